//! Error types for wlink core.
//!
//! This module defines the provider-level error returned by the wallet
//! client, the embedded cause carried by every user-rejection, and the
//! mapping to EIP-1193 style `{code, message}` errors that travel inside
//! wallet responses.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::ChannelError;
use crate::codec::CodecError;
use crate::round_trip::RoundTripError;
use crate::store::StoreError;

// ============================================================================
// RPC Error Codes
// ============================================================================

/// Provider error codes (EIP-1193, EIP-3085 and JSON-RPC).
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
}

/// `{code, message}` error as carried in a wallet response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

// ============================================================================
// User rejection
// ============================================================================

/// Phrases wallets use when the user declines, matched case-insensitively
/// as substrings.
///
/// Best-effort: a wallet phrasing its rejection differently surfaces as an
/// ordinary RPC error. This list is not a security boundary.
pub const USER_REJECTION_PHRASES: &[&str] = &[
    "user rejected",
    "user closed modal",
    "accounts received is empty",
    "user denied account",
    "request rejected",
];

/// Whether `message` matches one of [`USER_REJECTION_PHRASES`].
pub fn is_user_rejection_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    USER_REJECTION_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

/// Why a request ended as a user rejection.
///
/// Callers see one rejection kind; the cause is kept for logging and
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionCause {
    /// The wallet reported an explicit decline.
    Declined(String),
    /// The embedded browser was dismissed before the wallet returned.
    BrowserDismissed,
    /// Nothing came back before the round-trip deadline.
    Timeout,
    /// The host could not open the wallet.
    LaunchFailed(String),
    /// The wallet returned, but the payload could not be decoded.
    MalformedReturn(String),
}

impl fmt::Display for RejectionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionCause::Declined(msg) => write!(f, "declined: {}", msg),
            RejectionCause::BrowserDismissed => write!(f, "browser dismissed"),
            RejectionCause::Timeout => write!(f, "timed out waiting for wallet"),
            RejectionCause::LaunchFailed(msg) => write!(f, "launch failed: {}", msg),
            RejectionCause::MalformedReturn(msg) => write!(f, "malformed return payload: {}", msg),
        }
    }
}

// ============================================================================
// Provider Error
// ============================================================================

/// Errors returned by [`crate::client::WalletClient`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("user rejected the request ({0})")]
    UserRejected(RejectionCause),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("state storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("wallet error: {0}")]
    Rpc(ProviderRpcError),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),
}

impl From<RoundTripError> for ProviderError {
    fn from(e: RoundTripError) -> Self {
        match e {
            RoundTripError::UserRejected(cause) => ProviderError::UserRejected(cause),
        }
    }
}

impl ProviderError {
    /// The EIP-1193 code this error maps to.
    pub fn code(&self) -> i64 {
        match self {
            ProviderError::UserRejected(_) => codes::USER_REJECTED,
            ProviderError::Rpc(e) => e.code,
            ProviderError::Unauthorized(_) => codes::UNAUTHORIZED,
            ProviderError::InvalidParams(_) => codes::INVALID_PARAMS,
            ProviderError::Channel(_) | ProviderError::Store(_) | ProviderError::Codec(_) => {
                codes::INTERNAL
            }
        }
    }

    /// Whether this error means the user declined or abandoned the request.
    pub fn is_user_rejection(&self) -> bool {
        match self {
            ProviderError::UserRejected(_) => true,
            ProviderError::Rpc(e) => {
                e.code == codes::USER_REJECTED || is_user_rejection_message(&e.message)
            }
            _ => false,
        }
    }

    /// The rejection cause, if [`ProviderError::is_user_rejection`] holds.
    pub fn rejection_cause(&self) -> Option<RejectionCause> {
        match self {
            ProviderError::UserRejected(cause) => Some(cause.clone()),
            ProviderError::Rpc(e) if self.is_user_rejection() => {
                Some(RejectionCause::Declined(e.message.clone()))
            }
            _ => None,
        }
    }

    /// Wire form of this error.
    pub fn to_rpc_error(&self) -> ProviderRpcError {
        match self {
            ProviderError::Rpc(e) => e.clone(),
            other => ProviderRpcError::new(other.code(), other.to_string()),
        }
    }
}
