//! Request and response messages exchanged with the wallet.
//!
//! Outer messages travel as URL query parameters (see [`crate::codec`]).
//! Everything past the handshake is sealed: the plaintext payload types at
//! the bottom of this module only ever appear inside `encrypted` content.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use wlink_crypto::{EncryptedData, PublicKey};

use crate::errors::ProviderRpcError;

/// Version string stamped on every outbound request.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Request
// ============================================================================

/// Outbound request as carried to the wallet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequestMessage {
    pub id: Uuid,
    /// Our public key, hex.
    pub sender: String,
    pub content: RequestContent,
    pub timestamp: DateTime<Utc>,
    /// Return address the wallet deep-links back to.
    pub callback_url: String,
    pub sdk_version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestContent {
    Handshake(HandshakeContent),
    Encrypted(EncryptedContent),
}

/// Plaintext capability negotiation sent before a secret exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandshakeContent {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequestMessage {
    fn with_content(sender: &PublicKey, callback_url: &str, content: RequestContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.to_hex(),
            content,
            timestamp: Utc::now(),
            callback_url: callback_url.to_string(),
            sdk_version: SDK_VERSION.to_string(),
        }
    }

    /// A handshake request; `params` are sent in the clear.
    pub fn handshake(
        sender: &PublicKey,
        callback_url: &str,
        method: impl Into<String>,
        params: Value,
    ) -> Self {
        Self::with_content(
            sender,
            callback_url,
            RequestContent::Handshake(HandshakeContent {
                method: method.into(),
                params,
            }),
        )
    }

    /// A request carrying a sealed [`EncryptedRequest`].
    pub fn encrypted(sender: &PublicKey, callback_url: &str, data: &EncryptedData) -> Self {
        Self::with_content(
            sender,
            callback_url,
            RequestContent::Encrypted(EncryptedContent::from(data)),
        )
    }

    pub fn is_handshake(&self) -> bool {
        matches!(self.content, RequestContent::Handshake(_))
    }
}

// ============================================================================
// Response
// ============================================================================

/// Inbound response decoded from a return deep link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponseMessage {
    pub id: Uuid,
    /// Id of the request this answers.
    pub request_id: Uuid,
    /// The wallet's public key, hex.
    pub sender: String,
    pub content: ResponseContent,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseContent {
    Encrypted(EncryptedContent),
    /// The wallet failed the request before any secret was in play.
    Failure(ProviderRpcError),
}

impl RpcResponseMessage {
    /// An encrypted response answering `request`.
    pub fn encrypted(request_id: Uuid, sender: &PublicKey, data: &EncryptedData) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            sender: sender.to_hex(),
            content: ResponseContent::Encrypted(EncryptedContent::from(data)),
            timestamp: Utc::now(),
        }
    }

    /// A failure response answering `request`.
    pub fn failure(request_id: Uuid, sender: &PublicKey, error: ProviderRpcError) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            sender: sender.to_hex(),
            content: ResponseContent::Failure(error),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Encrypted content
// ============================================================================

/// Sealed payload with its nonce, both hex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedContent {
    pub iv: String,
    pub cipher_text: String,
}

impl From<&EncryptedData> for EncryptedContent {
    fn from(data: &EncryptedData) -> Self {
        Self {
            iv: hex::encode(data.iv),
            cipher_text: hex::encode(&data.cipher_text),
        }
    }
}

// ============================================================================
// Sealed payloads
// ============================================================================

/// Plaintext of an encrypted request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRequest {
    pub action: RequestAction,
    pub chain_id: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestAction {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Plaintext of an encrypted response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptedResponse {
    pub result: RpcResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl EncryptedResponse {
    pub fn value(value: Value) -> Self {
        Self {
            result: RpcResult::Value(value),
            data: None,
        }
    }

    pub fn error(error: ProviderRpcError) -> Self {
        Self {
            result: RpcResult::Error(error),
            data: None,
        }
    }

    pub fn with_data(mut self, data: ResponseData) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcResult {
    Value(Value),
    Error(ProviderRpcError),
}

/// Side data a wallet may attach to any response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    /// Chains the wallet can serve, chain id to RPC URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<BTreeMap<u64, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
}
