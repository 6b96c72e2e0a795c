//! wlink core - secure dapp-to-wallet channel over a deep-link return path.
//!
//! This crate implements:
//! - Channel key lifecycle (own key pair, peer key, derived secret)
//! - Request/response round trips through an external wallet app
//! - URL parameter codec for request and response messages
//! - Wallet client (handshake, sealed requests, cached session state)
//! - Connector with chain switching and user-rejection normalization
//! - Persistent storage abstraction

#![forbid(unsafe_code)]

// Channel and transport
pub mod channel;
pub mod round_trip;
pub mod codec;
pub mod message;

// Provider surface
pub mod client;
pub mod connector;
pub mod chain;
pub mod events;

// Infrastructure
pub mod store;
pub mod host;
pub mod listeners;

// Supporting modules
pub mod errors;
pub mod types;
pub mod harness;

#[cfg(test)]
mod proptests;

// Optional storage implementations
#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use channel::{ChannelError, SecureChannelManager};
pub use client::{ClientOptions, WalletClient};
pub use connector::{ConnectorError, EventSink, WalletConnector};
pub use errors::{ProviderError, ProviderRpcError, RejectionCause};
pub use round_trip::{RoundTripCoordinator, RoundTripError, ROUND_TRIP_TIMEOUT};
pub use types::{AppMetadata, WalletDescriptor};
