use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

/// The external wallet application a channel talks to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDescriptor {
    /// Stable identity used to scope persisted channel state.
    pub name: String,
    /// Universal link / URL scheme the wallet is launched through.
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
            icon_url: None,
        }
    }
}

/// Metadata the dapp presents to the wallet during the handshake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    /// Chains the dapp supports, preferred first.
    #[serde(default)]
    pub chain_ids: Vec<u64>,
    /// Return address the wallet deep-links back to.
    pub callback_url: String,
}

impl AppMetadata {
    /// Parameters of the `eth_requestAccounts` handshake.
    pub fn handshake_params(&self) -> Value {
        json!({
            "appName": self.name,
            "appLogoUrl": self.logo_url,
            "appChainIds": self.chain_ids,
        })
    }
}
