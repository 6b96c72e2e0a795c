//! Network definitions and the `wallet_addEthereumChain` payload.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn ether() -> Self {
        Self {
            name: "Ether".into(),
            symbol: "ETH".into(),
            decimals: 18,
        }
    }
}

/// A network the connector may switch to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: u64,
    pub name: String,
    pub native_currency: NativeCurrency,
    #[serde(default)]
    pub default_rpc_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_block_explorer: Option<String>,
}

impl Network {
    pub fn mainnet() -> Self {
        Self {
            id: 1,
            name: "Ethereum".into(),
            native_currency: NativeCurrency::ether(),
            default_rpc_urls: vec!["https://cloudflare-eth.com".into()],
            default_block_explorer: Some("https://etherscan.io".into()),
        }
    }

    pub fn base() -> Self {
        Self {
            id: 8453,
            name: "Base".into(),
            native_currency: NativeCurrency::ether(),
            default_rpc_urls: vec!["https://mainnet.base.org".into()],
            default_block_explorer: Some("https://basescan.org".into()),
        }
    }

    pub fn base_sepolia() -> Self {
        Self {
            id: 84532,
            name: "Base Sepolia".into(),
            native_currency: NativeCurrency {
                name: "Sepolia Ether".into(),
                symbol: "ETH".into(),
                decimals: 18,
            },
            default_rpc_urls: vec!["https://sepolia.base.org".into()],
            default_block_explorer: Some("https://sepolia.basescan.org".into()),
        }
    }
}

/// Caller-supplied values for an add-chain request. Unset fields fall back
/// to the network's defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_currency: Option<NativeCurrency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_explorer_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_urls: Option<Vec<String>>,
}

/// EIP-3085 `wallet_addEthereumChain` parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEthereumChainParameter {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icon_urls: Vec<String>,
}

/// Merge `overrides` with `network`'s defaults.
///
/// Non-empty override lists win; otherwise the network's defaults are used,
/// and an empty list when the network has none.
pub fn build_add_chain_parameter(
    network: &Network,
    overrides: &AddChainOverrides,
) -> AddEthereumChainParameter {
    let rpc_urls = match &overrides.rpc_urls {
        Some(urls) if !urls.is_empty() => urls.clone(),
        _ => network.default_rpc_urls.clone(),
    };
    let block_explorer_urls = match &overrides.block_explorer_urls {
        Some(urls) if !urls.is_empty() => urls.clone(),
        _ => network.default_block_explorer.iter().cloned().collect(),
    };

    AddEthereumChainParameter {
        chain_id: to_hex_chain_id(network.id),
        chain_name: overrides
            .chain_name
            .clone()
            .unwrap_or_else(|| network.name.clone()),
        native_currency: overrides
            .native_currency
            .clone()
            .unwrap_or_else(|| network.native_currency.clone()),
        rpc_urls,
        block_explorer_urls,
        icon_urls: overrides.icon_urls.clone().unwrap_or_default(),
    }
}

/// `0x`-prefixed lowercase hex chain id.
pub fn to_hex_chain_id(id: u64) -> String {
    format!("0x{:x}", id)
}

/// Parse a chain id given as `0x` hex, decimal string, or JSON number.
pub fn parse_chain_id(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}
