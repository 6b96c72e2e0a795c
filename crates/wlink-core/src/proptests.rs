//! Property tests for message encoding and error normalization.

use proptest::prelude::*;
use serde_json::json;
use url::Url;
use wlink_crypto::generate_key_pair;

use crate::chain::{build_add_chain_parameter, AddChainOverrides, NativeCurrency, Network};
use crate::codec::{build_request_url, decode_request_url_params};
use crate::errors::{is_user_rejection_message, USER_REJECTION_PHRASES};
use crate::message::RpcRequestMessage;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary app metadata survives the trip through a wallet URL.
    #[test]
    fn prop_request_url_preserves_params(name in ".*", logo in ".*", chains in prop::collection::vec(any::<u64>(), 0..4)) {
        let keys = generate_key_pair();
        let req = RpcRequestMessage::handshake(
            &keys.public,
            "demo://wlink",
            "eth_requestAccounts",
            json!({ "appName": name, "appLogoUrl": logo, "appChainIds": chains }),
        );
        let wallet = Url::parse("https://wallet.example/connect?ref=a&b").unwrap();
        let url = build_request_url(&wallet, &req).unwrap();
        let decoded = decode_request_url_params(url.query().unwrap()).unwrap();
        prop_assert_eq!(decoded, req);
    }

    /// Rejection phrases match regardless of case and surrounding text.
    #[test]
    fn prop_rejection_phrase_anywhere(prefix in "[a-z0-9 :]{0,16}", suffix in "[a-z0-9 .]{0,16}", idx in 0usize..5, upper in any::<bool>()) {
        let phrase = USER_REJECTION_PHRASES[idx % USER_REJECTION_PHRASES.len()];
        let phrase = if upper { phrase.to_uppercase() } else { phrase.to_string() };
        let message = format!("{}{}{}", prefix, phrase, suffix);
        prop_assert!(is_user_rejection_message(&message));
    }

    /// Override lists win when non-empty; otherwise defaults apply.
    #[test]
    fn prop_add_chain_prefers_overrides(
        rpc in prop::option::of(prop::collection::vec("https://[a-z]{1,8}\\.example", 0..3)),
        explorer in prop::option::of(prop::collection::vec("https://[a-z]{1,8}\\.scan", 0..3)),
        default_explorer in prop::option::of("https://[a-z]{1,8}\\.io"),
    ) {
        let network = Network {
            id: 7,
            name: "Seven".into(),
            native_currency: NativeCurrency::ether(),
            default_rpc_urls: vec!["https://rpc.seven".into()],
            default_block_explorer: default_explorer.clone(),
        };
        let overrides = AddChainOverrides {
            rpc_urls: rpc.clone(),
            block_explorer_urls: explorer.clone(),
            ..Default::default()
        };
        let param = build_add_chain_parameter(&network, &overrides);

        match rpc.filter(|v| !v.is_empty()) {
            Some(urls) => prop_assert_eq!(param.rpc_urls, urls),
            None => prop_assert_eq!(param.rpc_urls, network.default_rpc_urls),
        }
        match explorer.filter(|v| !v.is_empty()) {
            Some(urls) => prop_assert_eq!(param.block_explorer_urls, urls),
            None => prop_assert_eq!(param.block_explorer_urls, default_explorer.into_iter().collect::<Vec<_>>()),
        }
    }
}
