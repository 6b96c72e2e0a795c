//! Wallet client: the provider a dapp talks to.
//!
//! Owns one [`SecureChannelManager`] and one [`RoundTripCoordinator`] for a
//! single wallet. The first call performs the handshake; afterwards every
//! request is sealed under the channel secret, round-tripped through the
//! wallet, and opened again. Accounts and chain state are cached in scoped
//! storage so a restarted process stays connected.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use wlink_crypto::{PublicKey, SharedSecret};

use crate::chain::{parse_chain_id, to_hex_chain_id};
use crate::channel::SecureChannelManager;
use crate::codec::{decrypt_content, encrypt_content, CodecError};
use crate::errors::{codes, ProviderError, ProviderRpcError, RejectionCause};
use crate::events::{EventEmitter, ProviderEvent};
use crate::host::{BrowserOptions, HostEnvironment};
use crate::message::{
    EncryptedContent, EncryptedRequest, EncryptedResponse, RequestAction, ResponseContent,
    ResponseData, RpcRequestMessage, RpcResponseMessage, RpcResult,
};
use crate::round_trip::RoundTripCoordinator;
use crate::store::{KeyValueStorage, ScopedStorage, StoreError};
use crate::types::{AppMetadata, WalletDescriptor};

/// Component name client state is scoped under.
pub const CLIENT_COMPONENT: &str = "client";

pub const ACCOUNTS_KEY: &str = "accounts";
pub const ACTIVE_CHAIN_KEY: &str = "activeChain";
pub const AVAILABLE_CHAINS_KEY: &str = "availableChains";

/// Chain used when the dapp declares none.
pub const DEFAULT_CHAIN_ID: u64 = 1;

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub metadata: AppMetadata,
    pub wallet: WalletDescriptor,
    pub browser: BrowserOptions,
}

impl ClientOptions {
    pub fn new(metadata: AppMetadata, wallet: WalletDescriptor) -> Self {
        Self {
            metadata,
            wallet,
            browser: BrowserOptions::default(),
        }
    }
}

/// The chain requests are currently sent for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveChain {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

#[derive(Clone, Debug)]
struct ClientState {
    accounts: Vec<String>,
    chain: ActiveChain,
    available_chains: BTreeMap<u64, String>,
}

pub struct WalletClient<S, H: ?Sized> {
    options: ClientOptions,
    channel: Mutex<SecureChannelManager<S>>,
    state_store: ScopedStorage<S>,
    coordinator: RoundTripCoordinator<H>,
    state: RwLock<ClientState>,
    events: EventEmitter,
}

impl<S, H> WalletClient<S, H>
where
    S: KeyValueStorage + Clone,
    H: HostEnvironment + ?Sized,
{
    /// Build a client and restore any cached session state.
    pub async fn new(storage: S, host: Arc<H>, options: ClientOptions) -> Result<Self, ProviderError> {
        let wallet = options.wallet.name.clone();
        let state_store = ScopedStorage::new(storage.clone(), &wallet, CLIENT_COMPONENT);
        let channel = SecureChannelManager::new(storage, &wallet);
        let coordinator =
            RoundTripCoordinator::new(host).with_browser_options(options.browser.clone());

        let default_chain = ActiveChain {
            id: options
                .metadata
                .chain_ids
                .first()
                .copied()
                .unwrap_or(DEFAULT_CHAIN_ID),
            rpc_url: None,
        };
        let state = ClientState {
            accounts: load_cached(&state_store, ACCOUNTS_KEY).await?.unwrap_or_default(),
            chain: load_cached(&state_store, ACTIVE_CHAIN_KEY)
                .await?
                .unwrap_or(default_chain),
            available_chains: load_cached(&state_store, AVAILABLE_CHAINS_KEY)
                .await?
                .unwrap_or_default(),
        };
        debug!(
            wallet = %wallet,
            accounts = state.accounts.len(),
            chain = state.chain.id,
            "wallet client ready"
        );

        Ok(Self {
            options,
            channel: Mutex::new(channel),
            state_store,
            coordinator,
            state: RwLock::new(state),
            events: EventEmitter::new(),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub async fn accounts(&self) -> Vec<String> {
        self.state.read().await.accounts.clone()
    }

    pub async fn chain_id(&self) -> u64 {
        self.state.read().await.chain.id
    }

    pub async fn active_chain(&self) -> ActiveChain {
        self.state.read().await.chain.clone()
    }

    /// Chains the wallet advertised, chain id to RPC URL.
    pub async fn available_chains(&self) -> BTreeMap<u64, String> {
        self.state.read().await.available_chains.clone()
    }

    /// Whether a handshake has completed and not been disconnected.
    pub async fn is_connected(&self) -> bool {
        !self.state.read().await.accounts.is_empty()
    }

    /// Our channel public key.
    pub async fn own_public_key(&self) -> Result<PublicKey, ProviderError> {
        Ok(self.channel.lock().await.get_own_public_key().await?)
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Request accounts from the wallet, establishing the channel.
    ///
    /// Returns the cached accounts without a round trip when already
    /// connected.
    pub async fn handshake(&self) -> Result<Vec<String>, ProviderError> {
        {
            let state = self.state.read().await;
            if !state.accounts.is_empty() {
                return Ok(state.accounts.clone());
            }
        }

        let own = self.own_public_key().await?;
        let metadata = &self.options.metadata;
        let request = RpcRequestMessage::handshake(
            &own,
            &metadata.callback_url,
            "eth_requestAccounts",
            metadata.handshake_params(),
        );
        info!(request_id = %request.id, wallet = %self.options.wallet.name, "starting handshake");

        let response = self.round_trip(&request).await?;
        let content = self.encrypted_content(response.content).await?;

        let peer = PublicKey::from_hex(&response.sender).map_err(CodecError::from)?;
        let decrypted: EncryptedResponse = {
            let mut channel = self.channel.lock().await;
            let candidate = channel.derive_secret_for(&peer).await?;
            // The sender only becomes our peer once its payload opens.
            let decrypted = decrypt_content(&candidate, &content)?;
            channel.set_peer_public_key(peer).await?;
            decrypted
        };
        self.apply_response_data(decrypted.data).await?;

        let value = match decrypted.result {
            RpcResult::Value(value) => value,
            RpcResult::Error(e) => return Err(self.wallet_error(e).await),
        };
        let accounts: Vec<String> = serde_json::from_value(value).map_err(CodecError::from)?;
        if accounts.is_empty() {
            return Err(ProviderError::UserRejected(RejectionCause::Declined(
                "accounts received is empty".into(),
            )));
        }

        self.state_store.store_json(ACCOUNTS_KEY, &accounts).await?;
        self.state.write().await.accounts = accounts.clone();
        info!(accounts = accounts.len(), peer = %peer.fingerprint(), "handshake complete");
        self.events
            .emit(ProviderEvent::AccountsChanged(accounts.clone()));

        Ok(accounts)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Perform an EIP-1193 request.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        if let Some(value) = self.answer_locally(method, &params).await? {
            debug!(method, "answered locally");
            return Ok(value);
        }

        let secret = self.shared_secret().await?;
        let chain_id = self.chain_id().await;
        let payload = EncryptedRequest {
            action: RequestAction {
                method: method.to_string(),
                params: params.clone(),
            },
            chain_id,
        };
        let sealed = encrypt_content(&secret, &payload)?;
        let own = self.own_public_key().await?;
        let request =
            RpcRequestMessage::encrypted(&own, &self.options.metadata.callback_url, &sealed);
        debug!(request_id = %request.id, method, chain_id, "sending request");

        let response = self.round_trip(&request).await?;
        let content = self.encrypted_content(response.content).await?;
        let decrypted: EncryptedResponse = decrypt_content(&secret, &content)?;
        self.apply_response_data(decrypted.data).await?;

        match decrypted.result {
            RpcResult::Value(value) => {
                self.after_success(method, &params, &value).await?;
                Ok(value)
            }
            RpcResult::Error(e) => Err(self.wallet_error(e).await),
        }
    }

    /// Forget the channel and every cached value.
    ///
    /// Every removal is attempted; `disconnect` is emitted either way and
    /// the first failure is returned.
    pub async fn disconnect(&self) -> Result<(), ProviderError> {
        let result = self.reset().await;
        info!(wallet = %self.options.wallet.name, "disconnected");
        self.events.emit(ProviderEvent::Disconnect);
        result
    }

    async fn answer_locally(&self, method: &str, params: &Value) -> Result<Option<Value>, ProviderError> {
        let state = self.state.read().await.clone();
        let value = match method {
            "eth_accounts" => json!(state.accounts),
            "eth_coinbase" => state
                .accounts
                .first()
                .map(|a| json!(a))
                .unwrap_or(Value::Null),
            "net_version" => json!(state.chain.id.to_string()),
            "eth_chainId" => json!(to_hex_chain_id(state.chain.id)),
            "eth_requestAccounts" => json!(self.handshake().await?),
            "wallet_switchEthereumChain" => {
                let target = switch_target(params)?;
                if target == state.chain.id {
                    Value::Null
                } else if state.available_chains.contains_key(&target) {
                    self.update_chain(target).await?;
                    Value::Null
                } else {
                    return Ok(None);
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    async fn after_success(&self, method: &str, params: &Value, value: &Value) -> Result<(), ProviderError> {
        match method {
            "wallet_switchEthereumChain" => {
                let target = switch_target(params)?;
                self.update_chain(target).await
            }
            "wallet_addEthereumChain" if value.is_null() => {
                match params.get(0).and_then(|p| p.get("chainId")).and_then(parse_chain_id) {
                    Some(added) => self.update_chain(added).await,
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn shared_secret(&self) -> Result<SharedSecret, ProviderError> {
        let secret = self.channel.lock().await.get_shared_secret().await?;
        let connected = self.is_connected().await;
        match secret {
            Some(secret) if connected => Ok(secret),
            _ => Err(ProviderError::Unauthorized(
                "not connected; call eth_requestAccounts first".into(),
            )),
        }
    }

    async fn round_trip(&self, request: &RpcRequestMessage) -> Result<RpcResponseMessage, ProviderError> {
        let response = self
            .coordinator
            .send_and_await(
                request,
                &self.options.metadata.callback_url,
                &self.options.wallet,
            )
            .await?;
        Ok(response)
    }

    async fn encrypted_content(&self, content: ResponseContent) -> Result<EncryptedContent, ProviderError> {
        match content {
            ResponseContent::Encrypted(content) => Ok(content),
            ResponseContent::Failure(e) => Err(self.wallet_error(e).await),
        }
    }

    /// Surface a wallet error. An unauthorized error ends the session.
    async fn wallet_error(&self, error: ProviderRpcError) -> ProviderError {
        if error.code == codes::UNAUTHORIZED {
            warn!("wallet reports session unauthorized, disconnecting");
            if let Err(e) = self.disconnect().await {
                warn!("failed to clear session state: {}", e);
            }
        }
        ProviderError::Rpc(error)
    }

    async fn apply_response_data(&self, data: Option<ResponseData>) -> Result<(), ProviderError> {
        let Some(chains) = data.and_then(|d| d.chains) else {
            return Ok(());
        };
        self.state_store.store_json(AVAILABLE_CHAINS_KEY, &chains).await?;

        let mut state = self.state.write().await;
        state.available_chains = chains;
        if let Some(url) = state.available_chains.get(&state.chain.id).cloned() {
            if state.chain.rpc_url.as_deref() != Some(url.as_str()) {
                state.chain.rpc_url = Some(url);
                self.state_store
                    .store_json(ACTIVE_CHAIN_KEY, &state.chain)
                    .await?;
            }
        }
        Ok(())
    }

    async fn update_chain(&self, id: u64) -> Result<(), ProviderError> {
        let changed = {
            let mut state = self.state.write().await;
            let rpc_url = state.available_chains.get(&id).cloned();
            let chain = ActiveChain { id, rpc_url };
            if state.chain == chain {
                false
            } else {
                let changed = state.chain.id != id;
                self.state_store.store_json(ACTIVE_CHAIN_KEY, &chain).await?;
                state.chain = chain;
                changed
            }
        };
        if changed {
            info!(chain_id = id, "active chain changed");
            self.events.emit(ProviderEvent::ChainChanged(id));
        }
        Ok(())
    }

    async fn reset(&self) -> Result<(), ProviderError> {
        let mut first_err: Option<ProviderError> = None;
        if let Err(e) = self.channel.lock().await.clear().await {
            first_err = Some(e.into());
        }
        for key in [ACCOUNTS_KEY, ACTIVE_CHAIN_KEY, AVAILABLE_CHAINS_KEY] {
            if let Err(e) = self.state_store.remove_item(key).await {
                warn!("failed to remove {}: {}", key, e);
                first_err.get_or_insert(e.into());
            }
        }

        let mut state = self.state.write().await;
        state.accounts.clear();
        state.available_chains.clear();
        state.chain.rpc_url = None;

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Read a cached value; one that no longer parses is dropped with a warning.
async fn load_cached<S, T>(store: &ScopedStorage<S>, key: &str) -> Result<Option<T>, StoreError>
where
    S: KeyValueStorage,
    T: serde::de::DeserializeOwned,
{
    match store.load_json(key).await {
        Ok(value) => Ok(value),
        Err(StoreError::Serialization(e)) => {
            warn!("ignoring unreadable cached {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn switch_target(params: &Value) -> Result<u64, ProviderError> {
    params
        .get(0)
        .and_then(|p| p.get("chainId"))
        .and_then(parse_chain_id)
        .ok_or_else(|| ProviderError::InvalidParams("expected [{ chainId }]".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelError;
    use crate::codec::{decode_request_url_params, response_url};
    use crate::harness::{HostReaction, MockHost, ScriptedOutcome, ScriptedWallet};
    use wlink_crypto::{generate_key_pair, EncryptedData};
    use crate::store::InMemoryStorage;
    use std::sync::Mutex as StdMutex;
    use url::Url;

    const ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";

    fn options() -> ClientOptions {
        ClientOptions::new(
            AppMetadata {
                name: "Demo".into(),
                logo_url: None,
                chain_ids: vec![8453],
                callback_url: "demo://wlink".into(),
            },
            WalletDescriptor::new("test-wallet", Url::parse("https://wallet.example/connect").unwrap()),
        )
    }

    fn wallet() -> ScriptedWallet {
        ScriptedWallet::new(vec![ACCOUNT.to_string()])
            .with_chain(8453, "https://mainnet.base.org")
            .with_chain(84532, "https://sepolia.base.org")
    }

    async fn client(
        storage: &InMemoryStorage,
        host: &Arc<MockHost>,
    ) -> WalletClient<InMemoryStorage, MockHost> {
        WalletClient::new(storage.clone(), host.clone(), options())
            .await
            .unwrap()
    }

    /// Answer every request with a sealed-looking response from `sender`.
    fn unreadable_responder(sender: PublicKey) -> impl Fn(&Url) -> HostReaction + Send + Sync {
        move |url| {
            let request = decode_request_url_params(url.query().unwrap()).unwrap();
            let sealed = EncryptedData {
                iv: [7u8; 12],
                cipher_text: vec![0u8; 48],
            };
            let response = RpcResponseMessage::encrypted(request.id, &sender, &sealed);
            HostReaction::DeepLink(response_url("demo://wlink", &response).unwrap().to_string())
        }
    }

    #[tokio::test]
    async fn test_low_order_sender_does_not_stick() {
        let storage = InMemoryStorage::new();
        let host = Arc::new(MockHost::new());
        host.set_responder(unreadable_responder(PublicKey::from([0u8; 32])));
        let client = client(&storage, &host).await;

        let err = client.handshake().await.unwrap_err();
        assert!(matches!(err, ProviderError::Channel(ChannelError::KeyDerivation(_))));
        assert!(client.own_public_key().await.is_ok());

        let wallet = wallet();
        host.set_responder(move |url| wallet.respond(url));
        let accounts = client.handshake().await.unwrap();
        assert_eq!(accounts, vec![ACCOUNT.to_string()]);
        assert_eq!(host.opened_urls().len(), 2);
    }

    #[tokio::test]
    async fn test_undecryptable_handshake_keeps_peer_unset() {
        let storage = InMemoryStorage::new();
        let host = Arc::new(MockHost::new());
        host.set_responder(unreadable_responder(generate_key_pair().public));
        let client = client(&storage, &host).await;

        let err = client.handshake().await.unwrap_err();
        assert!(matches!(err, ProviderError::Codec(_)));
        assert!(client.channel.lock().await.peer_public_key().await.unwrap().is_none());
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_handshake_establishes_channel() {
        let storage = InMemoryStorage::new();
        let host = Arc::new(MockHost::new().with_wallet(wallet()));
        let client = client(&storage, &host).await;

        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = events.clone();
        client.events().on(move |e| sink.lock().unwrap().push(e.clone()));

        let accounts = client.handshake().await.unwrap();
        assert_eq!(accounts, vec![ACCOUNT.to_string()]);
        assert!(client.is_connected().await);
        assert_eq!(
            client.active_chain().await.rpc_url.as_deref(),
            Some("https://mainnet.base.org")
        );
        assert_eq!(
            *events.lock().unwrap(),
            vec![ProviderEvent::AccountsChanged(vec![ACCOUNT.to_string()])]
        );

        // Cached accounts: no second round trip.
        client.handshake().await.unwrap();
        assert_eq!(host.opened_urls().len(), 1);
    }

    #[tokio::test]
    async fn test_local_answers() {
        let host = Arc::new(MockHost::new().with_wallet(wallet()));
        let client = client(&InMemoryStorage::new(), &host).await;

        assert_eq!(client.request("eth_accounts", Value::Null).await.unwrap(), json!([]));
        assert_eq!(client.request("eth_chainId", Value::Null).await.unwrap(), json!("0x2105"));
        assert_eq!(client.request("net_version", Value::Null).await.unwrap(), json!("8453"));

        let accounts = client.request("eth_requestAccounts", Value::Null).await.unwrap();
        assert_eq!(accounts, json!([ACCOUNT]));
        assert_eq!(client.request("eth_coinbase", Value::Null).await.unwrap(), json!(ACCOUNT));
        assert_eq!(host.opened_urls().len(), 1);
    }

    #[tokio::test]
    async fn test_encrypted_request_round_trip() {
        let host = Arc::new(MockHost::new().with_wallet(
            wallet().script("personal_sign", ScriptedOutcome::Value(json!("0xsigned"))),
        ));
        let client = client(&InMemoryStorage::new(), &host).await;
        client.handshake().await.unwrap();

        let sig = client
            .request("personal_sign", json!(["0x68656c6c6f", ACCOUNT]))
            .await
            .unwrap();
        assert_eq!(sig, json!("0xsigned"));
        assert_eq!(host.opened_urls().len(), 2);
    }

    #[tokio::test]
    async fn test_request_requires_connection() {
        let host = Arc::new(MockHost::new().with_wallet(wallet()));
        let client = client(&InMemoryStorage::new(), &host).await;

        let err = client.request("personal_sign", json!([])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unauthorized(_)));
        assert_eq!(err.code(), codes::UNAUTHORIZED);
        assert!(host.opened_urls().is_empty());
    }

    #[tokio::test]
    async fn test_known_chain_switches_locally() {
        let host = Arc::new(MockHost::new().with_wallet(wallet()));
        let client = client(&InMemoryStorage::new(), &host).await;
        client.handshake().await.unwrap();

        let changed = Arc::new(StdMutex::new(Vec::new()));
        let sink = changed.clone();
        client.events().on(move |e| sink.lock().unwrap().push(e.clone()));

        client
            .request("wallet_switchEthereumChain", json!([{ "chainId": "0x14a34" }]))
            .await
            .unwrap();
        assert_eq!(client.chain_id().await, 84532);
        assert_eq!(host.opened_urls().len(), 1);
        assert_eq!(*changed.lock().unwrap(), vec![ProviderEvent::ChainChanged(84532)]);
    }

    #[tokio::test]
    async fn test_unknown_chain_switch_goes_to_wallet() {
        let host = Arc::new(MockHost::new().with_wallet(wallet().with_switchable_chain(10)));
        let client = client(&InMemoryStorage::new(), &host).await;
        client.handshake().await.unwrap();

        client
            .request("wallet_switchEthereumChain", json!([{ "chainId": "0xa" }]))
            .await
            .unwrap();
        assert_eq!(client.chain_id().await, 10);
        assert_eq!(host.opened_urls().len(), 2);
    }

    #[tokio::test]
    async fn test_wallet_error_surfaces_code() {
        let host = Arc::new(MockHost::new().with_wallet(wallet().script(
            "eth_sendTransaction",
            ScriptedOutcome::Error {
                code: codes::USER_REJECTED,
                message: "User rejected the request.".into(),
            },
        )));
        let client = client(&InMemoryStorage::new(), &host).await;
        client.handshake().await.unwrap();

        let err = client.request("eth_sendTransaction", json!([{}])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rpc(ref e) if e.code == codes::USER_REJECTED));
        assert!(err.is_user_rejection());
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn test_unauthorized_wallet_error_disconnects() {
        let host = Arc::new(MockHost::new().with_wallet(wallet().script(
            "eth_sign",
            ScriptedOutcome::Error {
                code: codes::UNAUTHORIZED,
                message: "session expired".into(),
            },
        )));
        let client = client(&InMemoryStorage::new(), &host).await;
        client.handshake().await.unwrap();

        let err = client.request("eth_sign", json!([])).await.unwrap_err();
        assert_eq!(err.code(), codes::UNAUTHORIZED);
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_handshake_failure_content() {
        let host = Arc::new(MockHost::new().with_wallet(wallet().script(
            "eth_requestAccounts",
            ScriptedOutcome::Failure {
                code: codes::USER_REJECTED,
                message: "User denied account authorization".into(),
            },
        )));
        let client = client(&InMemoryStorage::new(), &host).await;

        let err = client.handshake().await.unwrap_err();
        assert!(err.is_user_rejection());
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_dismissed_handshake_is_user_rejected() {
        let host = Arc::new(MockHost::new().with_wallet(
            wallet().script("eth_requestAccounts", ScriptedOutcome::Dismiss),
        ));
        let client = client(&InMemoryStorage::new(), &host).await;

        let err = client.handshake().await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::UserRejected(RejectionCause::BrowserDismissed)
        ));
    }

    #[tokio::test]
    async fn test_session_survives_restart_and_disconnect_clears_it() {
        let storage = InMemoryStorage::new();
        let host = Arc::new(MockHost::new().with_wallet(
            wallet().script("eth_signTypedData_v4", ScriptedOutcome::Value(json!("0x01"))),
        ));

        client(&storage, &host).await.handshake().await.unwrap();

        let restarted = client(&storage, &host).await;
        assert!(restarted.is_connected().await);
        assert_eq!(
            restarted
                .request("eth_signTypedData_v4", json!([ACCOUNT, "{}"]))
                .await
                .unwrap(),
            json!("0x01")
        );

        let disconnected = Arc::new(StdMutex::new(false));
        let flag = disconnected.clone();
        restarted.events().on(move |e| {
            if *e == ProviderEvent::Disconnect {
                *flag.lock().unwrap() = true;
            }
        });
        restarted.disconnect().await.unwrap();
        assert!(*disconnected.lock().unwrap());
        assert!(!restarted.is_connected().await);
        assert!(storage.is_empty().await);
    }
}
