//! Test harness for wlink core.
//!
//! In-process stand-ins for everything outside the crate: a host that
//! records browser activity and delivers deep links on demand, a scripted
//! wallet that answers requests the way a real wallet would, a storage
//! backend that can be told to fail, and an event sink that records what it
//! receives. Used by unit tests, the integration tests and the CLI.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;
use wlink_crypto::{derive_shared_secret, generate_key_pair, KeyPair, PublicKey, SharedSecret};

use crate::chain::parse_chain_id;
use crate::codec::{decode_request_url_params, decrypt_content, encrypt_content, response_url};
use crate::connector::{ConnectorChange, EventSink};
use crate::errors::{codes, ProviderRpcError};
use crate::host::{BrowserOptions, DeepLinkCallback, DismissCallback, HostEnvironment, HostError};
use crate::listeners::{ListenerId, ListenerRegistry};
use crate::message::{
    EncryptedRequest, EncryptedResponse, RequestContent, ResponseData, RpcRequestMessage,
    RpcResponseMessage,
};
use crate::store::{InMemoryStorage, KeyValueStorage, StoreError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Mock host
// ============================================================================

/// What the host does right after opening a URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostReaction {
    /// Deliver this deep link.
    DeepLink(String),
    /// Report the browser dismissed.
    Dismiss,
    /// Leave the browser open.
    Nothing,
    /// Refuse to open.
    FailLaunch(String),
}

type Responder = Arc<dyn Fn(&Url) -> HostReaction + Send + Sync>;

/// In-process [`HostEnvironment`].
pub struct MockHost {
    deep_links: ListenerRegistry<dyn Fn(String) + Send + Sync>,
    dismissals: ListenerRegistry<dyn Fn() + Send + Sync>,
    responder: Mutex<Option<Responder>>,
    opened: Mutex<Vec<Url>>,
    close_count: AtomicUsize,
    deep_link_removals: AtomicUsize,
    dismiss_removals: AtomicUsize,
}

impl Default for MockHost {
    fn default() -> Self {
        Self {
            deep_links: ListenerRegistry::new(),
            dismissals: ListenerRegistry::new(),
            responder: Mutex::new(None),
            opened: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
            deep_link_removals: AtomicUsize::new(0),
            dismiss_removals: AtomicUsize::new(0),
        }
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every opened URL to `wallet`.
    pub fn with_wallet(self, wallet: ScriptedWallet) -> Self {
        self.set_responder(move |url| wallet.respond(url));
        self
    }

    /// React the same way to every opened URL.
    pub fn set_reaction(&self, reaction: HostReaction) {
        self.set_responder(move |_| reaction.clone());
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&Url) -> HostReaction + Send + Sync + 'static,
    {
        *lock(&self.responder) = Some(Arc::new(responder));
    }

    /// Deliver a deep link to every registered listener.
    pub fn fire_deep_link(&self, link: &str) {
        for callback in self.deep_links.snapshot() {
            callback(link.to_string());
        }
    }

    /// Report the browser dismissed to every registered listener.
    pub fn fire_dismiss(&self) {
        for callback in self.dismissals.snapshot() {
            callback();
        }
    }

    pub fn opened_urls(&self) -> Vec<Url> {
        lock(&self.opened).clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn deep_link_listener_count(&self) -> usize {
        self.deep_links.len()
    }

    pub fn dismiss_listener_count(&self) -> usize {
        self.dismissals.len()
    }

    /// Calls to `remove_deep_link_listener`.
    pub fn deep_link_removals(&self) -> usize {
        self.deep_link_removals.load(Ordering::SeqCst)
    }

    /// Calls to `remove_dismiss_listener`.
    pub fn dismiss_removals(&self) -> usize {
        self.dismiss_removals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostEnvironment for MockHost {
    fn add_deep_link_listener(&self, callback: DeepLinkCallback) -> ListenerId {
        self.deep_links.add(Arc::from(callback))
    }

    fn remove_deep_link_listener(&self, id: ListenerId) {
        self.deep_link_removals.fetch_add(1, Ordering::SeqCst);
        self.deep_links.remove(id);
    }

    fn add_dismiss_listener(&self, callback: DismissCallback) -> ListenerId {
        self.dismissals.add(Arc::from(callback))
    }

    fn remove_dismiss_listener(&self, id: ListenerId) {
        self.dismiss_removals.fetch_add(1, Ordering::SeqCst);
        self.dismissals.remove(id);
    }

    async fn open_browser(&self, url: &Url, _options: &BrowserOptions) -> Result<(), HostError> {
        let responder = lock(&self.responder).clone();
        let reaction = match responder {
            Some(responder) => responder(url),
            None => HostReaction::Nothing,
        };

        if let HostReaction::FailLaunch(reason) = reaction {
            return Err(HostError::LaunchFailed(reason));
        }
        lock(&self.opened).push(url.clone());

        match reaction {
            HostReaction::DeepLink(link) => self.fire_deep_link(&link),
            HostReaction::Dismiss => self.fire_dismiss(),
            HostReaction::Nothing | HostReaction::FailLaunch(_) => {}
        }
        Ok(())
    }

    async fn close_browser(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Scripted wallet
// ============================================================================

/// Canned answer for one method.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptedOutcome {
    /// Encrypted `result.value`.
    Value(Value),
    /// Encrypted `result.error`.
    Error { code: i64, message: String },
    /// Plaintext failure content.
    Failure { code: i64, message: String },
    /// The user closes the browser.
    Dismiss,
    /// The wallet never returns.
    Ignore,
}

#[derive(Default)]
struct WalletState {
    accounts: Vec<String>,
    chains: BTreeMap<u64, String>,
    switchable: BTreeSet<u64>,
    scripts: HashMap<String, ScriptedOutcome>,
    added_chains: Vec<Value>,
    methods: Vec<String>,
    active_chain: Option<u64>,
}

/// A wallet that answers requests from a script.
///
/// Clones share state, so a test can keep a handle after giving one to a
/// [`MockHost`].
#[derive(Clone)]
pub struct ScriptedWallet {
    keys: Arc<KeyPair>,
    state: Arc<Mutex<WalletState>>,
}

impl ScriptedWallet {
    pub fn new(accounts: Vec<String>) -> Self {
        Self {
            keys: Arc::new(generate_key_pair()),
            state: Arc::new(Mutex::new(WalletState {
                accounts,
                ..Default::default()
            })),
        }
    }

    /// Advertise a chain in handshake responses.
    pub fn with_chain(self, id: u64, rpc_url: &str) -> Self {
        lock(&self.state).chains.insert(id, rpc_url.to_string());
        self
    }

    /// Accept switching to a chain without advertising it.
    pub fn with_switchable_chain(self, id: u64) -> Self {
        lock(&self.state).switchable.insert(id);
        self
    }

    /// Answer `method` with `outcome` instead of the default behavior.
    pub fn script(self, method: &str, outcome: ScriptedOutcome) -> Self {
        lock(&self.state).scripts.insert(method.to_string(), outcome);
        self
    }

    pub fn public_key(&self) -> PublicKey {
        self.keys.public
    }

    /// Methods received, in order.
    pub fn methods(&self) -> Vec<String> {
        lock(&self.state).methods.clone()
    }

    /// Parameters of every `wallet_addEthereumChain` received.
    pub fn added_chains(&self) -> Vec<Value> {
        lock(&self.state).added_chains.clone()
    }

    pub fn active_chain(&self) -> Option<u64> {
        lock(&self.state).active_chain
    }

    /// React to a request URL opened by the dapp.
    pub fn respond(&self, url: &Url) -> HostReaction {
        let Some(request) = url.query().and_then(|q| decode_request_url_params(q).ok()) else {
            return HostReaction::Nothing;
        };
        let Some(secret) = PublicKey::from_hex(&request.sender)
            .ok()
            .and_then(|dapp| derive_shared_secret(&self.keys.private, &dapp).ok())
        else {
            return HostReaction::Nothing;
        };

        let (method, params) = match &request.content {
            RequestContent::Handshake(h) => (h.method.clone(), h.params.clone()),
            RequestContent::Encrypted(content) => {
                match decrypt_content::<EncryptedRequest>(&secret, content) {
                    Ok(payload) => (payload.action.method, payload.action.params),
                    Err(_) => return HostReaction::Nothing,
                }
            }
        };

        let mut state = lock(&self.state);
        state.methods.push(method.clone());
        let is_handshake = request.is_handshake();
        let scripted = state.scripts.get(&method).cloned();

        let payload = match scripted {
            Some(ScriptedOutcome::Dismiss) => return HostReaction::Dismiss,
            Some(ScriptedOutcome::Ignore) => return HostReaction::Nothing,
            Some(ScriptedOutcome::Failure { code, message }) => {
                drop(state);
                let response = RpcResponseMessage::failure(
                    request.id,
                    &self.keys.public,
                    ProviderRpcError::new(code, message),
                );
                return deliver(&request, &response);
            }
            Some(ScriptedOutcome::Value(value)) => EncryptedResponse::value(value),
            Some(ScriptedOutcome::Error { code, message }) => {
                EncryptedResponse::error(ProviderRpcError::new(code, message))
            }
            None => default_answer(&mut state, &method, &params),
        };
        let payload = if is_handshake {
            payload.with_data(ResponseData {
                chains: Some(state.chains.clone()),
                capabilities: None,
            })
        } else {
            payload
        };
        drop(state);

        self.seal_and_deliver(&request, &secret, &payload)
    }

    fn seal_and_deliver(
        &self,
        request: &RpcRequestMessage,
        secret: &SharedSecret,
        payload: &EncryptedResponse,
    ) -> HostReaction {
        match encrypt_content(secret, payload) {
            Ok(sealed) => {
                let response = RpcResponseMessage::encrypted(request.id, &self.keys.public, &sealed);
                deliver(request, &response)
            }
            Err(_) => HostReaction::Nothing,
        }
    }
}

fn deliver(request: &RpcRequestMessage, response: &RpcResponseMessage) -> HostReaction {
    match response_url(&request.callback_url, response) {
        Ok(link) => HostReaction::DeepLink(link.to_string()),
        Err(_) => HostReaction::Nothing,
    }
}

fn default_answer(state: &mut WalletState, method: &str, params: &Value) -> EncryptedResponse {
    let target = params
        .get(0)
        .and_then(|p| p.get("chainId"))
        .and_then(parse_chain_id);

    match (method, target) {
        ("eth_requestAccounts", _) | ("eth_accounts", _) => {
            EncryptedResponse::value(json!(state.accounts))
        }
        ("wallet_switchEthereumChain", Some(id))
            if state.chains.contains_key(&id) || state.switchable.contains(&id) =>
        {
            state.active_chain = Some(id);
            EncryptedResponse::value(Value::Null)
        }
        ("wallet_switchEthereumChain", _) => EncryptedResponse::error(ProviderRpcError::new(
            codes::UNRECOGNIZED_CHAIN,
            "Unrecognized chain ID",
        )),
        ("wallet_addEthereumChain", Some(id)) => {
            state.added_chains.push(params[0].clone());
            state.switchable.insert(id);
            state.active_chain = Some(id);
            EncryptedResponse::value(Value::Null)
        }
        _ => EncryptedResponse::error(ProviderRpcError::new(
            codes::UNSUPPORTED_METHOD,
            format!("unsupported method: {}", method),
        )),
    }
}

// ============================================================================
// Failing storage
// ============================================================================

#[derive(Default)]
struct FlakyFlags {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
    remove_attempts: Mutex<Vec<String>>,
}

/// In-memory storage whose operations can be switched to fail.
#[derive(Clone, Default)]
pub struct FlakyStorage {
    inner: InMemoryStorage,
    flags: Arc<FlakyFlags>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.flags.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.flags.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.flags.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Keys passed to `remove_item`, failed or not.
    pub fn remove_attempts(&self) -> Vec<String> {
        lock(&self.flags.remove_attempts).clone()
    }

    pub fn inner(&self) -> &InMemoryStorage {
        &self.inner
    }
}

#[async_trait]
impl KeyValueStorage for FlakyStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.flags.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".into()));
        }
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.flags.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::OperationFailed(format!("write {} refused", key)));
        }
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        lock(&self.flags.remove_attempts).push(key.to_string());
        if self.flags.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::OperationFailed(format!("remove {} refused", key)));
        }
        self.inner.remove_item(key).await
    }
}

// ============================================================================
// Recording sink
// ============================================================================

/// [`EventSink`] that records everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    changes: Mutex<Vec<ConnectorChange>>,
    disconnects: AtomicUsize,
}

impl RecordingSink {
    pub fn changes(&self) -> Vec<ConnectorChange> {
        lock(&self.changes).clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl EventSink for RecordingSink {
    fn on_change(&self, change: ConnectorChange) {
        lock(&self.changes).push(change);
    }

    fn on_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}
