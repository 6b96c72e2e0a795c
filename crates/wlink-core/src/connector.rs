//! Connector: the authorization layer a dapp framework binds to.
//!
//! Wraps a [`WalletClient`] with connect / disconnect / switch-chain
//! semantics, forwards provider events to an [`EventSink`], and normalizes
//! every recognized user decline into [`ConnectorError::UserRejected`].

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chain::{build_add_chain_parameter, to_hex_chain_id, AddChainOverrides, Network};
use crate::client::WalletClient;
use crate::errors::{codes, ProviderError, RejectionCause};
use crate::events::{EventEmitter, ProviderEvent};
use crate::host::HostEnvironment;
use crate::listeners::ListenerId;
use crate::store::KeyValueStorage;

// ============================================================================
// Types
// ============================================================================

/// Receives connection changes while connected.
pub trait EventSink: Send + Sync {
    fn on_change(&self, change: ConnectorChange);
    fn on_disconnect(&self);
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectorChange {
    pub accounts: Option<Vec<String>>,
    pub chain_id: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub accounts: Vec<String>,
    pub chain_id: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwitchChainParams {
    pub chain_id: u64,
    /// Used only if the wallet does not know the chain yet.
    pub add_chain: AddChainOverrides,
}

impl SwitchChainParams {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            add_chain: AddChainOverrides::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("user rejected the request ({0})")]
    UserRejected(RejectionCause),

    #[error("chain {0} is not configured")]
    ChainNotConfigured(u64),

    #[error("chain switch failed: {0}")]
    ChainSwitchFailed(String),

    #[error(transparent)]
    Provider(ProviderError),
}

impl From<ProviderError> for ConnectorError {
    fn from(e: ProviderError) -> Self {
        match e.rejection_cause() {
            Some(cause) => ConnectorError::UserRejected(cause),
            None => ConnectorError::Provider(e),
        }
    }
}

impl ConnectorError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, ConnectorError::UserRejected(_))
    }
}

fn switch_failure(e: ProviderError) -> ConnectorError {
    match e.rejection_cause() {
        Some(cause) => ConnectorError::UserRejected(cause),
        None => ConnectorError::ChainSwitchFailed(e.to_string()),
    }
}

// ============================================================================
// Connector
// ============================================================================

type ListenerSlot = Arc<Mutex<Option<ListenerId>>>;

fn lock_slot(slot: &ListenerSlot) -> MutexGuard<'_, Option<ListenerId>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

fn unbind(events: &EventEmitter, slot: &ListenerSlot) {
    if let Some(id) = lock_slot(slot).take() {
        events.off(id);
        debug!("connector listeners unbound");
    }
}

pub struct WalletConnector<S, H: ?Sized> {
    client: Arc<WalletClient<S, H>>,
    networks: Vec<Network>,
    sink: Arc<dyn EventSink>,
    listener: ListenerSlot,
}

impl<S, H> WalletConnector<S, H>
where
    S: KeyValueStorage + Clone,
    H: HostEnvironment + ?Sized,
{
    pub fn new(client: Arc<WalletClient<S, H>>, networks: Vec<Network>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            client,
            networks,
            sink,
            listener: Arc::new(Mutex::new(None)),
        }
    }

    pub fn client(&self) -> &Arc<WalletClient<S, H>> {
        &self.client
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    /// Request accounts, bind lifecycle listeners, and optionally move to
    /// `chain_id`.
    ///
    /// A chain switch that fails for reasons other than a user decline
    /// leaves the connection on the wallet's current chain.
    pub async fn connect(&self, chain_id: Option<u64>) -> Result<Connection, ConnectorError> {
        let accounts = self.client.handshake().await?;
        self.bind_listeners();

        let mut current = self.client.chain_id().await;
        if let Some(target) = chain_id.filter(|target| *target != current) {
            match self.switch_chain(SwitchChainParams::new(target)).await {
                Ok(network) => current = network.id,
                Err(e) if e.is_user_rejection() => return Err(e),
                Err(e) => warn!(chain_id = target, "staying on chain {}: {}", current, e),
            }
        }

        info!(accounts = accounts.len(), chain_id = current, "connected");
        Ok(Connection {
            accounts,
            chain_id: current,
        })
    }

    /// Unbind listeners and end the session.
    pub async fn disconnect(&self) -> Result<(), ConnectorError> {
        unbind(self.client.events(), &self.listener);
        self.client.disconnect().await?;
        Ok(())
    }

    pub async fn get_accounts(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.client.accounts().await)
    }

    pub async fn get_chain_id(&self) -> Result<u64, ConnectorError> {
        Ok(self.client.chain_id().await)
    }

    pub async fn is_authorized(&self) -> bool {
        self.client.is_connected().await
    }

    /// Switch the wallet to a configured network, adding it to the wallet
    /// first if the wallet reports it unrecognized.
    pub async fn switch_chain(&self, params: SwitchChainParams) -> Result<Network, ConnectorError> {
        let network = self
            .networks
            .iter()
            .find(|n| n.id == params.chain_id)
            .cloned()
            .ok_or(ConnectorError::ChainNotConfigured(params.chain_id))?;

        let switch = self
            .client
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": to_hex_chain_id(network.id) }]),
            )
            .await;

        match switch {
            Ok(_) => Ok(network),
            Err(ProviderError::Rpc(e)) if e.code == codes::UNRECOGNIZED_CHAIN => {
                info!(chain_id = network.id, "wallet does not know chain, adding it");
                let param = build_add_chain_parameter(&network, &params.add_chain);
                self.client
                    .request("wallet_addEthereumChain", json!([param]))
                    .await
                    .map_err(switch_failure)?;

                if self.client.chain_id().await != network.id {
                    return Err(ConnectorError::UserRejected(RejectionCause::Declined(
                        "user rejected switch after adding network".into(),
                    )));
                }
                Ok(network)
            }
            Err(e) => Err(switch_failure(e)),
        }
    }

    /// Forward provider events to the sink. Binding twice is a no-op.
    fn bind_listeners(&self) {
        let mut slot = lock_slot(&self.listener);
        if slot.is_some() {
            return;
        }

        let sink = Arc::clone(&self.sink);
        let events = self.client.events().clone();
        let own_slot = Arc::clone(&self.listener);
        let id = self.client.events().on(move |event| match event {
            ProviderEvent::AccountsChanged(accounts) if accounts.is_empty() => {
                unbind(&events, &own_slot);
                sink.on_disconnect();
            }
            ProviderEvent::AccountsChanged(accounts) => sink.on_change(ConnectorChange {
                accounts: Some(accounts.clone()),
                chain_id: None,
            }),
            ProviderEvent::ChainChanged(id) => sink.on_change(ConnectorChange {
                accounts: None,
                chain_id: Some(*id),
            }),
            ProviderEvent::Disconnect => {
                unbind(&events, &own_slot);
                sink.on_disconnect();
            }
        });
        *slot = Some(id);
        debug!("connector listeners bound");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientOptions;
    use crate::harness::{MockHost, RecordingSink, ScriptedOutcome, ScriptedWallet};
    use crate::store::InMemoryStorage;
    use crate::types::{AppMetadata, WalletDescriptor};
    use url::Url;

    const ACCOUNT: &str = "0x00000000000000000000000000000000000000bb";

    async fn setup(
        wallet: ScriptedWallet,
    ) -> (
        WalletConnector<InMemoryStorage, MockHost>,
        Arc<MockHost>,
        Arc<RecordingSink>,
    ) {
        let host = Arc::new(MockHost::new().with_wallet(wallet));
        let options = ClientOptions::new(
            AppMetadata {
                name: "Demo".into(),
                logo_url: Some("https://demo.example/logo.png".into()),
                chain_ids: vec![1],
                callback_url: "demo://wlink".into(),
            },
            WalletDescriptor::new("test-wallet", Url::parse("https://wallet.example/connect").unwrap()),
        );
        let client = WalletClient::new(InMemoryStorage::new(), host.clone(), options)
            .await
            .unwrap();
        let sink = Arc::new(RecordingSink::default());
        let connector = WalletConnector::new(
            Arc::new(client),
            vec![Network::mainnet(), Network::base(), Network::base_sepolia()],
            sink.clone(),
        );
        (connector, host, sink)
    }

    fn wallet() -> ScriptedWallet {
        ScriptedWallet::new(vec![ACCOUNT.to_string()]).with_chain(1, "https://cloudflare-eth.com")
    }

    #[tokio::test]
    async fn test_connect_returns_accounts_and_chain() {
        let (connector, _, sink) = setup(wallet()).await;
        let conn = connector.connect(None).await.unwrap();
        assert_eq!(conn.accounts, vec![ACCOUNT.to_string()]);
        assert_eq!(conn.chain_id, 1);
        assert!(connector.is_authorized().await);
        assert_eq!(connector.get_accounts().await.unwrap(), conn.accounts);
        assert!(sink.changes().is_empty());
    }

    #[tokio::test]
    async fn test_connect_binds_listeners_once() {
        let (connector, _, _) = setup(wallet()).await;
        connector.connect(None).await.unwrap();
        connector.connect(None).await.unwrap();
        assert_eq!(connector.client().events().listener_count(), 1);

        connector.disconnect().await.unwrap();
        assert_eq!(connector.client().events().listener_count(), 0);
        assert!(!connector.is_authorized().await);
    }

    #[tokio::test]
    async fn test_rejected_connect_is_normalized() {
        let (connector, _, _) = setup(wallet().script(
            "eth_requestAccounts",
            ScriptedOutcome::Failure {
                code: -32000,
                message: "User closed modal".into(),
            },
        ))
        .await;
        let err = connector.connect(None).await.unwrap_err();
        assert!(matches!(err, ConnectorError::UserRejected(RejectionCause::Declined(_))));
    }

    #[tokio::test]
    async fn test_other_errors_propagate_unchanged() {
        let (connector, _, _) = setup(wallet().script(
            "eth_requestAccounts",
            ScriptedOutcome::Failure {
                code: codes::INTERNAL,
                message: "wallet exploded".into(),
            },
        ))
        .await;
        let err = connector.connect(None).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::Provider(ProviderError::Rpc(ref e)) if e.code == codes::INTERNAL
        ));
    }

    #[tokio::test]
    async fn test_switch_to_unconfigured_chain() {
        let (connector, _, _) = setup(wallet()).await;
        connector.connect(None).await.unwrap();
        let err = connector
            .switch_chain(SwitchChainParams::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::ChainNotConfigured(10)));
    }

    #[tokio::test]
    async fn test_switch_emits_change() {
        let (connector, _, sink) = setup(wallet().with_switchable_chain(8453)).await;
        connector.connect(None).await.unwrap();

        let network = connector.switch_chain(SwitchChainParams::new(8453)).await.unwrap();
        assert_eq!(network.id, 8453);
        assert_eq!(connector.get_chain_id().await.unwrap(), 8453);
        assert_eq!(
            sink.changes(),
            vec![ConnectorChange {
                accounts: None,
                chain_id: Some(8453),
            }]
        );
    }

    #[tokio::test]
    async fn test_unrecognized_chain_falls_back_to_add() {
        let scripted = wallet();
        let (connector, _, _) = setup(scripted.clone()).await;
        connector.connect(None).await.unwrap();

        let mut params = SwitchChainParams::new(84532);
        params.add_chain.rpc_urls = Some(vec!["https://rpc.custom".into()]);
        connector.switch_chain(params).await.unwrap();

        assert_eq!(connector.get_chain_id().await.unwrap(), 84532);
        let added = scripted.added_chains();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0]["chainId"], "0x14a34");
        assert_eq!(added[0]["chainName"], "Base Sepolia");
        assert_eq!(added[0]["rpcUrls"], json!(["https://rpc.custom"]));
        assert_eq!(added[0]["blockExplorerUrls"], json!(["https://sepolia.basescan.org"]));
    }

    #[tokio::test]
    async fn test_add_without_switch_is_rejection() {
        let (connector, _, _) = setup(
            wallet().script("wallet_addEthereumChain", ScriptedOutcome::Value(json!({}))),
        )
        .await;
        connector.connect(None).await.unwrap();

        let err = connector
            .switch_chain(SwitchChainParams::new(8453))
            .await
            .unwrap_err();
        assert!(err.is_user_rejection());
        assert_eq!(connector.get_chain_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_switch_failure_kinds() {
        let (connector, _, _) = setup(wallet().script(
            "wallet_switchEthereumChain",
            ScriptedOutcome::Error {
                code: codes::INTERNAL,
                message: "rpc down".into(),
            },
        ))
        .await;
        connector.connect(None).await.unwrap();
        let err = connector
            .switch_chain(SwitchChainParams::new(8453))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::ChainSwitchFailed(_)));

        let (connector, _, _) = setup(wallet().script(
            "wallet_switchEthereumChain",
            ScriptedOutcome::Error {
                code: codes::USER_REJECTED,
                message: "nope".into(),
            },
        ))
        .await;
        connector.connect(None).await.unwrap();
        let err = connector
            .switch_chain(SwitchChainParams::new(8453))
            .await
            .unwrap_err();
        assert!(err.is_user_rejection());
    }

    #[tokio::test]
    async fn test_connect_with_chain_keeps_current_on_failure() {
        let (connector, _, _) = setup(wallet().script(
            "wallet_switchEthereumChain",
            ScriptedOutcome::Error {
                code: codes::INTERNAL,
                message: "rpc down".into(),
            },
        ))
        .await;
        let conn = connector.connect(Some(8453)).await.unwrap();
        assert_eq!(conn.chain_id, 1);
    }

    #[tokio::test]
    async fn test_wallet_disconnect_reaches_sink_and_unbinds() {
        let (connector, _, sink) = setup(wallet()).await;
        connector.connect(None).await.unwrap();

        connector.client().disconnect().await.unwrap();
        assert_eq!(sink.disconnects(), 1);
        assert_eq!(connector.client().events().listener_count(), 0);

        // Explicit disconnect after the fact emits nothing further.
        connector.disconnect().await.unwrap();
        assert_eq!(sink.disconnects(), 1);
    }
}
