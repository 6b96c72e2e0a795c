//! Request/response round trips through the external wallet.
//!
//! One call to [`RoundTripCoordinator::send_and_await`] is one attempt: the
//! request is encoded into the wallet URL, the host opens it, and the call
//! waits for whichever happens first:
//!
//! 1. a deep link back into the app carrying the response,
//! 2. the user dismissing the embedded browser,
//! 3. [`ROUND_TRIP_TIMEOUT`] elapsing.
//!
//! Every failure resolves to [`RoundTripError::UserRejected`] with the cause
//! attached. Host listeners are removed before the call returns, including
//! when the future is dropped mid-wait.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec::{build_request_url, response_from_url};
use crate::errors::RejectionCause;
use crate::host::{BrowserOptions, HostEnvironment};
use crate::listeners::ListenerId;
use crate::message::{RpcRequestMessage, RpcResponseMessage};
use crate::types::WalletDescriptor;

/// How long a round trip waits for the wallet before giving up.
pub const ROUND_TRIP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoundTripError {
    #[error("user rejected the request ({0})")]
    UserRejected(RejectionCause),
}

impl RoundTripError {
    pub fn cause(&self) -> &RejectionCause {
        match self {
            RoundTripError::UserRejected(cause) => cause,
        }
    }
}

// ============================================================================
// Listener registrations
// ============================================================================

/// Host listeners held for the duration of one attempt.
struct Registrations<'a, H: HostEnvironment + ?Sized> {
    host: &'a H,
    deep_link: Option<ListenerId>,
    dismiss: Option<ListenerId>,
}

impl<'a, H: HostEnvironment + ?Sized> Registrations<'a, H> {
    fn new(host: &'a H) -> Self {
        Self {
            host,
            deep_link: None,
            dismiss: None,
        }
    }

    /// Remove whatever is still registered. Safe to call repeatedly.
    fn teardown(&mut self) {
        if let Some(id) = self.deep_link.take() {
            self.host.remove_deep_link_listener(id);
        }
        if let Some(id) = self.dismiss.take() {
            self.host.remove_dismiss_listener(id);
        }
    }
}

impl<H: HostEnvironment + ?Sized> Drop for Registrations<'_, H> {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Drives round trips through a [`HostEnvironment`].
pub struct RoundTripCoordinator<H: ?Sized> {
    host: Arc<H>,
    browser_options: BrowserOptions,
}

impl<H: ?Sized> Clone for RoundTripCoordinator<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            browser_options: self.browser_options.clone(),
        }
    }
}

impl<H: HostEnvironment + ?Sized> RoundTripCoordinator<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            host,
            browser_options: BrowserOptions::default(),
        }
    }

    pub fn with_browser_options(mut self, options: BrowserOptions) -> Self {
        self.browser_options = options;
        self
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Send `request` to `wallet` and wait for its response.
    ///
    /// Deep links not starting with `return_scheme` are ignored, as are
    /// well-formed responses to a different request.
    pub async fn send_and_await(
        &self,
        request: &RpcRequestMessage,
        return_scheme: &str,
        wallet: &WalletDescriptor,
    ) -> Result<RpcResponseMessage, RoundTripError> {
        let url = build_request_url(&wallet.url, request).map_err(|e| {
            warn!(request_id = %request.id, "failed to build wallet url: {}", e);
            RoundTripError::UserRejected(RejectionCause::LaunchFailed(e.to_string()))
        })?;

        let (link_tx, mut link_rx) = mpsc::unbounded_channel::<String>();
        let (dismiss_tx, mut dismiss_rx) = mpsc::unbounded_channel::<()>();

        let mut registrations = Registrations::new(&*self.host);
        registrations.deep_link = Some(self.host.add_deep_link_listener(Box::new(move |link| {
            let _ = link_tx.send(link);
        })));
        registrations.dismiss = Some(self.host.add_dismiss_listener(Box::new(move || {
            let _ = dismiss_tx.send(());
        })));

        let deadline = tokio::time::sleep(ROUND_TRIP_TIMEOUT);
        tokio::pin!(deadline);

        info!(
            request_id = %request.id,
            wallet = %wallet.name,
            "opening wallet"
        );
        if let Err(e) = self.host.open_browser(&url, &self.browser_options).await {
            registrations.teardown();
            warn!(request_id = %request.id, "wallet launch failed: {}", e);
            return Err(RoundTripError::UserRejected(RejectionCause::LaunchFailed(
                e.to_string(),
            )));
        }

        loop {
            tokio::select! {
                biased;

                Some(link) = link_rx.recv() => {
                    if !link.starts_with(return_scheme) {
                        debug!("ignoring deep link outside return scheme");
                        continue;
                    }

                    match response_from_url(&link) {
                        Ok(response) if response.request_id != request.id => {
                            warn!(
                                request_id = %request.id,
                                got = %response.request_id,
                                "ignoring response for another request"
                            );
                        }
                        Ok(response) => {
                            registrations.teardown();
                            self.host.close_browser().await;
                            debug!(request_id = %request.id, "wallet responded");
                            return Ok(response);
                        }
                        Err(e) => {
                            registrations.teardown();
                            self.host.close_browser().await;
                            warn!(request_id = %request.id, "malformed wallet response: {}", e);
                            return Err(RoundTripError::UserRejected(
                                RejectionCause::MalformedReturn(e.to_string()),
                            ));
                        }
                    }
                }

                Some(()) = dismiss_rx.recv() => {
                    registrations.teardown();
                    info!(request_id = %request.id, "wallet browser dismissed");
                    return Err(RoundTripError::UserRejected(RejectionCause::BrowserDismissed));
                }

                _ = &mut deadline => {
                    registrations.teardown();
                    self.host.close_browser().await;
                    warn!(request_id = %request.id, "timed out waiting for wallet");
                    return Err(RoundTripError::UserRejected(RejectionCause::Timeout));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::response_url;
    use crate::errors::ProviderRpcError;
    use crate::harness::{HostReaction, MockHost};
    use serde_json::Value;
    use url::Url;
    use wlink_crypto::generate_key_pair;

    const SCHEME: &str = "myapp://wlink";

    fn wallet() -> WalletDescriptor {
        WalletDescriptor::new("test-wallet", Url::parse("https://wallet.example/connect").unwrap())
    }

    fn request() -> RpcRequestMessage {
        let keys = generate_key_pair();
        RpcRequestMessage::handshake(&keys.public, SCHEME, "eth_requestAccounts", Value::Null)
    }

    fn failure_link(request_id: uuid::Uuid) -> String {
        let peer = generate_key_pair();
        let resp = RpcResponseMessage::failure(request_id, &peer.public, ProviderRpcError::new(4001, "no"));
        response_url(SCHEME, &resp).unwrap().to_string()
    }

    fn assert_clean(host: &MockHost) {
        assert_eq!(host.deep_link_listener_count(), 0);
        assert_eq!(host.dismiss_listener_count(), 0);
        assert_eq!(host.deep_link_removals(), 1);
        assert_eq!(host.dismiss_removals(), 1);
    }

    #[tokio::test]
    async fn test_deep_link_resolves_response() {
        let req = request();
        let host = Arc::new(MockHost::new());
        host.set_reaction(HostReaction::DeepLink(failure_link(req.id)));
        let coordinator = RoundTripCoordinator::new(host.clone());

        let resp = coordinator.send_and_await(&req, SCHEME, &wallet()).await.unwrap();
        assert_eq!(resp.request_id, req.id);
        assert_eq!(host.close_count(), 1);
        assert_clean(&host);

        let opened = host.opened_urls();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].host_str(), Some("wallet.example"));
    }

    #[tokio::test]
    async fn test_dismiss_rejects_without_closing() {
        let host = Arc::new(MockHost::new());
        host.set_reaction(HostReaction::Dismiss);
        let coordinator = RoundTripCoordinator::new(host.clone());

        let err = coordinator
            .send_and_await(&request(), SCHEME, &wallet())
            .await
            .unwrap_err();
        assert_eq!(err.cause(), &RejectionCause::BrowserDismissed);
        assert_eq!(host.close_count(), 0);
        assert_clean(&host);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_and_closes() {
        let host = Arc::new(MockHost::new());
        host.set_reaction(HostReaction::Nothing);
        let coordinator = RoundTripCoordinator::new(host.clone());

        let started = tokio::time::Instant::now();
        let err = coordinator
            .send_and_await(&request(), SCHEME, &wallet())
            .await
            .unwrap_err();
        assert_eq!(err.cause(), &RejectionCause::Timeout);
        assert!(started.elapsed() >= ROUND_TRIP_TIMEOUT);
        assert_eq!(host.close_count(), 1);
        assert_clean(&host);
    }

    #[tokio::test]
    async fn test_launch_failure_rejects() {
        let host = Arc::new(MockHost::new());
        host.set_reaction(HostReaction::FailLaunch("no browser".into()));
        let coordinator = RoundTripCoordinator::new(host.clone());

        let err = coordinator
            .send_and_await(&request(), SCHEME, &wallet())
            .await
            .unwrap_err();
        assert!(matches!(err.cause(), RejectionCause::LaunchFailed(_)));
        assert_eq!(host.close_count(), 0);
        assert_clean(&host);
    }

    #[tokio::test]
    async fn test_malformed_return_rejects_and_closes() {
        let host = Arc::new(MockHost::new());
        host.set_reaction(HostReaction::DeepLink(format!("{}?id=garbage", SCHEME)));
        let coordinator = RoundTripCoordinator::new(host.clone());

        let err = coordinator
            .send_and_await(&request(), SCHEME, &wallet())
            .await
            .unwrap_err();
        assert!(matches!(err.cause(), RejectionCause::MalformedReturn(_)));
        assert_eq!(host.close_count(), 1);
        assert_clean(&host);
    }

    #[tokio::test]
    async fn test_foreign_links_and_stale_responses_are_ignored() {
        let req = request();
        let host = Arc::new(MockHost::new());
        host.set_reaction(HostReaction::Nothing);
        let coordinator = RoundTripCoordinator::new(host.clone());

        let fire = async {
            while host.opened_urls().is_empty() {
                tokio::task::yield_now().await;
            }
            host.fire_deep_link("otherapp://callback?x=1");
            host.fire_deep_link(&failure_link(uuid::Uuid::new_v4()));
            host.fire_deep_link(&failure_link(req.id));
        };

        let wallet = wallet();
        let (result, ()) = tokio::join!(coordinator.send_and_await(&req, SCHEME, &wallet), fire);
        assert_eq!(result.unwrap().request_id, req.id);
        assert_eq!(host.close_count(), 1);
        assert_clean(&host);
    }

    #[tokio::test]
    async fn test_dropped_future_unregisters() {
        let host = Arc::new(MockHost::new());
        host.set_reaction(HostReaction::Nothing);
        let coordinator = RoundTripCoordinator::new(host.clone());

        let req = request();
        let wallet = wallet();
        let attempt = coordinator.send_and_await(&req, SCHEME, &wallet);
        let outcome = tokio::time::timeout(Duration::from_millis(20), attempt).await;
        assert!(outcome.is_err());
        assert_clean(&host);

        // Late events find no listener.
        host.fire_dismiss();
        host.fire_deep_link(&failure_link(req.id));
        assert_eq!(host.close_count(), 0);
    }
}
