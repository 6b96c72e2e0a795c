//! Secure channel key lifecycle.
//!
//! A [`SecureChannelManager`] owns one channel's keys for one wallet:
//! our X25519 key pair (generated once, persisted, reused across restarts),
//! the wallet's public key (replaced on every completed handshake), and the
//! shared secret derived from the two. The secret lives in memory only and
//! is recomputed whenever either input changes.

use thiserror::Error;
use tracing::{debug, info, warn};
use wlink_crypto::{
    derive_shared_secret, generate_key_pair, CryptoError, PrivateKey, PublicKey, SharedSecret,
};

use crate::store::{KeyValueStorage, ScopedStorage, StoreError};

/// Component name channel state is scoped under.
pub const CHANNEL_COMPONENT: &str = "channel";

pub const OWN_PRIVATE_KEY: &str = "ownPrivateKey";
pub const OWN_PUBLIC_KEY: &str = "ownPublicKey";
pub const PEER_PUBLIC_KEY: &str = "peerPublicKey";

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("key derivation failed: {0}")]
    KeyDerivation(CryptoError),
}

/// Key state for one (wallet, component) scope.
pub struct SecureChannelManager<S> {
    storage: ScopedStorage<S>,
    own_private: Option<PrivateKey>,
    own_public: Option<PublicKey>,
    peer_public: Option<PublicKey>,
    shared_secret: Option<SharedSecret>,
}

impl<S> std::fmt::Debug for SecureChannelManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannelManager")
            .field("own_public", &self.own_public)
            .field("peer_public", &self.peer_public)
            .field("has_secret", &self.shared_secret.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStorage> SecureChannelManager<S> {
    /// Channel for `wallet`, backed by `storage`. Nothing is loaded until
    /// first use.
    pub fn new(storage: S, wallet: &str) -> Self {
        Self::with_scope(ScopedStorage::new(storage, wallet, CHANNEL_COMPONENT))
    }

    pub fn with_scope(storage: ScopedStorage<S>) -> Self {
        Self {
            storage,
            own_private: None,
            own_public: None,
            peer_public: None,
            shared_secret: None,
        }
    }

    pub fn storage(&self) -> &ScopedStorage<S> {
        &self.storage
    }

    /// Our public key, generating and persisting a key pair if none exists.
    pub async fn get_own_public_key(&mut self) -> Result<PublicKey, ChannelError> {
        self.load_keys_if_needed().await?;
        match self.own_public {
            Some(key) => Ok(key),
            // load_keys_if_needed always leaves a key pair in place
            None => Err(ChannelError::Storage(StoreError::OperationFailed(
                "own key pair missing after load".into(),
            ))),
        }
    }

    /// The derived secret, or `None` until a peer key is known.
    pub async fn get_shared_secret(&mut self) -> Result<Option<SharedSecret>, ChannelError> {
        self.load_keys_if_needed().await?;
        Ok(self.shared_secret.clone())
    }

    /// The wallet's public key, if known.
    pub async fn peer_public_key(&mut self) -> Result<Option<PublicKey>, ChannelError> {
        self.load_keys_if_needed().await?;
        Ok(self.peer_public)
    }

    /// The secret our key pair would share with `peer`, without adopting it.
    pub async fn derive_secret_for(&mut self, peer: &PublicKey) -> Result<SharedSecret, ChannelError> {
        self.load_keys_if_needed().await?;
        let private = self.own_private.as_ref().ok_or_else(|| {
            ChannelError::Storage(StoreError::OperationFailed(
                "own key pair missing after load".into(),
            ))
        })?;
        derive_shared_secret(private, peer).map_err(ChannelError::KeyDerivation)
    }

    /// Adopt a new peer key and re-derive the secret.
    ///
    /// A key that cannot be derived against leaves the previous peer key and
    /// secret in place.
    pub async fn set_peer_public_key(&mut self, key: PublicKey) -> Result<(), ChannelError> {
        let secret = self.derive_secret_for(&key).await?;
        self.storage.set_item(PEER_PUBLIC_KEY, &key.to_hex()).await?;
        self.peer_public = Some(key);
        self.shared_secret = Some(secret);
        info!(peer = %key.fingerprint(), "peer public key updated");
        Ok(())
    }

    /// Forget every key, in memory and in storage.
    ///
    /// All three removals are attempted; the first failure is returned.
    pub async fn clear(&mut self) -> Result<(), ChannelError> {
        self.own_private = None;
        self.own_public = None;
        self.peer_public = None;
        self.shared_secret = None;

        let mut first_err = None;
        for key in [OWN_PRIVATE_KEY, OWN_PUBLIC_KEY, PEER_PUBLIC_KEY] {
            if let Err(e) = self.storage.remove_item(key).await {
                warn!("failed to remove {}: {}", key, e);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e.into()),
            None => {
                info!("channel cleared");
                Ok(())
            }
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    async fn load_keys_if_needed(&mut self) -> Result<(), ChannelError> {
        if self.own_private.is_none() || self.own_public.is_none() {
            if self.own_private.is_none() {
                self.own_private = self.load_key(OWN_PRIVATE_KEY, PrivateKey::from_hex).await?;
            }
            if self.own_public.is_none() {
                self.own_public = self.load_key(OWN_PUBLIC_KEY, PublicKey::from_hex).await?;
            }

            let consistent = match (&self.own_private, &self.own_public) {
                (Some(private), Some(public)) => {
                    let matches = private.public_key() == *public;
                    if !matches {
                        warn!("stored key pair halves do not match, regenerating");
                    }
                    matches
                }
                _ => false,
            };

            if !consistent {
                self.regenerate_own_keys().await?;
            }
        }

        if self.peer_public.is_none() {
            self.peer_public = self.load_key(PEER_PUBLIC_KEY, PublicKey::from_hex).await?;
        }

        if self.shared_secret.is_none() {
            if let (Some(private), Some(peer)) = (&self.own_private, self.peer_public) {
                match derive_shared_secret(private, &peer) {
                    Ok(secret) => {
                        debug!(peer = %peer.fingerprint(), "derived shared secret");
                        self.shared_secret = Some(secret);
                    }
                    // A stored key we cannot derive against is as good as no peer.
                    Err(e) => {
                        warn!(peer = %peer.fingerprint(), "ignoring unusable peer key: {}", e);
                        self.peer_public = None;
                    }
                }
            }
        }

        Ok(())
    }

    async fn regenerate_own_keys(&mut self) -> Result<(), ChannelError> {
        let pair = generate_key_pair();
        self.storage
            .set_item(OWN_PRIVATE_KEY, &pair.private.to_hex())
            .await?;
        self.storage
            .set_item(OWN_PUBLIC_KEY, &pair.public.to_hex())
            .await?;
        info!(key = %pair.public.fingerprint(), "generated channel key pair");

        // A new identity invalidates anything derived from the old one.
        self.shared_secret = None;
        self.own_public = Some(pair.public);
        self.own_private = Some(pair.private);
        Ok(())
    }

    async fn load_key<K>(
        &self,
        name: &str,
        parse: fn(&str) -> Result<K, CryptoError>,
    ) -> Result<Option<K>, ChannelError> {
        let Some(raw) = self.storage.get_item(name).await? else {
            return Ok(None);
        };
        match parse(&raw) {
            Ok(key) => Ok(Some(key)),
            Err(e) => {
                warn!("ignoring unreadable {}: {}", name, e);
                Ok(None)
            }
        }
    }
}
