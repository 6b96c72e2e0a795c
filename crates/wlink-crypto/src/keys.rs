//! Channel key material.
//!
//! Provides X25519 key pairs for the local side of a channel, the peer's
//! public key handle, and derivation of the symmetric [`SharedSecret`] used
//! to seal payloads. Private key and secret bytes are zeroized on drop and
//! never printed by `Debug`.

use std::fmt;

use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// HKDF salt binding derived secrets to this protocol version.
const CHANNEL_KDF_SALT: &[u8] = b"wlink_channel_v1";
/// HKDF info label for the payload key.
const CHANNEL_KDF_INFO: &[u8] = b"wlink_channel_key_v1";

/// Length of every raw key handled by this module.
pub const KEY_LEN: usize = 32;

/// Error type for key operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid {kind} key hex: {reason}")]
    InvalidHex { kind: KeyKind, reason: String },
    #[error("invalid {kind} key length: expected {expected}, got {got}")]
    InvalidKeyLength {
        kind: KeyKind,
        expected: usize,
        got: usize,
    },
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("RNG failed")]
    RngError,
}

/// Which half of a key pair a serialized key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Private,
    Public,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Private => write!(f, "private"),
            KeyKind::Public => write!(f, "public"),
        }
    }
}

fn decode_key_hex(kind: KeyKind, hex_str: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = hex::decode(hex_str.trim()).map_err(|e| CryptoError::InvalidHex {
        kind,
        reason: e.to_string(),
    })?;
    let got = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        kind,
        expected: KEY_LEN,
        got,
    })
}

// ============================================================================
// Private / Public keys
// ============================================================================

/// The private half of a channel key pair.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    #[zeroize(skip)] // StaticSecret zeroizes itself on drop
    secret: StaticSecret,
}

impl PrivateKey {
    /// The public key matching this private key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(X25519PublicKey::from(&self.secret))
    }

    /// Export as lowercase hex of the raw 32 bytes.
    pub fn to_hex(&self) -> String {
        let mut bytes = self.secret.to_bytes();
        let out = hex::encode(bytes);
        bytes.zeroize();
        out
    }

    /// Import from hex produced by [`PrivateKey::to_hex`].
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let mut bytes = decode_key_hex(KeyKind::Private, hex_str)?;
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        Ok(Self { secret })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey").finish_non_exhaustive()
    }
}

/// A channel public key, either our own or the peer's.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(X25519PublicKey);

impl PublicKey {
    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        self.0.as_bytes()
    }

    /// Export as lowercase hex of the raw 32 bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Import from hex produced by [`PublicKey::to_hex`].
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = decode_key_hex(KeyKind::Public, hex_str)?;
        Ok(Self(X25519PublicKey::from(bytes)))
    }

    /// Short hex prefix suitable for log lines.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.0.as_bytes()[..6])
    }
}

impl From<[u8; KEY_LEN]> for PublicKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(X25519PublicKey::from(bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// A freshly generated or reloaded local key pair.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

/// Generate a new random key pair from the OS RNG.
pub fn generate_key_pair() -> KeyPair {
    let secret = StaticSecret::random_from_rng(OsRng);
    let private = PrivateKey { secret };
    let public = private.public_key();
    KeyPair { private, public }
}

// ============================================================================
// Shared secret
// ============================================================================

/// Symmetric key derived from our private key and the peer's public key.
///
/// Held in memory only; never serialized.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    key: [u8; KEY_LEN],
}

impl SharedSecret {
    /// Raw symmetric key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret").finish_non_exhaustive()
    }
}

/// Derive the channel secret: HKDF-SHA256 over the X25519 output.
///
/// Both sides of a channel obtain the same secret. Fails when the peer key
/// is a low-order point (the DH output would be all zeroes).
pub fn derive_shared_secret(
    own_private: &PrivateKey,
    peer_public: &PublicKey,
) -> Result<SharedSecret, CryptoError> {
    let dh = own_private.secret.diffie_hellman(&peer_public.0);
    if !dh.was_contributory() {
        return Err(CryptoError::KeyDerivation(
            "peer public key is a low-order point".into(),
        ));
    }

    let hk = Hkdf::<Sha256>::new(Some(CHANNEL_KDF_SALT), dh.as_bytes());
    let mut key = [0u8; KEY_LEN];
    hk.expand(CHANNEL_KDF_INFO, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(SharedSecret { key })
}
