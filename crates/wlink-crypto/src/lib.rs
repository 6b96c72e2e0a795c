//! wlink-crypto - key agreement and payload sealing for wlink channels.
//!
//! - [`keys`]: X25519 key pairs, peer public keys, hex import/export and
//!   shared-secret derivation (X25519 + HKDF-SHA256)
//! - [`cipher`]: ChaCha20-Poly1305 sealing of channel payloads under a
//!   derived [`keys::SharedSecret`]

#![forbid(unsafe_code)]

pub mod cipher;
pub mod keys;

#[cfg(test)]
mod proptests;

pub use cipher::{decrypt, encrypt, EncryptedData};
pub use keys::{
    derive_shared_secret, generate_key_pair, CryptoError, KeyKind, KeyPair, PrivateKey, PublicKey,
    SharedSecret,
};
