//! Payload sealing under a channel [`SharedSecret`].
//!
//! ChaCha20-Poly1305 with a random 96-bit nonce per message. The nonce
//! travels next to the ciphertext (the `iv` of an encrypted message).

#![forbid(unsafe_code)]

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};

use crate::keys::{CryptoError, SharedSecret};

/// Nonce length for ChaCha20-Poly1305.
pub const IV_LEN: usize = 12;

/// Ciphertext (with tag) and the nonce it was sealed under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedData {
    pub iv: [u8; IV_LEN],
    pub cipher_text: Vec<u8>,
}

/// Seal `plaintext` under `secret` with a fresh random nonce.
pub fn encrypt(secret: &SharedSecret, plaintext: &[u8]) -> Result<EncryptedData, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    getrandom::getrandom(&mut iv).map_err(|_| CryptoError::RngError)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(secret.as_bytes()));
    let cipher_text = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(EncryptedData { iv, cipher_text })
}

/// Open data sealed by [`encrypt`]. Fails on a wrong key or any tampering.
pub fn decrypt(secret: &SharedSecret, data: &EncryptedData) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(secret.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(&data.iv), data.cipher_text.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)
}
