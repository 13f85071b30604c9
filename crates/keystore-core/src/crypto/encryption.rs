//! AES-256-GCM authenticated encryption
//!
//! Ciphertexts carry the 16-byte authentication tag appended, which is the
//! layout `aes-gcm` produces and expects. The 12-byte nonce travels
//! separately in the envelope.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use super::key_derivation::{derive_key, generate_salt, SALT_LEN};
use super::SymmetricKey;
use crate::error::{KeyStoreError, Result};

/// Nonce length in bytes (96 bits - standard for GCM)
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// Fill a buffer of `n` bytes from the OS random source
pub fn random_bytes(n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    OsRng.try_fill_bytes(&mut buf).map_err(|e| {
        KeyStoreError::CryptoUnavailable(format!("secure random source failed: {}", e))
    })?;
    Ok(buf)
}

/// Generate a fresh random nonce
pub fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    let bytes = random_bytes(NONCE_LEN)?;
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&bytes);
    Ok(nonce)
}

fn cipher(key: &SymmetricKey) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| KeyStoreError::CryptoUnavailable(format!("AES-256-GCM unavailable: {}", e)))
}

/// Encrypt plaintext, returning ciphertext with the tag appended
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey, nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>> {
    cipher(key)?
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| KeyStoreError::CryptoUnavailable(format!("encryption failed: {}", e)))
}

/// Decrypt ciphertext+tag
///
/// Any mismatch (wrong key, wrong nonce, modified bytes) fails with
/// [`KeyStoreError::Authentication`].
pub fn decrypt(
    ciphertext_with_tag: &[u8],
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    if ciphertext_with_tag.len() < TAG_LEN {
        return Err(KeyStoreError::Authentication);
    }

    cipher(key)?
        .decrypt(Nonce::from_slice(nonce), ciphertext_with_tag)
        .map_err(|_| KeyStoreError::Authentication)
}

/// Output of a password-based encryption: everything needed to decrypt
/// again except the secret itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedData {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub iterations: u32,
    pub ciphertext: Vec<u8>,
}

/// Derive a key from `secret` under a fresh salt and encrypt with a fresh nonce
pub fn seal_with_secret(plaintext: &str, secret: &str, iterations: u32) -> Result<SealedData> {
    let salt = generate_salt()?;
    let nonce = generate_nonce()?;
    let key = derive_key(secret, &salt, iterations)?;
    let ciphertext = encrypt(plaintext.as_bytes(), &key, &nonce)?;

    Ok(SealedData {
        salt,
        nonce,
        iterations,
        ciphertext,
    })
}

/// Reverse of [`seal_with_secret`]
pub fn open_with_secret(sealed: &SealedData, secret: &str) -> Result<String> {
    let key = derive_key(secret, &sealed.salt, sealed.iterations)?;
    let plaintext = decrypt(&sealed.ciphertext, &key, &sealed.nonce)?;
    String::from_utf8(plaintext).map_err(|_| KeyStoreError::Authentication)
}
