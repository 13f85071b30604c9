//! Cryptographic primitives for API key storage
//!
//! This module provides:
//! - AES-256-GCM authenticated encryption
//! - PBKDF2-HMAC-SHA256 key derivation from passwords
//! - Secure memory handling with zeroize
//! - The read-only legacy XOR scheme

mod encryption;
mod key_derivation;
pub mod legacy;
mod secure_memory;

pub use encryption::{
    decrypt, encrypt, generate_nonce, open_with_secret, random_bytes, seal_with_secret,
    SealedData, NONCE_LEN, TAG_LEN,
};
pub use key_derivation::{
    derive_key, generate_salt, KeyDerivationParams, DEFAULT_ITERATIONS, KEY_LEN, MAX_ITERATIONS,
    SALT_LEN,
};
pub use secure_memory::{SecretString, SymmetricKey};
