//! Password-based key derivation using PBKDF2-HMAC-SHA256

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use super::encryption::random_bytes;
use super::SymmetricKey;
use crate::error::{KeyStoreError, Result};

/// Derived key length in bytes (256 bits)
pub const KEY_LEN: usize = 32;

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Iteration count used for new envelopes unless configured otherwise
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Upper bound accepted from configuration or stored envelopes
pub const MAX_ITERATIONS: u32 = 10_000_000;

/// Parameters for PBKDF2 key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDerivationParams {
    /// PBKDF2 iteration count
    pub iterations: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl KeyDerivationParams {
    /// Whether the iteration count is within the accepted range
    pub fn is_valid(&self) -> bool {
        (1..=MAX_ITERATIONS).contains(&self.iterations)
    }
}

/// Generate a fresh random salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let bytes = random_bytes(SALT_LEN)?;
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&bytes);
    Ok(salt)
}

/// Derive a 256-bit key from a secret
///
/// The same `secret`, `salt` and `iterations` always produce the same key, so
/// all three must be kept alongside the ciphertext.
pub fn derive_key(secret: &str, salt: &[u8], iterations: u32) -> Result<SymmetricKey> {
    let params = KeyDerivationParams { iterations };
    if !params.is_valid() {
        return Err(KeyStoreError::Config(format!(
            "PBKDF2 iteration count must be between 1 and {}, got {}",
            MAX_ITERATIONS, iterations
        )));
    }

    let mut key_bytes = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, iterations, &mut key_bytes);

    let key = SymmetricKey::new(key_bytes);
    key_bytes.zeroize();
    Ok(key)
}
