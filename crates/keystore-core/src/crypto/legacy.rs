//! Repeating-key XOR scheme used by format version 1
//!
//! Read-only: kept so keys stored by old releases can still be recovered.
//! The validation tag is an FNV-1a-32 checksum of the secret and only serves
//! to tell a wrong password apart from a right one.

use crate::error::{KeyStoreError, Result};

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Compute the validation tag stored next to a v1 ciphertext
pub fn validation_tag(secret: &str) -> String {
    let hash = secret
        .as_bytes()
        .iter()
        .fold(FNV_OFFSET, |acc, b| (acc ^ u32::from(*b)).wrapping_mul(FNV_PRIME));
    format!("{:08x}", hash)
}

/// XOR `data` with the repeating bytes of `secret`
///
/// The operation is its own inverse.
pub(crate) fn xor_keystream(data: &[u8], secret: &str) -> Vec<u8> {
    let key = secret.as_bytes();
    data.iter()
        .zip(key.iter().cycle())
        .map(|(d, k)| d ^ k)
        .collect()
}

/// Recover a v1 plaintext
pub fn decrypt(ciphertext: &[u8], validation: &str, secret: &str) -> Result<String> {
    if secret.is_empty() || validation_tag(secret) != validation {
        return Err(KeyStoreError::Authentication);
    }

    String::from_utf8(xor_keystream(ciphertext, secret)).map_err(|_| KeyStoreError::Authentication)
}
