//! Format version 1: repeating-key XOR with a validation tag
//!
//! Only ever decoded. New records are always written as version 2.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::crypto::legacy;
use crate::error::{KeyStoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEnvelope {
    /// Base64 of the XOR-ed key bytes
    pub encrypted_key: String,
    /// Checksum of the secret used to detect a wrong password
    pub validation: String,
    pub version: u32,
    /// Owning provider, only written by some releases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl LegacyEnvelope {
    pub fn open(&self, secret: &str) -> Result<String> {
        let ciphertext = STANDARD
            .decode(&self.encrypted_key)
            .map_err(|e| KeyStoreError::CorruptedData(format!("invalid encryptedKey: {}", e)))?;

        legacy::decrypt(&ciphertext, &self.validation, secret)
    }

    /// Build a v1 envelope the way old releases did, for fixtures
    #[cfg(test)]
    pub(crate) fn seal_for_tests(plaintext: &str, secret: &str, provider: Option<&str>) -> Self {
        Self {
            encrypted_key: STANDARD.encode(legacy::xor_keystream(plaintext.as_bytes(), secret)),
            validation: legacy::validation_tag(secret),
            version: 1,
            provider: provider.map(str::to_string),
        }
    }
}
