//! Format version 2: PBKDF2-SHA256 + AES-256-GCM

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use super::FormatVersion;
use crate::crypto::{
    open_with_secret, seal_with_secret, SealedData, MAX_ITERATIONS, NONCE_LEN, SALT_LEN,
};
use crate::error::{KeyStoreError, Result};
use crate::provider::ProviderId;

pub const ALGORITHM: &str = "AES-256-GCM";
pub const KDF: &str = "PBKDF2-SHA256";

/// Wire shape of a v2 envelope
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AeadWire {
    pub(super) ciphertext: String,
    pub(super) salt: String,
    pub(super) nonce: String,
    pub(super) iterations: u32,
    pub(super) algorithm: String,
    #[serde(default = "default_kdf")]
    pub(super) kdf: String,
    pub(super) provider_id: ProviderId,
    pub(super) version: u32,
}

fn default_kdf() -> String {
    KDF.to_string()
}

/// AEAD envelope with every parameter needed to re-derive the key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AeadEnvelope {
    pub sealed: SealedData,
    pub provider_id: ProviderId,
}

impl AeadEnvelope {
    /// Encrypt `plaintext` under `secret` with fresh salt and nonce
    pub fn seal(plaintext: &str, secret: &str, provider_id: &ProviderId, iterations: u32) -> Result<Self> {
        Ok(Self {
            sealed: seal_with_secret(plaintext, secret, iterations)?,
            provider_id: provider_id.clone(),
        })
    }

    pub fn open(&self, secret: &str) -> Result<String> {
        open_with_secret(&self.sealed, secret)
    }

    pub(super) fn to_wire(&self) -> AeadWire {
        AeadWire {
            ciphertext: STANDARD.encode(&self.sealed.ciphertext),
            salt: STANDARD.encode(self.sealed.salt),
            nonce: STANDARD.encode(self.sealed.nonce),
            iterations: self.sealed.iterations,
            algorithm: ALGORITHM.to_string(),
            kdf: KDF.to_string(),
            provider_id: self.provider_id.clone(),
            version: FormatVersion::Aead as u32,
        }
    }

    pub(super) fn from_wire(wire: AeadWire) -> Result<Self> {
        if wire.version != FormatVersion::Aead as u32 {
            return Err(KeyStoreError::CorruptedData(format!(
                "version {} is not an AEAD envelope",
                wire.version
            )));
        }
        if wire.algorithm != ALGORITHM {
            return Err(KeyStoreError::CorruptedData(format!(
                "unsupported algorithm '{}'",
                wire.algorithm
            )));
        }
        if wire.kdf != KDF {
            return Err(KeyStoreError::CorruptedData(format!(
                "unsupported key derivation '{}'",
                wire.kdf
            )));
        }
        if wire.iterations == 0 || wire.iterations > MAX_ITERATIONS {
            return Err(KeyStoreError::CorruptedData(format!(
                "iteration count {} out of range",
                wire.iterations
            )));
        }

        let salt: [u8; SALT_LEN] = decode_fixed(&wire.salt, "salt")?;
        let nonce: [u8; NONCE_LEN] = decode_fixed(&wire.nonce, "nonce")?;
        let ciphertext = STANDARD
            .decode(&wire.ciphertext)
            .map_err(|e| KeyStoreError::CorruptedData(format!("invalid ciphertext: {}", e)))?;

        Ok(Self {
            sealed: SealedData {
                salt,
                nonce,
                iterations: wire.iterations,
                ciphertext,
            },
            provider_id: wire.provider_id,
        })
    }
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> Result<[u8; N]> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| KeyStoreError::CorruptedData(format!("invalid {}: {}", field, e)))?;

    bytes.try_into().map_err(|bytes: Vec<u8>| {
        KeyStoreError::CorruptedData(format!(
            "invalid {} length: expected {}, got {}",
            field,
            N,
            bytes.len()
        ))
    })
}
