//! Versioned envelope format
//!
//! An envelope is the single opaque string stored as a record's ciphertext:
//! base64 of a compact JSON object whose `version` field selects the handler.
//!
//! | version | handler | writes |
//! |---|---|---|
//! | 1 | [`LegacyEnvelope`] (XOR + validation tag) | never |
//! | 2 | [`AeadEnvelope`] (PBKDF2-SHA256 + AES-256-GCM) | always |

mod aead;
mod legacy;

pub use aead::{AeadEnvelope, ALGORITHM, KDF};
pub use legacy::LegacyEnvelope;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;

use crate::error::{KeyStoreError, Result};
use crate::provider::ProviderId;

/// Envelope format generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatVersion {
    LegacyXor = 1,
    Aead = 2,
}

impl FormatVersion {
    /// Version used for every new write
    pub const CURRENT: FormatVersion = FormatVersion::Aead;

    pub fn from_number(n: u64) -> Option<Self> {
        match n {
            1 => Some(FormatVersion::LegacyXor),
            2 => Some(FormatVersion::Aead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Legacy(LegacyEnvelope),
    Aead(AeadEnvelope),
}

impl Envelope {
    /// Encrypt a credential into a current-version envelope
    pub fn seal(
        plaintext: &str,
        secret: &str,
        provider_id: &ProviderId,
        iterations: u32,
    ) -> Result<Self> {
        AeadEnvelope::seal(plaintext, secret, provider_id, iterations).map(Envelope::Aead)
    }

    /// Recover the plaintext; any mismatch is [`KeyStoreError::Authentication`]
    pub fn open(&self, secret: &str) -> Result<String> {
        match self {
            Envelope::Legacy(env) => env.open(secret),
            Envelope::Aead(env) => env.open(secret),
        }
    }

    pub fn version(&self) -> FormatVersion {
        match self {
            Envelope::Legacy(_) => FormatVersion::LegacyXor,
            Envelope::Aead(_) => FormatVersion::Aead,
        }
    }

    /// Provider recorded inside the envelope, if the format carries one
    pub fn provider(&self) -> Option<&str> {
        match self {
            Envelope::Legacy(env) => env.provider.as_deref(),
            Envelope::Aead(env) => Some(env.provider_id.as_str()),
        }
    }

    /// Serialize to the stored string form
    pub fn encode(&self) -> Result<String> {
        let json = match self {
            Envelope::Legacy(env) => serde_json::to_vec(env)?,
            Envelope::Aead(env) => serde_json::to_vec(&env.to_wire())?,
        };
        Ok(STANDARD.encode(json))
    }

    /// Parse a stored string
    ///
    /// Anything structurally wrong is [`KeyStoreError::CorruptedData`].
    pub fn decode(encoded: &str) -> Result<Self> {
        let json = STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyStoreError::CorruptedData(format!("invalid base64: {}", e)))?;

        let value: Value = serde_json::from_slice(&json)
            .map_err(|e| KeyStoreError::CorruptedData(format!("invalid JSON: {}", e)))?;

        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| KeyStoreError::CorruptedData("missing format version".to_string()))?;

        let malformed =
            |e: serde_json::Error| KeyStoreError::CorruptedData(format!("malformed envelope: {}", e));

        match FormatVersion::from_number(version) {
            Some(FormatVersion::LegacyXor) => serde_json::from_value(value)
                .map(Envelope::Legacy)
                .map_err(malformed),
            Some(FormatVersion::Aead) => {
                let wire = serde_json::from_value(value).map_err(malformed)?;
                AeadEnvelope::from_wire(wire).map(Envelope::Aead)
            }
            None => Err(KeyStoreError::CorruptedData(format!(
                "unsupported format version {}",
                version
            ))),
        }
    }
}
