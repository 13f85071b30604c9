//! Credential type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::SecretString;
use crate::envelope::FormatVersion;
use crate::expiration::ExpirationClass;
use crate::provider::ProviderId;
use crate::storage::Scope;

/// Number of leading characters shown by [`DecryptedCredential::masked`]
const MASK_PREFIX_LEN: usize = 8;

/// Options for [`super::CredentialStore::store`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// User password; required for durable scope
    pub secret: Option<SecretString>,
    /// Storage tier
    pub scope: Scope,
    /// Expiry policy for the record
    pub expiration: ExpirationClass,
    /// Owning provider; the registry default when `None`
    pub provider: Option<ProviderId>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            secret: None,
            scope: Scope::Durable,
            expiration: ExpirationClass::Never,
            provider: None,
        }
    }
}

impl StoreOptions {
    /// Durable, password-protected storage
    pub fn durable(secret: &str) -> Self {
        Self::default().with_secret(secret)
    }

    /// Session storage under the generated session secret
    pub fn session() -> Self {
        Self {
            scope: Scope::Session,
            expiration: ExpirationClass::Session,
            ..Self::default()
        }
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(SecretString::from(secret));
        self
    }

    pub fn expiring(mut self, expiration: ExpirationClass) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn for_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// Metadata of a stored credential (safe to display)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRecord {
    pub provider: ProviderId,
    pub scope: Scope,
    pub password_protected: bool,
    pub expiration: ExpirationClass,
    /// Absolute expiry; `None` if the record does not expire by time
    pub expires_at: Option<DateTime<Utc>>,
    /// Envelope generation; `None` if the envelope cannot be parsed
    #[serde(skip)]
    pub format_version: Option<FormatVersion>,
}

/// Decrypted credential value - automatically zeroed when dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DecryptedCredential {
    /// The actual secret value
    value: String,
}

impl DecryptedCredential {
    /// Create a new decrypted credential
    pub fn new(value: String) -> Self {
        Self { value }
    }

    /// Get the secret value (use carefully)
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// First few characters for display, e.g. "sk-proj-..."
    pub fn masked(&self) -> String {
        let prefix: String = self.value.chars().take(MASK_PREFIX_LEN).collect();
        format!("{}...", prefix)
    }
}

impl std::fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedCredential")
            .field("value", &"[REDACTED]")
            .finish()
    }
}
