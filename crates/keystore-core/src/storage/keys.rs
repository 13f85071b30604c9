//! Storage scopes, record purposes and key naming

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KeyStoreError;
use crate::provider::ProviderId;

/// Storage tier a record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Survives process restarts until cleared
    Durable,
    /// Lives as long as the current session
    Session,
}

impl Scope {
    /// Order in which scopes are consulted when none is given
    pub const LOOKUP_ORDER: [Scope; 2] = [Scope::Durable, Scope::Session];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Durable => "durable",
            Scope::Session => "session",
        }
    }

    /// Parse a stored scope label; `local` is the label older releases wrote
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "durable" | "local" => Some(Scope::Durable),
            "session" => Some(Scope::Session),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Scope::Durable => Scope::Session,
            Scope::Session => Scope::Durable,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = KeyStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| KeyStoreError::Config(format!("unknown scope '{}'", s)))
    }
}

/// One field of a stored credential record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// The serialized envelope
    Ciphertext,
    /// "true"/"false": whether a user password protects the record
    ProtectedFlag,
    /// Scope label the record was written with
    ScopeFlag,
    /// Expiration class label
    ExpiryClass,
    /// RFC 3339 expiry instant
    ExpiryInstant,
}

impl Purpose {
    pub const ALL: [Purpose; 5] = [
        Purpose::Ciphertext,
        Purpose::ProtectedFlag,
        Purpose::ScopeFlag,
        Purpose::ExpiryClass,
        Purpose::ExpiryInstant,
    ];

    fn suffix(self) -> &'static str {
        match self {
            Purpose::Ciphertext => "",
            Purpose::ProtectedFlag => "_protected",
            Purpose::ScopeFlag => "_storage_type",
            Purpose::ExpiryClass => "_expiration",
            Purpose::ExpiryInstant => "_expires_at",
        }
    }
}

/// A fully qualified storage key name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// `<namespace>_api_key<purpose suffix>_<provider id>`
    pub fn new(namespace: &str, purpose: Purpose, provider: &ProviderId) -> Self {
        Self(format!(
            "{}_api_key{}_{}",
            namespace,
            purpose.suffix(),
            provider
        ))
    }

    /// Key name used before records were split per provider
    pub fn legacy(namespace: &str, purpose: Purpose) -> Self {
        Self(format!("{}_api_key{}", namespace, purpose.suffix()))
    }

    /// Whether a provider id would make its ciphertext key equal to a legacy key
    pub(crate) fn collides_with_legacy(provider_id: &str) -> bool {
        Purpose::ALL
            .iter()
            .any(|p| !p.suffix().is_empty() && p.suffix().trim_start_matches('_') == provider_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
