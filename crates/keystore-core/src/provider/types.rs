//! Provider type definitions

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{KeyStoreError, Result};
use crate::storage::{Purpose, StorageKey};

/// Maximum length of a provider id
const MAX_ID_LEN: usize = 64;

/// Identifier of a credential provider (e.g. "mistral", "openai")
///
/// Lowercase ASCII letters, digits and hyphens only, so ids can be
/// substituted into storage key names without ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a provider id, validating its shape
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        let well_formed = !id.is_empty()
            && id.len() <= MAX_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

        if !well_formed || StorageKey::collides_with_legacy(&id) {
            return Err(KeyStoreError::InvalidProviderId(id));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProviderId {
    type Err = KeyStoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProviderId {
    type Error = KeyStoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.0
    }
}

/// A credential-consuming service: format rule plus key namespacing
pub trait Provider: Send + Sync + fmt::Debug {
    /// Unique provider id
    fn id(&self) -> &ProviderId;

    /// Human-readable name
    fn display_name(&self) -> &str;

    /// Check whether `candidate` has the shape of this provider's API keys
    ///
    /// Must be pure: no I/O, no state.
    fn validate(&self, candidate: &str) -> bool;

    /// Short description of the accepted format
    fn format_hint(&self) -> &str {
        ""
    }

    /// Storage key name for one of this provider's record fields
    fn storage_key(&self, namespace: &str, purpose: Purpose) -> StorageKey {
        StorageKey::new(namespace, purpose, self.id())
    }
}

/// Provider whose keys are recognised by a regular expression
#[derive(Debug, Clone)]
pub struct PatternProvider {
    id: ProviderId,
    display_name: String,
    pattern: Regex,
    hint: String,
}

impl PatternProvider {
    /// Create a provider from an unanchored pattern
    ///
    /// The pattern is anchored at both ends, so it must describe the whole key.
    pub fn new(id: ProviderId, display_name: &str, pattern: &str, hint: &str) -> Result<Self> {
        let pattern = Regex::new(&format!("^(?:{})$", pattern))
            .map_err(|e| KeyStoreError::Config(format!("invalid pattern for '{}': {}", id, e)))?;

        Ok(Self {
            id,
            display_name: display_name.to_string(),
            pattern,
            hint: hint.to_string(),
        })
    }
}

impl Provider for PatternProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn validate(&self, candidate: &str) -> bool {
        self.pattern.is_match(candidate)
    }

    fn format_hint(&self) -> &str {
        &self.hint
    }
}

/// Providers shipped with the key store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinProvider {
    /// Mistral OCR API
    Mistral,
    /// OpenAI vision models
    OpenAi,
    /// Google Gemini vision models
    Gemini,
    /// Anthropic Claude vision models
    Anthropic,
}

impl BuiltinProvider {
    pub const ALL: [BuiltinProvider; 4] = [
        BuiltinProvider::Mistral,
        BuiltinProvider::OpenAi,
        BuiltinProvider::Gemini,
        BuiltinProvider::Anthropic,
    ];

    pub fn id_str(self) -> &'static str {
        match self {
            BuiltinProvider::Mistral => "mistral",
            BuiltinProvider::OpenAi => "openai",
            BuiltinProvider::Gemini => "gemini",
            BuiltinProvider::Anthropic => "anthropic",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BuiltinProvider::Mistral => "Mistral AI",
            BuiltinProvider::OpenAi => "OpenAI",
            BuiltinProvider::Gemini => "Google Gemini",
            BuiltinProvider::Anthropic => "Anthropic",
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            BuiltinProvider::Mistral => r"[A-Za-z0-9]{32}",
            BuiltinProvider::OpenAi => r"sk-[A-Za-z0-9_-]{20,200}",
            BuiltinProvider::Gemini => r"AIza[A-Za-z0-9_-]{35}",
            BuiltinProvider::Anthropic => r"sk-ant-[A-Za-z0-9_-]{32,200}",
        }
    }

    fn hint(self) -> &'static str {
        match self {
            BuiltinProvider::Mistral => "32 letters and digits",
            BuiltinProvider::OpenAi => "starts with 'sk-'",
            BuiltinProvider::Gemini => "starts with 'AIza', 39 characters",
            BuiltinProvider::Anthropic => "starts with 'sk-ant-'",
        }
    }

    /// Built-in ids are valid by construction
    pub fn provider_id(self) -> ProviderId {
        ProviderId(self.id_str().to_string())
    }

    /// Build the provider object
    pub fn build(self) -> Result<PatternProvider> {
        PatternProvider::new(
            self.provider_id(),
            self.display_name(),
            self.pattern(),
            self.hint(),
        )
    }
}
