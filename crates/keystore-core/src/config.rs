//! Key store configuration
//!
//! Static configuration supplied at construction time. It can be built in
//! code or loaded from a JSON file; nothing is read from the environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::crypto::{KeyDerivationParams, DEFAULT_ITERATIONS, MAX_ITERATIONS};
use crate::error::{KeyStoreError, Result};
use crate::expiration::{default_durations_ms, ExpirationClass, MAX_DURATION_MS};
use crate::provider::{BuiltinProvider, ProviderId};

/// Namespace prefixed to every storage key
pub const DEFAULT_NAMESPACE: &str = "paper2llm";

const CONFIG_VERSION: u32 = 1;

/// Minimum strength required of user passwords
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordPolicy {
    /// Minimum number of characters
    pub min_length: usize,
    /// Minimum number of distinct classes among letters, digits and symbols
    pub min_character_classes: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            min_character_classes: 2,
        }
    }
}

impl PasswordPolicy {
    /// Human-readable statement of the policy
    pub fn describe(&self) -> String {
        format!(
            "use at least {} characters and at least {} of: letters, digits, symbols",
            self.min_length, self.min_character_classes
        )
    }

    /// Check a password against the policy
    pub fn check(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.min_length {
            return Err(KeyStoreError::WeakPassword(self.describe()));
        }

        let has_letter = password.chars().any(char::is_alphabetic);
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_symbol = password
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

        let classes = [has_letter, has_digit, has_symbol]
            .iter()
            .filter(|present| **present)
            .count();

        if classes < self.min_character_classes {
            return Err(KeyStoreError::WeakPassword(self.describe()));
        }

        Ok(())
    }
}

/// Key store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyStoreConfig {
    /// Config file version
    pub version: u32,
    /// Application namespace used in storage key names
    pub namespace: String,
    /// Provider used when an operation names none
    pub default_provider: ProviderId,
    /// Duration in milliseconds for each expiring class
    pub expiration_durations_ms: BTreeMap<ExpirationClass, u64>,
    /// Password strength policy
    pub password_policy: PasswordPolicy,
    /// PBKDF2 iteration count for new envelopes
    pub kdf_iterations: u32,
    /// Re-seal legacy envelopes in the current format after a successful read
    pub upgrade_legacy_on_read: bool,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_provider: BuiltinProvider::Mistral.provider_id(),
            expiration_durations_ms: default_durations_ms(),
            password_policy: PasswordPolicy::default(),
            kdf_iterations: DEFAULT_ITERATIONS,
            upgrade_legacy_on_read: true,
        }
    }
}

impl KeyStoreConfig {
    /// Load configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let config: KeyStoreConfig = serde_json::from_str(&contents)
            .map_err(|e| KeyStoreError::Config(format!("invalid config file {:?}: {}", path, e)))?;

        config.validate()?;
        debug!("Loaded key store config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        // Write atomically using temp file
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, path).await?;

        debug!("Saved key store config to {:?}", path);
        Ok(())
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty()
            || !self
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(KeyStoreError::Config(format!(
                "invalid namespace '{}'",
                self.namespace
            )));
        }

        let kdf = KeyDerivationParams {
            iterations: self.kdf_iterations,
        };
        if !kdf.is_valid() {
            return Err(KeyStoreError::Config(format!(
                "kdfIterations must be between 1 and {}",
                MAX_ITERATIONS
            )));
        }

        if self.password_policy.min_character_classes > 3 {
            return Err(KeyStoreError::Config(
                "passwordPolicy.minCharacterClasses cannot exceed 3".to_string(),
            ));
        }

        for (class, ms) in &self.expiration_durations_ms {
            if class.is_open_ended() {
                continue;
            }
            if *ms == 0 {
                return Err(KeyStoreError::Config(format!(
                    "expiration class '{}' has a zero duration",
                    class
                )));
            }
            if *ms > MAX_DURATION_MS {
                return Err(KeyStoreError::Config(format!(
                    "expiration class '{}' exceeds the maximum of {} ms",
                    class, MAX_DURATION_MS
                )));
            }
        }

        Ok(())
    }
}
