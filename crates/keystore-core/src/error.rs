//! Error types for keystore-core

use thiserror::Error;

/// Result type alias for key store operations
pub type Result<T> = std::result::Result<T, KeyStoreError>;

/// Key store error types
///
/// Every failure surfaced by [`crate::CredentialStore`] is one of these
/// variants; lower layers map their own failures into them before returning.
#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("Invalid API key format for provider '{0}'")]
    Validation(String),

    #[error("A password is required for this operation")]
    PasswordRequired,

    #[error("Password is too weak: {0}")]
    WeakPassword(String),

    #[error("Incorrect password or corrupted data")]
    Authentication,

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Cryptography is unavailable ({0}) - please upgrade your environment")]
    CryptoUnavailable(String),

    #[error("Stored API key data is corrupted ({0}) - clear it and enter the key again")]
    CorruptedData(String),

    #[error("Unsupported expiration class: {0}")]
    UnsupportedExpiration(String),

    #[error("Invalid provider id '{0}'")]
    InvalidProviderId(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KeyStoreError {
    /// Whether the message is meant to be shown to the end user as-is
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            KeyStoreError::Io(_) | KeyStoreError::Serialization(_) | KeyStoreError::Storage(_)
        )
    }
}
