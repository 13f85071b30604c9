//! Session secret for unprotected session-scope records
//!
//! When a user stores a key for the session without choosing a password, the
//! key is still encrypted, under a random secret that only lives in this
//! process. Losing the process loses the secret, which ends the session.

use rand::{rngs::OsRng, RngCore};
use tokio::sync::RwLock;
use tracing::debug;

use crate::crypto::SecretString;
use crate::error::{KeyStoreError, Result};

/// Length of the random session secret in bytes (64 hex chars)
pub const SESSION_SECRET_LEN: usize = 32;

/// Generate a fresh random session secret, hex encoded
pub fn generate_session_secret() -> Result<SecretString> {
    let mut bytes = [0u8; SESSION_SECRET_LEN];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        KeyStoreError::CryptoUnavailable(format!("secure random source failed: {}", e))
    })?;

    let secret = SecretString::new(hex::encode(bytes));
    zeroize::Zeroize::zeroize(&mut bytes);
    Ok(secret)
}

/// Per-process holder of the generated session secret
#[derive(Debug, Default)]
pub struct SessionKeyCache {
    secret: RwLock<Option<SecretString>>,
}

impl SessionKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Secret of the current session, if one was started
    pub async fn current(&self) -> Option<SecretString> {
        self.secret.read().await.clone()
    }

    /// Secret of the current session, starting one if needed
    pub async fn get_or_create(&self) -> Result<SecretString> {
        let mut guard = self.secret.write().await;

        if let Some(secret) = guard.as_ref() {
            return Ok(secret.clone());
        }

        let secret = generate_session_secret()?;
        *guard = Some(secret.clone());
        debug!("Started new session secret");
        Ok(secret)
    }

    /// Forget the secret; records sealed with it become unreadable
    pub async fn end_session(&self) {
        let mut guard = self.secret.write().await;
        if guard.take().is_some() {
            debug!("Session secret discarded");
        }
    }
}
