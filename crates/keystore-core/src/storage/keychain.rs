//! OS keychain storage area
//!
//! Durable scope backed by the platform credential store (macOS Keychain,
//! Windows Credential Manager, Secret Service on Linux). Every storage key is
//! one keychain entry; the service name is the key store namespace.

use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, warn};

use super::StorageArea;
use crate::error::{KeyStoreError, Result};

const PROBE_ACCOUNT: &str = "__keystore_probe__";

pub struct KeychainStorage {
    service: String,
}

impl KeychainStorage {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// Check that the keychain accepts writes, by writing and removing a probe entry
    pub async fn probe(&self) -> bool {
        let available = self
            .run(PROBE_ACCOUNT, |entry| {
                entry.set_password("probe")?;
                entry.delete_password()
            })
            .await
            .is_ok();

        if !available {
            warn!("Keychain for service '{}' is not available", self.service);
        }
        available
    }

    /// Run a blocking keyring call for one entry off the async executor
    async fn run<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Entry) -> keyring::Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &key).map_err(keychain_error)?;
            op(&entry).map_err(keychain_error)
        })
        .await
        .map_err(|e| KeyStoreError::Storage(format!("keychain task failed: {}", e)))?
    }
}

fn keychain_error(e: keyring::Error) -> KeyStoreError {
    KeyStoreError::Storage(format!("keychain: {}", e))
}

#[async_trait]
impl StorageArea for KeychainStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.run(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        self.run(key, move |entry| entry.set_password(&value)).await?;

        debug!("Stored key in keychain: {}", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.run(key, |entry| match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        if cfg!(target_os = "macos") {
            "macOS Keychain"
        } else if cfg!(target_os = "windows") {
            "Windows Credential Manager"
        } else if cfg!(target_os = "linux") {
            "Secret Service"
        } else {
            "System Keychain"
        }
    }
}
