//! Storage trait definitions

use crate::error::Result;
use async_trait::async_trait;

/// A flat string key-value area (one storage scope)
///
/// Values written here are already envelopes or plain metadata; areas do not
/// encrypt.
#[async_trait]
pub trait StorageArea: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Check if a key exists
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Get a human-readable name for this storage area
    fn backend_name(&self) -> &'static str;
}
