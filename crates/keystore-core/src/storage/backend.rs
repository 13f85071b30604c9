//! Two-scope storage backend
//!
//! All scope selection happens here: callers name a purpose and a provider and
//! optionally a scope; omitted scopes are resolved durable-first. Key names
//! come from the provider's `storage_key`.

use std::sync::Arc;
use tracing::debug;

use super::keys::{Purpose, Scope, StorageKey};
use super::memory::MemoryStorage;
use super::StorageArea;
use crate::error::Result;
use crate::provider::Provider;

pub struct StorageBackend {
    namespace: String,
    durable: Arc<dyn StorageArea>,
    session: Arc<dyn StorageArea>,
}

impl StorageBackend {
    pub fn new(
        namespace: &str,
        durable: Arc<dyn StorageArea>,
        session: Arc<dyn StorageArea>,
    ) -> Self {
        debug!(
            "Storage backend '{}': durable={}, session={}",
            namespace,
            durable.backend_name(),
            session.backend_name()
        );

        Self {
            namespace: namespace.to_string(),
            durable,
            session,
        }
    }

    /// Both scopes in memory
    pub fn in_memory(namespace: &str) -> Self {
        Self::new(
            namespace,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
        )
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn area(&self, scope: Scope) -> &Arc<dyn StorageArea> {
        match scope {
            Scope::Durable => &self.durable,
            Scope::Session => &self.session,
        }
    }

    fn key(&self, purpose: Purpose, provider: &dyn Provider) -> StorageKey {
        provider.storage_key(&self.namespace, purpose)
    }

    fn scopes(scope: Option<Scope>) -> Vec<Scope> {
        match scope {
            Some(scope) => vec![scope],
            None => Scope::LOOKUP_ORDER.to_vec(),
        }
    }

    async fn get_key(&self, key: &StorageKey, scope: Option<Scope>) -> Result<Option<String>> {
        for scope in Self::scopes(scope) {
            if let Some(value) = self.area(scope).get(key.as_str()).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    async fn remove_key(&self, key: &StorageKey, scope: Option<Scope>) -> Result<()> {
        for scope in Self::scopes(scope) {
            self.area(scope).remove(key.as_str()).await?;
        }
        Ok(())
    }

    /// Read a record field; without a scope, the first hit wins
    pub async fn get(
        &self,
        purpose: Purpose,
        provider: &dyn Provider,
        scope: Option<Scope>,
    ) -> Result<Option<String>> {
        self.get_key(&self.key(purpose, provider), scope).await
    }

    /// Write a record field
    pub async fn set(
        &self,
        purpose: Purpose,
        provider: &dyn Provider,
        value: &str,
        scope: Scope,
    ) -> Result<()> {
        let key = self.key(purpose, provider);
        self.area(scope).set(key.as_str(), value).await
    }

    /// Remove a record field; without a scope, from both
    pub async fn remove(
        &self,
        purpose: Purpose,
        provider: &dyn Provider,
        scope: Option<Scope>,
    ) -> Result<()> {
        self.remove_key(&self.key(purpose, provider), scope).await
    }

    /// Check if a record field exists
    pub async fn exists(
        &self,
        purpose: Purpose,
        provider: &dyn Provider,
        scope: Option<Scope>,
    ) -> Result<bool> {
        let key = self.key(purpose, provider);
        for scope in Self::scopes(scope) {
            if self.area(scope).contains(key.as_str()).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Scope currently holding a record for the provider, durable first
    pub async fn scope_of(&self, provider: &dyn Provider) -> Result<Option<Scope>> {
        for scope in Scope::LOOKUP_ORDER {
            if self.exists(Purpose::Ciphertext, provider, Some(scope)).await? {
                return Ok(Some(scope));
            }
        }
        Ok(None)
    }

    /// Remove every field of a provider's record
    ///
    /// The ciphertext goes first so an interrupted removal leaves no record
    /// behind, only orphaned metadata.
    pub async fn remove_record(&self, provider: &dyn Provider, scope: Option<Scope>) -> Result<()> {
        for purpose in Purpose::ALL {
            self.remove(purpose, provider, scope).await?;
        }
        Ok(())
    }

    /// Read a field under its pre-multi-provider key name
    pub async fn get_legacy(&self, purpose: Purpose, scope: Option<Scope>) -> Result<Option<String>> {
        self.get_key(&StorageKey::legacy(&self.namespace, purpose), scope)
            .await
    }

    /// Remove every pre-multi-provider key from both scopes
    pub async fn remove_legacy_record(&self) -> Result<()> {
        for purpose in Purpose::ALL {
            self.remove_key(&StorageKey::legacy(&self.namespace, purpose), None)
                .await?;
        }
        Ok(())
    }
}
