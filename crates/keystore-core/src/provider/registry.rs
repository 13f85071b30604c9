//! Registry of credential providers and the designated default

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{BuiltinProvider, Provider, ProviderId};
use crate::error::{KeyStoreError, Result};

/// Set of registered providers plus the default one
///
/// Built once during setup and handed to [`crate::CredentialStore`]; there is
/// no process-wide instance.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderId, Arc<dyn Provider>>,
    default: Arc<dyn Provider>,
}

impl ProviderRegistry {
    /// Create a registry from a set of providers
    ///
    /// Fails with [`KeyStoreError::UnsupportedProvider`] if `default_id` is not
    /// among them.
    pub fn new(
        providers: impl IntoIterator<Item = Arc<dyn Provider>>,
        default_id: &ProviderId,
    ) -> Result<Self> {
        let providers: HashMap<ProviderId, Arc<dyn Provider>> = providers
            .into_iter()
            .map(|p| (p.id().clone(), p))
            .collect();

        let default = providers
            .get(default_id)
            .cloned()
            .ok_or_else(|| KeyStoreError::UnsupportedProvider(default_id.to_string()))?;

        debug!(
            "Provider registry created with {} providers, default '{}'",
            providers.len(),
            default_id
        );

        Ok(Self { providers, default })
    }

    /// Create a registry holding every built-in provider
    pub fn with_builtins(default_id: &ProviderId) -> Result<Self> {
        let providers = BuiltinProvider::ALL
            .iter()
            .map(|b| b.build().map(|p| Arc::new(p) as Arc<dyn Provider>))
            .collect::<Result<Vec<_>>>()?;

        Self::new(providers, default_id)
    }

    /// Register a provider, replacing any provider with the same id
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.id().clone();

        if &id == self.default.id() {
            self.default = provider.clone();
        }

        if self.providers.insert(id.clone(), provider).is_some() {
            info!("Replaced provider: {}", id);
        } else {
            info!("Registered provider: {}", id);
        }
    }

    /// Remove a provider
    ///
    /// The default provider cannot be removed; change the default first.
    pub fn unregister(&mut self, id: &ProviderId) -> Result<Option<Arc<dyn Provider>>> {
        if id == self.default.id() {
            return Err(KeyStoreError::Config(format!(
                "cannot unregister default provider '{}'",
                id
            )));
        }

        Ok(self.providers.remove(id))
    }

    /// Get a provider by id
    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn Provider>> {
        self.providers.get(id).cloned()
    }

    /// Whether a provider id is registered
    pub fn contains(&self, id: &ProviderId) -> bool {
        self.providers.contains_key(id)
    }

    /// Get the default provider
    pub fn get_default(&self) -> Arc<dyn Provider> {
        self.default.clone()
    }

    /// Get the default provider id
    pub fn default_id(&self) -> &ProviderId {
        self.default.id()
    }

    /// Change the default provider
    pub fn set_default(&mut self, id: &ProviderId) -> Result<()> {
        let provider = self
            .get(id)
            .ok_or_else(|| KeyStoreError::UnsupportedProvider(id.to_string()))?;

        self.default = provider;
        info!("Default provider set to: {}", id);
        Ok(())
    }

    /// Resolve an optional id: the named provider, or the default when `None`
    pub fn resolve(&self, id: Option<&ProviderId>) -> Result<Arc<dyn Provider>> {
        match id {
            Some(id) => self
                .get(id)
                .ok_or_else(|| KeyStoreError::UnsupportedProvider(id.to_string())),
            None => Ok(self.get_default()),
        }
    }

    /// List all providers, ordered by id
    pub fn list(&self) -> Vec<Arc<dyn Provider>> {
        let mut providers: Vec<_> = self.providers.values().cloned().collect();
        providers.sort_by(|a, b| a.id().cmp(b.id()));
        providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::PatternProvider;

    fn id(s: &str) -> ProviderId {
        ProviderId::new(s).unwrap()
    }

    fn svc(name: &str, pattern: &str) -> Arc<dyn Provider> {
        Arc::new(PatternProvider::new(id(name), name, pattern, "").unwrap())
    }

    #[test]
    fn test_with_builtins() {
        let registry = ProviderRegistry::with_builtins(&id("mistral")).unwrap();

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.default_id().as_str(), "mistral");
        let ids: Vec<_> = registry.list().iter().map(|p| p.id().clone()).collect();
        assert_eq!(
            ids,
            vec![id("anthropic"), id("gemini"), id("mistral"), id("openai")]
        );
    }

    #[test]
    fn test_unregistered_default_fails_fast() {
        let result = ProviderRegistry::new(vec![svc("svc-a", "a+")], &id("svc-b"));
        assert!(matches!(result, Err(KeyStoreError::UnsupportedProvider(_))));
    }

    #[test]
    fn test_register_upserts() {
        let mut registry = ProviderRegistry::new(vec![svc("svc-a", "a+")], &id("svc-a")).unwrap();

        registry.register(svc("svc-b", "b+"));
        assert_eq!(registry.len(), 2);

        registry.register(svc("svc-a", "z+"));
        assert_eq!(registry.len(), 2);
        assert!(registry.get_default().validate("zz"));
        assert!(!registry.get_default().validate("aa"));
    }

    #[test]
    fn test_set_default() {
        let mut registry =
            ProviderRegistry::new(vec![svc("svc-a", "a+"), svc("svc-b", "b+")], &id("svc-a"))
                .unwrap();

        registry.set_default(&id("svc-b")).unwrap();
        assert_eq!(registry.default_id(), &id("svc-b"));

        let result = registry.set_default(&id("svc-c"));
        assert!(matches!(result, Err(KeyStoreError::UnsupportedProvider(_))));
        assert_eq!(registry.default_id(), &id("svc-b"));
    }

    #[test]
    fn test_unregister() {
        let mut registry =
            ProviderRegistry::new(vec![svc("svc-a", "a+"), svc("svc-b", "b+")], &id("svc-a"))
                .unwrap();

        assert!(registry.unregister(&id("svc-a")).is_err());
        assert!(registry.unregister(&id("svc-b")).unwrap().is_some());
        assert!(registry.get(&id("svc-b")).is_none());
    }

    #[test]
    fn test_resolve() {
        let registry = ProviderRegistry::with_builtins(&id("openai")).unwrap();

        assert_eq!(registry.resolve(None).unwrap().id(), &id("openai"));
        assert_eq!(
            registry.resolve(Some(&id("gemini"))).unwrap().id(),
            &id("gemini")
        );
        assert!(matches!(
            registry.resolve(Some(&id("unknown"))),
            Err(KeyStoreError::UnsupportedProvider(_))
        ));
    }
}
