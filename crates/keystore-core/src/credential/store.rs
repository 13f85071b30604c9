//! Credential store: the facade over providers, storage, crypto and expiry

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{DecryptedCredential, StorageRecord, StoreOptions};
use crate::clock::{Clock, SystemClock};
use crate::config::KeyStoreConfig;
use crate::crypto::SecretString;
use crate::envelope::{Envelope, FormatVersion};
use crate::error::{KeyStoreError, Result};
use crate::expiration::{format_instant, parse_instant, ExpirationClass, ExpirationPolicy};
use crate::migration::{LegacyMigrator, MigrationReport};
use crate::provider::{Provider, ProviderId, ProviderRegistry};
use crate::session::SessionKeyCache;
use crate::storage::{Purpose, Scope, StorageBackend};

/// Encrypted API key store, one record per provider
pub struct CredentialStore {
    config: KeyStoreConfig,
    registry: ProviderRegistry,
    backend: StorageBackend,
    expiration: ExpirationPolicy,
    session: SessionKeyCache,
}

impl CredentialStore {
    /// Create a store and run the legacy migration
    ///
    /// The configured default provider becomes the registry default, so it
    /// must be registered.
    pub async fn open(
        config: KeyStoreConfig,
        mut registry: ProviderRegistry,
        backend: StorageBackend,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        if backend.namespace() != config.namespace {
            return Err(KeyStoreError::Config(format!(
                "storage namespace '{}' does not match configured namespace '{}'",
                backend.namespace(),
                config.namespace
            )));
        }

        registry.set_default(&config.default_provider)?;

        let expiration = ExpirationPolicy::new(&config.expiration_durations_ms, clock);

        let store = Self {
            config,
            registry,
            backend,
            expiration,
            session: SessionKeyCache::new(),
        };

        store.migrate_legacy().await;

        info!(
            "Credential store opened (default provider '{}')",
            store.registry.default_id()
        );
        Ok(store)
    }

    /// Store with built-in providers and both scopes in memory
    pub async fn in_memory(config: KeyStoreConfig) -> Result<Self> {
        let registry = ProviderRegistry::with_builtins(&config.default_provider)?;
        let backend = StorageBackend::in_memory(&config.namespace);
        Self::open(config, registry, backend, Arc::new(SystemClock)).await
    }

    pub fn config(&self) -> &KeyStoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Copy a single-provider legacy record to the default provider
    pub async fn migrate_legacy(&self) -> MigrationReport {
        let target = self.registry.get_default();
        LegacyMigrator::new(&self.backend, target.as_ref())
            .run()
            .await
    }

    /// Encrypt and persist a credential
    pub async fn store(&self, plaintext: &str, options: StoreOptions) -> Result<()> {
        let resolved = self.registry.resolve(options.provider.as_ref())?;
        let provider = resolved.as_ref();
        let id = provider.id().clone();
        let scope = options.scope;

        let plaintext = plaintext.trim();
        if !provider.validate(plaintext) {
            return Err(KeyStoreError::Validation(id.to_string()));
        }

        let (secret, protected) = match (options.secret, scope) {
            (Some(secret), _) => {
                self.config.password_policy.check(secret.expose())?;
                (secret, true)
            }
            (None, Scope::Durable) => return Err(KeyStoreError::PasswordRequired),
            (None, Scope::Session) => (self.session.get_or_create().await?, false),
        };

        let expires_at = match scope {
            Scope::Durable => self.expiration.expiry_instant(options.expiration)?,
            Scope::Session => {
                // Checked for support only; the session ends the record
                self.expiration.expiry_instant(options.expiration)?;
                None
            }
        };

        let envelope = self
            .seal(SecretString::from(plaintext), secret, id.clone())
            .await?;

        // The ciphertext key marks the record as present: drop it first and
        // write it last so an interrupted store leaves no half record.
        self.backend.remove(Purpose::Ciphertext, provider, None).await?;
        self.backend
            .remove_record(provider, Some(scope.other()))
            .await?;

        self.backend
            .set(Purpose::ProtectedFlag, provider, &protected.to_string(), scope)
            .await?;
        self.backend
            .set(Purpose::ScopeFlag, provider, scope.as_str(), scope)
            .await?;
        self.backend
            .set(Purpose::ExpiryClass, provider, options.expiration.as_str(), scope)
            .await?;
        match expires_at {
            Some(instant) => {
                self.backend
                    .set(
                        Purpose::ExpiryInstant,
                        provider,
                        &format_instant(instant),
                        scope,
                    )
                    .await?
            }
            None => {
                self.backend
                    .remove(Purpose::ExpiryInstant, provider, Some(scope))
                    .await?
            }
        }
        self.backend
            .set(Purpose::Ciphertext, provider, &envelope, scope)
            .await?;

        info!(
            "Stored API key for provider '{}' in {} scope (expiration: {})",
            id, scope, options.expiration
        );
        Ok(())
    }

    /// Decrypt the stored credential
    ///
    /// Returns `None` if there is no live record. Expired records and
    /// session records whose session has ended are deleted on the way.
    pub async fn retrieve(
        &self,
        secret: Option<&str>,
        provider: Option<&ProviderId>,
    ) -> Result<Option<DecryptedCredential>> {
        let resolved = self.registry.resolve(provider)?;
        let provider = resolved.as_ref();
        let id = provider.id();

        let Some(scope) = self.live_scope(provider).await? else {
            return Ok(None);
        };

        let protected = self.read_protected(provider, scope).await?;
        let secret = if protected {
            match secret {
                Some(secret) => SecretString::from(secret),
                None => return Err(KeyStoreError::PasswordRequired),
            }
        } else {
            match self.session.current().await {
                Some(secret) => secret,
                // Session ended after the liveness check
                None => return Ok(None),
            }
        };

        let Some(encoded) = self
            .backend
            .get(Purpose::Ciphertext, provider, Some(scope))
            .await?
        else {
            return Ok(None);
        };

        let envelope = Envelope::decode(&encoded)?;
        self.check_envelope_owner(&envelope, id)?;

        let version = envelope.version();
        let value = self.open_envelope(envelope, secret.clone()).await?;

        if !provider.validate(value.expose()) {
            return Err(KeyStoreError::Authentication);
        }

        if version < FormatVersion::CURRENT && self.config.upgrade_legacy_on_read {
            self.upgrade(&value, secret, provider, scope).await;
        }

        debug!("Retrieved API key for provider '{}'", id);
        Ok(Some(value))
    }

    /// Whether a live record exists
    ///
    /// With no provider, whether any registered provider has one.
    pub async fn has_credential(&self, provider: Option<&ProviderId>) -> Result<bool> {
        match provider {
            Some(id) => {
                let provider = self.registry.resolve(Some(id))?;
                Ok(self.live_scope(provider.as_ref()).await?.is_some())
            }
            None => Ok(!self.list_providers_with_credentials().await?.is_empty()),
        }
    }

    /// Providers holding a live record, ordered by id
    ///
    /// Expired and ended-session records found along the way are deleted.
    pub async fn list_providers_with_credentials(&self) -> Result<Vec<ProviderId>> {
        let mut providers = Vec::new();

        for provider in self.registry.list() {
            if self.live_scope(provider.as_ref()).await?.is_some() {
                providers.push(provider.id().clone());
            }
        }

        Ok(providers)
    }

    /// Whether the provider's record needs a user password
    ///
    /// `false` when there is no record.
    pub async fn is_password_protected(&self, provider: Option<&ProviderId>) -> Result<bool> {
        let provider = self.registry.resolve(provider)?;
        match self.backend.scope_of(provider.as_ref()).await? {
            Some(scope) => self.read_protected(provider.as_ref(), scope).await,
            None => Ok(false),
        }
    }

    /// Whether the provider's record has passed its expiry instant
    pub async fn is_expired(&self, provider: Option<&ProviderId>) -> Result<bool> {
        let provider = self.registry.resolve(provider)?;
        match self.backend.scope_of(provider.as_ref()).await? {
            Some(scope) => {
                self.expiration
                    .is_expired(&self.backend, provider.as_ref(), scope)
                    .await
            }
            None => Ok(false),
        }
    }

    /// Scope holding the provider's record
    pub async fn storage_scope(&self, provider: Option<&ProviderId>) -> Result<Option<Scope>> {
        let provider = self.registry.resolve(provider)?;
        self.backend.scope_of(provider.as_ref()).await
    }

    /// Metadata of the provider's record; never touches the secret
    pub async fn record(&self, provider: Option<&ProviderId>) -> Result<Option<StorageRecord>> {
        let resolved = self.registry.resolve(provider)?;
        let provider = resolved.as_ref();

        let Some(scope) = self.backend.scope_of(provider).await? else {
            return Ok(None);
        };

        let password_protected = self.read_protected(provider, scope).await?;
        let expiration = self
            .backend
            .get(Purpose::ExpiryClass, provider, Some(scope))
            .await?
            .and_then(|label| ExpirationClass::from_label(&label))
            .unwrap_or(match scope {
                Scope::Durable => ExpirationClass::Never,
                Scope::Session => ExpirationClass::Session,
            });
        let expires_at = match scope {
            Scope::Durable => self
                .backend
                .get(Purpose::ExpiryInstant, provider, Some(scope))
                .await?
                .and_then(|value| parse_instant(&value)),
            Scope::Session => None,
        };
        let format_version = self
            .backend
            .get(Purpose::Ciphertext, provider, Some(scope))
            .await?
            .and_then(|encoded| Envelope::decode(&encoded).ok())
            .map(|envelope| envelope.version());

        Ok(Some(StorageRecord {
            provider: provider.id().clone(),
            scope,
            password_protected,
            expiration,
            expires_at,
            format_version,
        }))
    }

    /// Delete stored credentials
    ///
    /// With no provider, every registered provider's record and the legacy
    /// single-provider keys.
    pub async fn clear(&self, provider: Option<&ProviderId>) -> Result<()> {
        match provider {
            Some(id) => {
                let provider = self.registry.resolve(Some(id))?;
                self.backend.remove_record(provider.as_ref(), None).await?;
                info!("Cleared API key for provider '{}'", provider.id());
            }
            None => {
                for provider in self.registry.list() {
                    self.backend.remove_record(provider.as_ref(), None).await?;
                }
                self.backend.remove_legacy_record().await?;
                info!("Cleared all stored API keys");
            }
        }
        Ok(())
    }

    /// Expiration classes accepted by `store` with this configuration
    pub fn supported_expirations(&self) -> Vec<ExpirationClass> {
        self.expiration.supported_classes()
    }

    /// Check a candidate against the provider's key format
    pub fn validate(&self, plaintext: &str, provider: Option<&ProviderId>) -> Result<bool> {
        let provider = self.registry.resolve(provider)?;
        Ok(provider.validate(plaintext.trim()))
    }

    /// Forget the generated session secret
    ///
    /// Unprotected session records stop counting as live and are deleted by
    /// the next query that looks at them.
    pub async fn end_session(&self) {
        self.session.end_session().await;
        info!("Session ended");
    }

    /// Scope of the provider's live record
    ///
    /// Expired records and unprotected session records whose session secret
    /// is gone are deleted and reported as absent.
    async fn live_scope(&self, provider: &dyn Provider) -> Result<Option<Scope>> {
        let Some(scope) = self.backend.scope_of(provider).await? else {
            return Ok(None);
        };

        if self
            .expiration
            .is_expired(&self.backend, provider, scope)
            .await?
        {
            self.evict(provider, scope).await?;
            return Ok(None);
        }

        if scope == Scope::Session
            && !self.read_protected(provider, scope).await?
            && self.session.current().await.is_none()
        {
            debug!(
                "No session secret for '{}' record, session has ended",
                provider.id()
            );
            self.evict(provider, scope).await?;
            return Ok(None);
        }

        Ok(Some(scope))
    }

    async fn evict(&self, provider: &dyn Provider, scope: Scope) -> Result<()> {
        self.backend.remove_record(provider, Some(scope)).await?;
        info!(
            "Removed stale API key for provider '{}' from {} scope",
            provider.id(),
            scope
        );
        Ok(())
    }

    /// Protected flag; durable records are always protected
    async fn read_protected(&self, provider: &dyn Provider, scope: Scope) -> Result<bool> {
        if scope == Scope::Durable {
            return Ok(true);
        }

        let flag = self
            .backend
            .get(Purpose::ProtectedFlag, provider, Some(scope))
            .await?;
        Ok(flag.as_deref().map(str::trim) == Some("true"))
    }

    fn check_envelope_owner(&self, envelope: &Envelope, id: &ProviderId) -> Result<()> {
        let Some(owner) = envelope.provider() else {
            return Ok(());
        };
        if owner == id.as_str() {
            return Ok(());
        }

        let registered = ProviderId::new(owner)
            .map(|owner| self.registry.contains(&owner))
            .unwrap_or(false);
        if registered {
            Err(KeyStoreError::CorruptedData(format!(
                "record for '{}' holds a key for '{}'",
                id, owner
            )))
        } else {
            Err(KeyStoreError::UnsupportedProvider(owner.to_string()))
        }
    }

    async fn seal(
        &self,
        plaintext: SecretString,
        secret: SecretString,
        id: ProviderId,
    ) -> Result<String> {
        let iterations = self.config.kdf_iterations;

        tokio::task::spawn_blocking(move || {
            Envelope::seal(plaintext.expose(), secret.expose(), &id, iterations)?.encode()
        })
        .await
        .map_err(blocking_task_failed)?
    }

    async fn open_envelope(
        &self,
        envelope: Envelope,
        secret: SecretString,
    ) -> Result<DecryptedCredential> {
        tokio::task::spawn_blocking(move || envelope.open(secret.expose()))
            .await
            .map_err(blocking_task_failed)?
            .map(DecryptedCredential::new)
    }

    /// Re-seal an older envelope in the current format
    ///
    /// Best effort: the caller already has the plaintext.
    async fn upgrade(
        &self,
        value: &DecryptedCredential,
        secret: SecretString,
        provider: &dyn Provider,
        scope: Scope,
    ) {
        let id = provider.id();
        let sealed = self
            .seal(SecretString::from(value.expose()), secret, id.clone())
            .await;

        let result = match sealed {
            Ok(envelope) => {
                self.backend
                    .set(Purpose::Ciphertext, provider, &envelope, scope)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => info!("Upgraded stored API key for '{}' to the current format", id),
            Err(e) => warn!("Could not upgrade stored API key for '{}': {}", id, e),
        }
    }
}

fn blocking_task_failed(e: tokio::task::JoinError) -> KeyStoreError {
    KeyStoreError::CryptoUnavailable(format!("crypto task failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::envelope::LegacyEnvelope;
    use crate::provider::{BuiltinProvider, PatternProvider};
    use crate::storage::{MemoryStorage, StorageArea};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use crate::expiration::MAX_DURATION_MS;
    use chrono::{Duration, TimeZone, Utc};

    const PASSWORD: &str = "Aa123456";
    const MISTRAL_KEY: &str = "abcdefghijklmnopqrstuvwxyz012345";

    fn id(s: &str) -> ProviderId {
        ProviderId::new(s).unwrap()
    }

    fn test_config() -> KeyStoreConfig {
        KeyStoreConfig {
            kdf_iterations: 1_000,
            ..KeyStoreConfig::default()
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::with_builtins(&id("mistral")).unwrap();
        registry.register(Arc::new(
            PatternProvider::new(id("svc-a"), "Service A", "[A-Za-z0-9_-]{32,64}", "").unwrap(),
        ));
        registry
    }

    struct Fixture {
        store: CredentialStore,
        clock: ManualClock,
        durable: Arc<MemoryStorage>,
        session: Arc<MemoryStorage>,
    }

    async fn fixture_with(durable: Arc<MemoryStorage>, session: Arc<MemoryStorage>) -> Fixture {
        let clock = ManualClock::default();
        let backend = StorageBackend::new("paper2llm", durable.clone(), session.clone());
        let store = CredentialStore::open(test_config(), registry(), backend, Arc::new(clock.clone()))
            .await
            .unwrap();
        Fixture {
            store,
            clock,
            durable,
            session,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new())).await
    }

    fn sample_key(provider: BuiltinProvider) -> String {
        match provider {
            BuiltinProvider::Mistral => MISTRAL_KEY.to_string(),
            BuiltinProvider::OpenAi => format!("sk-proj-{}", "a1B2".repeat(6)),
            BuiltinProvider::Gemini => format!("AIza{}", "Xy9_-".repeat(7)),
            BuiltinProvider::Anthropic => format!("sk-ant-api03-{}", "k".repeat(40)),
        }
    }

    #[tokio::test]
    async fn test_round_trip_every_builtin() {
        let f = fixture().await;

        for builtin in BuiltinProvider::ALL {
            let key = sample_key(builtin);
            let provider = builtin.provider_id();

            f.store
                .store(&key, StoreOptions::durable(PASSWORD).for_provider(provider.clone()))
                .await
                .unwrap();

            let value = f
                .store
                .retrieve(Some(PASSWORD), Some(&provider))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(value.expose(), key);
        }

        assert_eq!(
            f.store.list_providers_with_credentials().await.unwrap(),
            vec![id("anthropic"), id("gemini"), id("mistral"), id("openai")]
        );
    }

    #[tokio::test]
    async fn test_svc_a_scenario() {
        let f = fixture().await;
        let svc = id("svc-a");
        let key = "a1b2c3d4e5f6g7h8i9j0a1b2c3d4e5f6g7h8i9d4";
        assert_eq!(key.len(), 40);

        f.store
            .store(key, StoreOptions::durable("correct-horse-1").for_provider(svc.clone()))
            .await
            .unwrap();

        let value = f
            .store
            .retrieve(Some("correct-horse-1"), Some(&svc))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.expose(), key);

        assert!(matches!(
            f.store.retrieve(Some("wrong-horse-1"), Some(&svc)).await,
            Err(KeyStoreError::Authentication)
        ));
        assert!(matches!(
            f.store.retrieve(None, Some(&svc)).await,
            Err(KeyStoreError::PasswordRequired)
        ));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::durable(PASSWORD))
            .await
            .unwrap();

        assert!(matches!(
            f.store.retrieve(Some("WrongPass1"), None).await,
            Err(KeyStoreError::Authentication)
        ));
    }

    #[tokio::test]
    async fn test_store_failures() {
        let f = fixture().await;

        assert!(matches!(
            f.store.store("not-a-key", StoreOptions::durable(PASSWORD)).await,
            Err(KeyStoreError::Validation(_))
        ));
        assert!(matches!(
            f.store.store(MISTRAL_KEY, StoreOptions::default()).await,
            Err(KeyStoreError::PasswordRequired)
        ));
        assert!(matches!(
            f.store.store(MISTRAL_KEY, StoreOptions::durable("short")).await,
            Err(KeyStoreError::WeakPassword(_))
        ));
        assert!(matches!(
            f.store
                .store(
                    MISTRAL_KEY,
                    StoreOptions::durable(PASSWORD).for_provider(id("unknown"))
                )
                .await,
            Err(KeyStoreError::UnsupportedProvider(_))
        ));
        assert!(matches!(
            f.store
                .store(
                    MISTRAL_KEY,
                    StoreOptions::durable(PASSWORD).expiring(ExpirationClass::NinetyDays)
                )
                .await,
            Err(KeyStoreError::UnsupportedExpiration(_))
        ));

        assert!(!f.store.has_credential(None).await.unwrap());
        assert!(f.durable.is_empty().await);
    }

    #[tokio::test]
    async fn test_input_is_trimmed() {
        let f = fixture().await;
        f.store
            .store(&format!("  {}\n", MISTRAL_KEY), StoreOptions::durable(PASSWORD))
            .await
            .unwrap();

        let value = f.store.retrieve(Some(PASSWORD), None).await.unwrap().unwrap();
        assert_eq!(value.expose(), MISTRAL_KEY);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails_authentication() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::durable(PASSWORD))
            .await
            .unwrap();

        let key = "paper2llm_api_key_mistral";
        let original = f.durable.get(key).await.unwrap().unwrap();
        let Envelope::Aead(aead) = Envelope::decode(&original).unwrap() else {
            panic!("expected AEAD envelope");
        };

        for i in 0..aead.sealed.ciphertext.len() {
            let mut tampered = aead.clone();
            tampered.sealed.ciphertext[i] ^= 0x01;
            let encoded = Envelope::Aead(tampered).encode().unwrap();
            f.durable.set(key, &encoded).await.unwrap();

            assert!(
                matches!(
                    f.store.retrieve(Some(PASSWORD), None).await,
                    Err(KeyStoreError::Authentication)
                ),
                "byte {} accepted",
                i
            );
        }
    }

    #[tokio::test]
    async fn test_garbage_envelope_is_corrupted() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::durable(PASSWORD))
            .await
            .unwrap();
        f.durable
            .set("paper2llm_api_key_mistral", "%%% garbage %%%")
            .await
            .unwrap();

        assert!(matches!(
            f.store.retrieve(Some(PASSWORD), None).await,
            Err(KeyStoreError::CorruptedData(_))
        ));

        let record = f.store.record(None).await.unwrap().unwrap();
        assert_eq!(record.format_version, None);
    }

    #[tokio::test]
    async fn test_expiry() {
        let f = fixture().await;
        f.store
            .store(
                MISTRAL_KEY,
                StoreOptions::durable(PASSWORD).expiring(ExpirationClass::OneDay),
            )
            .await
            .unwrap();

        assert!(!f.store.is_expired(None).await.unwrap());
        let record = f.store.record(None).await.unwrap().unwrap();
        assert_eq!(record.expires_at, Some(f.clock.now() + Duration::days(1)));

        f.clock.advance(Duration::days(1) + Duration::seconds(1));

        assert!(f.store.is_expired(None).await.unwrap());
        assert!(f.store.retrieve(Some(PASSWORD), None).await.unwrap().is_none());
        assert!(!f.store.has_credential(None).await.unwrap());
        assert!(f.durable.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_evicts_expired() {
        let f = fixture().await;
        f.store
            .store(
                MISTRAL_KEY,
                StoreOptions::durable(PASSWORD).expiring(ExpirationClass::SevenDays),
            )
            .await
            .unwrap();
        f.store
            .store(
                &sample_key(BuiltinProvider::OpenAi),
                StoreOptions::durable(PASSWORD).for_provider(id("openai")),
            )
            .await
            .unwrap();

        f.clock.advance(Duration::days(8));

        assert_eq!(
            f.store.list_providers_with_credentials().await.unwrap(),
            vec![id("openai")]
        );
        assert!(!f
            .durable
            .contains("paper2llm_api_key_mistral")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_session_scope_never_expires() {
        let f = fixture().await;
        f.store
            .store(
                MISTRAL_KEY,
                StoreOptions::session().expiring(ExpirationClass::OneDay),
            )
            .await
            .unwrap();

        f.clock.advance(Duration::days(30));

        assert!(!f.store.is_expired(None).await.unwrap());
        let value = f.store.retrieve(None, None).await.unwrap().unwrap();
        assert_eq!(value.expose(), MISTRAL_KEY);
    }

    #[tokio::test]
    async fn test_session_without_password() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::session())
            .await
            .unwrap();

        assert_eq!(f.store.storage_scope(None).await.unwrap(), Some(Scope::Session));
        assert!(!f.store.is_password_protected(None).await.unwrap());
        assert!(f.durable.is_empty().await);

        // Stored encrypted, not as plaintext
        let stored = f.session.get("paper2llm_api_key_mistral").await.unwrap().unwrap();
        assert!(!stored.contains(MISTRAL_KEY));

        let value = f.store.retrieve(None, None).await.unwrap().unwrap();
        assert_eq!(value.expose(), MISTRAL_KEY);
    }

    #[tokio::test]
    async fn test_session_with_password() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::session().with_secret(PASSWORD))
            .await
            .unwrap();

        assert!(f.store.is_password_protected(None).await.unwrap());
        assert!(matches!(
            f.store.retrieve(None, None).await,
            Err(KeyStoreError::PasswordRequired)
        ));
        assert!(f.store.retrieve(Some(PASSWORD), None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lost_session_secret_evicts_record() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::session())
            .await
            .unwrap();

        f.store.end_session().await;

        assert!(f.store.retrieve(None, None).await.unwrap().is_none());
        assert!(f.session.is_empty().await);
    }

    #[tokio::test]
    async fn test_ended_session_is_not_live_anywhere() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::session())
            .await
            .unwrap();
        assert!(f.store.has_credential(None).await.unwrap());

        f.store.end_session().await;

        assert!(f
            .store
            .list_providers_with_credentials()
            .await
            .unwrap()
            .is_empty());
        assert!(!f.store.has_credential(Some(&id("mistral"))).await.unwrap());
        assert!(!f.store.has_credential(None).await.unwrap());
        assert!(f.session.is_empty().await);
    }

    #[tokio::test]
    async fn test_protected_session_record_outlives_session_secret() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::session().with_secret(PASSWORD))
            .await
            .unwrap();

        f.store.end_session().await;

        assert!(f.store.has_credential(None).await.unwrap());
        assert!(f.store.retrieve(Some(PASSWORD), None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_replaces_record_in_other_scope() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::session())
            .await
            .unwrap();
        f.store
            .store(MISTRAL_KEY, StoreOptions::durable(PASSWORD))
            .await
            .unwrap();

        assert!(f.session.is_empty().await);
        assert_eq!(f.store.storage_scope(None).await.unwrap(), Some(Scope::Durable));
        assert!(f.store.is_password_protected(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_provider_isolation() {
        let f = fixture().await;
        let a = id("svc-a");
        let key_a = "A".repeat(40);

        f.store
            .store(&key_a, StoreOptions::durable(PASSWORD).for_provider(a.clone()))
            .await
            .unwrap();
        f.store
            .store(MISTRAL_KEY, StoreOptions::durable(PASSWORD))
            .await
            .unwrap();
        let before = f.durable.get("paper2llm_api_key_svc-a").await.unwrap();

        f.store.clear(Some(&id("mistral"))).await.unwrap();

        assert_eq!(f.durable.get("paper2llm_api_key_svc-a").await.unwrap(), before);
        let value = f.store.retrieve(Some(PASSWORD), Some(&a)).await.unwrap().unwrap();
        assert_eq!(value.expose(), key_a);
        assert!(!f.store.has_credential(Some(&id("mistral"))).await.unwrap());
        assert!(f.store.has_credential(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_all_removes_legacy_keys() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::durable(PASSWORD))
            .await
            .unwrap();
        f.durable.set("paper2llm_api_key", "legacy").await.unwrap();
        f.session.set("paper2llm_api_key_protected", "false").await.unwrap();

        f.store.clear(None).await.unwrap();

        assert!(f.durable.is_empty().await);
        assert!(f.session.is_empty().await);
    }

    #[tokio::test]
    async fn test_unregistered_provider() {
        let f = fixture().await;
        let unknown = id("unknown");

        assert!(matches!(
            f.store.retrieve(Some(PASSWORD), Some(&unknown)).await,
            Err(KeyStoreError::UnsupportedProvider(_))
        ));
        assert!(f.store.validate(MISTRAL_KEY, Some(&unknown)).is_err());
        assert!(f.store.validate(MISTRAL_KEY, None).unwrap());
        assert!(!f.store.validate("nope", None).unwrap());
    }

    #[tokio::test]
    async fn test_envelope_for_unregistered_provider() {
        let f = fixture().await;
        let ghost = Envelope::seal(MISTRAL_KEY, PASSWORD, &id("ghost"), 1_000)
            .unwrap()
            .encode()
            .unwrap();
        f.durable.set("paper2llm_api_key_mistral", &ghost).await.unwrap();

        assert!(matches!(
            f.store.retrieve(Some(PASSWORD), None).await,
            Err(KeyStoreError::UnsupportedProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_interrupted_store_leaves_no_record() {
        let f = fixture().await;
        let mistral = id("mistral");

        // Metadata written, ciphertext never arrived
        f.durable
            .set("paper2llm_api_key_protected_mistral", "true")
            .await
            .unwrap();
        f.durable
            .set("paper2llm_api_key_expiration_mistral", "1day")
            .await
            .unwrap();

        assert!(!f.store.has_credential(Some(&mistral)).await.unwrap());
        assert!(f.store.retrieve(Some(PASSWORD), None).await.unwrap().is_none());
        assert!(f.store.record(None).await.unwrap().is_none());

        f.store
            .store(MISTRAL_KEY, StoreOptions::durable(PASSWORD))
            .await
            .unwrap();
        let record = f.store.record(None).await.unwrap().unwrap();
        assert_eq!(record.expiration, ExpirationClass::Never);
        assert_eq!(record.expires_at, None);
    }

    #[tokio::test]
    async fn test_missing_metadata_uses_defaults() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::durable(PASSWORD))
            .await
            .unwrap();

        for suffix in ["_protected", "_storage_type", "_expiration", "_expires_at"] {
            f.durable
                .remove(&format!("paper2llm_api_key{}_mistral", suffix))
                .await
                .unwrap();
        }

        assert!(f.store.is_password_protected(None).await.unwrap());
        assert!(!f.store.is_expired(None).await.unwrap());
        assert!(matches!(
            f.store.retrieve(None, None).await,
            Err(KeyStoreError::PasswordRequired)
        ));
        assert!(f.store.retrieve(Some(PASSWORD), None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_legacy_record_is_migrated_and_upgraded() {
        let durable = Arc::new(MemoryStorage::new());
        let legacy = LegacyEnvelope::seal_for_tests(MISTRAL_KEY, PASSWORD, None);
        let encoded = Envelope::Legacy(legacy).encode().unwrap();
        durable.set("paper2llm_api_key", &encoded).await.unwrap();
        durable.set("paper2llm_api_key_protected", "true").await.unwrap();
        durable.set("paper2llm_api_key_storage_type", "local").await.unwrap();

        let f = fixture_with(durable, Arc::new(MemoryStorage::new())).await;

        let record = f.store.record(None).await.unwrap().unwrap();
        assert_eq!(record.format_version, Some(FormatVersion::LegacyXor));

        let value = f.store.retrieve(Some(PASSWORD), None).await.unwrap().unwrap();
        assert_eq!(value.expose(), MISTRAL_KEY);

        let record = f.store.record(None).await.unwrap().unwrap();
        assert_eq!(record.format_version, Some(FormatVersion::Aead));
        let value = f.store.retrieve(Some(PASSWORD), None).await.unwrap().unwrap();
        assert_eq!(value.expose(), MISTRAL_KEY);

        // The legacy copy is never rewritten
        assert_eq!(
            f.durable.get("paper2llm_api_key").await.unwrap(),
            Some(encoded)
        );
    }

    #[tokio::test]
    async fn test_legacy_wrong_password() {
        let durable = Arc::new(MemoryStorage::new());
        let legacy = LegacyEnvelope::seal_for_tests(MISTRAL_KEY, PASSWORD, Some("mistral"));
        let encoded = Envelope::Legacy(legacy).encode().unwrap();
        durable.set("paper2llm_api_key", &encoded).await.unwrap();

        let f = fixture_with(durable, Arc::new(MemoryStorage::new())).await;

        assert!(matches!(
            f.store.retrieve(Some("WrongPass1"), None).await,
            Err(KeyStoreError::Authentication)
        ));
        let record = f.store.record(None).await.unwrap().unwrap();
        assert_eq!(record.format_version, Some(FormatVersion::LegacyXor));
    }

    #[tokio::test]
    async fn test_envelope_not_readable_as_plaintext() {
        let f = fixture().await;
        f.store
            .store(MISTRAL_KEY, StoreOptions::durable(PASSWORD))
            .await
            .unwrap();

        let stored = f.durable.get("paper2llm_api_key_mistral").await.unwrap().unwrap();
        let json = STANDARD.decode(stored).unwrap();
        assert!(!String::from_utf8_lossy(&json).contains(MISTRAL_KEY));
    }

    #[tokio::test]
    async fn test_durable_record_survives_reopen() {
        use crate::storage::FileStorage;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();

        let open = |dir: std::path::PathBuf| async move {
            let durable = Arc::new(FileStorage::open_in(dir).await.unwrap());
            let backend =
                StorageBackend::new("paper2llm", durable, Arc::new(MemoryStorage::new()));
            CredentialStore::open(test_config(), registry(), backend, Arc::new(SystemClock))
                .await
                .unwrap()
        };

        {
            let store = open(temp_dir.path().to_path_buf()).await;
            store
                .store(MISTRAL_KEY, StoreOptions::durable(PASSWORD))
                .await
                .unwrap();
            store
                .store(&"B".repeat(40), StoreOptions::session().for_provider(id("svc-a")))
                .await
                .unwrap();
        }

        let store = open(temp_dir.path().to_path_buf()).await;
        let value = store.retrieve(Some(PASSWORD), None).await.unwrap().unwrap();
        assert_eq!(value.expose(), MISTRAL_KEY);

        // Session records end with the process that wrote them
        assert!(!store.has_credential(Some(&id("svc-a"))).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_requires_registered_default() {
        let config = KeyStoreConfig {
            default_provider: id("svc-b"),
            ..test_config()
        };
        let result = CredentialStore::open(
            config,
            registry(),
            StorageBackend::in_memory("paper2llm"),
            Arc::new(SystemClock),
        )
        .await;
        assert!(matches!(result, Err(KeyStoreError::UnsupportedProvider(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_oversized_duration() {
        let mut config = test_config();
        config
            .expiration_durations_ms
            .insert(ExpirationClass::OneDay, u64::MAX);

        let result = CredentialStore::open(
            config,
            registry(),
            StorageBackend::in_memory("paper2llm"),
            Arc::new(SystemClock),
        )
        .await;
        assert!(matches!(result, Err(KeyStoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_expiry_past_calendar_range_is_unsupported() {
        // A valid duration that still lands past the last representable date
        let clock = ManualClock::new(Utc.with_ymd_and_hms(262_142, 12, 31, 0, 0, 0).unwrap());
        let mut config = test_config();
        config
            .expiration_durations_ms
            .insert(ExpirationClass::NinetyDays, MAX_DURATION_MS);
        let backend = StorageBackend::in_memory("paper2llm");
        let store = CredentialStore::open(config, registry(), backend, Arc::new(clock))
            .await
            .unwrap();

        assert!(matches!(
            store
                .store(
                    MISTRAL_KEY,
                    StoreOptions::durable(PASSWORD).expiring(ExpirationClass::NinetyDays)
                )
                .await,
            Err(KeyStoreError::UnsupportedExpiration(_))
        ));
        assert!(!store.has_credential(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_keys_follow_provider_storage_key() {
        use crate::storage::StorageKey;

        #[derive(Debug)]
        struct VaultProvider(ProviderId);

        impl Provider for VaultProvider {
            fn id(&self) -> &ProviderId {
                &self.0
            }

            fn display_name(&self) -> &str {
                "Vault"
            }

            fn validate(&self, candidate: &str) -> bool {
                candidate.starts_with("vlt-")
            }

            fn storage_key(&self, namespace: &str, purpose: Purpose) -> StorageKey {
                StorageKey::new(&format!("{}_vault", namespace), purpose, &self.0)
            }
        }

        let f = fixture().await;
        let mut registry = registry();
        registry.register(Arc::new(VaultProvider(id("vault"))));
        let backend = StorageBackend::new("paper2llm", f.durable.clone(), f.session.clone());
        let store = CredentialStore::open(test_config(), registry, backend, Arc::new(SystemClock))
            .await
            .unwrap();

        store
            .store(
                "vlt-0123456789",
                StoreOptions::durable(PASSWORD).for_provider(id("vault")),
            )
            .await
            .unwrap();

        assert!(f
            .durable
            .contains("paper2llm_vault_api_key_vault")
            .await
            .unwrap());
        assert!(!f.durable.contains("paper2llm_api_key_vault").await.unwrap());

        let value = store
            .retrieve(Some(PASSWORD), Some(&id("vault")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.expose(), "vlt-0123456789");
    }

    #[tokio::test]
    async fn test_supported_expirations_follow_config() {
        let f = fixture().await;
        let supported = f.store.supported_expirations();
        assert!(supported.contains(&ExpirationClass::ThirtyDays));
        assert!(!supported.contains(&ExpirationClass::NinetyDays));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = CredentialStore::in_memory(test_config()).await.unwrap();
        assert_eq!(store.registry().default_id().as_str(), "mistral");
        assert!(!store.has_credential(None).await.unwrap());
    }
}
