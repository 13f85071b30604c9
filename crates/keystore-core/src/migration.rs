//! One-shot upgrade from the single-provider key layout
//!
//! Older releases kept one credential under `<ns>_api_key` and its siblings.
//! Those entries are copied, envelope untouched, to the default provider's
//! keys in the same scope. Legacy entries stay where they are so an older
//! release running side by side keeps working.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::expiration::ExpirationClass;
use crate::provider::Provider;
use crate::storage::{Purpose, Scope, StorageBackend};

/// What a migration pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Scopes whose legacy record was copied
    pub migrated: Vec<Scope>,
}

impl MigrationReport {
    pub fn migrated_any(&self) -> bool {
        !self.migrated.is_empty()
    }
}

/// Copies a legacy record to the default provider's namespaced keys
pub struct LegacyMigrator<'a> {
    backend: &'a StorageBackend,
    target: &'a dyn Provider,
}

impl<'a> LegacyMigrator<'a> {
    pub fn new(backend: &'a StorageBackend, target: &'a dyn Provider) -> Self {
        Self { backend, target }
    }

    /// Migrate both scopes
    ///
    /// Never fails. A scope that cannot be migrated is logged and left for
    /// the next run.
    pub async fn run(&self) -> MigrationReport {
        let mut report = MigrationReport::default();

        for scope in Scope::LOOKUP_ORDER {
            match self.migrate_scope(scope).await {
                Ok(true) => report.migrated.push(scope),
                Ok(false) => {}
                Err(e) => warn!("Legacy migration of {} scope failed: {}", scope, e),
            }
        }

        if report.migrated_any() {
            info!(
                "Migrated legacy credential to provider '{}' ({:?})",
                self.target.id(),
                report.migrated
            );
        }
        report
    }

    async fn migrate_scope(&self, scope: Scope) -> Result<bool> {
        let Some(envelope) = self.backend.get_legacy(Purpose::Ciphertext, Some(scope)).await?
        else {
            return Ok(false);
        };

        if self
            .backend
            .exists(Purpose::Ciphertext, self.target, Some(scope))
            .await?
        {
            debug!(
                "Provider '{}' already has a {} record",
                self.target.id(),
                scope
            );
            return Ok(false);
        }

        let protected = match scope {
            // Durable records are always password protected
            Scope::Durable => true,
            Scope::Session => self
                .backend
                .get_legacy(Purpose::ProtectedFlag, Some(scope))
                .await?
                .map(|flag| flag.trim() == "true")
                .unwrap_or(false),
        };

        if let Some(label) = self.backend.get_legacy(Purpose::ScopeFlag, Some(scope)).await? {
            if Scope::from_label(&label) != Some(scope) {
                debug!("Legacy scope label '{}' found in {} scope", label, scope);
            }
        }

        let class = self
            .backend
            .get_legacy(Purpose::ExpiryClass, Some(scope))
            .await?
            .and_then(|label| ExpirationClass::from_label(&label))
            .unwrap_or(match scope {
                Scope::Durable => ExpirationClass::Never,
                Scope::Session => ExpirationClass::Session,
            });

        let instant = match scope {
            Scope::Durable => {
                self.backend
                    .get_legacy(Purpose::ExpiryInstant, Some(scope))
                    .await?
            }
            Scope::Session => None,
        };

        let target = self.target;
        self.backend
            .set(Purpose::ProtectedFlag, target, &protected.to_string(), scope)
            .await?;
        self.backend
            .set(Purpose::ScopeFlag, target, scope.as_str(), scope)
            .await?;
        self.backend
            .set(Purpose::ExpiryClass, target, class.as_str(), scope)
            .await?;
        match instant {
            Some(instant) => {
                self.backend
                    .set(Purpose::ExpiryInstant, target, &instant, scope)
                    .await?
            }
            None => {
                self.backend
                    .remove(Purpose::ExpiryInstant, target, Some(scope))
                    .await?
            }
        }

        // Ciphertext last: it marks the record as present
        self.backend
            .set(Purpose::Ciphertext, target, &envelope, scope)
            .await?;

        Ok(true)
    }
}
