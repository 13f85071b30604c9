//! # keystore-core
//!
//! Encrypted API key storage for paper2llm:
//! - PBKDF2-HMAC-SHA256 key derivation and AES-256-GCM envelopes
//! - One record per credential provider, each with its own key format
//! - Durable and session storage scopes with expiry classes
//! - Read-only support and lazy upgrade for the legacy XOR format
//! - Migration from the single-provider key layout

pub mod clock;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod expiration;
pub mod migration;
pub mod provider;
pub mod session;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{KeyStoreConfig, PasswordPolicy};
pub use credential::{CredentialStore, DecryptedCredential, StorageRecord, StoreOptions};
pub use envelope::{Envelope, FormatVersion};
pub use error::{KeyStoreError, Result};
pub use expiration::{ExpirationClass, ExpirationPolicy};
pub use migration::{LegacyMigrator, MigrationReport};
pub use provider::{BuiltinProvider, PatternProvider, Provider, ProviderId, ProviderRegistry};
pub use storage::{
    FileStorage, KeychainStorage, MemoryStorage, Scope, StorageArea, StorageBackend,
};
