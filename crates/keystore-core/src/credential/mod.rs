//! Credential storage facade

mod store;
mod types;

pub use store::CredentialStore;
pub use types::{DecryptedCredential, StorageRecord, StoreOptions};
