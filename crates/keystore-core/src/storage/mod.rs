//! Storage backends for API key records
//!
//! Two scopes, each a [`StorageArea`]:
//! 1. Durable: [`FileStorage`], [`KeychainStorage`] or [`MemoryStorage`]
//! 2. Session: [`MemoryStorage`]
//!
//! [`StorageBackend`] combines them and owns key naming.

mod backend;
mod file;
mod keychain;
mod keys;
mod memory;
mod traits;

pub use backend::StorageBackend;
pub use file::FileStorage;
pub use keychain::KeychainStorage;
pub use keys::{Purpose, Scope, StorageKey};
pub use memory::MemoryStorage;
pub use traits::StorageArea;
