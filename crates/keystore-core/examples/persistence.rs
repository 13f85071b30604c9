//! Store a key in file storage, reopen the store and read it back

use keystore_core::{
    CredentialStore, ExpirationClass, FileStorage, KeyStoreConfig, MemoryStorage,
    ProviderRegistry, StorageBackend, StoreOptions, SystemClock,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

async fn open(dir: &Path) -> CredentialStore {
    let config = KeyStoreConfig::default();
    let durable = Arc::new(FileStorage::open_in(dir).await.expect("Failed to open storage"));
    let backend = StorageBackend::new(&config.namespace, durable, Arc::new(MemoryStorage::new()));
    let registry =
        ProviderRegistry::with_builtins(&config.default_provider).expect("Failed to build registry");

    CredentialStore::open(config, registry, backend, Arc::new(SystemClock))
        .await
        .expect("Failed to open store")
}

#[tokio::main]
async fn main() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    println!("=== Phase 1: Store a Mistral key for 7 days ===");
    {
        let store = open(temp_dir.path()).await;
        store
            .store(
                "abcdefghijklmnopqrstuvwxyz012345",
                StoreOptions::durable("correct-horse-1").expiring(ExpirationClass::SevenDays),
            )
            .await
            .expect("Failed to store key");

        let record = store.record(None).await.unwrap().expect("No record");
        println!("Stored in {} scope, expires at {:?}", record.scope, record.expires_at);
    }

    println!("\n=== Phase 2: Reopen and retrieve ===");
    {
        let store = open(temp_dir.path()).await;
        println!(
            "Providers with keys: {:?}",
            store.list_providers_with_credentials().await.unwrap()
        );

        match store.retrieve(Some("wrong-horse-1"), None).await {
            Ok(_) => println!("Wrong password accepted!"),
            Err(e) => println!("Wrong password rejected: {}", e),
        }

        let value = store
            .retrieve(Some("correct-horse-1"), None)
            .await
            .expect("Failed to retrieve")
            .expect("Key missing");
        println!("Retrieved: {}", value.masked());

        store.clear(None).await.expect("Failed to clear");
        println!("Cleared, has key: {}", store.has_credential(None).await.unwrap());
    }
}
