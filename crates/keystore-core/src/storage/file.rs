//! JSON file storage area
//!
//! Durable scope for desktop and CLI use. Entries live in a single
//! `keystore.json` in the user's data directory, kept in memory and written
//! back atomically after every change.

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use super::StorageArea;
use crate::error::{KeyStoreError, Result};

const FILE_NAME: &str = "keystore.json";
const FILE_VERSION: u32 = 1;

/// File format for persistent storage
#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageFile {
    version: u32,
    entries: HashMap<String, String>,
}

/// File-backed storage area
pub struct FileStorage {
    storage_dir: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the storage in the default data directory
    pub async fn open() -> Result<Self> {
        Self::open_in(Self::default_dir()?).await
    }

    /// Open the storage in a specific directory, loading any existing file
    pub async fn open_in(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        tokio::fs::create_dir_all(&storage_dir).await?;

        let entries = Self::load(&storage_dir.join(FILE_NAME)).await?;
        debug!(
            "File storage opened at {:?} with {} entries",
            storage_dir,
            entries.len()
        );

        Ok(Self {
            storage_dir,
            entries: RwLock::new(entries),
        })
    }

    /// Get the default storage directory
    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("org", "paper2llm", "paper2llm")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| KeyStoreError::Storage("Could not determine data directory".to_string()))
    }

    /// Get the storage directory path
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn file_path(&self) -> PathBuf {
        self.storage_dir.join(FILE_NAME)
    }

    async fn load(path: &Path) -> Result<HashMap<String, String>> {
        if !tokio::fs::try_exists(path).await? {
            debug!("No existing storage file found");
            return Ok(HashMap::new());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let file: StorageFile = serde_json::from_str(&contents).map_err(|e| {
            KeyStoreError::Storage(format!("unreadable storage file {:?}: {}", path, e))
        })?;

        if file.version > FILE_VERSION {
            return Err(KeyStoreError::Storage(format!(
                "storage file version {} is newer than supported version {}",
                file.version, FILE_VERSION
            )));
        }

        Ok(file.entries)
    }

    async fn save(&self, entries: &HashMap<String, String>) -> Result<()> {
        let file = StorageFile {
            version: FILE_VERSION,
            entries: entries.clone(),
        };

        let contents = serde_json::to_string_pretty(&file)?;
        let path = self.file_path();

        // Write atomically using a temp file
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!("Saved {} entries to storage", entries.len());
        Ok(())
    }
}

#[async_trait]
impl StorageArea for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries).await?;

        debug!("Stored key: {}", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;

        if entries.remove(key).is_some() {
            self.save(&entries).await?;
            debug!("Deleted key: {}", key);
        }

        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    fn backend_name(&self) -> &'static str {
        "File Storage"
    }
}
