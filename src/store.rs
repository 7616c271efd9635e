//! Record persistence over named collections.
//!
//! The worker only reads, updates and lists records; `create` and `delete`
//! exist for the handlers that own the check lifecycle.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const CHECKS: &str = "checks";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("record {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("invalid record id {0:?}")]
    InvalidId(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError>;
    async fn read(&self, collection: &str, id: &str) -> Result<Value, StoreError>;
    async fn update(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError>;
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
    async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError>;
}

/// Typed access on top of any [`RecordStore`].
pub async fn read_as<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: &str,
    id: &str,
) -> Result<T, StoreError> {
    let value = store.read(collection, id).await?;
    Ok(serde_json::from_value(value)?)
}

pub async fn update_from<T: Serialize>(
    store: &dyn RecordStore,
    collection: &str,
    id: &str,
    record: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(record)?;
    store.update(collection, id, &value).await
}

/// One JSON document per record at `<base>/<collection>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// Path of one record. Ids that could leave the collection directory are refused.
    fn record_path(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        let escapes = id.is_empty()
            || id.starts_with('.')
            || id.contains(&['/', '\\', '\0'][..])
            || Path::new(id).is_absolute();
        if escapes {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.base_dir.join(collection).join(format!("{id}.json")))
    }

    fn not_found(collection: &str, id: &str) -> StoreError {
        StoreError::NotFound { collection: collection.to_string(), id: id.to_string() }
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn create(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError> {
        let path = self.record_path(collection, id)?;
        fs::create_dir_all(self.base_dir.join(collection)).await?;
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists { collection: collection.to_string(), id: id.to_string() });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&serde_json::to_vec(record)?).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
        let bytes = match fs::read(self.record_path(collection, id)?).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Self::not_found(collection, id)),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn update(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError> {
        let path = self.record_path(collection, id)?;
        let bytes = serde_json::to_vec(record)?;
        let mut file = match fs::OpenOptions::new().write(true).truncate(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Self::not_found(collection, id)),
            Err(e) => return Err(e.into()),
        };
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(collection, id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Self::not_found(collection, id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.base_dir.join(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
