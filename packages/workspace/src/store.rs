//! # Persistence
//!
//! The builder only needs atomic single-record reads and writes; the
//! per-template serialization point lives in [`crate::locks`]. Two backends
//! ship with the crate: an in-memory map and a directory of JSON files.
//!
//! ```text
//! {data_dir}/templates/{template_id}.json
//! {data_dir}/themes/{theme_id}.json
//! ```

use async_trait::async_trait;
use railspress_common::{Classify, ErrorKind};
use railspress_editor::{TemplateRecord, ThemeRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored record at {path} is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode record {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Identifier {0:?} cannot be used as a storage key")]
    InvalidId(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidId(_) => ErrorKind::Validation,
            StoreError::Io { .. }
            | StoreError::Corrupt { .. }
            | StoreError::Encode { .. }
            | StoreError::Unavailable(_) => ErrorKind::TransportFailure,
        }
    }
}

/// Durable storage for template and theme records
#[async_trait]
pub trait CompositionStore: Send + Sync {
    async fn load_template(&self, id: &str) -> Result<Option<TemplateRecord>, StoreError>;

    /// Replace the stored record in one atomic write
    async fn save_template(&self, record: &TemplateRecord) -> Result<(), StoreError>;

    async fn list_templates(&self) -> Result<Vec<String>, StoreError>;

    async fn load_theme(&self, id: &str) -> Result<Option<ThemeRecord>, StoreError>;

    async fn save_theme(&self, theme: &ThemeRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    templates: RwLock<BTreeMap<String, TemplateRecord>>,
    themes: RwLock<BTreeMap<String, ThemeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompositionStore for MemoryStore {
    async fn load_template(&self, id: &str) -> Result<Option<TemplateRecord>, StoreError> {
        Ok(self.templates.read().await.get(id).cloned())
    }

    async fn save_template(&self, record: &TemplateRecord) -> Result<(), StoreError> {
        self.templates
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.templates.read().await.keys().cloned().collect())
    }

    async fn load_theme(&self, id: &str) -> Result<Option<ThemeRecord>, StoreError> {
        Ok(self.themes.read().await.get(id).cloned())
    }

    async fn save_theme(&self, theme: &ThemeRecord) -> Result<(), StoreError> {
        self.themes
            .write()
            .await
            .insert(theme.id.clone(), theme.clone());
        Ok(())
    }
}

/// One JSON file per record; writes go to a temp file and are renamed over
/// the previous version
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for dir in ["templates", "themes"] {
            let path = root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|source| StoreError::Io { path, source })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, kind: &str, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(kind).join(format!("{}.json", id)))
    }

    async fn read<T: DeserializeOwned>(&self, path: PathBuf) -> Result<Option<T>, StoreError> {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    async fn write<T: Serialize>(&self, path: PathBuf, id: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
            id: id.to_string(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io { path, source })
    }
}

#[async_trait]
impl CompositionStore for JsonFileStore {
    async fn load_template(&self, id: &str) -> Result<Option<TemplateRecord>, StoreError> {
        let path = self.record_path("templates", id)?;
        self.read(path).await
    }

    async fn save_template(&self, record: &TemplateRecord) -> Result<(), StoreError> {
        let path = self.record_path("templates", &record.id)?;
        self.write(path, &record.id, record).await
    }

    async fn list_templates(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join("templates");
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn load_theme(&self, id: &str) -> Result<Option<ThemeRecord>, StoreError> {
        let path = self.record_path("themes", id)?;
        self.read(path).await
    }

    async fn save_theme(&self, theme: &ThemeRecord) -> Result<(), StoreError> {
        let path = self.record_path("themes", &theme.id)?;
        self.write(path, &theme.id, theme).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load_template("index").await.unwrap().is_none());

        store
            .save_template(&TemplateRecord::new("index", "dawn"))
            .await
            .unwrap();
        let loaded = store.load_template("index").await.unwrap().unwrap();
        assert_eq!(loaded.theme_id, "dawn");
        assert_eq!(store.list_templates().await.unwrap(), vec!["index"]);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let record = TemplateRecord::new("single-post", "dawn");
        store.save_template(&record).await.unwrap();
        store.save_theme(&ThemeRecord::new("dawn", "Dawn")).await.unwrap();

        assert_eq!(store.load_template("single-post").await.unwrap(), Some(record));
        assert_eq!(store.list_templates().await.unwrap(), vec!["single-post"]);
        assert_eq!(
            store.load_theme("dawn").await.unwrap().map(|t| t.name),
            Some("Dawn".to_string())
        );
        assert!(!dir.path().join("templates/single-post.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let err = store.load_template("../escape").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("templates/index.json"), b"{ not json").unwrap();

        let err = store.load_template("index").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
    }
}
