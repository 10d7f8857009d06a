use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::StoreConfig;
use crate::fs_util::set_secure_dir_permissions;

/// Collection used when a session identifier carries no `collection\` prefix.
pub const DEFAULT_COLLECTION: &str = "others";

/// Address of a persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub collection: String,
    pub name: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            name: name.into(),
        }
    }
}

/// A whole ledger document, replaced wholesale on every flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub user_id: String,
    pub data: serde_json::Value,
    /// Seconds since the epoch.
    pub last_updated: f64,
}

impl Document {
    pub fn new(user_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            user_id: user_id.into(),
            data,
            last_updated: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }
}

/// Persistence collaborator: `get(key) -> doc`, `replace(key, doc)`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &DocumentKey) -> anyhow::Result<Option<Document>>;

    /// Insert or overwrite the document at `key`.
    async fn replace(&self, key: &DocumentKey, document: Document) -> anyhow::Result<()>;
}

/// Process-local store, used in tests and when no persistence is configured.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentKey, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &DocumentKey) -> anyhow::Result<Option<Document>> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn replace(&self, key: &DocumentKey, document: Document) -> anyhow::Result<()> {
        self.documents.write().await.insert(key.clone(), document);
        Ok(())
    }
}

/// On-disk encoding of file-backed documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    #[default]
    Json,
    Msgpack,
}

/// Stores each document as one file: `<root>/<collection>/<name>`.
pub struct FileDocumentStore {
    root: PathBuf,
    format: DocumentFormat,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>, format: DocumentFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    pub fn path_for(&self, key: &DocumentKey) -> PathBuf {
        let name = match self.format {
            DocumentFormat::Json => key.name.clone(),
            DocumentFormat::Msgpack => match key.name.strip_suffix(".json") {
                Some(stem) => format!("{stem}.msgpack"),
                None => format!("{}.msgpack", key.name),
            },
        };
        self.root.join(&key.collection).join(name)
    }

    fn encode(&self, document: &Document) -> anyhow::Result<Vec<u8>> {
        Ok(match self.format {
            DocumentFormat::Json => serde_json::to_vec_pretty(document)?,
            DocumentFormat::Msgpack => rmp_serde::to_vec_named(document)?,
        })
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<Document> {
        let document = match self.format {
            DocumentFormat::Json => serde_json::from_slice(bytes)
                .map_err(|e| anyhow::anyhow!("invalid document {}: {e}", path.display()))?,
            DocumentFormat::Msgpack => rmp_serde::from_slice(bytes)
                .map_err(|e| anyhow::anyhow!("invalid document {}: {e}", path.display()))?,
        };
        Ok(document)
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, key: &DocumentKey) -> anyhow::Result<Option<Document>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => anyhow::bail!("failed to read {}: {e}", path.display()),
        };
        self.decode(&path, &bytes).map(Some)
    }

    async fn replace(&self, key: &DocumentKey, document: Document) -> anyhow::Result<()> {
        let path = self.path_for(key);
        let dir = self.root.join(&key.collection);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", dir.display()))?;
        set_secure_dir_permissions(&dir)?;

        let bytes = self.encode(&document)?;
        // Atomic replace: sibling tmp file, then rename over the target.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to replace {}: {e}", path.display()))?;

        debug!(path = %path.display(), bytes = bytes.len(), "document replaced");
        Ok(())
    }
}

/// Create the document store named by `config.backend`.
pub fn from_config(config: &StoreConfig) -> Arc<dyn DocumentStore> {
    match config.backend.as_str() {
        "file" => Arc::new(FileDocumentStore::new(config.root(), config.format)),
        _ => Arc::new(InMemoryDocumentStore::new()),
    }
}
