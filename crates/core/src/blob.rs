//! Blob persistence for on-chain payloads.
//!
//! Two operations only: `put` (creates parents, overwrite-safe) and `get`.
//! Paths are relative; the backend decides the root mapping. Object-storage
//! backends are external collaborators behind the same trait; the core ships
//! the local filesystem implementation.

use async_trait::async_trait;
use metafs_types::ChainKind;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError>;
    async fn get(&self, path: &str) -> Result<Vec<u8>, BlobError>;
    /// Store type recorded on materialized rows (`local`, `oss`, ...).
    fn kind(&self) -> &'static str;
}

/// Deterministic layout helpers shared by the materializer and tests.
pub fn file_blob_path(chain: ChainKind, pin_id: &str, extension: &str) -> String {
    format!("indexer/{chain}/{pin_id}{extension}")
}

pub fn chunk_blob_path(chain: ChainKind, txid: &str, pin_id: &str) -> String {
    format!("indexer/chunk/{chain}/{txid}/{pin_id}")
}

pub fn avatar_blob_path(chain: ChainKind, txid: &str, pin_id: &str, extension: &str) -> String {
    format!("indexer/avatar/{chain}/{txid}/{pin_id}{extension}")
}

/// Scratch location for pending index descriptors awaiting their chunks.
pub fn index_context_path(chain: ChainKind, pin_id: &str) -> String {
    format!("indexer/index/{chain}/{pin_id}.json")
}

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|component| {
            !matches!(component, Component::Normal(_) | Component::CurDir)
        });
        if escapes || relative.as_os_str().is_empty() {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(target, bytes).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::read(target).await?)
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}
