//! Result cache: skip reconversion of a deck that was already converted with
//! the same output-shaping settings.
//!
//! The key is a SHA-256 over the deck's own SHA-256 and the sorted settings
//! that change what a conversion produces. A hit reuses the earlier job's
//! artifacts; only `result.json` is written again for the new session.

use crate::config::ProcessingConfig;
use crate::error::StorageError;
use crate::output::DeckResult;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Chunk size for hashing decks.
const HASH_CHUNK: usize = 1024 * 1024;

/// Looks up and stores completed results by cache key.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// A stored result, or `None` on a miss. Unreadable entries are misses.
    async fn get(&self, key: &str) -> Result<Option<DeckResult>, StorageError>;

    async fn put(&self, key: &str, result: &DeckResult) -> Result<(), StorageError>;
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileResultCache {
    dir: PathBuf,
}

impl FileResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StorageError::InvalidDestination(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl ResultCache for FileResultCache {
    async fn get(&self, key: &str) -> Result<Option<DeckResult>, StorageError> {
        let path = self.entry_path(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "Result cache miss");
                return Ok(None);
            }
            Err(e) => return Err(StorageError::Io { path, source: e }),
        };
        match serde_json::from_slice(&bytes) {
            Ok(result) => {
                debug!(key, "Result cache hit");
                Ok(Some(result))
            }
            Err(e) => {
                warn!(key, "Discarding corrupt cache entry: {}", e);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(key, "Could not remove corrupt cache entry: {}", e);
                }
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, result: &DeckResult) -> Result<(), StorageError> {
        let path = self.entry_path(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
        let json = serde_json::to_vec(result).map_err(|e| StorageError::Io {
            path: path.clone(),
            source: e.into(),
        })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| StorageError::Io { path, source: e })?;
        debug!(key, "Stored result in cache");
        Ok(())
    }
}

/// Settings that change a conversion's output, as sorted `k=v` pairs.
fn output_params(config: &ProcessingConfig) -> String {
    let params: BTreeMap<&str, String> = BTreeMap::from([
        ("engine", config.engine_enabled().to_string()),
        ("results_bucket", config.results_bucket.clone()),
        ("slides_bucket", config.slides_bucket.clone()),
        ("thumbnail_max_dim", config.thumbnail_max_dim.to_string()),
    ]);
    params.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

/// Cache key for converting `deck_path` under `config`.
pub async fn cache_key(deck_path: &Path, config: &ProcessingConfig) -> std::io::Result<String> {
    let path = deck_path.to_path_buf();
    let file_hash = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; HASH_CHUNK];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(std::io::Error::other)??;

    let material = format!("{}-{}", file_hash, output_params(config));
    Ok(format!("{:x}", Sha256::digest(material.as_bytes())))
}
