//! Embedding Cache
//!
//! Fingerprint-keyed embedding vectors persisted as one JSON object on disk.
//! Shared by the memory store (document embeddings) and the retrieval index
//! (query embeddings).
//!
//! Every insert re-reads the file, merges, and replaces it atomically via a
//! temp file and rename on the blocking pool. Concurrent writers may lose
//! each other's newest entries, but an already-flushed file is never left
//! half-written.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::types::{Result, ResultExt, RfpError};

pub struct EmbeddingCache {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, Vec<f32>>>,
}

impl EmbeddingCache {
    /// Open the cache at `path`; an unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read_file(&path) {
            Ok(entries) => {
                debug!(
                    "Loaded embedding cache: {} entries from {}",
                    entries.len(),
                    path.display()
                );
                entries
            }
            Err(e) => {
                warn!("Failed to load embedding cache {}: {}", path.display(), e);
                HashMap::new()
            }
        };
        Self {
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    /// Cache that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    /// Insert and persist.
    ///
    /// The in-memory entry is kept even when the write fails.
    pub async fn insert(&self, key: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        let key = key.into();
        {
            let mut entries = self
                .entries
                .write()
                .map_err(|_| RfpError::Storage("Embedding cache lock poisoned".to_string()))?;
            entries.insert(key.clone(), vector.clone());
        }

        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || {
            // Merge with whatever other writers flushed since we loaded
            let mut on_disk = Self::read_file(&path).unwrap_or_default();
            on_disk.insert(key, vector);
            Self::write_atomic(&path, &on_disk)
        })
        .await
        .map_err(|e| RfpError::Storage(format!("Embedding cache write task failed: {}", e)))?
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read_file(path: &Path) -> Result<HashMap<String, Vec<f32>>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_atomic(path: &Path, entries: &HashMap<String, Vec<f32>>) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context_fn(|| format!("creating {}", parent.display()))?;
        }
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        fs::write(&tmp, serde_json::to_vec(entries)?)
            .with_context_fn(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context_fn(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache/embeddings.json");

        let cache = EmbeddingCache::open(&path);
        assert!(cache.is_empty());
        cache.insert("abc", vec![0.5, 0.25]).await.unwrap();

        let reopened = EmbeddingCache::open(&path);
        assert_eq!(reopened.get("abc"), Some(vec![0.5, 0.25]));
    }

    #[tokio::test]
    async fn test_insert_merges_other_writers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.json");

        let first = EmbeddingCache::open(&path);
        let second = EmbeddingCache::open(&path);
        first.insert("a", vec![1.0]).await.unwrap();
        second.insert("b", vec![2.0]).await.unwrap();

        let merged = EmbeddingCache::open(&path);
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.json");
        fs::write(&path, "{not json").unwrap();

        let cache = EmbeddingCache::open(&path);
        assert!(cache.is_empty());
        cache.insert("k", vec![1.0]).await.unwrap();
        assert_eq!(EmbeddingCache::open(&path).get("k"), Some(vec![1.0]));
    }

    #[tokio::test]
    async fn test_in_memory_has_no_path() {
        let cache = EmbeddingCache::in_memory();
        cache.insert("k", vec![3.0]).await.unwrap();
        assert_eq!(cache.get("k"), Some(vec![3.0]));
        assert!(cache.path().is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_insert_persists_from_single_threaded_runtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/embeddings.json");
        let cache = EmbeddingCache::open(&path);

        for i in 0..8 {
            cache.insert(format!("k{}", i), vec![i as f32]).await.unwrap();
        }

        assert!(path.exists());
        let reopened = EmbeddingCache::open(&path);
        assert_eq!(reopened.len(), 8);
        assert_eq!(reopened.get("k7"), Some(vec![7.0]));
    }
}
