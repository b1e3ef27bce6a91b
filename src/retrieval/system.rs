//! Reference document index: build, persist, reload, search.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::chunker::chunk_text;
use super::extract::{PlainTextExtractor, TextExtractor};
use super::index::{self, ChunkMeta, FlatL2Index};
use crate::ai::SharedEmbedder;
use crate::config::RetrievalConfig;
use crate::constants::retrieval::{EMBED_BATCH_SIZE, SUPPORTED_EXTENSIONS};
use crate::storage::EmbeddingCache;
use crate::types::{Result, RfpError, fingerprint, truncate_chars};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub rank: usize,
    pub chunk_text: String,
    pub file_name: String,
    pub file_path: String,
    pub chunk_index: usize,
    /// Squared L2 distance; lower is closer
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub built: bool,
    pub num_vectors: usize,
    pub num_files: usize,
    pub dimension: usize,
    pub index_path: PathBuf,
}

struct Loaded {
    index: FlatL2Index,
    metadata: Vec<ChunkMeta>,
}

pub struct ReferenceIndex {
    docs_dir: PathBuf,
    index_path: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
    embedder: SharedEmbedder,
    extractor: Arc<dyn TextExtractor>,
    query_cache: EmbeddingCache,
    state: Option<Loaded>,
}

impl ReferenceIndex {
    pub fn new(config: &RetrievalConfig, embedder: SharedEmbedder) -> Self {
        let query_cache = EmbeddingCache::open(&config.query_cache_path);
        info!(
            "Reference index initialized (docs={}, index={}, cached queries={})",
            config.docs_dir.display(),
            config.index_path.display(),
            query_cache.len()
        );
        Self {
            docs_dir: config.docs_dir.clone(),
            index_path: config.index_path.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            batch_size: EMBED_BATCH_SIZE,
            embedder,
            extractor: Arc::new(PlainTextExtractor),
            query_cache,
            state: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_query_cache(mut self, cache: EmbeddingCache) -> Self {
        self.query_cache = cache;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Extract, chunk and embed every supported document, then persist.
    pub async fn build(&mut self) -> Result<IndexStats> {
        if !self.docs_dir.is_dir() {
            return Err(RfpError::Config(format!(
                "Docs folder does not exist: {}",
                self.docs_dir.display()
            )));
        }
        let started = Instant::now();
        info!("Building reference index from {}", self.docs_dir.display());

        let documents = self.load_documents()?;
        if documents.is_empty() {
            return Err(RfpError::Config(format!(
                "No documents found in {}",
                self.docs_dir.display()
            )));
        }

        let mut texts = Vec::new();
        let mut metadata = Vec::new();
        for (path, text) in &documents {
            let chunks = chunk_text(text, self.chunk_size, self.chunk_overlap);
            let total = chunks.len();
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            debug!("{}: {} chunk(s)", file_name, total);
            for (chunk_index, chunk) in chunks.into_iter().enumerate() {
                metadata.push(ChunkMeta {
                    file_path: path.display().to_string(),
                    file_name: file_name.clone(),
                    chunk_index,
                    total_chunks: total,
                    chunk_text: chunk.clone(),
                });
                texts.push(chunk);
            }
        }

        let vectors = self.embed_all(&texts).await;
        let mut flat = FlatL2Index::new(self.embedder.dimension());
        for vector in &vectors {
            flat.add(vector)?;
        }

        index::save(&self.index_path, &flat, &metadata)?;
        info!(
            "Reference index built: {} documents, {} chunks in {:.2}s",
            documents.len(),
            metadata.len(),
            started.elapsed().as_secs_f64()
        );

        self.state = Some(Loaded {
            index: flat,
            metadata,
        });
        Ok(self.stats())
    }

    fn load_documents(&self) -> Result<Vec<(PathBuf, String)>> {
        let mut documents = Vec::new();
        for ext in SUPPORTED_EXTENSIONS {
            let pattern = format!("{}/**/*.{}", self.docs_dir.display(), ext);
            let paths = glob::glob(&pattern)
                .map_err(|e| RfpError::Config(format!("Invalid docs pattern {}: {}", pattern, e)))?;
            for entry in paths {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!("Skipping unreadable path: {}", e);
                        continue;
                    }
                };
                match self.extractor.extract(&path) {
                    Ok(text) if text.trim().is_empty() => {
                        warn!("Document {} is empty", path.display());
                    }
                    Ok(text) => {
                        debug!("Loaded {} ({} chars)", path.display(), text.chars().count());
                        documents.push((path, text));
                    }
                    Err(e) => error!("Failed to load document {}: {}", path.display(), e),
                }
            }
        }
        documents.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(documents)
    }

    /// Batch embedding with a per-text fallback; a text that still fails
    /// gets a zero vector so the build completes.
    async fn embed_all(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let dimension = self.embedder.dimension();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            match self.embedder.embed_batch(batch).await {
                Ok(batch_vectors) => vectors.extend(batch_vectors),
                Err(e) => {
                    warn!(
                        "Batch embedding of {} texts failed, embedding one by one: {}",
                        batch.len(),
                        e
                    );
                    for text in batch {
                        match self.embedder.embed(text).await {
                            Ok(v) => vectors.push(v),
                            Err(e) => {
                                error!(
                                    "Embedding failed for text {} ({} chars): {}",
                                    vectors.len(),
                                    text.chars().count(),
                                    e
                                );
                                vectors.push(vec![0.0; dimension]);
                            }
                        }
                    }
                }
            }
        }
        vectors
    }

    // =========================================================================
    // Load / Search
    // =========================================================================

    /// Reload a previously built index without re-embedding.
    pub fn load(&mut self) -> Result<IndexStats> {
        let (flat, metadata) = index::load(&self.index_path)?;
        info!(
            "Loaded reference index: {} vectors from {}",
            flat.len(),
            self.index_path.display()
        );
        self.state = Some(Loaded {
            index: flat,
            metadata,
        });
        Ok(self.stats())
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let loaded = self.state.as_ref().ok_or_else(|| {
            RfpError::NotReady("Reference index not built or loaded".to_string())
        })?;

        debug!(
            "Index search (k={}, population={}): {}",
            k,
            loaded.index.len(),
            truncate_chars(query, 200)
        );
        let query_vector = self.query_embedding(query).await?;
        let hits = loaded.index.search(&query_vector, k)?;

        let results: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter_map(|(row, distance)| {
                let meta = loaded.metadata.get(row)?;
                Some((meta, distance))
            })
            .enumerate()
            .map(|(i, (meta, distance))| RetrievedChunk {
                rank: i + 1,
                chunk_text: meta.chunk_text.clone(),
                file_name: meta.file_name.clone(),
                file_path: meta.file_path.clone(),
                chunk_index: meta.chunk_index,
                distance,
            })
            .collect();
        info!("Index search returned {} chunk(s)", results.len());
        Ok(results)
    }

    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        let key = fingerprint(query);
        if let Some(vector) = self.query_cache.get(&key) {
            debug!("Query embedding cache hit ({})", &key[..16]);
            return Ok(vector);
        }
        debug!("Query embedding cache miss ({})", &key[..16]);
        let vector = self.embedder.embed(query).await?;
        if let Err(e) = self.query_cache.insert(key, vector.clone()).await {
            warn!("Failed to persist query embedding: {}", e);
        }
        Ok(vector)
    }

    pub fn stats(&self) -> IndexStats {
        match &self.state {
            Some(loaded) => IndexStats {
                built: true,
                num_vectors: loaded.index.len(),
                num_files: loaded
                    .metadata
                    .iter()
                    .map(|m| m.file_path.as_str())
                    .collect::<HashSet<_>>()
                    .len(),
                dimension: loaded.index.dimension(),
                index_path: self.index_path.clone(),
            },
            None => IndexStats {
                built: false,
                num_vectors: 0,
                num_files: 0,
                dimension: self.embedder.dimension(),
                index_path: self.index_path.clone(),
            },
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}
