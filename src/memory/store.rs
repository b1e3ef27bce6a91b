//! Append-only memory store backed by one line-delimited JSON file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::record::{MemoryPayload, MemoryRecord};
use crate::ai::{SharedEmbedder, cosine_similarity};
use crate::config::{MemoryConfig, RetrievalMode};
use crate::constants::memory::{RECORD_SOURCE, SNIPPET_AFTER, SNIPPET_BEFORE};
use crate::storage::EmbeddingCache;
use crate::types::{Result, RfpError, Stage, fingerprint};

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid word pattern"));

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryHit {
    pub record: MemoryRecord,
    pub score: f32,
    pub snippet: String,
}

pub struct MemoryStore {
    path: PathBuf,
    mode: RetrievalMode,
    embedder: Option<SharedEmbedder>,
    cache: Arc<EmbeddingCache>,
}

impl MemoryStore {
    pub fn new(
        path: impl Into<PathBuf>,
        mode: RetrievalMode,
        embedder: Option<SharedEmbedder>,
        cache: Arc<EmbeddingCache>,
    ) -> Self {
        Self {
            path: path.into(),
            mode,
            embedder,
            cache,
        }
    }

    pub fn from_config(config: &MemoryConfig, embedder: Option<SharedEmbedder>) -> Self {
        let cache = match config.retrieval_mode {
            RetrievalMode::Embedding => EmbeddingCache::open(&config.embedding_cache_path),
            RetrievalMode::Token => EmbeddingCache::in_memory(),
        };
        Self::new(
            &config.store_path,
            config.retrieval_mode,
            embedder,
            Arc::new(cache),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> RetrievalMode {
        self.mode
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Append one record. Best-effort: failures are logged and reported as `false`.
    pub async fn store(&self, source_text: &str, stage: Stage, payload: MemoryPayload) -> bool {
        if source_text.trim().is_empty() {
            debug!("Skipping {} memory snapshot: empty source text", stage);
            return false;
        }

        let mut metadata = Map::new();
        metadata.insert("stage".to_string(), Value::from(stage.as_str()));
        if let Some(language) = &payload.language {
            metadata.insert("language".to_string(), Value::from(language.as_str()));
        }
        metadata.insert("source".to_string(), Value::from(RECORD_SOURCE));

        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: fingerprint(source_text),
            stage,
            metadata,
            messages: payload.messages,
            created_at: Utc::now(),
        };

        match self.append(&record).await {
            Ok(()) => {
                debug!(
                    "Stored {} memory snapshot for {}",
                    stage,
                    &record.user_id[..12]
                );
                true
            }
            Err(e) => {
                warn!("Failed to store {} memory snapshot: {}", stage, e);
                false
            }
        }
    }

    async fn append(&self, record: &MemoryRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        // One buffer per record so concurrent appends interleave by line
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Every parseable record in file order. Malformed lines are skipped.
    pub async fn records(&self) -> Result<Vec<MemoryRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<MemoryRecord>(line) {
                Ok(record) => records.push(record),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                "Skipped {} malformed memory line(s) in {}",
                skipped,
                self.path.display()
            );
        }
        Ok(records)
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        stage: Option<Stage>,
    ) -> Result<Vec<MemoryHit>> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        let records: Vec<MemoryRecord> = self
            .records()
            .await?
            .into_iter()
            .filter(|r| stage.is_none_or(|s| r.stage == s))
            .collect();

        let mut hits: Vec<MemoryHit> = records
            .into_iter()
            .filter_map(|record| score_tokens(&query_tokens, record))
            .collect();
        sort_descending(&mut hits);
        debug!(
            "Memory token pass: {} candidate(s) for '{}'",
            hits.len(),
            query
        );

        if self.mode == RetrievalMode::Embedding {
            match self.rescore(query, &hits).await {
                Ok(rescored) => hits = rescored,
                Err(e) => {
                    warn!("Embedding rescoring unavailable, using token scores: {}", e);
                }
            }
        }

        hits.truncate(max_results);
        info!("Memory search returned {} result(s)", hits.len());
        Ok(hits)
    }

    /// Cosine rescoring over the token candidates; only positive similarities survive.
    async fn rescore(&self, query: &str, candidates: &[MemoryHit]) -> Result<Vec<MemoryHit>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| RfpError::Embedding("No embedder configured".to_string()))?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = embedder.embed(query).await?;
        let mut rescored = Vec::with_capacity(candidates.len());
        for hit in candidates {
            let content = hit.record.content();
            let key = fingerprint(&content);
            let vector = match self.cache.get(&key) {
                Some(v) => v,
                None => {
                    let v = embedder.embed(&content).await?;
                    if let Err(e) = self.cache.insert(key, v.clone()).await {
                        warn!("Failed to persist memory embedding: {}", e);
                    }
                    v
                }
            };
            let score = cosine_similarity(&query_vector, &vector);
            if score > 0.0 {
                rescored.push(MemoryHit {
                    record: hit.record.clone(),
                    score,
                    snippet: hit.snippet.clone(),
                });
            }
        }
        sort_descending(&mut rescored);
        Ok(rescored)
    }
}

// =============================================================================
// Token Scoring
// =============================================================================

fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Term-frequency density: query-token occurrences over document length.
fn score_tokens(query_tokens: &[String], record: MemoryRecord) -> Option<MemoryHit> {
    let doc_tokens = tokenize(&record.content());
    if doc_tokens.is_empty() {
        return None;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in &doc_tokens {
        *counts.entry(token.as_str()).or_default() += 1;
    }
    let matched: usize = query_tokens
        .iter()
        .map(|q| counts.get(q.as_str()).copied().unwrap_or(0))
        .sum();
    if matched == 0 {
        return None;
    }

    let pos = doc_tokens
        .iter()
        .position(|t| query_tokens.contains(t))
        .unwrap_or(0);
    let start = pos.saturating_sub(SNIPPET_BEFORE);
    let end = (pos + SNIPPET_AFTER).min(doc_tokens.len());
    let snippet = doc_tokens[start..end].join(" ");

    Some(MemoryHit {
        score: matched as f32 / doc_tokens.len() as f32,
        record,
        snippet,
    })
}

fn sort_descending(hits: &mut [MemoryHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::HashingEmbedder;
    use crate::memory::record::MemoryMessage;
    use tempfile::TempDir;

    fn payload(text: &str) -> MemoryPayload {
        MemoryPayload {
            language: Some("en".to_string()),
            messages: vec![MemoryMessage::user(text)],
        }
    }

    fn token_store(dir: &TempDir) -> MemoryStore {
        MemoryStore::new(
            dir.path().join("memory/memories.jsonl"),
            RetrievalMode::Token,
            None,
            Arc::new(EmbeddingCache::in_memory()),
        )
    }

    #[tokio::test]
    async fn test_store_appends_lines() {
        let dir = TempDir::new().unwrap();
        let store = token_store(&dir);

        assert!(store.store("source a", Stage::Preprocess, payload("one")).await);
        assert!(store.store("source a", Stage::Preprocess, payload("two")).await);

        let records = store.records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id, records[1].user_id);
        assert_eq!(records[0].user_id, fingerprint("source a"));
        assert_eq!(records[0].metadata["source"], RECORD_SOURCE);
        assert_eq!(records[1].messages[0].content, "two");
    }

    #[tokio::test]
    async fn test_store_rejects_empty_source() {
        let dir = TempDir::new().unwrap();
        let store = token_store(&dir);
        assert!(!store.store("  ", Stage::Requirements, payload("x")).await);
        assert!(store.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_reports_io_failure() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be
        let blocked = dir.path().join("blocked");
        std::fs::create_dir_all(&blocked).unwrap();
        let store = MemoryStore::new(
            &blocked,
            RetrievalMode::Token,
            None,
            Arc::new(EmbeddingCache::in_memory()),
        );
        assert!(!store.store("text", Stage::Preprocess, payload("x")).await);
    }

    #[tokio::test]
    async fn test_token_search_finds_single_related_record() {
        let dir = TempDir::new().unwrap();
        let store = token_store(&dir);
        for i in 0..9 {
            store
                .store(
                    &format!("noise {}", i),
                    Stage::Preprocess,
                    payload(&format!("catering invoice number {} for lunch", i)),
                )
                .await;
        }
        store
            .store(
                "related",
                Stage::Requirements,
                payload("The platform must support single sign-on via SAML"),
            )
            .await;

        let hits = store.search("SAML sign-on", 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.0);
        assert!(hits[0].record.content().contains("SAML"));
        assert!(hits[0].snippet.contains("saml"));
    }

    #[tokio::test]
    async fn test_stage_filter_and_zero_scores() {
        let dir = TempDir::new().unwrap();
        let store = token_store(&dir);
        store
            .store("a", Stage::Preprocess, payload("hosting in europe"))
            .await;
        store
            .store("b", Stage::Requirements, payload("hosting on premises"))
            .await;

        let all = store.search("hosting", 10, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let scoped = store
            .search("hosting", 10, Some(Stage::Requirements))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].record.stage, Stage::Requirements);

        assert!(store.search("unrelated", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_score_is_density() {
        let dir = TempDir::new().unwrap();
        let store = token_store(&dir);
        store.store("short", Stage::Preprocess, payload("audit log")).await;
        store
            .store(
                "long",
                Stage::Preprocess,
                payload("audit trail retained for seven years in cold storage"),
            )
            .await;

        let hits = store.search("audit", 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!((hits[0].score - 0.5).abs() < f32::EPSILON);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_snippet_window() {
        let dir = TempDir::new().unwrap();
        let store = token_store(&dir);
        let words: Vec<String> = (0..60).map(|i| format!("w{}", i)).collect();
        let mut text = words.clone();
        text[30] = "target".to_string();
        store
            .store("doc", Stage::Preprocess, payload(&text.join(" ")))
            .await;

        let hits = store.search("target", 1, None).await.unwrap();
        let snippet: Vec<&str> = hits[0].snippet.split(' ').collect();
        assert_eq!(snippet.len(), SNIPPET_BEFORE + SNIPPET_AFTER);
        assert_eq!(snippet[SNIPPET_BEFORE], "target");
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = token_store(&dir);
        store.store("a", Stage::Preprocess, payload("kubernetes")).await;
        let mut raw = std::fs::read_to_string(store.path()).unwrap();
        raw.push_str("{broken\n");
        std::fs::write(store.path(), raw).unwrap();

        let hits = store.search("kubernetes", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_mode_rescores_and_caches() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(HashingEmbedder::new(64));
        let cache = Arc::new(EmbeddingCache::open(dir.path().join("cache.json")));
        let store = MemoryStore::new(
            dir.path().join("m.jsonl"),
            RetrievalMode::Embedding,
            Some(embedder.clone()),
            cache.clone(),
        );
        store
            .store("a", Stage::Preprocess, payload("data residency in the EU"))
            .await;
        store
            .store("b", Stage::Preprocess, payload("catering menu"))
            .await;

        let hits = store.search("EU data residency", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.5);
        // Query plus one candidate document
        assert_eq!(embedder.calls(), 2);
        assert_eq!(cache.len(), 1);
        let persisted = EmbeddingCache::open(dir.path().join("cache.json"));
        assert_eq!(persisted.len(), 1);

        store.search("EU data residency", 5, None).await.unwrap();
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back_to_token_results() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(
            dir.path().join("m.jsonl"),
            RetrievalMode::Embedding,
            Some(Arc::new(HashingEmbedder::failing(16))),
            Arc::new(EmbeddingCache::in_memory()),
        );
        store
            .store("a", Stage::Preprocess, payload("penalty clauses apply"))
            .await;

        let hits = store.search("penalty", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0 / 3.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = token_store(&dir);
        assert!(store.search("anything", 5, None).await.unwrap().is_empty());
    }
}
