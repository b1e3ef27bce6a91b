//! Test doubles for providers and embedders.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::embedding::Embedder;
use super::provider::{CompletionRequest, LlmProvider, ProviderKind};
use crate::types::{Result, RfpError};

// =============================================================================
// Scripted Provider
// =============================================================================

/// Counting provider that answers from rules, then a script, then a fallback.
///
/// Rules match a substring anywhere in the request's message text.
pub struct ScriptedProvider {
    kind: ProviderKind,
    rules: Vec<(String, String)>,
    script: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind, script: Vec<Result<String>>) -> Self {
        Self {
            kind,
            rules: Vec::new(),
            script: Mutex::new(script.into()),
            fallback: None,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(kind: ProviderKind, response: &str) -> Self {
        let mut provider = Self::new(kind, Vec::new());
        provider.fallback = Some(response.to_string());
        provider
    }

    pub fn with_rule(mut self, needle: &str, response: &str) -> Self {
        self.rules.push((needle.to_string(), response.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let text: String = request
            .messages
            .iter()
            .map(|m| m.content.as_text())
            .collect::<Vec<_>>()
            .join("\n");
        if let Some((_, response)) = self.rules.iter().find(|(needle, _)| text.contains(needle)) {
            return Ok(response.clone());
        }

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }

        self.fallback
            .clone()
            .ok_or_else(|| RfpError::LlmApi("mock script exhausted".to_string()))
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// =============================================================================
// Hashing Embedder
// =============================================================================

/// Deterministic bag-of-words embedder: each lowercase token bumps one bucket.
pub struct HashingEmbedder {
    dimension: usize,
    fail_single: bool,
    fail_batch: bool,
    /// Texts containing this marker fail in single mode
    poison: Option<String>,
    /// Single-text calls left that time out before succeeding
    timeouts: AtomicUsize,
    calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail_single: false,
            fail_batch: false,
            poison: None,
            timeouts: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(dimension: usize) -> Self {
        Self {
            fail_single: true,
            fail_batch: true,
            ..Self::new(dimension)
        }
    }

    pub fn without_batch(mut self) -> Self {
        self.fail_batch = true;
        self
    }

    pub fn with_poison(mut self, marker: &str) -> Self {
        self.poison = Some(marker.to_string());
        self
    }

    pub fn with_timeouts(self, count: usize) -> Self {
        self.timeouts.store(count, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = crc32fast::hash(token.to_lowercase().as_bytes()) as usize % self.dimension;
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_single {
            return Err(RfpError::Embedding("mock embedder offline".to_string()));
        }
        if self
            .timeouts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RfpError::timeout("mock embedding", Duration::from_millis(1)));
        }
        if let Some(marker) = &self.poison
            && text.contains(marker.as_str())
        {
            return Err(RfpError::Embedding("poisoned text".to_string()));
        }
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batch {
            return Err(RfpError::Embedding("mock batch endpoint offline".to_string()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
