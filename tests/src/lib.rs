//! Deterministic stand-ins for the embedding provider and the language model.

use domain::error::{EmbeddingError, GenerationError};
use domain::models::{ChatMessage, EmbeddingVector};
use domain::ports::{Embedder, Generator};
use std::hash::Hasher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use twox_hash::XxHash64;

pub const STUB_DIMENSION: usize = 64;

/// Bag-of-words embedder: every lowercase word is hashed into one of
/// `dimension` buckets and the counts are L2-normalised.
pub struct HashEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::with_dimension(STUB_DIMENSION)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> EmbeddingVector {
        let mut values = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(word.to_lowercase().as_bytes());
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            values[bucket] += 1.0;
        }
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            values.iter_mut().for_each(|v| *v /= norm);
        }
        EmbeddingVector::new(values)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }
}

/// Embeds like [`HashEmbedder`] but fails for any text containing `trigger`.
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    trigger: String,
}

impl FlakyEmbedder {
    pub fn failing_on(trigger: impl Into<String>) -> Self {
        Self {
            inner: HashEmbedder::new(),
            trigger: trigger.into(),
        }
    }
}

impl Embedder for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        if text.contains(&self.trigger) {
            return Err(EmbeddingError::Unavailable("connection refused".into()));
        }
        self.inner.embed(text).await
    }
}

/// Returns a fixed answer and records every prompt it receives.
pub struct ScriptedGenerator {
    answer: String,
    fail_on: Option<String>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGenerator {
    pub fn answering(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            fail_on: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fail whenever the user message contains `trigger`.
    pub fn failing_on(mut self, trigger: impl Into<String>) -> Self {
        self.fail_on = Some(trigger.into());
        self
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl Generator for ScriptedGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        let question = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        match &self.fail_on {
            Some(trigger) if question.contains(trigger.as_str()) => {
                Err(GenerationError::Provider("model returned HTTP 500".into()))
            }
            _ => Ok(self.answer.clone()),
        }
    }
}
