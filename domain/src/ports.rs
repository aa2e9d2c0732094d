//! Capability traits for the two external providers.
//!
//! The index and the chain only see these traits, so any provider (Ollama,
//! a hosted API, a deterministic stub) can be plugged in. Vectors used to
//! build an index and vectors used to query it must come from the same
//! `Embedder` or scores are meaningless.

use crate::error::{EmbeddingError, GenerationError};
use crate::models::{ChatMessage, EmbeddingVector};
use std::future::Future;

pub trait Embedder: Send + Sync {
    fn embed(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<EmbeddingVector, EmbeddingError>> + Send;

    /// Embed several texts, one vector per text in input order.
    ///
    /// The default embeds one text at a time; providers with a native batch
    /// endpoint should override it.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<EmbeddingVector>, EmbeddingError>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed(text).await?);
            }
            Ok(vectors)
        }
    }
}

pub trait Generator: Send + Sync {
    fn generate(
        &self,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}
