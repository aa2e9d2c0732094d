use crate::index::{EmbeddingIndex, DEFAULT_TOP_K};
use crate::prompt::{assemble, DEFAULT_SYSTEM_INSTRUCTION};
use domain::error::{ChainError, IndexError, RetrievalError};
use domain::models::{ChainResponse, ChainStage, Document};
use domain::ports::{Embedder, Generator};
use shared::telemetry::Telemetry;
use tracing::debug;

/// Question answering over an embedded note collection.
///
/// The index is built before the service exists and is only read afterwards,
/// so one service can answer any number of queries in sequence.
pub struct RagService<E: Embedder, G: Generator> {
    index: EmbeddingIndex,
    embedder: E,
    generator: G,
    top_k: usize,
    instruction: String,
}

impl<E: Embedder, G: Generator> RagService<E, G> {
    pub fn new(index: EmbeddingIndex, embedder: E, generator: G) -> Self {
        Self {
            index,
            embedder,
            generator,
            top_k: DEFAULT_TOP_K,
            instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }

    /// Embed `documents` with `embedder` and wrap the result in a service.
    pub async fn from_documents(
        documents: Vec<Document>,
        embedder: E,
        generator: G,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        let index = EmbeddingIndex::build(&embedder, documents, batch_size).await?;
        Ok(Self::new(index, embedder, generator))
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Answer one query. Either every stage succeeds and a full response is
    /// returned, or the first failing stage's error is.
    pub async fn answer(&self, query: &str) -> Result<ChainResponse, ChainError> {
        let telemetry = Telemetry::new();
        debug!(stage = %ChainStage::QueryReceived, "{query}");

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(RetrievalError::from)?;
        debug!(stage = %ChainStage::Embedded, dimension = vector.dimension());

        let retrieved = self
            .index
            .search_vector(&vector, self.top_k)
            .map_err(RetrievalError::Index)?;
        debug!(stage = %ChainStage::Retrieved, hits = retrieved.len(), scores = ?retrieved.scores());

        let prompt = assemble(&self.instruction, retrieved.documents(), query);
        debug!(stage = %ChainStage::PromptAssembled, chars = prompt.system().len());

        let answer = self.generator.generate(prompt.messages()).await?;
        debug!(
            stage = %ChainStage::Generated,
            chars = answer.len(),
            elapsed_ms = telemetry.elapsed_ms() as u64
        );

        Ok(ChainResponse {
            query: query.to_string(),
            answer,
            sources: retrieved.into_documents(),
        })
    }
}
