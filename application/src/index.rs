use domain::error::{EmbeddingError, IndexError, IngestionError, RetrievalError};
use domain::models::{Document, EmbeddingVector, IndexEntry, RetrievalResult, ScoredDocument};
use domain::ports::Embedder;
use infrastructure::file_scanner::FileScanner;
use infrastructure::search::{SearchEngine, SimilarityMetric};
use serde::{Deserialize, Serialize};
use shared::telemetry::Telemetry;
use std::collections::HashSet;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// In-memory vector index over whole documents. Immutable once built; every
/// vector has the same dimension and comes from the embedder it was built with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
    metric: SimilarityMetric,
}

impl EmbeddingIndex {
    pub async fn build<E: Embedder>(
        embedder: &E,
        documents: Vec<Document>,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        Self::build_with_metric(embedder, documents, batch_size, SimilarityMetric::default()).await
    }

    /// Embed every document and keep one entry per `source_path`.
    /// The first document seen for a path wins.
    pub async fn build_with_metric<E: Embedder>(
        embedder: &E,
        documents: Vec<Document>,
        batch_size: usize,
        metric: SimilarityMetric,
    ) -> Result<Self, IndexError> {
        let mut seen = HashSet::new();
        let documents: Vec<Document> = documents
            .into_iter()
            .filter(|doc| {
                let first = seen.insert(doc.source_path().to_string());
                if !first {
                    tracing::warn!("Dropping duplicate note {}", doc.source_path());
                }
                first
            })
            .collect();
        if documents.is_empty() {
            return Err(IngestionError::EmptyCorpus.into());
        }

        let telemetry = Telemetry::new();
        let batch_size = batch_size.max(1);
        let total = documents.len();
        let mut entries = Vec::with_capacity(total);
        let mut dimension = None;
        let mut pending = documents.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<Document> = pending.by_ref().take(batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|doc| doc.content().to_string()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                }
                .into());
            }
            for (vector, document) in vectors.into_iter().zip(batch) {
                let expected = *dimension.get_or_insert(vector.dimension());
                validate_vector(&vector, expected)?;
                entries.push(IndexEntry::new(vector, document));
            }
            tracing::info!("Embedded {}/{} notes", entries.len(), total);
        }

        let dimension = dimension.unwrap_or_default();
        tracing::info!(
            "Index ready: {} notes, dimension {}, {} ms",
            entries.len(),
            dimension,
            telemetry.elapsed_ms()
        );
        Ok(Self {
            entries,
            dimension,
            metric,
        })
    }

    /// Embed `query` with `embedder` and return the `k` most similar documents.
    pub async fn search<E: Embedder>(
        &self,
        embedder: &E,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        let vector = embedder.embed(query).await?;
        self.search_vector(&vector, k).map_err(RetrievalError::Index)
    }

    pub fn search_vector(
        &self,
        query: &EmbeddingVector,
        k: usize,
    ) -> Result<RetrievalResult, EmbeddingError> {
        validate_vector(query, self.dimension)?;
        let ranked = SearchEngine::rank(
            query.as_slice(),
            self.entries.iter().map(|entry| entry.vector().as_slice()),
            k,
            self.metric,
        );
        let hits = ranked
            .into_iter()
            .map(|(position, score)| ScoredDocument {
                document: self.entries[position].document().clone(),
                score,
            })
            .collect();
        Ok(RetrievalResult::new(hits))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}

fn validate_vector(vector: &EmbeddingVector, expected: usize) -> Result<(), EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::Empty);
    }
    if vector.dimension() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.dimension(),
        });
    }
    if let Some(position) = vector.first_non_finite() {
        return Err(EmbeddingError::NonFinite { position });
    }
    Ok(())
}

/// Load the notes under the scanner's root and embed them into a new index.
pub async fn load_and_embed<E: Embedder>(
    scanner: &FileScanner,
    embedder: &E,
    batch_size: usize,
    metric: SimilarityMetric,
) -> Result<EmbeddingIndex, IndexError> {
    let report = scanner.load_with_report()?;
    if !report.skipped.is_empty() {
        tracing::warn!("Skipped {} unreadable entries", report.skipped.len());
    }
    EmbeddingIndex::build_with_metric(embedder, report.documents, batch_size, metric).await
}
