//! Error taxonomy of the retrieval pipeline.
//!
//! Build-time errors (`IngestionError`, `EmbeddingError` wrapped in
//! `IndexError`) are fatal to startup. Query-time errors surface as a single
//! `ChainError` per query and never end the session.

use crate::models::ChainStage;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A single file or directory that was skipped during loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Error loading file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error loading file {}: not valid UTF-8 text", path.display())]
    NotUtf8 { path: PathBuf },

    #[error("Error listing directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LoadError {
    pub fn path(&self) -> &Path {
        match self {
            LoadError::Read { path, .. }
            | LoadError::NotUtf8 { path }
            | LoadError::Directory { path, .. } => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(
        "No notes were found under {} (suffixes: {suffixes}, unreadable: {failed}). Ensure the directory contains valid markdown files.",
        root.display()
    )]
    NoDocuments {
        root: PathBuf,
        suffixes: String,
        failed: usize,
    },

    #[error("Cannot read notes directory {}: {source}", root.display())]
    RootUnreadable {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No documents were given to index")]
    EmptyCorpus,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding provider unreachable: {0}")]
    Unavailable(String),

    #[error("embedding provider failed: {0}")]
    Provider(String),

    #[error("embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding provider returned an empty vector")]
    Empty,

    #[error("embedding has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding has a non-finite value at position {position}")]
    NonFinite { position: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("language model unreachable: {0}")]
    Unavailable(String),

    #[error("language model failed: {0}")]
    Provider(String),

    #[error("language model returned an unreadable response: {0}")]
    InvalidResponse(String),
}

/// Failure to build the embedding index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error("Error creating vector index: {0}")]
    Embedding(#[from] EmbeddingError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("could not embed the query: {0}")]
    Embedding(#[from] EmbeddingError),

    /// The query vector was produced but does not fit the index.
    #[error("query does not match the index: {0}")]
    Index(EmbeddingError),
}

/// The one failure signal a query can produce.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChainError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("answer generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl ChainError {
    /// The stage that was being attempted when the query failed.
    pub fn stage(&self) -> ChainStage {
        match self {
            ChainError::Retrieval(RetrievalError::Embedding(_)) => ChainStage::Embedded,
            ChainError::Retrieval(RetrievalError::Index(_)) => ChainStage::Retrieved,
            ChainError::Generation(_) => ChainStage::Generated,
        }
    }
}
