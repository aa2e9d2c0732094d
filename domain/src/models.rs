use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub type Metadata = BTreeMap<String, String>;

pub const META_SOURCE: &str = "source";
pub const META_FILE_NAME: &str = "file_name";
pub const META_RELATIVE_PATH: &str = "relative_path";

/// One ingested note. Identity is `source_path`; the content is never
/// modified after loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    content: String,
    source_path: String,
    metadata: Metadata,
}

impl Document {
    pub fn new(source_path: impl Into<String>, content: impl Into<String>) -> Self {
        let source_path = source_path.into();
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), source_path.clone());
        if let Some(name) = Path::new(&source_path).file_name() {
            metadata.insert(META_FILE_NAME.to_string(), name.to_string_lossy().into_owned());
        }
        Self {
            content: content.into(),
            source_path,
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// File name of the note, falling back to the full source path.
    pub fn file_name(&self) -> &str {
        self.metadata
            .get(META_FILE_NAME)
            .map(String::as_str)
            .unwrap_or(&self.source_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of the first NaN or infinite component, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.0.iter().position(|v| !v.is_finite())
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    vector: EmbeddingVector,
    document: Document,
}

impl IndexEntry {
    pub fn new(vector: EmbeddingVector, document: Document) -> Self {
        Self { vector, document }
    }

    pub fn vector(&self) -> &EmbeddingVector {
        &self.vector
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Hits of one search, best first. Never longer than the requested `k`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    hits: Vec<ScoredDocument>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredDocument>) -> Self {
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[ScoredDocument] {
        &self.hits
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.hits.iter().map(|hit| &hit.document)
    }

    pub fn scores(&self) -> Vec<f32> {
        self.hits.iter().map(|hit| hit.score).collect()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.hits.into_iter().map(|hit| hit.document).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainResponse {
    pub query: String,
    pub answer: String,
    pub sources: Vec<Document>,
}

impl ChainResponse {
    pub fn source_paths(&self) -> Vec<&str> {
        self.sources.iter().map(Document::source_path).collect()
    }
}

/// Stages a query passes through, in order. A failure at any stage ends the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStage {
    QueryReceived,
    Embedded,
    Retrieved,
    PromptAssembled,
    Generated,
    Formatted,
}

impl fmt::Display for ChainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainStage::QueryReceived => "query received",
            ChainStage::Embedded => "embedded",
            ChainStage::Retrieved => "retrieved",
            ChainStage::PromptAssembled => "prompt assembled",
            ChainStage::Generated => "generated",
            ChainStage::Formatted => "formatted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_records_source_metadata() {
        let doc = Document::new("vault/daily/2024-01-01.md", "- [ ] water plants")
            .with_metadata(META_RELATIVE_PATH, "daily/2024-01-01.md");

        assert_eq!(doc.source_path(), "vault/daily/2024-01-01.md");
        assert_eq!(doc.file_name(), "2024-01-01.md");
        assert_eq!(doc.metadata()[META_SOURCE], "vault/daily/2024-01-01.md");
        assert_eq!(doc.metadata()[META_RELATIVE_PATH], "daily/2024-01-01.md");
    }

    #[test]
    fn file_name_falls_back_to_source_path() {
        let doc = Document::new("..", "text");
        assert_eq!(doc.file_name(), "..");
    }

    #[test]
    fn vector_reports_non_finite_position() {
        let ok = EmbeddingVector::new(vec![0.1, 0.2]);
        let bad = EmbeddingVector::new(vec![0.1, f32::NAN, f32::INFINITY]);
        assert_eq!(ok.first_non_finite(), None);
        assert_eq!(bad.first_non_finite(), Some(1));
        assert_eq!(bad.dimension(), 3);
    }

    #[test]
    fn chat_roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("hi")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }

    #[test]
    fn index_entry_round_trips_through_json() {
        let entry = IndexEntry::new(
            EmbeddingVector::new(vec![1.0, 0.0]),
            Document::new("a.md", "alpha"),
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: IndexEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
