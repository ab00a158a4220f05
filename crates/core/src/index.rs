use serde::{Deserialize, Serialize};

pub const INDEX_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagChunk {
    pub id: String,
    pub doc_id: String,
    pub text: String,
    #[serde(default)]
    pub page_start: Option<u32>,
    #[serde(default)]
    pub page_end: Option<u32>,
    #[serde(default)]
    pub vector: Vec<f32>,
}

impl RagChunk {
    pub fn chunk_id(doc_id: &str, ordinal: usize) -> String {
        format!("chunk_{doc_id}_{ordinal}")
    }

    /// Build-time ordinal encoded in the chunk id.
    pub fn ordinal(&self) -> usize {
        self.id
            .rsplit('_')
            .next()
            .and_then(|tail| tail.parse().ok())
            .unwrap_or(0)
    }
}

/// Persisted per-document index. One JSON file per document; loaders
/// reject any version other than [`INDEX_FILE_VERSION`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagIndexFile {
    pub version: u32,
    pub doc_id: String,
    pub token_estimate: usize,
    pub chunks: Vec<RagChunk>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagIndexResult {
    pub document_id: String,
    pub chunk_count: usize,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct RagMatch {
    pub chunk: RagChunk,
    pub score: f32,
}
