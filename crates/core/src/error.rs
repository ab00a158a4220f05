use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),
    #[error("document not found: {0}")]
    DocumentMissing(String),
    #[error("no recognizable text extracted")]
    ExtractionEmpty,
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
}

pub type Result<T> = std::result::Result<T, RagError>;
