use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexStage {
    Preparing,
    Ocr,
    Chunking,
    Vectorizing,
    Saving,
    Completed,
    Error,
}

/// One progress event emitted by the index builder. The callback must be
/// cheap; a build emits hundreds of these.
#[derive(Debug, Clone, Serialize)]
pub struct IndexProgress {
    pub stage: IndexStage,
    pub current: usize,
    pub total: usize,
    pub message: String,
    pub processed_tokens: usize,
    pub estimated_tokens: usize,
}

impl IndexProgress {
    pub fn stage(stage: IndexStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            current: 0,
            total: 0,
            message: message.into(),
            processed_tokens: 0,
            estimated_tokens: 0,
        }
    }
}
