pub mod builder;
pub mod embedding;
pub mod engine;
mod extract;
pub mod host;
pub mod ocr;
pub mod search;
pub mod store;

pub use builder::{IndexBuilder, ProgressFn};
pub use embedding::{
    query_prompt, EmbeddingBackend, LocalEmbeddingEngine, PassageEmbedder, RemoteEmbeddingClient,
};
pub use engine::RagEngine;
pub use extract::MAX_TEXT_CHARS;
pub use host::{
    DeviceCapabilities, DocumentStore, EmbeddingConfig, EmbeddingMode, HostEnvironment,
    NativeCapabilities, SettingsProvider,
};
pub use ocr::{recognize_page, PageImage};
pub use search::{cosine_similarity, SearchEngine};
pub use store::IndexStore;
pub use studyrag_core::{
    DocumentDescriptor, DocumentKind, IndexProgress, IndexStage, RagChunk, RagError,
    RagIndexFile, RagIndexResult, RagMatch, Result,
};
