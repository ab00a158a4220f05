mod chunk;
mod document;
mod error;
mod index;
mod progress;
mod tokens;

pub use chunk::{split_sections, ChunkConfig, Chunker, SECTION_SENTINEL};
pub use document::{DocumentDescriptor, DocumentKind, PageText, SectionText};
pub use error::{RagError, Result};
pub use index::{RagChunk, RagIndexFile, RagIndexResult, RagMatch, INDEX_FILE_VERSION};
pub use progress::{IndexProgress, IndexStage};
pub use tokens::estimate_tokens;
