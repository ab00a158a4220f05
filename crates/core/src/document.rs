use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PlainText,
    Markdown,
    Pdf,
    Image,
    Other,
}

/// Descriptor handed over by the document store. Immutable for the
/// duration of one index build.
#[derive(Debug, Clone)]
pub struct DocumentDescriptor {
    pub id: String,
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub name: String,
}

/// Text extracted from one unit of a document. `page_number` is present
/// for PDF pages and absent for whole-file text.
#[derive(Debug, Clone, Default)]
pub struct PageText {
    pub page_number: Option<u32>,
    pub text: String,
    pub estimated_tokens: usize,
}

impl PageText {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A sentinel-delimited region of a document; the unit of chunker input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionText {
    pub text: String,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
}
