use crate::document::{PageText, SectionText};
use crate::index::RagChunk;

/// Literal marker the OCR prompt asks the vision model to place at the end
/// of each logical section. Matched exactly; close variants do not count.
pub const SECTION_SENTINEL: &str = "[[SECTION_END]]";

const MAX_CHUNK_CHARS: usize = 800;
const OVERLAP_CHARS: usize = 120;

#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    pub max_chars: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: MAX_CHUNK_CHARS,
            overlap: OVERLAP_CHARS,
        }
    }
}

pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Split page-tagged text into overlapping chunks with dense zero-based
    /// ordinals. Vectors are left empty and attached later.
    pub fn chunk_pages(&self, doc_id: &str, pages: &[PageText]) -> Vec<RagChunk> {
        let mut chunks = Vec::new();
        let mut ordinal = 0usize;
        for section in split_sections(pages) {
            for window in self.windows(&section.text) {
                chunks.push(RagChunk {
                    id: RagChunk::chunk_id(doc_id, ordinal),
                    doc_id: doc_id.to_string(),
                    text: window,
                    page_start: section.page_start,
                    page_end: section.page_end,
                    vector: Vec::new(),
                });
                ordinal += 1;
            }
        }
        chunks
    }

    /// Windowed split of one section, counted in characters. Each window is
    /// at most `max_chars` long; when a window does not reach the end of the
    /// text, a line break in the back half of the window wins over a hard
    /// cut. Consecutive windows overlap by `overlap` characters.
    pub fn windows(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.trim().chars().collect();
        let len = chars.len();
        if len == 0 {
            return Vec::new();
        }
        let max_chars = self.config.max_chars.max(1);
        // A line break is only taken past start + max_chars / 2, so an
        // overlap capped at half a window keeps every step advancing.
        let overlap = self.config.overlap.min(max_chars / 2);

        let mut out = Vec::new();
        let mut start = 0usize;
        loop {
            let mut end = (start + max_chars).min(len);
            if end < len {
                let floor = start + max_chars / 2;
                if let Some(pos) = (floor + 1..end).rev().find(|&i| chars[i] == '\n') {
                    end = pos;
                }
            }
            let window: String = chars[start..end].iter().collect();
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
            if end == len {
                break;
            }
            start = end.saturating_sub(overlap);
        }
        out
    }
}

/// Assemble sentinel-delimited sections from extracted pages.
///
/// Lines are consumed in order; within a line, `[[SECTION_END]]` splits the
/// stream. Fragments accumulate into a live buffer joined by `\n`, whose
/// page range spans the first through last page that contributed non-blank
/// text. The sentinel flushes the buffer; end of input flushes the rest.
pub fn split_sections(pages: &[PageText]) -> Vec<SectionText> {
    let mut sections = Vec::new();
    let mut buffer = SectionBuffer::default();
    for page in pages {
        for line in page.text.lines() {
            let pieces: Vec<&str> = line.split(SECTION_SENTINEL).collect();
            for (idx, piece) in pieces.iter().enumerate() {
                buffer.push(piece, page.page_number);
                if idx + 1 < pieces.len() {
                    buffer.flush_into(&mut sections);
                }
            }
        }
    }
    buffer.flush_into(&mut sections);
    sections
}

#[derive(Default)]
struct SectionBuffer {
    parts: Vec<String>,
    page_start: Option<u32>,
    page_end: Option<u32>,
}

impl SectionBuffer {
    fn push(&mut self, fragment: &str, page: Option<u32>) {
        self.parts.push(fragment.to_string());
        if !fragment.trim().is_empty() {
            if let Some(page) = page {
                self.page_start.get_or_insert(page);
                self.page_end = Some(page);
            }
        }
    }

    fn flush_into(&mut self, sections: &mut Vec<SectionText>) {
        let joined = self.parts.join("\n");
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            sections.push(SectionText {
                text: trimmed.to_string(),
                page_start: self.page_start,
                page_end: self.page_end,
            });
        }
        self.parts.clear();
        self.page_start = None;
        self.page_end = None;
    }
}
