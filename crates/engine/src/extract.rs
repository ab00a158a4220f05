use std::fs;
use std::path::Path;

use studyrag_core::{estimate_tokens, PageText, RagError, Result};

/// Upper bound on characters read from a text document.
pub const MAX_TEXT_CHARS: usize = 1_000_000;

/// Read a text-like document as UTF-8, truncating oversized files.
pub(crate) fn read_text_document(path: &Path) -> Result<PageText> {
    let bytes = fs::read(path)?;
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if let Some((cut, _)) = text.char_indices().nth(MAX_TEXT_CHARS) {
        text.truncate(cut);
        tracing::warn!(
            "text document {} truncated to {MAX_TEXT_CHARS} characters",
            path.display()
        );
    }
    let estimated_tokens = estimate_tokens(&text);
    Ok(PageText {
        page_number: None,
        text,
        estimated_tokens,
    })
}

pub(crate) fn load_image(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).map_err(|err| {
        RagError::Extraction(format!("failed to open image {}: {err}", path.display()))
    })
}

/// Native text per PDF page. This is the degraded path used when page
/// rendering is unavailable; page numbers are still 1-based.
pub(crate) fn pdf_text_pages(path: &Path) -> Result<Vec<PageText>> {
    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|err| RagError::Extraction(format!("pdf extract failed: {err}")))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(idx, text)| {
            let estimated_tokens = estimate_tokens(&text);
            PageText {
                page_number: Some(idx as u32 + 1),
                text,
                estimated_tokens,
            }
        })
        .collect())
}

/// Render each PDF page to a bitmap for OCR.
#[cfg(feature = "pdfium")]
pub(crate) fn render_pdf_pages(path: &Path) -> Result<Vec<image::DynamicImage>> {
    use pdfium_render::prelude::*;

    use crate::ocr::MAX_PAGE_EDGE_PX;

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|err| RagError::Extraction(format!("pdfium binding failed: {err}")))?;
    let pdfium = Pdfium::new(bindings);
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|err| RagError::Extraction(format!("pdfium load failed: {err}")))?;
    let render_config = PdfRenderConfig::new().set_target_width(MAX_PAGE_EDGE_PX as i32);
    let mut images = Vec::new();
    for page in document.pages().iter() {
        let rendered = page
            .render_with_config(&render_config)
            .map_err(|err| RagError::Extraction(format!("pdf render failed: {err}")))?;
        images.push(rendered.as_image());
    }
    Ok(images)
}
