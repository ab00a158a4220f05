use std::sync::Arc;

use studyrag_core::{
    estimate_tokens, ChunkConfig, Chunker, DocumentDescriptor, DocumentKind, IndexProgress,
    IndexStage, PageText, RagError, RagIndexFile, RagIndexResult, Result, INDEX_FILE_VERSION,
};
use studyrag_llm::ProviderConfig;

use crate::embedding::{EmbeddingBackend, LocalEmbeddingEngine};
use crate::extract;
use crate::host::{DeviceCapabilities, HostEnvironment, SettingsProvider};
use crate::ocr::{self, PageImage};
use crate::store::IndexStore;

pub type ProgressFn<'a> = &'a (dyn Fn(IndexProgress) + Send + Sync);

/// Builds the persisted index for one document: prepare → extract/OCR →
/// chunk → vectorize → save, reporting progress at every transition and
/// per-unit advance.
///
/// One builder call handles one document; concurrent builds of different
/// documents may share the engine through separate calls (the local
/// embedding mutex is the only cross-build coupling). Cancellation is
/// dropping the returned future: every network call is a suspension point
/// and the save is the final step, so no partial index is ever written.
pub struct IndexBuilder<'a> {
    settings: &'a dyn SettingsProvider,
    host: &'a dyn HostEnvironment,
    caps: &'a dyn DeviceCapabilities,
    store: &'a IndexStore,
    local: Arc<LocalEmbeddingEngine>,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(
        settings: &'a dyn SettingsProvider,
        host: &'a dyn HostEnvironment,
        caps: &'a dyn DeviceCapabilities,
        store: &'a IndexStore,
        local: Arc<LocalEmbeddingEngine>,
    ) -> Self {
        Self {
            settings,
            host,
            caps,
            store,
            local,
        }
    }

    pub async fn build_index(
        &self,
        document: &DocumentDescriptor,
        on_progress: ProgressFn<'_>,
    ) -> Result<RagIndexResult> {
        on_progress(IndexProgress::stage(IndexStage::Preparing, "正在准备索引"));

        let Some(backend) = EmbeddingBackend::resolve(
            self.settings,
            self.host,
            self.caps,
            Arc::clone(&self.local),
        ) else {
            on_progress(IndexProgress::stage(
                IndexStage::Error,
                "嵌入模型未配置，请在设置中配置本地或远程嵌入模型",
            ));
            return Ok(empty_result(document));
        };

        self.build_with_backend(document, backend, on_progress).await
    }

    /// Same pipeline with an explicitly resolved backend. Hosts that
    /// manage their own embedders (and tests) enter here.
    pub async fn build_with_backend(
        &self,
        document: &DocumentDescriptor,
        mut backend: EmbeddingBackend,
        on_progress: ProgressFn<'_>,
    ) -> Result<RagIndexResult> {
        let mut ocr_tokens = 0usize;
        let pages = match self
            .extract_pages(document, on_progress, &mut ocr_tokens)
            .await
        {
            Ok(pages) => pages,
            Err(err) => {
                let message = match &err {
                    RagError::ConfigurationMissing(detail) => detail.clone(),
                    other => format!("文本提取失败：{other}"),
                };
                on_progress(IndexProgress::stage(IndexStage::Error, message));
                return Err(err);
            }
        };
        if pages.iter().all(PageText::is_blank) {
            on_progress(IndexProgress::stage(
                IndexStage::Error,
                "未识别到有效文本，请检查 OCR 识别结果或文件清晰度",
            ));
            return Ok(empty_result(document));
        }

        on_progress(IndexProgress::stage(IndexStage::Chunking, "正在切分文本"));
        let mut chunks = Chunker::new(ChunkConfig::default()).chunk_pages(&document.id, &pages);
        let embedding_tokens: usize = chunks.iter().map(|c| estimate_tokens(&c.text)).sum();
        let total_tokens = ocr_tokens + embedding_tokens;

        let total = chunks.len();
        let mut processed_tokens = ocr_tokens;
        on_progress(IndexProgress {
            stage: IndexStage::Vectorizing,
            current: 0,
            total,
            message: "正在生成向量".to_string(),
            processed_tokens,
            estimated_tokens: total_tokens,
        });
        for (idx, chunk) in chunks.iter_mut().enumerate() {
            let label = match chunk.page_start {
                Some(page) => format!("第{page}页"),
                None => "全文".to_string(),
            };
            on_progress(IndexProgress {
                stage: IndexStage::Vectorizing,
                current: idx + 1,
                total,
                message: format!("正在向量化 {label}（{}/{total}）", idx + 1),
                processed_tokens,
                estimated_tokens: total_tokens,
            });
            match backend.embed_passage(&chunk.text) {
                Ok(vector) => {
                    chunk.vector = vector;
                    processed_tokens += estimate_tokens(&chunk.text);
                }
                Err(err) => {
                    on_progress(IndexProgress::stage(
                        IndexStage::Error,
                        format!("向量化失败：{err}"),
                    ));
                    return Err(err);
                }
            }
        }

        on_progress(IndexProgress::stage(IndexStage::Saving, "正在保存索引"));
        let index = RagIndexFile {
            version: INDEX_FILE_VERSION,
            doc_id: document.id.clone(),
            token_estimate: total_tokens,
            chunks,
        };
        let chunk_count = index.chunks.len();
        if let Err(err) = self.store.save(&document.id, &index) {
            on_progress(IndexProgress::stage(
                IndexStage::Error,
                "索引保存失败，已保留原有索引",
            ));
            return Err(err);
        }

        on_progress(IndexProgress {
            stage: IndexStage::Completed,
            current: total,
            total,
            message: "索引完成".to_string(),
            processed_tokens: total_tokens,
            estimated_tokens: total_tokens,
        });
        Ok(RagIndexResult {
            document_id: document.id.clone(),
            chunk_count,
            estimated_tokens: total_tokens,
        })
    }

    async fn extract_pages(
        &self,
        document: &DocumentDescriptor,
        on_progress: ProgressFn<'_>,
        ocr_tokens: &mut usize,
    ) -> Result<Vec<PageText>> {
        match document.kind {
            DocumentKind::Pdf => self.extract_pdf(document, on_progress, ocr_tokens).await,
            DocumentKind::Image => self.extract_image(document, on_progress, ocr_tokens).await,
            DocumentKind::PlainText | DocumentKind::Markdown => {
                Ok(vec![extract::read_text_document(&document.path)?])
            }
            DocumentKind::Other => {
                tracing::debug!(
                    "document {} has kind Other, reading as plain text",
                    document.id
                );
                Ok(vec![extract::read_text_document(&document.path)?])
            }
        }
    }

    #[cfg_attr(not(feature = "pdfium"), allow(unused_variables))]
    async fn extract_pdf(
        &self,
        document: &DocumentDescriptor,
        on_progress: ProgressFn<'_>,
        ocr_tokens: &mut usize,
    ) -> Result<Vec<PageText>> {
        #[cfg(feature = "pdfium")]
        {
            match extract::render_pdf_pages(&document.path) {
                Ok(images) => {
                    let vision = self.vision_provider()?;
                    let total = images.len();
                    let mut pages = Vec::with_capacity(total);
                    for (idx, image) in images.into_iter().enumerate() {
                        let number = idx as u32 + 1;
                        on_progress(IndexProgress {
                            stage: IndexStage::Ocr,
                            current: idx + 1,
                            total,
                            message: format!("OCR 上传第 {number}/{total} 页"),
                            processed_tokens: *ocr_tokens,
                            estimated_tokens: 0,
                        });
                        let page = PageImage {
                            image,
                            label: format!("第 {number} 页"),
                        };
                        // An empty page is tolerated; the all-blank check
                        // happens after extraction.
                        let text = ocr::recognize_page(&page, &vision).await;
                        let estimated_tokens = estimate_tokens(&text);
                        *ocr_tokens += estimated_tokens;
                        on_progress(IndexProgress {
                            stage: IndexStage::Ocr,
                            current: idx + 1,
                            total,
                            message: format!("第 {number}/{total} 页识别完成"),
                            processed_tokens: *ocr_tokens,
                            estimated_tokens: 0,
                        });
                        pages.push(PageText {
                            page_number: Some(number),
                            text,
                            estimated_tokens,
                        });
                    }
                    return Ok(pages);
                }
                Err(err) => {
                    tracing::warn!("pdf page rendering unavailable: {err}");
                }
            }
        }

        // Degraded path: native PDF text, one entry per page.
        tracing::warn!(
            "indexing {} from native pdf text without OCR",
            document.id
        );
        extract::pdf_text_pages(&document.path)
    }

    async fn extract_image(
        &self,
        document: &DocumentDescriptor,
        on_progress: ProgressFn<'_>,
        ocr_tokens: &mut usize,
    ) -> Result<Vec<PageText>> {
        let vision = self.vision_provider()?;
        on_progress(IndexProgress {
            stage: IndexStage::Ocr,
            current: 1,
            total: 1,
            message: "OCR 上传第 1/1 页".to_string(),
            processed_tokens: 0,
            estimated_tokens: 0,
        });
        let image = extract::load_image(&document.path)?;
        let page = PageImage {
            image,
            label: "第 1 页".to_string(),
        };
        let text = ocr::recognize_page(&page, &vision).await;
        let estimated_tokens = estimate_tokens(&text);
        *ocr_tokens += estimated_tokens;
        Ok(vec![PageText {
            page_number: None,
            text,
            estimated_tokens,
        }])
    }

    fn vision_provider(&self) -> Result<ProviderConfig> {
        let vision = self.settings.vision_provider();
        if !vision.is_usable() {
            return Err(RagError::ConfigurationMissing(
                "多模态视觉模型未配置，请在设置中选择支持图片识别的模型".to_string(),
            ));
        }
        Ok(vision)
    }
}

fn empty_result(document: &DocumentDescriptor) -> RagIndexResult {
    RagIndexResult {
        document_id: document.id.clone(),
        chunk_count: 0,
        estimated_tokens: 0,
    }
}
