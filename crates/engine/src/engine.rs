use std::sync::Arc;

use studyrag_core::{RagError, RagIndexResult, RagMatch, Result};

use crate::builder::{IndexBuilder, ProgressFn};
use crate::embedding::LocalEmbeddingEngine;
use crate::host::{DeviceCapabilities, DocumentStore, HostEnvironment, SettingsProvider};
use crate::search::SearchEngine;
use crate::store::IndexStore;

/// Facade over the retrieval core. The host constructs it once with its
/// collaborators and keeps it for the process lifetime; builds for
/// different documents may run concurrently through separate calls, while
/// builds for the same document must be sequenced by the caller.
pub struct RagEngine {
    settings: Arc<dyn SettingsProvider>,
    documents: Arc<dyn DocumentStore>,
    host: Arc<dyn HostEnvironment>,
    caps: Arc<dyn DeviceCapabilities>,
    store: IndexStore,
    local: Arc<LocalEmbeddingEngine>,
}

impl RagEngine {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        documents: Arc<dyn DocumentStore>,
        host: Arc<dyn HostEnvironment>,
        caps: Arc<dyn DeviceCapabilities>,
    ) -> Self {
        let store = IndexStore::new(&host.data_dir());
        Self {
            settings,
            documents,
            host,
            caps,
            store,
            local: Arc::new(LocalEmbeddingEngine::new()),
        }
    }

    /// Build (or rebuild from scratch) the index for one document.
    /// Cancellation is dropping the future; no partial index survives it.
    pub async fn build_index(
        &self,
        document_id: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<RagIndexResult> {
        let document = self
            .documents
            .get_document(document_id)
            .ok_or_else(|| RagError::DocumentMissing(document_id.to_string()))?;
        let builder = IndexBuilder::new(
            self.settings.as_ref(),
            self.host.as_ref(),
            self.caps.as_ref(),
            &self.store,
            Arc::clone(&self.local),
        );
        builder.build_index(&document, on_progress).await
    }

    pub fn search(&self, query: &str, doc_ids: &[String], top_k: usize) -> Vec<RagMatch> {
        let search = SearchEngine::new(
            self.settings.as_ref(),
            self.host.as_ref(),
            self.caps.as_ref(),
            &self.store,
            Arc::clone(&self.local),
        );
        search.search(query, doc_ids, top_k)
    }

    pub fn is_indexed(&self, doc_id: &str) -> bool {
        self.store.exists(doc_id)
    }

    pub fn remove_index(&self, doc_id: &str) -> Result<()> {
        self.store.remove(doc_id)
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }
}
