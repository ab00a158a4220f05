use std::cmp::Ordering;
use std::sync::Arc;

use studyrag_core::RagMatch;

use crate::embedding::{EmbeddingBackend, LocalEmbeddingEngine};
use crate::host::{DeviceCapabilities, HostEnvironment, SettingsProvider};
use crate::store::IndexStore;

/// Cosine similarity with build-time conventions: a zero norm scores 0,
/// and when lengths differ the missing positions count as zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub struct SearchEngine<'a> {
    settings: &'a dyn SettingsProvider,
    host: &'a dyn HostEnvironment,
    caps: &'a dyn DeviceCapabilities,
    store: &'a IndexStore,
    local: Arc<LocalEmbeddingEngine>,
}

impl<'a> SearchEngine<'a> {
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

    /// Top-K passages across the named documents for a natural-language
    /// query. Blank queries, empty document lists and an unconfigured
    /// embedding backend all return an empty result.
    pub fn search(&self, query: &str, doc_ids: &[String], top_k: usize) -> Vec<RagMatch> {
        if query.trim().is_empty() || doc_ids.is_empty() {
            return Vec::new();
        }
        let Some(mut backend) = EmbeddingBackend::resolve(
            self.settings,
            self.host,
            self.caps,
            Arc::clone(&self.local),
        ) else {
            tracing::warn!("semantic search skipped: embedding model unconfigured");
            return Vec::new();
        };
        self.search_with_backend(query, doc_ids, top_k, &mut backend)
    }

    pub fn search_with_backend(
        &self,
        query: &str,
        doc_ids: &[String],
        top_k: usize,
        backend: &mut EmbeddingBackend,
    ) -> Vec<RagMatch> {
        let query_vector = match backend.embed_query(query) {
            Ok(vector) => vector,
            Err(err) => {
                tracing::warn!("query embedding failed: {err}");
                return Vec::new();
            }
        };

        let mut matches = Vec::new();
        for doc_id in doc_ids {
            let Some(index) = self.store.load(doc_id) else {
                continue;
            };
            for chunk in index.chunks {
                let score = cosine_similarity(&query_vector, &chunk.vector);
                matches.push(RagMatch { chunk, score });
            }
        }
        sort_matches(&mut matches);
        matches.truncate(top_k);
        matches
    }
}

/// Descending by score; ties resolve by `(doc_id, ordinal)` ascending so
/// results are deterministic for a fixed index and query vector.
pub(crate) fn sort_matches(matches: &mut [RagMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.doc_id.cmp(&b.chunk.doc_id))
            .then_with(|| a.chunk.ordinal().cmp(&b.chunk.ordinal()))
    });
}
