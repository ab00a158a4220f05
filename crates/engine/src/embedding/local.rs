use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::host::DeviceCapabilities;

/// Physical-memory floor for running the local model.
const MIN_LOCAL_MEMORY_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// Sentence-embedding engine over a quantized GGUF model.
///
/// Holds at most one loaded model; a request naming a different path
/// releases the current handle and loads the replacement. All calls
/// serialize on the internal mutex, so the engine is safe to share
/// across builds at the cost of sequential embedding.
pub struct LocalEmbeddingEngine {
    inner: Mutex<Option<(PathBuf, native::LoadedModel)>>,
}

impl Default for LocalEmbeddingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEmbeddingEngine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Whether this device may run the local backend at all: the native
    /// binding must be compiled in, the CPU must be 64-bit ARM-class, and
    /// physical memory must reach the floor.
    pub fn is_available(caps: &dyn DeviceCapabilities) -> bool {
        native::supported()
            && caps.has_arm64_cpu()
            && caps.total_memory_bytes() >= MIN_LOCAL_MEMORY_BYTES
    }

    /// Embed one string with the model at `model_path`. Returns `None` on
    /// load failure, empty tokenization, decode failure, or context
    /// allocation failure; the engine is left idle after a failed load.
    pub fn embed(&self, model_path: &Path, text: &str) -> Option<Vec<f32>> {
        let mut slot = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let reload = match slot.as_ref() {
            Some((loaded_path, _)) => loaded_path != model_path,
            None => true,
        };
        if reload {
            // Release the previous handle before loading the replacement.
            *slot = None;
            *slot = native::load(model_path).map(|model| (model_path.to_path_buf(), model));
        }
        let (_, model) = slot.as_ref()?;
        native::embed(model, text)
    }
}

pub(crate) fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
    vector
}

#[cfg(feature = "local-embedding")]
mod native {
    use std::num::NonZeroU32;
    use std::path::Path;

    use llama_cpp_2::context::params::{LlamaContextParams, LlamaPoolingType};
    use llama_cpp_2::llama_backend::LlamaBackend;
    use llama_cpp_2::llama_batch::LlamaBatch;
    use llama_cpp_2::model::params::LlamaModelParams;
    use llama_cpp_2::model::{AddBos, LlamaModel};
    use once_cell::sync::OnceCell;

    use super::l2_normalize;

    const EMBED_CTX_TOKENS: u32 = 4096;

    static BACKEND: OnceCell<LlamaBackend> = OnceCell::new();

    pub(super) struct LoadedModel {
        model: LlamaModel,
    }

    pub(super) fn supported() -> bool {
        true
    }

    fn backend() -> Option<&'static LlamaBackend> {
        match BACKEND.get_or_try_init(LlamaBackend::init) {
            Ok(backend) => Some(backend),
            Err(err) => {
                tracing::warn!("llama backend init failed: {err}");
                None
            }
        }
    }

    pub(super) fn load(path: &Path) -> Option<LoadedModel> {
        let backend = backend()?;
        let params = LlamaModelParams::default();
        match LlamaModel::load_from_file(backend, path, &params) {
            Ok(model) => Some(LoadedModel { model }),
            Err(err) => {
                tracing::warn!("failed to load embedding model {}: {err}", path.display());
                None
            }
        }
    }

    pub(super) fn embed(loaded: &LoadedModel, text: &str) -> Option<Vec<f32>> {
        let backend = backend()?;
        let params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(EMBED_CTX_TOKENS))
            .with_n_batch(EMBED_CTX_TOKENS)
            .with_embeddings(true)
            .with_pooling_type(LlamaPoolingType::Last);
        let mut ctx = match loaded.model.new_context(backend, params) {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::warn!("embedding context allocation failed: {err}");
                return None;
            }
        };

        let mut tokens = match loaded.model.str_to_token(text, AddBos::Always) {
            Ok(tokens) => tokens,
            Err(err) => {
                tracing::warn!("embedding tokenization failed: {err}");
                return None;
            }
        };
        if tokens.is_empty() {
            tracing::warn!("embedding input tokenized to nothing");
            return None;
        }
        tokens.truncate(EMBED_CTX_TOKENS as usize);

        let mut batch = LlamaBatch::new(tokens.len(), 1);
        if let Err(err) = batch.add_sequence(&tokens, 0, false) {
            tracing::warn!("embedding batch setup failed: {err}");
            return None;
        }
        if let Err(err) = ctx.decode(&mut batch) {
            tracing::warn!("embedding decode failed: {err}");
            return None;
        }

        match ctx.embeddings_seq_ith(0) {
            Ok(values) => Some(l2_normalize(values.to_vec())),
            Err(err) => {
                tracing::warn!("embedding readback failed: {err}");
                None
            }
        }
    }
}

#[cfg(not(feature = "local-embedding"))]
mod native {
    use std::path::Path;

    pub(super) struct LoadedModel;

    pub(super) fn supported() -> bool {
        false
    }

    pub(super) fn load(_path: &Path) -> Option<LoadedModel> {
        tracing::warn!("local embedding support is not compiled in");
        None
    }

    pub(super) fn embed(_loaded: &LoadedModel, _text: &str) -> Option<Vec<f32>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCaps {
        arm64: bool,
        memory: u64,
    }

    impl DeviceCapabilities for FakeCaps {
        fn has_arm64_cpu(&self) -> bool {
            self.arm64
        }
        fn total_memory_bytes(&self) -> u64 {
            self.memory
        }
    }

    #[test]
    fn l2_normalize_produces_unit_vectors() {
        let normalized = l2_normalize(vec![3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
        let norm: f32 = normalized.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_passes_zero_vector_through() {
        assert_eq!(l2_normalize(vec![0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn availability_requires_all_gates() {
        let weak_memory = FakeCaps {
            arm64: true,
            memory: 4 * 1024 * 1024 * 1024,
        };
        assert!(!LocalEmbeddingEngine::is_available(&weak_memory));

        let wrong_cpu = FakeCaps {
            arm64: false,
            memory: 16 * 1024 * 1024 * 1024,
        };
        assert!(!LocalEmbeddingEngine::is_available(&wrong_cpu));
    }

    #[cfg(not(feature = "local-embedding"))]
    #[test]
    fn embed_without_native_support_returns_none() {
        let engine = LocalEmbeddingEngine::new();
        assert_eq!(
            engine.embed(std::path::Path::new("/nonexistent.gguf"), "text"),
            None
        );
    }
}
