mod local;
mod remote;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use studyrag_core::{RagError, Result};

use crate::host::{
    DeviceCapabilities, EmbeddingConfig, EmbeddingMode, HostEnvironment, SettingsProvider,
};

pub use local::LocalEmbeddingEngine;
pub use remote::RemoteEmbeddingClient;

/// Instruction wrapper applied to query-side embeddings only; chunk texts
/// are embedded verbatim.
pub const QUERY_INSTRUCTION: &str =
    "Instruct: Given a web search query, retrieve relevant passages that answer the query\nQuery:";

pub fn query_prompt(query: &str) -> String {
    format!("{QUERY_INSTRUCTION}{query}")
}

/// One side of the embedding backend. `None` means this call failed; the
/// resolver decides whether that is recoverable.
pub trait PassageEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Resolved embedding backend for one build or query. Carries the local
/// engine when policy and device allow it, and the remote client when the
/// remote config is valid; a local failure permanently demotes the backend
/// to remote for its remaining lifetime.
pub struct EmbeddingBackend {
    local: Option<Arc<dyn PassageEmbedder>>,
    remote: Option<Arc<dyn PassageEmbedder>>,
    use_local: bool,
}

impl EmbeddingBackend {
    /// Resolve per configured policy and device capability. Returns `None`
    /// when neither backend is usable; callers surface the unconfigured
    /// state to the user.
    pub fn resolve(
        settings: &dyn SettingsProvider,
        host: &dyn HostEnvironment,
        caps: &dyn DeviceCapabilities,
        engine: Arc<LocalEmbeddingEngine>,
    ) -> Option<Self> {
        let remote_config = settings.embedding_config();
        let remote: Option<Arc<dyn PassageEmbedder>> = if remote_config.is_valid() {
            Some(Arc::new(RemoteEmbedder {
                client: RemoteEmbeddingClient::new(),
                config: remote_config,
            }))
        } else {
            None
        };

        let local: Option<Arc<dyn PassageEmbedder>> = if settings.embedding_mode()
            == EmbeddingMode::LocalPreferred
            && LocalEmbeddingEngine::is_available(caps)
        {
            ensure_local_model(settings, host).map(|model_path| {
                Arc::new(LocalEmbedder { engine, model_path }) as Arc<dyn PassageEmbedder>
            })
        } else {
            None
        };

        let use_local = local.is_some();
        if !use_local && remote.is_none() {
            return None;
        }
        Some(Self {
            local,
            remote,
            use_local,
        })
    }

    /// Assemble a backend from explicit parts. Hosts with their own
    /// embedders (and tests) plug in here.
    pub fn from_parts(
        local: Option<Arc<dyn PassageEmbedder>>,
        remote: Option<Arc<dyn PassageEmbedder>>,
    ) -> Self {
        let use_local = local.is_some();
        Self {
            local,
            remote,
            use_local,
        }
    }

    pub fn uses_local(&self) -> bool {
        self.use_local
    }

    /// Embed one chunk text. A local failure falls back to the remote
    /// backend for this and every later call; with no remote configured
    /// the failure is fatal to the build.
    pub fn embed_passage(&mut self, text: &str) -> Result<Vec<f32>> {
        if self.use_local {
            if let Some(local) = &self.local {
                if let Some(vector) = local.embed(text) {
                    return Ok(vector);
                }
                tracing::warn!("local embedding failed, switching to remote backend");
                self.use_local = false;
            }
        }
        let remote = self.remote.as_ref().ok_or_else(|| {
            RagError::Embedding("本地嵌入失败，且未配置远程嵌入模型".to_string())
        })?;
        remote
            .embed(text)
            .ok_or_else(|| RagError::Embedding("远程嵌入服务调用失败".to_string()))
    }

    /// Embed a search query: same backends, query-side instruction prefix.
    pub fn embed_query(&mut self, query: &str) -> Result<Vec<f32>> {
        self.embed_passage(&query_prompt(query))
    }
}

/// Materialize the bundled model file under `<data>/models/` on first use.
fn ensure_local_model(
    settings: &dyn SettingsProvider,
    host: &dyn HostEnvironment,
) -> Option<PathBuf> {
    let file_name = settings.local_model_file();
    if file_name.trim().is_empty() {
        return None;
    }
    let target = host.data_dir().join("models").join(&file_name);
    if target.exists() {
        return Some(target);
    }
    let asset = host.model_asset(&file_name)?;
    if let Some(parent) = target.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            tracing::warn!("failed to create model directory: {err}");
            return None;
        }
    }
    match fs::copy(&asset, &target) {
        Ok(_) => Some(target),
        Err(err) => {
            tracing::warn!(
                "failed to materialize embedding model {}: {err}",
                target.display()
            );
            None
        }
    }
}

struct LocalEmbedder {
    engine: Arc<LocalEmbeddingEngine>,
    model_path: PathBuf,
}

impl PassageEmbedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.engine.embed(&self.model_path, text)
    }
}

struct RemoteEmbedder {
    client: RemoteEmbeddingClient,
    config: EmbeddingConfig,
}

impl PassageEmbedder for RemoteEmbedder {
    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.client.embed(text, &self.config)
    }
}
