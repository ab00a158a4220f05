use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use studyrag_core::DocumentDescriptor;
use studyrag_llm::ProviderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    LocalPreferred,
    RemoteOnly,
}

/// Remote embedding endpoint settings. Valid only when every field is
/// non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl EmbeddingConfig {
    pub fn is_valid(&self) -> bool {
        !self.api_url.trim().is_empty()
            && !self.api_key.trim().is_empty()
            && !self.model.trim().is_empty()
    }
}

/// Read access to the host's settings store. The host owns persistence;
/// the engine only consumes current values.
pub trait SettingsProvider: Send + Sync {
    fn embedding_mode(&self) -> EmbeddingMode;
    fn embedding_config(&self) -> EmbeddingConfig;
    /// Resolved vision-capable provider used for OCR, including the
    /// custom-provider case.
    fn vision_provider(&self) -> ProviderConfig;
    /// File name of the bundled local embedding model (GGUF).
    fn local_model_file(&self) -> String;
}

pub trait DocumentStore: Send + Sync {
    fn get_document(&self, id: &str) -> Option<DocumentDescriptor>;
}

/// Filesystem roots supplied by the host application.
pub trait HostEnvironment: Send + Sync {
    /// App-files root; `rag_indexes/` and `models/` live under it.
    fn data_dir(&self) -> PathBuf;
    /// Location of a bundled asset to materialize on first use.
    fn model_asset(&self, file_name: &str) -> Option<PathBuf>;
}

/// Capability gates for the local embedding engine.
pub trait DeviceCapabilities: Send + Sync {
    fn has_arm64_cpu(&self) -> bool;
    fn total_memory_bytes(&self) -> u64;
}

/// Probes the machine the engine is running on.
pub struct NativeCapabilities;

impl DeviceCapabilities for NativeCapabilities {
    fn has_arm64_cpu(&self) -> bool {
        std::env::consts::ARCH == "aarch64"
    }

    fn total_memory_bytes(&self) -> u64 {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        system.total_memory()
    }
}
