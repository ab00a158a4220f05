use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use studyrag_core::{RagIndexFile, Result, INDEX_FILE_VERSION};

pub const INDEX_DIR: &str = "rag_indexes";

/// One JSON index file per document under `<data>/rag_indexes/`. Writes go
/// through a temp file and rename, so a failed save leaves the previous
/// index intact.
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(INDEX_DIR),
        }
    }

    fn file_path(&self, doc_id: &str) -> PathBuf {
        self.dir.join(format!("rag_index_{doc_id}.json"))
    }

    pub fn exists(&self, doc_id: &str) -> bool {
        self.file_path(doc_id).is_file()
    }

    pub fn remove(&self, doc_id: &str) -> Result<()> {
        match fs::remove_file(self.file_path(doc_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, doc_id: &str, index: &RagIndexFile) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec(index)?;
        let mut staged = tempfile::NamedTempFile::new_in(&self.dir)?;
        staged.write_all(&json)?;
        staged
            .persist(self.file_path(doc_id))
            .map_err(|err| err.error)?;
        Ok(())
    }

    /// Load a document's index. Corrupt JSON, an unknown version, or a
    /// mismatched document id all read as "not indexed".
    pub fn load(&self, doc_id: &str) -> Option<RagIndexFile> {
        let raw = fs::read(self.file_path(doc_id)).ok()?;
        let parsed: RagIndexFile = match serde_json::from_slice(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!("corrupt index file for {doc_id}: {err}");
                return None;
            }
        };
        if parsed.version != INDEX_FILE_VERSION {
            tracing::warn!(
                "index file for {doc_id} has unsupported version {}",
                parsed.version
            );
            return None;
        }
        if parsed.doc_id != doc_id {
            tracing::warn!(
                "index file for {doc_id} names document {}",
                parsed.doc_id
            );
            return None;
        }
        Some(parsed)
    }
}
