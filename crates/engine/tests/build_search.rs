use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use studyrag_core::{
    estimate_tokens, DocumentDescriptor, DocumentKind, IndexProgress, IndexStage, RagChunk,
    RagIndexFile, INDEX_FILE_VERSION,
};
use studyrag_engine::{
    DeviceCapabilities, EmbeddingBackend, EmbeddingConfig, EmbeddingMode, HostEnvironment,
    IndexBuilder, IndexStore, PassageEmbedder, SearchEngine, SettingsProvider,
};
use studyrag_llm::{ProviderConfig, ProviderKind};

struct FakeSettings {
    mode: EmbeddingMode,
    remote: EmbeddingConfig,
}

impl SettingsProvider for FakeSettings {
    fn embedding_mode(&self) -> EmbeddingMode {
        self.mode
    }
    fn embedding_config(&self) -> EmbeddingConfig {
        self.remote.clone()
    }
    fn vision_provider(&self) -> ProviderConfig {
        ProviderConfig {
            kind: ProviderKind::OpenAiStyle,
            api_url: "http://127.0.0.1:9/v1".to_string(),
            api_key: "unused".to_string(),
            model: "vision-model".to_string(),
            max_context_tokens: 4096,
            enabled: true,
        }
    }
    fn local_model_file(&self) -> String {
        "qwen3-embedding-0.6b-q8.gguf".to_string()
    }
}

struct FakeHost {
    dir: PathBuf,
}

impl HostEnvironment for FakeHost {
    fn data_dir(&self) -> PathBuf {
        self.dir.clone()
    }
    fn model_asset(&self, _file_name: &str) -> Option<PathBuf> {
        None
    }
}

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

/// Embedder that succeeds with a fixed unit vector until `fail_from`
/// calls have happened, then fails forever.
struct ScriptedEmbedder {
    vector: Vec<f32>,
    fail_from: usize,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    fn always(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            fail_from: usize::MAX,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing_from(fail_from: usize, vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            fail_from,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PassageEmbedder for ScriptedEmbedder {
    fn embed(&self, _text: &str) -> Option<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_from {
            None
        } else {
            Some(self.vector.clone())
        }
    }
}

fn recorder() -> (
    Arc<Mutex<Vec<IndexProgress>>>,
    impl Fn(IndexProgress) + Send + Sync,
) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |progress| {
        sink.lock().unwrap().push(progress);
    })
}

fn text_document(dir: &std::path::Path, id: &str, content: &str) -> DocumentDescriptor {
    let path = dir.join(format!("{id}.txt"));
    std::fs::write(&path, content).unwrap();
    DocumentDescriptor {
        id: id.to_string(),
        path,
        kind: DocumentKind::PlainText,
        name: format!("{id}.txt"),
    }
}

fn remote_only_settings() -> FakeSettings {
    FakeSettings {
        mode: EmbeddingMode::RemoteOnly,
        remote: EmbeddingConfig {
            api_url: "http://127.0.0.1:9/v1/embeddings".to_string(),
            api_key: "key".to_string(),
            model: "embedding-model".to_string(),
        },
    }
}

fn capable_device() -> FakeCaps {
    FakeCaps {
        arm64: true,
        memory: 16 * 1024 * 1024 * 1024,
    }
}

#[tokio::test]
async fn plain_text_builds_one_chunk_and_is_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let content = "This is paragraph one.\n\nThis is paragraph two.";
    let document = text_document(dir.path(), "doc1", content);

    let settings = remote_only_settings();
    let host = FakeHost {
        dir: dir.path().to_path_buf(),
    };
    let caps = capable_device();
    let store = IndexStore::new(dir.path());
    let local_engine = Arc::new(studyrag_engine::LocalEmbeddingEngine::new());

    let builder = IndexBuilder::new(&settings, &host, &caps, &store, Arc::clone(&local_engine));
    let remote = ScriptedEmbedder::always(vec![1.0, 0.0, 0.0]);
    let backend =
        EmbeddingBackend::from_parts(None, Some(remote.clone() as Arc<dyn PassageEmbedder>));

    let (events, on_progress) = recorder();
    let result = builder
        .build_with_backend(&document, backend, &on_progress)
        .await
        .unwrap();

    assert_eq!(result.chunk_count, 1);
    assert_eq!(result.estimated_tokens, estimate_tokens(content));
    assert!(store.exists("doc1"));

    let index = store.load("doc1").unwrap();
    assert_eq!(index.version, INDEX_FILE_VERSION);
    assert_eq!(index.chunks.len(), 1);
    assert_eq!(index.chunks[0].id, "chunk_doc1_0");
    let widths: Vec<usize> = index.chunks.iter().map(|c| c.vector.len()).collect();
    assert!(widths.iter().all(|w| *w == widths[0] && *w > 0));
    for chunk in &index.chunks {
        let norm: f32 = chunk.vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((0.98..=1.02).contains(&norm));
        assert!(!chunk.text.trim().is_empty());
        assert!(chunk.text.chars().count() <= 800);
    }

    let stages: Vec<IndexStage> = events.lock().unwrap().iter().map(|e| e.stage).collect();
    let order = [
        IndexStage::Chunking,
        IndexStage::Vectorizing,
        IndexStage::Saving,
        IndexStage::Completed,
    ];
    let mut cursor = 0;
    for stage in &stages {
        if cursor < order.len() && *stage == order[cursor] {
            cursor += 1;
        }
    }
    assert_eq!(cursor, order.len(), "stage order was {stages:?}");

    // The one chunk comes back with a score of ~1 for any query the fake
    // embedder maps onto the same unit vector.
    let search = SearchEngine::new(&settings, &host, &caps, &store, local_engine);
    let mut query_backend = EmbeddingBackend::from_parts(
        None,
        Some(ScriptedEmbedder::always(vec![1.0, 0.0, 0.0]) as Arc<dyn PassageEmbedder>),
    );
    let matches = search.search_with_backend(
        "paragraph two",
        &["doc1".to_string()],
        5,
        &mut query_backend,
    );
    assert_eq!(matches.len(), 1);
    assert!((matches[0].score - 1.0).abs() < 1e-6);
    assert!(matches[0].chunk.text.contains("paragraph two"));
}

#[tokio::test]
async fn local_failure_falls_back_to_remote_for_remaining_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let content =
        "part one[[SECTION_END]]part two[[SECTION_END]]part three[[SECTION_END]]part four[[SECTION_END]]part five";
    let document = text_document(dir.path(), "doc2", content);

    let settings = remote_only_settings();
    let host = FakeHost {
        dir: dir.path().to_path_buf(),
    };
    let caps = capable_device();
    let store = IndexStore::new(dir.path());
    let local_engine = Arc::new(studyrag_engine::LocalEmbeddingEngine::new());
    let builder = IndexBuilder::new(&settings, &host, &caps, &store, local_engine);

    let local = ScriptedEmbedder::failing_from(2, vec![0.0, 1.0]);
    let remote = ScriptedEmbedder::always(vec![1.0, 0.0]);
    let backend = EmbeddingBackend::from_parts(
        Some(local.clone() as Arc<dyn PassageEmbedder>),
        Some(remote.clone() as Arc<dyn PassageEmbedder>),
    );

    let (_events, on_progress) = recorder();
    let result = builder
        .build_with_backend(&document, backend, &on_progress)
        .await
        .unwrap();

    assert_eq!(result.chunk_count, 5);
    // Chunks 0 and 1 went local; the failure on chunk 2 switched the rest
    // to the remote backend.
    assert_eq!(local.call_count(), 3);
    assert_eq!(remote.call_count(), 3);

    let index = store.load("doc2").unwrap();
    assert_eq!(index.chunks[0].vector, vec![0.0, 1.0]);
    assert_eq!(index.chunks[1].vector, vec![0.0, 1.0]);
    for chunk in &index.chunks[2..] {
        assert_eq!(chunk.vector, vec![1.0, 0.0]);
    }
}

#[tokio::test]
async fn local_failure_without_remote_aborts_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let content = "alpha[[SECTION_END]]beta[[SECTION_END]]gamma";
    let document = text_document(dir.path(), "doc3", content);

    let settings = remote_only_settings();
    let host = FakeHost {
        dir: dir.path().to_path_buf(),
    };
    let caps = capable_device();
    let store = IndexStore::new(dir.path());
    let local_engine = Arc::new(studyrag_engine::LocalEmbeddingEngine::new());
    let builder = IndexBuilder::new(&settings, &host, &caps, &store, local_engine);

    let local = ScriptedEmbedder::failing_from(1, vec![0.0, 1.0]) as Arc<dyn PassageEmbedder>;
    let backend = EmbeddingBackend::from_parts(Some(local), None);

    let (events, on_progress) = recorder();
    let err = builder
        .build_with_backend(&document, backend, &on_progress)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("embedding failed"));
    assert!(!store.exists("doc3"));
    let stages: Vec<IndexStage> = events.lock().unwrap().iter().map(|e| e.stage).collect();
    assert_eq!(stages.last(), Some(&IndexStage::Error));
}

#[tokio::test]
async fn unconfigured_backend_reports_error_and_zero_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let document = text_document(dir.path(), "doc4", "content");

    let settings = FakeSettings {
        mode: EmbeddingMode::RemoteOnly,
        remote: EmbeddingConfig::default(),
    };
    let host = FakeHost {
        dir: dir.path().to_path_buf(),
    };
    let caps = capable_device();
    let store = IndexStore::new(dir.path());
    let local_engine = Arc::new(studyrag_engine::LocalEmbeddingEngine::new());
    let builder = IndexBuilder::new(&settings, &host, &caps, &store, local_engine);

    let (events, on_progress) = recorder();
    let result = builder.build_index(&document, &on_progress).await.unwrap();
    assert_eq!(result.chunk_count, 0);
    assert!(!store.exists("doc4"));
    let events = events.lock().unwrap();
    assert_eq!(events.first().map(|e| e.stage), Some(IndexStage::Preparing));
    assert_eq!(events.last().map(|e| e.stage), Some(IndexStage::Error));
    assert!(events.last().unwrap().message.contains("嵌入模型未配置"));
}

#[tokio::test]
async fn blank_document_reports_extraction_error() {
    let dir = tempfile::tempdir().unwrap();
    let document = text_document(dir.path(), "doc5", "   \n  \n");

    let settings = remote_only_settings();
    let host = FakeHost {
        dir: dir.path().to_path_buf(),
    };
    let caps = capable_device();
    let store = IndexStore::new(dir.path());
    let local_engine = Arc::new(studyrag_engine::LocalEmbeddingEngine::new());
    let builder = IndexBuilder::new(&settings, &host, &caps, &store, local_engine);

    let backend = EmbeddingBackend::from_parts(
        None,
        Some(ScriptedEmbedder::always(vec![1.0]) as Arc<dyn PassageEmbedder>),
    );
    let (events, on_progress) = recorder();
    let result = builder
        .build_with_backend(&document, backend, &on_progress)
        .await
        .unwrap();
    assert_eq!(result.chunk_count, 0);
    assert!(!store.exists("doc5"));
    let events = events.lock().unwrap();
    assert!(events.last().unwrap().message.contains("未识别到有效文本"));
}

#[test]
fn remote_only_policy_never_uses_local() {
    let dir = tempfile::tempdir().unwrap();
    let settings = remote_only_settings();
    let host = FakeHost {
        dir: dir.path().to_path_buf(),
    };
    // Device passes every local gate; policy must still win.
    let caps = capable_device();
    let local_engine = Arc::new(studyrag_engine::LocalEmbeddingEngine::new());
    let backend =
        EmbeddingBackend::resolve(&settings, &host, &caps, local_engine).expect("remote is valid");
    assert!(!backend.uses_local());
}

#[test]
fn search_orders_by_score_with_stable_ties() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::new(dir.path());
    let settings = remote_only_settings();
    let host = FakeHost {
        dir: dir.path().to_path_buf(),
    };
    let caps = capable_device();

    let index_a = RagIndexFile {
        version: INDEX_FILE_VERSION,
        doc_id: "a".to_string(),
        token_estimate: 10,
        chunks: vec![
            chunk("a", 0, vec![1.0, 0.0]),
            chunk("a", 1, vec![0.6, 0.8]),
        ],
    };
    let index_b = RagIndexFile {
        version: INDEX_FILE_VERSION,
        doc_id: "b".to_string(),
        token_estimate: 10,
        chunks: vec![chunk("b", 0, vec![1.0, 0.0])],
    };
    store.save("a", &index_a).unwrap();
    store.save("b", &index_b).unwrap();

    let local_engine = Arc::new(studyrag_engine::LocalEmbeddingEngine::new());
    let search = SearchEngine::new(&settings, &host, &caps, &store, local_engine);
    let mut backend = EmbeddingBackend::from_parts(
        None,
        Some(ScriptedEmbedder::always(vec![1.0, 0.0]) as Arc<dyn PassageEmbedder>),
    );
    let ids = vec!["a".to_string(), "b".to_string(), "missing".to_string()];
    let matches = search.search_with_backend("查询", &ids, 10, &mut backend);

    let order: Vec<&str> = matches.iter().map(|m| m.chunk.id.as_str()).collect();
    // The two perfect matches tie and resolve by (doc_id, ordinal).
    assert_eq!(order, vec!["chunk_a_0", "chunk_b_0", "chunk_a_1"]);
    assert!(matches[0].score >= matches[1].score);
    assert!(matches[1].score >= matches[2].score);

    let top2 = search.search_with_backend(
        "查询",
        &ids,
        2,
        &mut EmbeddingBackend::from_parts(
            None,
            Some(ScriptedEmbedder::always(vec![1.0, 0.0]) as Arc<dyn PassageEmbedder>),
        ),
    );
    assert_eq!(top2.len(), 2);
}

#[test]
fn blank_query_and_empty_ids_return_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::new(dir.path());
    let settings = remote_only_settings();
    let host = FakeHost {
        dir: dir.path().to_path_buf(),
    };
    let caps = capable_device();
    let local_engine = Arc::new(studyrag_engine::LocalEmbeddingEngine::new());
    let search = SearchEngine::new(&settings, &host, &caps, &store, local_engine);
    assert!(search.search("  ", &["a".to_string()], 5).is_empty());
    assert!(search.search("query", &[], 5).is_empty());
}

fn chunk(doc_id: &str, ordinal: usize, vector: Vec<f32>) -> RagChunk {
    RagChunk {
        id: RagChunk::chunk_id(doc_id, ordinal),
        doc_id: doc_id.to_string(),
        text: format!("chunk {ordinal} of {doc_id}"),
        page_start: None,
        page_end: None,
        vector,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn index_files_round_trip_through_the_store(
        texts in prop::collection::vec("[a-z甲乙丙 ]{1,40}", 1..8),
        seed in 0.1f32..10.0,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let chunks: Vec<RagChunk> = texts
            .iter()
            .enumerate()
            .map(|(idx, text)| RagChunk {
                id: RagChunk::chunk_id("doc", idx),
                doc_id: "doc".to_string(),
                text: text.clone(),
                page_start: Some(idx as u32 + 1),
                page_end: Some(idx as u32 + 1),
                vector: vec![seed, seed * 0.5, -seed],
            })
            .collect();
        let index = RagIndexFile {
            version: INDEX_FILE_VERSION,
            doc_id: "doc".to_string(),
            token_estimate: texts.iter().map(|t| estimate_tokens(t)).sum(),
            chunks,
        };
        store.save("doc", &index).unwrap();
        let loaded = store.load("doc").unwrap();
        prop_assert_eq!(loaded, index);
    }
}
