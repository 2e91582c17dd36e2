use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bankrag_core::config::{ChunkingConfig, IndexConfig, ProviderSettings};
use bankrag_core::data_processor::DataProcessor;
use bankrag_core::error::{Error, Result};
use bankrag_core::traits::{EmbedProvider, Generator};
use bankrag_core::types::{Document, TaggedChunk};
use bankrag_provider::{LocalEmbedProvider, ProviderFactory, ProviderRegistry};
use bankrag_vector::table::{open_db, set_meta};
use bankrag_vector::IndexManager;
use tempfile::TempDir;

fn docs_dir() -> PathBuf {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap().to_path_buf();
    root.join("test_data/docs")
}

fn fake_settings(dim: usize) -> ProviderSettings {
    let mut s = ProviderSettings { use_fake_embeddings: true, ..ProviderSettings::default() };
    s.local.fake_dim = dim;
    s
}

fn corpus() -> Vec<TaggedChunk> {
    DataProcessor::new(ChunkingConfig::default()).unwrap().process_directory(&docs_dir()).expect("process")
}

fn tagged(name: &str, text: &str) -> Vec<TaggedChunk> {
    DataProcessor::new(ChunkingConfig::default()).unwrap().process_document(&Document::new(name, text))
}

async fn manager(dir: &TempDir, registry: Arc<ProviderRegistry>) -> IndexManager {
    IndexManager::open_at(dir.path(), &IndexConfig::default(), registry).await.expect("open")
}

/// Hashing embeddings that fail on any text containing `FALLA`.
struct FailingEmbedder {
    inner: LocalEmbedProvider,
    short_vectors: bool,
}

#[async_trait]
impl EmbedProvider for FailingEmbedder {
    fn embedder_id(&self) -> &str { "test:failing" }

    fn dim(&self) -> usize { self.inner.dim() }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("FALLA") {
            if self.short_vectors {
                return Ok(vec![0.5; 3]);
            }
            return Err(Error::connection("embedding backend went away"));
        }
        self.inner.embed(text).await
    }
}

struct FailingFactory {
    short_vectors: bool,
}

#[async_trait]
impl ProviderFactory for FailingFactory {
    async fn create_embedder(&self, settings: &ProviderSettings) -> Result<Arc<dyn EmbedProvider>> {
        Ok(Arc::new(FailingEmbedder {
            inner: LocalEmbedProvider::hashing(settings.local.fake_dim),
            short_vectors: self.short_vectors,
        }))
    }

    async fn create_generator(&self, _settings: &ProviderSettings) -> Result<Arc<dyn Generator>> {
        Err(Error::config("no generator in this test"))
    }
}

#[tokio::test]
async fn three_documents_build_and_report_stats() {
    let chunks = corpus();
    let doc_ids: std::collections::HashSet<_> = chunks.iter().map(|c| c.chunk.doc_id.clone()).collect();
    assert_eq!(doc_ids.len(), 3);
    assert!(chunks.len() >= 3);
    assert!(chunks.iter().all(|c| c.chunk.char_len <= 800));

    let tmp = TempDir::new().unwrap();
    let registry = Arc::new(ProviderRegistry::new(fake_settings(384)).unwrap());
    let index = manager(&tmp, registry.clone()).await;
    assert!(!index.exists());

    let report = index.build(&chunks).await.expect("build");
    assert_eq!(report.records, chunks.len());
    assert_eq!(report.dim, 384);
    assert!(report.replaced.is_none());

    let stats = index.stats();
    assert_eq!(stats.records, chunks.len());
    assert_eq!(stats.dim, 384);
    assert_eq!(stats.categories.values().sum::<usize>(), chunks.len());
    assert!(stats.categories.contains_key("inversiones_renta_fija"));
    assert!(stats.categories.contains_key("faq"));

    let validity = index.validate().await.expect("validate");
    assert!(validity.valid, "problems: {:?}", validity.problems);
    assert_eq!(validity.records, chunks.len());
    assert_eq!(validity.index_dim, Some(384));

    // a fresh manager over the same directory sees the same generation
    let reopened = manager(&tmp, registry).await;
    assert!(reopened.exists());
    assert_eq!(reopened.stats().records, chunks.len());
    assert_eq!(reopened.stats().generation, stats.generation);
    let first = reopened.snapshot().unwrap();
    assert_eq!(first.records()[0].chunk.id, chunks[0].chunk.id);
    assert_eq!(first.records()[0].metadata, chunks[0].metadata);
}

#[tokio::test]
async fn switching_to_a_wider_provider_is_a_dimension_mismatch() {
    let tmp = TempDir::new().unwrap();
    let registry = Arc::new(ProviderRegistry::new(fake_settings(384)).unwrap());
    let index = manager(&tmp, registry.clone()).await;
    index.build(&corpus()).await.expect("build");

    registry.reconfigure(fake_settings(1536)).await.unwrap();

    match index.validate().await {
        Err(Error::DimensionMismatch { index_dim, provider_dim }) => {
            assert_eq!(index_dim, 384);
            assert_eq!(provider_dim, 1536);
        }
        other => panic!("expected dimension mismatch, got {other:?}"),
    }
    let query = registry.embedder().await.unwrap().embed("¿Qué es un CDT?").await.unwrap();
    assert!(matches!(index.query(&query, 20), Err(Error::DimensionMismatch { .. })));
}

#[tokio::test]
async fn empty_corpus_and_empty_index() {
    let tmp = TempDir::new().unwrap();
    let registry = Arc::new(ProviderRegistry::new(fake_settings(64)).unwrap());
    let index = manager(&tmp, registry).await;

    assert!(matches!(index.build(&[]).await, Err(Error::Build(_))));
    assert!(matches!(index.query(&[0.0; 64], 5), Err(Error::EmptyIndex)));

    let validity = index.validate().await.expect("validate");
    assert!(!validity.exists);
    assert!(!validity.valid);
    assert_eq!(validity.records, 0);
    assert!(index.generations().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_rebuild_leaves_previous_index_live() {
    for short_vectors in [false, true] {
        let tmp = TempDir::new().unwrap();
        let registry =
            Arc::new(ProviderRegistry::with_factory(fake_settings(128), Arc::new(FailingFactory { short_vectors })).unwrap());
        let index = manager(&tmp, registry).await;

        let good = tagged("/docs/cuentas.md", "# Cuentas\nLa cuenta de ahorros paga intereses mensuales.");
        let first = index.build(&good).await.expect("first build");

        let mut bad = corpus();
        bad.extend(tagged("/docs/roto.md", "# Roto\nFALLA al embeber este texto."));
        assert!(matches!(index.build(&bad).await, Err(Error::Build(_))));

        let stats = index.stats();
        assert_eq!(stats.generation.as_deref(), Some(first.generation.as_str()));
        assert_eq!(stats.records, good.len());
        assert_eq!(index.generations().await.unwrap(), vec![first.generation.clone()]);
        assert!(index.validate().await.unwrap().valid);
        assert_eq!(index.query(&[1.0; 128], 5).unwrap().len(), good.len());
    }
}

#[tokio::test]
async fn rebuild_swaps_generation_and_prunes_the_old_one() {
    let tmp = TempDir::new().unwrap();
    let registry = Arc::new(ProviderRegistry::new(fake_settings(96)).unwrap());
    let index = manager(&tmp, registry).await;

    let first = index.build(&tagged("/docs/a.md", "# Tarjetas\nTarjeta de crédito clásica.")).await.unwrap();
    let second = index.build(&corpus()).await.unwrap();

    assert_ne!(first.generation, second.generation);
    assert_eq!(second.replaced.as_deref(), Some(first.generation.as_str()));
    assert_eq!(index.generations().await.unwrap(), vec![second.generation.clone()]);
    assert_eq!(index.stats().records, second.records);
}

#[tokio::test]
async fn equal_scores_keep_insertion_order() {
    let tmp = TempDir::new().unwrap();
    let registry = Arc::new(ProviderRegistry::new(fake_settings(256)).unwrap());
    let index = manager(&tmp, registry.clone()).await;

    let mut chunks = tagged("/docs/uno.md", "Horario de oficinas de lunes a viernes.");
    chunks.extend(tagged("/docs/dos.md", "Horario de oficinas de lunes a viernes."));
    chunks.extend(tagged("/docs/tres.md", "Seguro de depósitos."));
    index.build(&chunks).await.unwrap();

    let q = registry.embedder().await.unwrap().embed("horario de oficinas").await.unwrap();
    let hits = index.query(&q, 3).unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].score, hits[1].score);
    assert_eq!(hits[0].record.chunk.doc_id, "uno");
    assert_eq!(hits[1].record.chunk.doc_id, "dos");
    assert_eq!(hits.iter().map(|h| h.rank).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn validate_during_rebuilds_sees_a_complete_generation() {
    let tmp = TempDir::new().unwrap();
    let registry = Arc::new(ProviderRegistry::new(fake_settings(64)).unwrap());
    let index = Arc::new(manager(&tmp, registry).await);
    let chunks = corpus();
    index.build(&chunks).await.unwrap();

    let builder = {
        let index = index.clone();
        let chunks = chunks.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                index.build(&chunks).await.expect("rebuild");
            }
        })
    };
    loop {
        let report = index.validate().await.expect("validate");
        assert!(report.valid, "problems: {:?}", report.problems);
        assert_eq!(report.records, chunks.len());
        if builder.is_finished() {
            break;
        }
    }
    builder.await.unwrap();
    assert_eq!(index.generations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn unreadable_pointer_discards_the_new_generation() {
    let tmp = TempDir::new().unwrap();
    let registry = Arc::new(ProviderRegistry::new(fake_settings(32)).unwrap());
    let index = manager(&tmp, registry).await;

    let conn = open_db(&tmp.path().to_string_lossy()).await.unwrap();
    set_meta(&conn, &format!("active:{}", index.alias()), "{not json").await.unwrap();

    let chunks = tagged("/docs/cuentas.md", "# Cuentas\nLa cuenta corriente permite sobregiro.");
    assert!(matches!(index.build(&chunks).await, Err(Error::Serialization(_))));
    assert!(index.generations().await.unwrap().is_empty());
    assert!(!index.exists());
}
