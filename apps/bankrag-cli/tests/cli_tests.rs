use std::path::PathBuf;
use std::sync::Arc;

use bankrag_cli::{inspect_index, open_retriever, RebuildOptions};
use bankrag_core::config::{ChunkingConfig, IndexConfig, ProviderSettings, RetrievalConfig, Settings};
use bankrag_core::data_processor::DataProcessor;
use bankrag_core::error::Error;
use bankrag_provider::ProviderRegistry;
use bankrag_vector::IndexManager;
use tempfile::TempDir;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| (*a).to_string()).collect()
}

fn docs_dir() -> PathBuf {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap().to_path_buf();
    root.join("test_data/docs")
}

fn fake_registry(dim: usize) -> Arc<ProviderRegistry> {
    let mut settings = ProviderSettings { use_fake_embeddings: true, ..ProviderSettings::default() };
    settings.local.fake_dim = dim;
    Arc::new(ProviderRegistry::new(settings).unwrap())
}

#[test]
fn inspect_alone_is_read_only() {
    let opts = RebuildOptions::parse(&args(&["--inspect"])).unwrap();
    assert!(opts.inspect_only());

    let opts = RebuildOptions::parse(&args(&["--inspect", "--force", "docs"])).unwrap();
    assert!(!opts.inspect_only());
    assert_eq!(opts.docs_dir, Some(PathBuf::from("docs")));

    let opts = RebuildOptions::parse(&args(&["--limit", "3", "-v"])).unwrap();
    assert_eq!(opts.limit, Some(3));
    assert!(opts.verbose && !opts.inspect_only());
}

#[test]
fn bad_flags_are_rejected() {
    assert!(RebuildOptions::parse(&args(&["--limit"])).is_err());
    assert!(RebuildOptions::parse(&args(&["--limit", "many"])).is_err());
    assert!(RebuildOptions::parse(&args(&["--rebuild"])).is_err());
}

#[tokio::test]
async fn inspecting_a_built_index_keeps_its_generation() {
    let tmp = TempDir::new().unwrap();
    let registry = fake_registry(64);
    let index = IndexManager::open_at(tmp.path(), &IndexConfig::default(), registry.clone()).await.unwrap();
    let chunks = DataProcessor::new(ChunkingConfig::default()).unwrap().process_directory(&docs_dir()).unwrap();
    let built = index.build(&chunks).await.unwrap();
    let index = Arc::new(index);

    let valid = inspect_index(&index, registry, &RetrievalConfig::default()).await.unwrap();
    assert!(valid);
    assert_eq!(index.generations().await.unwrap(), vec![built.generation]);
    assert_eq!(index.stats().records, built.records);
}

#[tokio::test]
async fn inspecting_a_missing_index_builds_nothing() {
    let tmp = TempDir::new().unwrap();
    let registry = fake_registry(64);
    let index = Arc::new(IndexManager::open_at(tmp.path(), &IndexConfig::default(), registry.clone()).await.unwrap());

    let valid = inspect_index(&index, registry, &RetrievalConfig::default()).await.unwrap();
    assert!(!valid);
    assert!(!index.exists());
    assert!(index.generations().await.unwrap().is_empty());
}

fn unreachable_generator_settings(tmp: &TempDir) -> Settings {
    let mut settings = Settings { use_fake_embeddings: true, ..Settings::default() };
    settings.local.fake_dim = 32;
    settings.local.ollama_url = "http://127.0.0.1:9".to_string();
    settings.local.timeout_secs = 1;
    settings.paths.index_dir = tmp.path().join("vectorstore").to_string_lossy().into_owned();
    settings
}

#[tokio::test]
async fn answer_mode_fails_on_the_generator_before_opening_the_index() {
    let tmp = TempDir::new().unwrap();
    let settings = unreachable_generator_settings(&tmp);

    let err = match open_retriever(&settings, true).await {
        Err(err) => err,
        Ok(_) => panic!("expected the generator check to fail"),
    };
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Connection(_))), "got {err:#}");
    assert!(!tmp.path().join("vectorstore").exists());
}

#[tokio::test]
async fn search_mode_does_not_need_the_generator() {
    let tmp = TempDir::new().unwrap();
    let settings = unreachable_generator_settings(&tmp);

    let retriever = open_retriever(&settings, false).await.expect("retriever without generator");
    assert!(!retriever.index().exists());
}
