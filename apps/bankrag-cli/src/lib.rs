//! Shared startup for the command-line tools.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bankrag_core::config::{Config, RetrievalConfig, Settings};
use bankrag_provider::ProviderRegistry;
use bankrag_retrieval::DiversityRetriever;
use bankrag_vector::IndexManager;
use tracing_subscriber::EnvFilter;

pub const SAMPLE_QUESTION: &str = "¿Qué es un CDT?";

/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `--verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Load and validate settings from `config.toml` in the working directory.
pub fn load_settings() -> anyhow::Result<Settings> {
    let config = Config::load().context("loading configuration")?;
    let settings = config.settings()?;
    Ok(settings)
}

/// Value following `flag`, parsed; exits with a usage message when missing or invalid.
pub fn flag_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    match args.get(i + 1).and_then(|v| v.parse::<T>().ok()) {
        Some(v) => v,
        None => {
            eprintln!("Error: {flag} requires a number");
            std::process::exit(2);
        }
    }
}

/// Flags of `bankrag-rebuild`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildOptions {
    pub force: bool,
    pub inspect: bool,
    pub verbose: bool,
    pub help: bool,
    pub limit: Option<usize>,
    pub docs_dir: Option<PathBuf>,
}

impl RebuildOptions {
    /// Parse arguments after the program name.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = Self::default();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--force" | "-f" => opts.force = true,
                "--inspect" | "-i" => opts.inspect = true,
                "--verbose" | "-v" => opts.verbose = true,
                "--help" | "-h" => opts.help = true,
                "--limit" => {
                    let n = args.get(i + 1).and_then(|v| v.parse().ok());
                    opts.limit = Some(n.ok_or("--limit requires a number")?);
                    i += 1;
                }
                a if !a.starts_with('-') => opts.docs_dir = Some(PathBuf::from(a)),
                other => return Err(format!("Unknown flag: {other}")),
            }
            i += 1;
        }
        Ok(opts)
    }

    /// `--inspect` without `--force` only reads the existing index.
    pub fn inspect_only(&self) -> bool { self.inspect && !self.force }
}

/// Validate the index, print its stats and run a sample search. Never
/// writes. Returns whether the index is valid.
pub async fn inspect_index(
    index: &Arc<IndexManager>,
    registry: Arc<ProviderRegistry>,
    retrieval: &RetrievalConfig,
) -> anyhow::Result<bool> {
    let validity = index.validate().await?;
    println!("\n🔎 Validation: {}", if validity.valid { "ok" } else { "FAILED" });
    for problem in &validity.problems {
        println!("   - {problem}");
    }
    let stats = index.stats();
    println!(
        "📊 {} records, dim {}, embedder {}",
        stats.records,
        stats.dim,
        stats.embedder_id.unwrap_or_default()
    );
    for (category, count) in &stats.categories {
        println!("   {category:<24} {count}");
    }
    if !validity.valid {
        return Ok(false);
    }

    let retriever = DiversityRetriever::connect(index.clone(), registry, retrieval.clone()).await?;
    let result = retriever.ask(SAMPLE_QUESTION, Some(3)).await?;
    println!("\n🔍 Sample search: \"{SAMPLE_QUESTION}\"");
    for (n, hit) in result.iter().enumerate() {
        println!("  {}. score={:.4}  {}  [{}]  {}", n + 1, hit.score, hit.chunk.id, hit.metadata.category, hit.metadata.section);
    }
    Ok(true)
}

/// Registry, index and retriever for the query tool. With `with_generator`
/// the generation backend is checked before anything else is opened.
pub async fn open_retriever(settings: &Settings, with_generator: bool) -> anyhow::Result<DiversityRetriever> {
    let registry = Arc::new(ProviderRegistry::new(settings.providers())?);
    if with_generator {
        registry.warm_up().await?;
    }
    let index = Arc::new(IndexManager::open(settings, registry.clone()).await?);
    Ok(DiversityRetriever::connect(index, registry, settings.retrieval.clone()).await?)
}
