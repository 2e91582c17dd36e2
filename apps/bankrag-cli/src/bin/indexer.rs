use std::path::PathBuf;
use std::sync::Arc;
use std::{env, process};

use bankrag_cli::{init_logging, inspect_index, load_settings, RebuildOptions};
use bankrag_core::data_processor::DataProcessor;
use bankrag_core::error::Error;
use bankrag_provider::ProviderRegistry;
use bankrag_vector::IndexManager;
use tracing::warn;

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} [--force] [--inspect] [--verbose] [--limit N] [docs_dir]");
    eprintln!("  --inspect alone validates the current index and runs a sample search without rebuilding");
    process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let opts = match RebuildOptions::parse(&args[1..]) {
        Ok(opts) if !opts.help => opts,
        Ok(_) => usage(&args[0]),
        Err(msg) => {
            eprintln!("Error: {msg}");
            usage(&args[0]);
        }
    };
    init_logging(opts.verbose);

    let settings = load_settings()?;
    let docs_dir = opts.docs_dir.clone().unwrap_or_else(|| PathBuf::from(&settings.paths.docs_dir));
    println!("Bank RAG index {}\n======================", if opts.inspect_only() { "inspection" } else { "rebuild" });
    println!("Index:     {}", settings.paths.index_dir);
    println!("Mode:      {}", settings.mode);

    let registry = Arc::new(ProviderRegistry::new(settings.providers())?);
    let embedder = registry.embedder().await?;
    println!("Embedder:  {} (dim {})", embedder.embedder_id(), embedder.dim());

    let index = Arc::new(IndexManager::open(&settings, registry.clone()).await?.with_progress(true));
    if opts.inspect_only() {
        let valid = inspect_index(&index, registry, &settings.retrieval).await?;
        process::exit(if valid { 0 } else { 1 });
    }

    println!("Documents: {}", docs_dir.display());
    if index.exists() && !opts.force {
        match index.validate().await {
            Ok(report) if report.valid => {
                warn!(generation = report.generation.as_deref().unwrap_or_default(), "index already exists");
                println!("\n⚠️  A valid index already exists ({} records). Use --force to rebuild.", report.records);
                process::exit(1);
            }
            Ok(report) => println!("⚠️  Existing index has problems, rebuilding: {}", report.problems.join("; ")),
            Err(Error::DimensionMismatch { index_dim, provider_dim }) => {
                println!("⚠️  Existing index has dimension {index_dim}, provider has {provider_dim}; rebuilding");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let processor = DataProcessor::new(settings.chunking.clone())?;
    let chunks = match opts.limit {
        Some(n) => {
            println!("🔢 Limiting to {n} documents");
            processor.process_directory_limited(&docs_dir, n)?
        }
        None => processor.process_directory(&docs_dir)?,
    };
    println!("📄 {} chunks (size {}, overlap {})", chunks.len(), settings.chunking.chunk_size, settings.chunking.chunk_overlap);

    let report = index.build(&chunks).await?;
    println!("\n✅ Index rebuilt in {:.1}s", report.elapsed.as_secs_f64());
    println!("📊 Generation {}: {} records, dim {}", report.generation, report.records, report.dim);
    if let Some(old) = &report.replaced {
        println!("🗑️  Replaced {old}");
    }

    if opts.inspect {
        inspect_index(&index, registry, &settings.retrieval).await?;
    }

    println!("\n💡 To query the index, use: cargo run --bin bankrag-query '<question>'");
    Ok(())
}
