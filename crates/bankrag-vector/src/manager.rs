//! Index lifecycle: build, validate, query, stats.
//!
//! Each build writes a complete new generation table `<alias>_<timestamp>`,
//! checks it, then flips the `active:<alias>` pointer in the `meta` table and
//! publishes a new in-memory snapshot. Until the flip the previous generation
//! stays live; after it the previous table is pruned. A failure before the
//! flip deletes the partial table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bankrag_core::config::{IndexConfig, Settings};
use bankrag_core::error::{Error, Result};
use bankrag_core::types::{TaggedChunk, VectorRecord};
use bankrag_provider::ProviderRegistry;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::reader::read_generation;
use crate::schema::vector_dim;
use crate::snapshot::{ActivePointer, IndexSnapshot, ScoredRecord};
use crate::table::{self, get_meta, open_db, set_meta, table_exists};
use crate::writer::write_generation;

#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub generation: String,
    pub records: usize,
    pub dim: usize,
    pub embedder_id: String,
    pub replaced: Option<String>,
    pub elapsed: Duration,
}

/// Result of [`IndexManager::validate`]. `valid` is true when `problems` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityReport {
    pub exists: bool,
    pub generation: Option<String>,
    pub records: usize,
    pub index_dim: Option<usize>,
    pub provider_dim: usize,
    pub index_embedder: Option<String>,
    pub provider_embedder: String,
    pub problems: Vec<String>,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub generation: Option<String>,
    pub records: usize,
    pub dim: usize,
    pub embedder_id: Option<String>,
    pub categories: BTreeMap<String, usize>,
    pub index_dir: PathBuf,
}

pub struct IndexManager {
    conn: Connection,
    index_dir: PathBuf,
    alias: String,
    embed_batch_size: usize,
    registry: Arc<ProviderRegistry>,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    rebuild: Mutex<()>,
    progress: bool,
}

impl IndexManager {
    pub async fn open(settings: &Settings, registry: Arc<ProviderRegistry>) -> Result<Self> {
        Self::open_at(Path::new(&settings.paths.index_dir), &settings.index, registry).await
    }

    /// Connect to the database under `index_dir` and load the active
    /// generation, if any. A dangling pointer is logged and left for
    /// [`IndexManager::validate`] to report.
    pub async fn open_at(index_dir: &Path, index: &IndexConfig, registry: Arc<ProviderRegistry>) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;
        let conn = open_db(&index_dir.to_string_lossy()).await.map_err(Error::storage)?;
        let manager = Self {
            conn,
            index_dir: index_dir.to_path_buf(),
            alias: index.alias.clone(),
            embed_batch_size: index.embed_batch_size.max(1),
            registry,
            snapshot: RwLock::new(None),
            rebuild: Mutex::new(()),
            progress: false,
        };
        if let Some(pointer) = manager.read_pointer().await? {
            match read_generation(&manager.conn, &pointer.table).await {
                Ok(records) => {
                    info!(generation = %pointer.table, records = records.len(), dim = pointer.dim, "index generation loaded");
                    manager.publish(IndexSnapshot::new(pointer, records));
                }
                Err(err) => error!(generation = %pointer.table, error = %format!("{err:#}"), "active generation unreadable"),
            }
        }
        Ok(manager)
    }

    /// Show an indicatif progress bar while embedding.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn index_dir(&self) -> &Path { &self.index_dir }

    pub fn alias(&self) -> &str { &self.alias }

    pub fn exists(&self) -> bool { self.snapshot().is_some() }

    /// The live snapshot; cheap to clone and safe to hold across awaits.
    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Replace the index with one built from `chunks`.
    pub async fn build(&self, chunks: &[TaggedChunk]) -> Result<BuildReport> {
        if chunks.is_empty() {
            return Err(Error::build("no chunks to index: the document corpus is empty"));
        }
        let _guard = self.rebuild.lock().await;
        let started = Instant::now();

        let embedder = self.registry.embedder().await?;
        let dim = embedder.dim();
        let embedder_id = embedder.embedder_id().to_string();
        info!(chunks = chunks.len(), dim, embedder = %embedder_id, "index build started");

        let pb = self.progress_bar(chunks.len());
        let mut records: Vec<VectorRecord> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|t| t.chunk.content.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await.map_err(|e| {
                Error::build(format!("embedding failed after {} of {} chunks: {e}", records.len(), chunks.len()))
            })?;
            if vectors.len() != batch.len() {
                return Err(Error::build(format!(
                    "provider returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (tagged, vector) in batch.iter().zip(vectors) {
                if vector.len() != dim {
                    return Err(Error::build(format!(
                        "chunk {} embedded to {} values, provider dimension is {dim}",
                        tagged.chunk.id,
                        vector.len()
                    )));
                }
                records.push(VectorRecord { chunk: tagged.chunk.clone(), metadata: tagged.metadata.clone(), vector });
            }
            pb.inc(batch.len() as u64);
        }
        pb.finish_with_message("embedded");

        let generation = self.next_generation_name().await?;
        if let Err(err) = self.write_and_verify(&generation, &records, dim).await {
            self.discard(&generation);
            return Err(err);
        }

        let previous = match self.read_pointer().await {
            Ok(previous) => previous,
            Err(err) => {
                self.discard(&generation);
                return Err(err);
            }
        };
        let pointer = ActivePointer {
            table: generation.clone(),
            dim,
            embedder_id: embedder_id.clone(),
            records: records.len(),
            built_at: Utc::now(),
        };
        let flipped = match serde_json::to_string(&pointer) {
            Ok(value) => set_meta(&self.conn, &self.pointer_key(), &value).await.map_err(Error::storage),
            Err(e) => Err(Error::from(e)),
        };
        if let Err(err) = flipped {
            self.discard(&generation);
            return Err(err);
        }

        let count = records.len();
        self.publish(IndexSnapshot::new(pointer, records));
        let replaced = previous.map(|p| p.table).filter(|t| *t != generation);
        if let Some(old) = &replaced {
            if let Err(err) = table::remove_table_dir(&self.index_dir, old) {
                warn!(generation = %old, error = %err, "could not prune previous generation");
            }
        }

        let elapsed = started.elapsed();
        info!(generation = %generation, records = count, dim, elapsed_ms = elapsed.as_millis() as u64, "index generation published");
        Ok(BuildReport { generation, records: count, dim, embedder_id, replaced, elapsed })
    }

    /// Check persisted state against the active embedding provider. Never
    /// mutates anything. A dimension difference is returned as
    /// [`Error::DimensionMismatch`]. Waits for a running build so the pointer
    /// and the table it names are read from the same generation.
    pub async fn validate(&self) -> Result<ValidityReport> {
        let _guard = self.rebuild.lock().await;
        let embedder = self.registry.embedder().await?;
        let provider_dim = embedder.dim();
        let provider_embedder = embedder.embedder_id().to_string();
        let mut report = ValidityReport {
            exists: false,
            generation: None,
            records: 0,
            index_dim: None,
            provider_dim,
            index_embedder: None,
            provider_embedder,
            problems: Vec::new(),
            valid: false,
        };

        let Some(pointer) = self.read_pointer().await? else {
            report.problems.push("no index has been built".to_string());
            return Ok(report);
        };
        report.generation = Some(pointer.table.clone());
        report.index_embedder = Some(pointer.embedder_id.clone());

        if !table_exists(&self.conn, &pointer.table).await.map_err(Error::storage)? {
            report.problems.push(format!("active generation '{}' is missing on disk", pointer.table));
            return Ok(report);
        }
        report.exists = true;
        let table = self.conn.open_table(&pointer.table).execute().await.map_err(|e| Error::storage(e.into()))?;
        report.records = table.count_rows(None).await.map_err(|e| Error::storage(e.into()))?;
        let schema = table.schema().await.map_err(|e| Error::storage(e.into()))?;
        let index_dim = vector_dim(&schema).unwrap_or(pointer.dim);
        report.index_dim = Some(index_dim);

        if index_dim != provider_dim {
            warn!(index_dim, provider_dim, "embedding dimension mismatch");
            return Err(Error::DimensionMismatch { index_dim, provider_dim });
        }
        if report.records == 0 {
            report.problems.push("index has no records".to_string());
        } else if report.records != pointer.records {
            report.problems.push(format!(
                "pointer records {} but table holds {}",
                pointer.records, report.records
            ));
        }
        if pointer.embedder_id != report.provider_embedder {
            warn!(index = %pointer.embedder_id, provider = %report.provider_embedder, "index was built by a different embedder");
        }
        report.valid = report.problems.is_empty();
        Ok(report)
    }

    /// The `fetch_k` nearest records to `vector`, best first, ties in insertion order.
    pub fn query(&self, vector: &[f32], fetch_k: usize) -> Result<Vec<ScoredRecord>> {
        let snapshot = self.snapshot().ok_or(Error::EmptyIndex)?;
        if snapshot.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if vector.len() != snapshot.dim() {
            return Err(Error::DimensionMismatch { index_dim: snapshot.dim(), provider_dim: vector.len() });
        }
        Ok(snapshot.search(vector, fetch_k))
    }

    pub fn stats(&self) -> IndexStats {
        match self.snapshot() {
            Some(s) => IndexStats {
                generation: Some(s.pointer().table.clone()),
                records: s.len(),
                dim: s.dim(),
                embedder_id: Some(s.pointer().embedder_id.clone()),
                categories: s.category_histogram(),
                index_dir: self.index_dir.clone(),
            },
            None => IndexStats {
                generation: None,
                records: 0,
                dim: 0,
                embedder_id: None,
                categories: BTreeMap::new(),
                index_dir: self.index_dir.clone(),
            },
        }
    }

    /// Generation tables of this alias currently on disk.
    pub async fn generations(&self) -> Result<Vec<String>> {
        let prefix = format!("{}_", self.alias);
        let names = self.conn.table_names().execute().await.map_err(|e| Error::storage(e.into()))?;
        Ok(names.into_iter().filter(|n| n.starts_with(&prefix)).collect())
    }

    fn pointer_key(&self) -> String { format!("active:{}", self.alias) }

    async fn read_pointer(&self) -> Result<Option<ActivePointer>> {
        let raw = get_meta(&self.conn, &self.pointer_key()).await.map_err(Error::storage)?;
        raw.map(|v| serde_json::from_str(&v).map_err(Error::from)).transpose()
    }

    fn publish(&self, snapshot: IndexSnapshot) {
        *self.snapshot.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Arc::new(snapshot));
    }

    async fn next_generation_name(&self) -> Result<String> {
        let base = format!("{}_{}", self.alias, Utc::now().format("%Y%m%d%H%M%S%3f"));
        let existing = self.generations().await?;
        let mut name = base.clone();
        let mut n = 1;
        while existing.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        Ok(name)
    }

    async fn write_and_verify(&self, generation: &str, records: &[VectorRecord], dim: usize) -> Result<()> {
        write_generation(&self.conn, generation, records, dim)
            .await
            .map_err(|e| Error::build(format!("writing generation {generation}: {e:#}")))?;
        let table = self.conn.open_table(generation).execute().await.map_err(|e| Error::storage(e.into()))?;
        let count = table.count_rows(None).await.map_err(|e| Error::storage(e.into()))?;
        let schema = table.schema().await.map_err(|e| Error::storage(e.into()))?;
        if count != records.len() || vector_dim(&schema) != Some(dim) {
            return Err(Error::build(format!(
                "generation {generation} failed verification: {count} rows of dim {:?}, expected {} of dim {dim}",
                vector_dim(&schema),
                records.len()
            )));
        }
        Ok(())
    }

    fn discard(&self, generation: &str) {
        warn!(generation, "discarding partial generation");
        if let Err(err) = table::remove_table_dir(&self.index_dir, generation) {
            error!(generation, error = %err, "could not remove partial generation");
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
