//! Diversity-aware retrieval over the active index generation, plus the
//! answer composition that sits on top of it.
//!
//! [`DiversityRetriever`] embeds the question, pulls `fetch_k` candidates from
//! the [`IndexManager`] and reduces them to `k` with [`mmr_select`].

pub mod answer;
pub mod mmr;

use std::sync::Arc;

use bankrag_core::config::RetrievalConfig;
use bankrag_core::error::{Error, Result};
use bankrag_core::types::{RetrievalQuery, RetrievalResult, ScoredChunk};
use bankrag_provider::ProviderRegistry;
use bankrag_vector::{IndexManager, ScoredRecord};
use tracing::{debug, info, warn};

pub use answer::{
    compose_prompt, confidence, format_context, format_history, sources, Answer, AnswerService, Role, SourceInfo, Turn,
};
pub use mmr::{mmr_select, MmrCandidate};

pub struct DiversityRetriever {
    index: Arc<IndexManager>,
    registry: Arc<ProviderRegistry>,
    config: RetrievalConfig,
}

impl DiversityRetriever {
    /// Validates the index against the active embedding provider before
    /// accepting queries. A dimension mismatch is fatal; other problems
    /// (no index yet, count drift) are logged and surface again at query time.
    pub async fn connect(
        index: Arc<IndexManager>,
        registry: Arc<ProviderRegistry>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        let report = index.validate().await?;
        if report.valid {
            info!(
                generation = report.generation.as_deref().unwrap_or_default(),
                records = report.records,
                dim = report.provider_dim,
                "retriever connected"
            );
        } else {
            for problem in &report.problems {
                warn!(%problem, "index not ready for queries");
            }
        }
        Ok(Self { index, registry, config })
    }

    pub fn config(&self) -> &RetrievalConfig { &self.config }

    pub fn index(&self) -> &Arc<IndexManager> { &self.index }

    pub fn registry(&self) -> &Arc<ProviderRegistry> { &self.registry }

    /// Query with the configured `fetch_k`/`lambda`, optionally overriding `k`.
    pub async fn ask(&self, question: &str, k: Option<usize>) -> Result<RetrievalResult> {
        let query = RetrievalQuery::new(
            question,
            k.unwrap_or(self.config.k),
            self.config.fetch_k,
            self.config.lambda,
        );
        self.retrieve(&query).await
    }

    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<RetrievalResult> {
        if query.k == 0 {
            return Err(Error::config("k must be at least 1"));
        }
        if !(0.0..=1.0).contains(&query.lambda) {
            return Err(Error::config(format!("lambda ({}) must be within [0, 1]", query.lambda)));
        }

        let embedder = self.registry.embedder().await?;
        let vector = embedder.embed(&query.question).await?;
        let candidates = self.index.query(&vector, query.effective_fetch_k())?;

        let picks = {
            let pool: Vec<MmrCandidate<'_>> = candidates
                .iter()
                .map(|c| MmrCandidate { vector: &c.record.vector, priority: c.record.metadata.priority })
                .collect();
            mmr_select(&vector, &pool, query.k, query.lambda)
        };
        debug!(candidates = candidates.len(), selected = picks.len(), lambda = query.lambda, "mmr selection");

        let mut slots: Vec<Option<ScoredRecord>> = candidates.into_iter().map(Some).collect();
        let hits = picks
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .map(|c| ScoredChunk { chunk: c.record.chunk, metadata: c.record.metadata, score: c.score })
            .collect();
        Ok(RetrievalResult { hits })
    }
}
