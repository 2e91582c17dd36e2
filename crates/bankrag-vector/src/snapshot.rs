use std::collections::BTreeMap;

use bankrag_core::types::VectorRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::search::{dot, norm, top_k_stable};

/// The `meta` value naming the live generation of an alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePointer {
    pub table: String,
    pub dim: usize,
    pub embedder_id: String,
    pub records: usize,
    pub built_at: DateTime<Utc>,
}

/// A candidate returned by [`IndexSnapshot::search`]. `rank` is the position
/// in relevance order, `score` the cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
    pub rank: usize,
}

/// Immutable, fully loaded generation. Queries share it through an `Arc`; a
/// rebuild publishes a new one instead of mutating this.
#[derive(Debug)]
pub struct IndexSnapshot {
    pointer: ActivePointer,
    records: Vec<VectorRecord>,
    norms: Vec<f32>,
}

impl IndexSnapshot {
    pub fn new(pointer: ActivePointer, records: Vec<VectorRecord>) -> Self {
        let norms = records.iter().map(|r| norm(&r.vector)).collect();
        Self { pointer, records, norms }
    }

    pub fn pointer(&self) -> &ActivePointer { &self.pointer }

    pub fn dim(&self) -> usize { self.pointer.dim }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn records(&self) -> &[VectorRecord] { &self.records }

    pub fn category_histogram(&self) -> BTreeMap<String, usize> {
        let mut hist = BTreeMap::new();
        for r in &self.records {
            *hist.entry(r.metadata.category.clone()).or_insert(0) += 1;
        }
        hist
    }

    /// The `fetch_k` records most similar to `query` by cosine similarity.
    /// Callers check `query.len() == dim()` first.
    pub fn search(&self, query: &[f32], fetch_k: usize) -> Vec<ScoredRecord> {
        let q_norm = norm(query);
        let scores: Vec<f32> = self
            .records
            .iter()
            .zip(&self.norms)
            .map(|(r, n)| {
                let denom = q_norm * n;
                if denom > 0.0 { dot(query, &r.vector) / denom } else { 0.0 }
            })
            .collect();
        top_k_stable(&scores, fetch_k)
            .into_iter()
            .enumerate()
            .map(|(rank, i)| ScoredRecord { record: self.records[i].clone(), score: scores[i], rank })
            .collect()
    }
}
