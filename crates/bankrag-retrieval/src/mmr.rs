//! Maximal Marginal Relevance selection.
//!
//! Each step picks the candidate maximizing
//! `lambda * sim(query, c) - (1 - lambda) * max(sim(c, s) for s in selected)`.
//! `lambda = 1` reproduces relevance order; `lambda = 0` picks the candidate
//! least similar to what is already selected.

use bankrag_vector::search::{cosine, dot, norm};

/// A candidate as seen by MMR. Candidates are passed in relevance order.
#[derive(Debug, Clone, Copy)]
pub struct MmrCandidate<'a> {
    pub vector: &'a [f32],
    pub priority: u8,
}

/// Indices into `candidates`, in selection order, at most `k` of them.
///
/// Equal MMR scores go to the earlier (more relevant) candidate; when the
/// relevance is also identical the higher priority wins. With `k` or fewer
/// candidates all of them are returned in relevance order.
pub fn mmr_select(query: &[f32], candidates: &[MmrCandidate<'_>], k: usize, lambda: f32) -> Vec<usize> {
    let n = candidates.len();
    if n == 0 || k == 0 {
        return Vec::new();
    }
    if n <= k {
        return (0..n).collect();
    }

    let q_norm = norm(query);
    let norms: Vec<f32> = candidates.iter().map(|c| norm(c.vector)).collect();
    let relevance: Vec<f32> = candidates
        .iter()
        .zip(&norms)
        .map(|(c, n)| {
            let denom = q_norm * n;
            if denom > 0.0 { dot(query, c.vector) / denom } else { 0.0 }
        })
        .collect();

    let mut taken = vec![false; n];
    let mut redundancy = vec![0.0f32; n];
    let mut selected = Vec::with_capacity(k);

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for i in (0..n).filter(|&i| !taken[i]) {
            let score = lambda * relevance[i] - (1.0 - lambda) * redundancy[i];
            let better = match best {
                None => true,
                Some((b, best_score)) => {
                    score > best_score
                        || (score == best_score
                            && relevance[i] == relevance[b]
                            && candidates[i].priority > candidates[b].priority)
                }
            };
            if better {
                best = Some((i, score));
            }
        }
        let Some((pick, _)) = best else { break };
        taken[pick] = true;
        selected.push(pick);
        for j in (0..n).filter(|&j| !taken[j]) {
            let sim = cosine(candidates[pick].vector, candidates[j].vector);
            if selected.len() == 1 || sim > redundancy[j] {
                redundancy[j] = sim;
            }
        }
    }
    selected
}
