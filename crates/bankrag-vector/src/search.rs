//! Exact cosine scan over an in-memory generation.

use std::cmp::Ordering;

pub fn dot(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

pub fn norm(v: &[f32]) -> f32 { dot(v, v).sqrt() }

/// Cosine similarity; 0 when either vector has zero length.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom > 0.0 { dot(a, b) / denom } else { 0.0 }
}

/// Indices of the `k` highest scores, best first. Equal scores keep their
/// original (insertion) order; NaN sorts last.
pub fn top_k_stable(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| descending(scores[a], scores[b]));
    order.truncate(k);
    order
}

fn descending(a: f32, b: f32) -> Ordering {
    let key = |x: f32| if x.is_nan() { f32::NEG_INFINITY } else { x };
    key(b).total_cmp(&key(a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal() {
        assert!((cosine(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let scores = [0.5, 0.9, 0.5, 0.9, f32::NAN, 0.1];
        assert_eq!(top_k_stable(&scores, 4), vec![1, 3, 0, 2]);
        assert_eq!(top_k_stable(&scores, 10), vec![1, 3, 0, 2, 5, 4]);
    }
}
