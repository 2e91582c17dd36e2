//! Domain types shared by the chunking, index and retrieval crates.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::metadata::Metadata;

pub type ChunkId = String;

/// A source document as read from the document root. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File stem, used as the stable document identity.
    pub doc_id: String,
    pub path: PathBuf,
    pub content: String,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let path = path.into();
        let doc_id = doc_id_for(&path);
        Self { doc_id, path, content: content.into() }
    }

    /// File name of the origin, used for citations.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.doc_id.clone())
    }
}

fn doc_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// A chunk of a source document that is independently embedded and indexed.
///
/// - `id`: `<doc_id>_<segment_index>_<window>`, unique within a corpus
/// - `chunk_index`/`total_chunks`: position within the parent document
/// - `header_path`: enclosing section titles, outermost first
/// - `char_len`: length of `content` in characters (not bytes)
/// - `oversized`: a single token longer than the chunk size, kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub doc_path: String,
    pub source: String,
    pub header_path: Vec<String>,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub segment_index: usize,
    pub char_len: usize,
    pub oversized: bool,
    pub content_hash: String,
}

/// A chunk with its extracted metadata, the unit handed to the index build.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedChunk {
    pub chunk: Chunk,
    pub metadata: Metadata,
}

/// What the index stores per chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// A question plus its retrieval knobs.
///
/// `lambda` = 0 favours diversity only, 1 favours relevance only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub question: String,
    pub k: usize,
    pub fetch_k: usize,
    pub lambda: f32,
}

impl RetrievalQuery {
    pub fn new(question: impl Into<String>, k: usize, fetch_k: usize, lambda: f32) -> Self {
        Self { question: question.into(), k, fetch_k, lambda }
    }

    /// Candidate pool size, never smaller than `k`.
    pub fn effective_fetch_k(&self) -> usize { self.fetch_k.max(self.k) }
}

/// One entry of a retrieval result. `score` is the cosine similarity between
/// the question and the chunk; higher is better.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub metadata: Metadata,
    pub score: f32,
}

/// Final ranked output, at most `k` entries, in MMR order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize { self.hits.len() }

    pub fn is_empty(&self) -> bool { self.hits.is_empty() }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> { self.hits.iter() }
}
