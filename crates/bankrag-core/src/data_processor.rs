use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::chunking::Chunker;
use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::metadata::MetadataExtractor;
use crate::types::{Document, TaggedChunk};

const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Reads the document root and turns it into tagged chunks ready for indexing.
pub struct DataProcessor {
    chunker: Chunker,
    extractor: MetadataExtractor,
    dedup_exact: bool,
}

impl DataProcessor {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        let dedup_exact = config.dedup_exact;
        Ok(Self { chunker: Chunker::new(config)?, extractor: MetadataExtractor, dedup_exact })
    }

    pub fn chunker(&self) -> &Chunker { &self.chunker }

    pub fn process_directory(&self, root: &Path) -> Result<Vec<TaggedChunk>> {
        let files = self.list_documents(root)?;
        self.process_files(root, &files)
    }

    pub fn process_directory_limited(&self, root: &Path, limit: usize) -> Result<Vec<TaggedChunk>> {
        let mut files = self.list_documents(root)?;
        if files.len() > limit {
            files.truncate(limit);
            info!(limit, "limited to first files");
        }
        self.process_files(root, &files)
    }

    /// Chunk and tag one document.
    pub fn process_document(&self, doc: &Document) -> Vec<TaggedChunk> {
        self.chunker
            .chunk_document(doc)
            .into_iter()
            .map(|chunk| self.extractor.tag(chunk))
            .collect()
    }

    /// Recursive listing of supported files under `root`, in path order.
    pub fn list_documents(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(Error::config(format!("documents directory not found: {}", root.display())));
        }
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .map(|ext| DOC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    pub fn read_document(&self, path: &Path) -> Result<Document> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => String::from_utf8_lossy(&fs::read(path)?).into_owned(),
        };
        Ok(Document::new(path, content))
    }

    fn process_files(&self, root: &Path, files: &[PathBuf]) -> Result<Vec<TaggedChunk>> {
        if files.is_empty() {
            warn!(root = %root.display(), "no documents found");
            return Ok(vec![]);
        }
        let mut all = Vec::new();
        for (i, path) in files.iter().enumerate() {
            let doc = self.read_document(path)?;
            let tagged = self.process_document(&doc);
            debug!(file = i + 1, of = files.len(), path = %path.display(), chunks = tagged.len(), "processed document");
            all.extend(tagged);
        }
        if self.dedup_exact {
            let before = all.len();
            all = dedup_exact(all);
            if all.len() < before {
                info!(dropped = before - all.len(), "dropped exact duplicate chunks");
            }
        }
        info!(documents = files.len(), chunks = all.len(), "processed document directory");
        Ok(all)
    }
}

/// Keeps the first chunk of every group whose normalized text is identical.
/// Normalization lowercases and collapses whitespace.
pub fn dedup_exact(chunks: Vec<TaggedChunk>) -> Vec<TaggedChunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|t| seen.insert(normalized_hash(&t.chunk.content)))
        .collect()
}

fn normalized_hash(text: &str) -> blake3::Hash {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    blake3::hash(normalized.as_bytes())
}
