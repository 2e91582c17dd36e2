//! Two-stage document splitting.
//!
//! Stage 1 cuts a Markdown document along `#`/`##`/`###` headers and records
//! the header path of every section. Stage 2 cuts sections longer than
//! `chunk_size` characters into windows; consecutive windows share exactly
//! `chunk_overlap` characters. Window ends snap to the latest separator
//! (`"\n\n"`, `"\n"`, `". "`, `" "`) when one is available.
//!
//! A whitespace-delimited token longer than `chunk_size` cannot be windowed
//! without corrupting it: it is emitted verbatim as its own chunk with
//! `oversized = true` and acts as a boundary for the windows around it.
//!
//! Lengths are measured in `char`s. No randomness: the same text and config
//! always produce the same chunks.

use tracing::{debug, warn};

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::{Chunk, Document};

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];
const MAX_HEADER_LEVEL: usize = 3;

/// A header-scoped piece of a document. `text` keeps its header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub header_path: Vec<String>,
    pub text: String,
}

/// One stage-2 window. `start`/`end` are char offsets into the section text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub oversized: bool,
}

impl Window {
    pub fn char_len(&self) -> usize { self.end - self.start }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    separators: Vec<Vec<char>>,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        let separators = SEPARATORS.iter().map(|s| s.chars().collect()).collect();
        Ok(Self { config, separators })
    }

    pub fn config(&self) -> &ChunkingConfig { &self.config }

    pub fn split_sections(&self, text: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut current_path: Vec<String> = Vec::new();
        let mut lines: Vec<&str> = Vec::new();
        let mut has_body = false;
        let mut in_fence = false;

        for line in text.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
            } else if !in_fence {
                if let Some((level, title)) = parse_header(line) {
                    flush_section(&mut sections, &current_path, &lines, has_body);
                    stack.retain(|(l, _)| *l < level);
                    stack.push((level, title));
                    current_path = stack.iter().map(|(_, t)| t.clone()).collect();
                    lines = vec![line];
                    has_body = false;
                    continue;
                }
            }
            if !line.trim().is_empty() {
                has_body = true;
            }
            lines.push(line);
        }
        flush_section(&mut sections, &current_path, &lines, has_body);
        sections
    }

    pub fn split_text(&self, text: &str) -> Vec<Window> {
        let chars: Vec<char> = text.chars().collect();
        if chars.iter().all(|c| c.is_whitespace()) {
            return Vec::new();
        }
        if chars.len() <= self.config.chunk_size {
            return vec![window(&chars, 0, chars.len(), false)];
        }

        let mut windows = Vec::new();
        for piece in self.pieces(&chars) {
            match piece {
                Piece::Oversized(start, end) => windows.push(window(&chars, start, end, true)),
                Piece::Run(start, end) => {
                    for (s, e) in self.window_bounds(&chars[start..end]) {
                        windows.push(window(&chars, start + s, start + e, false));
                    }
                }
            }
        }
        windows
    }

    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        let doc_path = doc.path.to_string_lossy().into_owned();
        let source = doc.file_name();
        let mut chunks = Vec::new();
        for (segment_index, section) in self.split_sections(&doc.content).iter().enumerate() {
            for (window_index, w) in self.split_text(&section.text).into_iter().enumerate() {
                if w.oversized {
                    warn!(
                        doc = %doc.doc_id,
                        segment = segment_index,
                        chars = w.char_len(),
                        limit = self.config.chunk_size,
                        "token longer than chunk_size emitted verbatim as its own chunk"
                    );
                }
                let char_len = w.char_len();
                let content_hash = blake3::hash(w.text.as_bytes()).to_hex().to_string();
                chunks.push(Chunk {
                    id: format!("{}_{}_{}", doc.doc_id, segment_index, window_index),
                    doc_id: doc.doc_id.clone(),
                    doc_path: doc_path.clone(),
                    source: source.clone(),
                    header_path: section.header_path.clone(),
                    content: w.text,
                    chunk_index: chunks.len(),
                    total_chunks: 0,
                    segment_index,
                    char_len,
                    oversized: w.oversized,
                    content_hash,
                });
            }
        }
        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks = total;
        }
        debug!(doc = %doc.doc_id, chunks = total, "document chunked");
        chunks
    }

    /// Split `chars` into windowable runs and verbatim oversized tokens.
    fn pieces(&self, chars: &[char]) -> Vec<Piece> {
        let n = chars.len();
        let mut pieces = Vec::new();
        let mut run_start = 0;
        let mut i = 0;
        while i < n {
            if chars[i].is_whitespace() {
                i += 1;
                continue;
            }
            let token_start = i;
            while i < n && !chars[i].is_whitespace() {
                i += 1;
            }
            if i - token_start > self.config.chunk_size {
                push_run(&mut pieces, chars, run_start, token_start);
                pieces.push(Piece::Oversized(token_start, i));
                run_start = i;
            }
        }
        push_run(&mut pieces, chars, run_start, n);
        pieces
    }

    /// Window bounds over a run that holds no oversized token.
    fn window_bounds(&self, run: &[char]) -> Vec<(usize, usize)> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let n = run.len();
        let mut bounds = Vec::new();
        let mut start = 0;
        loop {
            if n - start <= size {
                bounds.push((start, n));
                break;
            }
            let limit = start + size;
            // end > start + overlap keeps the next start moving forward
            let min_end = start + overlap + 1;
            let upper_half = start + (size / 2).max(overlap + 1);
            let end = self
                .find_break(run, upper_half, limit)
                .or_else(|| self.find_break(run, min_end, limit))
                .unwrap_or(limit);
            bounds.push((start, end));
            start = end - overlap;
        }
        bounds
    }

    /// Latest position in `lo..=hi` right after the highest-priority separator.
    fn find_break(&self, run: &[char], lo: usize, hi: usize) -> Option<usize> {
        if lo > hi {
            return None;
        }
        self.separators.iter().find_map(|sep| {
            (lo..=hi).rev().find(|&p| p >= sep.len() && run[p - sep.len()..p] == sep[..])
        })
    }
}

enum Piece {
    Run(usize, usize),
    Oversized(usize, usize),
}

fn push_run(pieces: &mut Vec<Piece>, chars: &[char], mut start: usize, mut end: usize) {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    if start < end {
        pieces.push(Piece::Run(start, end));
    }
}

fn window(chars: &[char], start: usize, end: usize, oversized: bool) -> Window {
    Window { text: chars[start..end].iter().collect(), start, end, oversized }
}

fn flush_section(sections: &mut Vec<Section>, path: &[String], lines: &[&str], has_body: bool) {
    if !has_body {
        return;
    }
    let text = lines.join("\n").trim().to_string();
    if !text.is_empty() {
        sections.push(Section { header_path: path.to_vec(), text });
    }
}

/// ATX header of level 1..=3 with a non-empty title.
fn parse_header(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > MAX_HEADER_LEVEL {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        return None;
    }
    Some((level, title.to_string()))
}
