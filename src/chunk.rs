//! Recursive boundary-aware text chunker.
//!
//! Splits a document's text into overlapping [`Chunk`]s of roughly `chunk_chars`
//! characters. Break points are chosen by priority: paragraph (`\n\n`),
//! then line (`\n`), then space. A lower-priority boundary is only used for
//! a piece that still exceeds the target after splitting on every higher one.
//! Consecutive chunks share up to `overlap_chars` characters of trailing
//! context so that a date and its agenda are not separated.
//!
//! Lengths are measured in Unicode scalar values, not bytes.

use std::collections::VecDeque;

use crate::identity::content_id;
use crate::models::{Chunk, PageDocument, SourceMetadata};

/// Split separators in priority order.
pub const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Inserted between consecutive pages when they are joined for chunking.
pub const PAGE_SEPARATOR: &str = "\n";

/// Chunk sizing.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_chars: 1500,
            overlap_chars: 200,
        }
    }
}

impl Chunker {
    pub fn new(chunk_chars: usize, overlap_chars: usize) -> Self {
        Self {
            chunk_chars: chunk_chars.max(1),
            overlap_chars: overlap_chars.min(chunk_chars.saturating_sub(1)),
        }
    }

    /// Chunk a document's pages as one text body.
    ///
    /// Non-blank pages are joined with [`PAGE_SEPARATOR`], so text running
    /// across a page break can share a chunk. Each chunk is attributed to the
    /// page its first character comes from.
    pub fn chunk_pages(&self, pages: &[PageDocument]) -> Vec<Chunk> {
        let mut body = String::new();
        let mut page_starts: Vec<(usize, &PageDocument)> = Vec::new();
        for page in pages.iter().filter(|p| !p.text.trim().is_empty()) {
            if !body.is_empty() {
                body.push_str(PAGE_SEPARATOR);
            }
            page_starts.push((body.len(), page));
            body.push_str(&page.text);
        }

        let mut chunks = Vec::new();
        let mut cursor = 0;
        for text in self.split_text(&body) {
            // Chunks are trimmed slices of the body, in increasing start order
            let offset = body[cursor..]
                .find(text.as_str())
                .map_or(cursor, |i| cursor + i);
            cursor = offset + body[offset..].chars().next().map_or(0, char::len_utf8);

            let source = page_starts
                .iter()
                .rev()
                .find(|(start, _)| *start <= offset)
                .map(|(_, page)| SourceMetadata {
                    source_name: page.source_name.clone(),
                    page_index: page.page_index,
                })
                .unwrap_or_default();

            chunks.push(Chunk {
                content_id: content_id(&text),
                text,
                source,
            });
        }
        chunks
    }

    /// Split a single text body. Never returns empty strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.split_recursive(text, &SEPARATORS, &mut out);
        out
    }

    fn split_recursive(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        let Some(pos) = separators.iter().position(|s| text.contains(s)) else {
            self.hard_split(text, out);
            return;
        };
        let separator = separators[pos];
        let lower = &separators[pos + 1..];

        let mut good: Vec<&str> = Vec::new();
        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_chars {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                out.extend(self.merge(&good));
                good.clear();
            }
            self.split_recursive(piece, lower, out);
        }
        if !good.is_empty() {
            out.extend(self.merge(&good));
        }
    }

    /// Greedily pack pieces up to `chunk_chars`, carrying trailing pieces
    /// totalling at most `overlap_chars` into the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_chars && !current.is_empty() {
                push_joined(&current, &mut docs);
                while total > self.overlap_chars || (total + len > self.chunk_chars && total > 0) {
                    match current.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }
        push_joined(&current, &mut docs);
        docs
    }

    /// Fixed-width windows for runs with no whitespace at all.
    fn hard_split(&self, text: &str, out: &mut Vec<String>) {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.chunk_chars {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
            return;
        }
        let step = self.chunk_chars - self.overlap_chars;
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_chars).min(chars.len());
            let piece: String = chars[start..end].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }
}

/// Split on `separator`, attaching each separator to the piece that follows it.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut bounds: Vec<usize> = vec![0];
    bounds.extend(text.match_indices(separator).map(|(i, _)| i));
    bounds.push(text.len());
    bounds.dedup();
    bounds
        .windows(2)
        .map(|w| &text[w[0]..w[1]])
        .filter(|s| !s.is_empty())
        .collect()
}

fn push_joined(pieces: &VecDeque<&str>, docs: &mut Vec<String>) {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
