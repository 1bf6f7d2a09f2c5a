//! Content-derived chunk identity.
//!
//! A chunk's id is a name-based (v5) UUID of its text under the DNS
//! namespace, so identical text maps to the same id in every process and run
//! regardless of where the chunk sat in the document.

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::Chunk;

/// Stable identifier for a chunk of text.
pub fn content_id(text: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, text.as_bytes()).to_string()
}

/// Keep the first occurrence of each distinct content id, preserving order.
///
/// Returns the surviving chunks and their ids as parallel vectors.
pub fn dedup_chunks(chunks: Vec<Chunk>) -> (Vec<Chunk>, Vec<String>) {
    let mut seen: HashSet<String> = HashSet::with_capacity(chunks.len());
    let mut unique = Vec::with_capacity(chunks.len());
    let mut ids = Vec::with_capacity(chunks.len());

    for mut chunk in chunks {
        let id = content_id(&chunk.text);
        if seen.insert(id.clone()) {
            chunk.content_id = id.clone();
            ids.push(id);
            unique.push(chunk);
        }
    }

    (unique, ids)
}
