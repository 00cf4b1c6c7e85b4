//! Recursive-separator text chunker with exact overlap.
//!
//! Splits each [`PolicyDocument`] into [`Chunk`]s of at most `chunk_size`
//! characters. A chunk ends at the last occurrence of the coarsest
//! separator that fits inside its window: paragraph break, line break,
//! sentence end, space, and finally any character boundary. The next chunk
//! starts exactly `chunk_overlap` characters before that end, so facts that
//! straddle a boundary appear whole in at least one chunk.
//!
//! Lengths are counted in Unicode scalar values, never bytes. Each chunk
//! receives a random UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ChunkingConfig, CorpusConfig};
use crate::corpus;
use crate::error::{RagError, Result};
use crate::models::{Chunk, PolicyDocument};

/// Break points tried in order, coarsest first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Load the corpus and chunk every document.
///
/// Output order is document order (sorted by `source_id`) then position
/// within the document.
pub fn load_and_chunk(corpus: &CorpusConfig, chunking: &ChunkingConfig) -> Result<Vec<Chunk>> {
    if chunking.chunk_size == 0 || chunking.chunk_overlap >= chunking.chunk_size {
        return Err(RagError::Configuration(format!(
            "chunk_overlap ({}) must be smaller than a non-zero chunk_size ({})",
            chunking.chunk_overlap, chunking.chunk_size
        )));
    }

    let documents = corpus::load_policy_documents(corpus)?;
    let chunks = chunk_documents(&documents, chunking.chunk_size, chunking.chunk_overlap);

    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "chunked policy corpus"
    );

    Ok(chunks)
}

/// Chunk a batch of documents independently; chunks never span documents.
pub fn chunk_documents(
    documents: &[PolicyDocument],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| chunk_document(doc, chunk_size, chunk_overlap))
        .collect()
}

/// Chunk one document. Blank documents produce no chunks.
pub fn chunk_document(doc: &PolicyDocument, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    if doc.content.trim().is_empty() {
        warn!(source_id = %doc.source_id, "skipping blank policy document");
        return Vec::new();
    }

    split_text(&doc.content, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_chunk(doc, i as i64, text))
        .collect()
}

/// Split text into overlapping slices of at most `chunk_size` characters.
///
/// Dropping the first `chunk_overlap` characters of every slice after the
/// first and concatenating the rest yields `text` again.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<&str> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = chunk_overlap.min(chunk_size - 1);

    // Byte offset of every char boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;

    let mut pieces = Vec::new();
    let mut start = 0;

    loop {
        if total - start <= chunk_size {
            pieces.push(&text[bounds[start]..]);
            break;
        }

        // A break must leave more than `overlap` characters so the next
        // chunk starts strictly after this one.
        let limit = start + chunk_size;
        let end = find_break(text, &bounds, start, start + overlap + 1, limit);
        pieces.push(&text[bounds[start]..bounds[end]]);
        start = end - overlap;
    }

    pieces
}

/// Pick the chunk end (a char index in `min_end..=limit`) for a chunk
/// starting at `start`: just after the last occurrence of the coarsest
/// separator, or `limit` when no separator qualifies.
fn find_break(text: &str, bounds: &[usize], start: usize, min_end: usize, limit: usize) -> usize {
    let window_start = bounds[start];
    let window = &text[window_start..bounds[limit]];
    let floor = bounds[min_end];

    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let end_byte = window_start + pos + sep.len();
            if end_byte < floor {
                continue;
            }
            if let Ok(idx) = bounds.binary_search(&end_byte) {
                return idx;
            }
        }
    }

    limit
}

fn make_chunk(doc: &PolicyDocument, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source_id: doc.source_id.clone(),
        display_name: doc.display_name.clone(),
        chunk_index: index,
        content: text.to_string(),
        hash,
    }
}
