//! Core data models used throughout the policy assistant.
//!
//! These types represent the documents, chunks, retrieval results and
//! answers that flow through the ingestion and question-answering pipeline.

use serde::Serialize;

/// One policy file loaded from the corpus directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDocument {
    /// Full file text.
    pub content: String,
    /// Path relative to the corpus root (the file name for top-level files).
    pub source_id: String,
    /// Human-readable policy title derived from the file stem.
    pub display_name: String,
}

/// A bounded slice of a [`PolicyDocument`], the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub display_name: String,
    pub chunk_index: i64,
    pub content: String,
    pub hash: String,
}

/// A retrieved chunk with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked retrieval output, best match first.
pub type RetrievalResult = Vec<ScoredChunk>;

/// A deduplicated reference to a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub document_identifier: String,
    pub display_name: String,
}

/// The result of answering one question.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer_text: String,
    pub sources: Vec<Citation>,
    pub chunks_retrieved: usize,
}
