//! Grounded answer synthesis with citations.
//!
//! Retrieves the top-`k` chunks for a question, assembles a prompt that
//! restricts the model to that context, calls the [`LanguageModel`] once,
//! and returns the answer with deduplicated source citations.
//!
//! A failed model call is not an error: the record carries
//! `"Error generating answer: ..."` along with the sources that were
//! retrieved. Retrieval failures do propagate.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::llm::LanguageModel;
use crate::models::{AnswerRecord, Citation, ScoredChunk};
use crate::retrieve;

pub const FALLBACK_ANSWER: &str =
    "I couldn't find relevant information in our policy documents to answer this question.";

const OUT_OF_SCOPE_ANSWER: &str = "I can only answer questions about our company policies, and I don't have information about that in our policy documents.";

/// Everything a question needs: the index to search, the embedder that
/// built it, and the model that writes the answer.
pub struct RagContext {
    pub index: VectorIndex,
    pub embedder: Box<dyn EmbeddingProvider>,
    pub model: Box<dyn LanguageModel>,
}

impl RagContext {
    pub fn new(
        index: VectorIndex,
        embedder: Box<dyn EmbeddingProvider>,
        model: Box<dyn LanguageModel>,
    ) -> Self {
        Self {
            index,
            embedder,
            model,
        }
    }
}

/// Answer `question` from the policy corpus.
pub async fn answer(
    ctx: &RagContext,
    question: &str,
    k: usize,
    temperature: f32,
) -> Result<AnswerRecord> {
    let retrieved = retrieve::query(&ctx.index, ctx.embedder.as_ref(), question, k).await?;

    if retrieved.is_empty() {
        info!("no relevant chunks retrieved; returning fallback answer");
        return Ok(AnswerRecord {
            question: question.to_string(),
            answer_text: FALLBACK_ANSWER.to_string(),
            sources: Vec::new(),
            chunks_retrieved: 0,
        });
    }

    let prompt = build_prompt(question, &retrieved);
    let sources = dedup_citations(&retrieved);

    let answer_text = match ctx.model.generate(&prompt, temperature).await {
        Ok(text) => text,
        Err(e) => {
            warn!(model = %ctx.model.model_name(), error = %e, "answer generation failed");
            format!("Error generating answer: {}", e)
        }
    };

    info!(
        chunks = retrieved.len(),
        sources = sources.len(),
        "answered policy question"
    );

    Ok(AnswerRecord {
        question: question.to_string(),
        answer_text,
        sources,
        chunks_retrieved: retrieved.len(),
    })
}

/// Assemble the grounded prompt. Context blocks are numbered from 1 in
/// retrieval order.
pub fn build_prompt(question: &str, retrieved: &[ScoredChunk]) -> String {
    let context = retrieved
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[Source {}: {}]\n{}", i + 1, hit.chunk.source_id, hit.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful assistant that answers questions about company policies.\n\
         \n\
         Use ONLY the information provided in the context below to answer the question.\n\
         \n\
         IMPORTANT RULES:\n\
         1. If the answer is not in the context, say \"{refusal}\"\n\
         2. Always cite which policy document(s) your answer comes from using the source names provided\n\
         3. Be concise but complete\n\
         4. Use bullet points for lists when appropriate\n\
         5. Include specific numbers, dates, and details when present in the context\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         QUESTION: {question}\n\
         \n\
         ANSWER:",
        refusal = OUT_OF_SCOPE_ANSWER,
        context = context,
        question = question,
    )
}

/// One citation per source document, in first-retrieved order.
pub fn dedup_citations(retrieved: &[ScoredChunk]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    retrieved
        .iter()
        .filter(|hit| seen.insert(hit.chunk.source_id.as_str()))
        .map(|hit| Citation {
            document_identifier: hit.chunk.source_id.clone(),
            display_name: hit.chunk.display_name.clone(),
        })
        .collect()
}
