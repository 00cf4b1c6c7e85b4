//! Similarity search over a built [`VectorIndex`].

use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::RetrievalResult;

/// Embed `question` and return the `k` nearest chunks, best first.
///
/// Chunks from the same document are not merged here; citation
/// deduplication happens in the answer step.
///
/// # Errors
///
/// [`RagError::InvalidArgument`] when `k == 0`. Embedding failures and
/// a query vector whose dimensionality differs from the index propagate.
pub async fn query(
    index: &VectorIndex,
    embedder: &dyn EmbeddingProvider,
    question: &str,
    k: usize,
) -> Result<RetrievalResult> {
    if k == 0 {
        return Err(RagError::InvalidArgument("k must be at least 1".to_string()));
    }

    if question.trim().is_empty() {
        return Ok(Vec::new());
    }

    let vector = embedder.embed(question).await?;
    if index.dims() != 0 && vector.len() != index.dims() {
        return Err(RagError::embedding(
            embedder.model_name(),
            format!(
                "query vector has {} dimensions, index {} has {}",
                vector.len(),
                index.collection_id(),
                index.dims()
            ),
        ));
    }

    let results = index.query(&vector, k).await?;
    debug!(
        collection = %index.collection_id(),
        k,
        hits = results.len(),
        "retrieved chunks"
    );

    Ok(results)
}
