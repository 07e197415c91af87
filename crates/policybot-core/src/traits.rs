use async_trait::async_trait;

use crate::types::RetrievedChunk;

/// Text embedding model. Implementations must return L2-normalized vectors
/// of `dim()` length and be deterministic for a given `model_id()`.
pub trait Embedder: Send + Sync {
    /// Stable identifier recorded with an index so queries use the same model.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Nearest-neighbour lookup over stored chunks.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<RetrievedChunk>>;
}
