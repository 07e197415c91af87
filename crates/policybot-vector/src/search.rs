use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, Int32Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use policybot_core::error::Error;
use policybot_core::traits::{Embedder, Retriever};
use policybot_core::types::{Chunk, RetrievedChunk, SourceKind};

use crate::schema::{META_EMBEDDER_ID, META_TABLE};
use crate::table::{get_meta, open_db, table_exists};

/// Read side of the chunk store. A store that was never built opens as
/// empty and answers every query with no chunks.
pub struct VectorStore {
	table: Option<Table>,
	embedder: Arc<dyn Embedder>,
}

impl VectorStore {
	pub async fn open(path: &Path, table_name: &str, embedder: Arc<dyn Embedder>) -> Result<Self, Error> {
		if !path.exists() {
			warn!(path = %path.display(), "vector store not found; answering from an empty store");
			return Ok(Self { table: None, embedder });
		}
		let init = |e: anyhow::Error| Error::EngineInit(format!("opening vector store {}: {e:#}", path.display()));
		let db = open_db(&path.to_string_lossy()).await.map_err(init)?;
		if !table_exists(&db, table_name).await.map_err(init)? {
			warn!(path = %path.display(), table_name, "chunk table missing; answering from an empty store");
			return Ok(Self { table: None, embedder });
		}
		if let Some(built_with) = get_meta(&db, META_TABLE, META_EMBEDDER_ID).await.map_err(init)? {
			if built_with != embedder.model_id() {
				return Err(Error::EngineInit(format!(
					"store was built with embedder '{built_with}' but '{}' is configured; rebuild the index",
					embedder.model_id()
				)));
			}
		}
		let table = db.open_table(table_name).execute().await.map_err(|e| init(e.into()))?;
		info!(path = %path.display(), table_name, "vector store opened");
		Ok(Self { table: Some(table), embedder })
	}

	pub async fn count(&self) -> Result<usize> {
		match &self.table {
			Some(t) => Ok(t.count_rows(None).await?),
			None => Ok(0),
		}
	}

	/// Up to `k` chunks nearest to `query` by cosine distance, best first.
	pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
		let Some(table) = &self.table else { return Ok(Vec::new()) };
		if k == 0 || self.count().await? == 0 {
			return Ok(Vec::new());
		}
		let q = query.to_string();
		let embedder = Arc::clone(&self.embedder);
		let mut vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&[q])).await??;
		let query_vec = vectors.pop().ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

		let mut stream = table.vector_search(query_vec)?.distance_type(DistanceType::Cosine).limit(k).execute().await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			hits.extend(batch_to_hits(&batch)?);
		}
		hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
		hits.truncate(k);
		debug!(k, hits = hits.len(), "vector search");
		Ok(hits)
	}
}

#[async_trait]
impl Retriever for VectorStore {
	async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
		self.search(query, k).await
	}
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("column '{name}' missing"))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<Int32Array>()).ok_or_else(|| anyhow!("column '{name}' missing"))
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<RetrievedChunk>> {
	let ids = string_col(batch, "id")?;
	let sources = string_col(batch, "source")?;
	let contents = string_col(batch, "content")?;
	let pages = int_col(batch, "page")?;
	let chunk_indices = int_col(batch, "chunk_index")?;
	let totals = int_col(batch, "total_chunks")?;
	let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

	let mut hits = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let source = SourceKind::from_tag(sources.value(i)).ok_or_else(|| anyhow!("unknown source tag '{}'", sources.value(i)))?;
		let page = if pages.is_null(i) { None } else { Some(u32::try_from(pages.value(i))?) };
		let chunk = Chunk {
			id: ids.value(i).to_string(),
			source,
			page,
			content: contents.value(i).to_string(),
			chunk_index: usize::try_from(chunk_indices.value(i))?,
			total_chunks: usize::try_from(totals.value(i))?,
		};
		let score = distances.map_or(0.0, |d| 1.0 - d.value(i));
		hits.push(RetrievedChunk { chunk, score });
	}
	Ok(hits)
}
