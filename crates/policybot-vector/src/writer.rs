//! One-shot index build.
//!
//! Chunks are embedded and written into a staging directory next to the
//! target; the finished store then replaces the live one by directory
//! renames, so readers never observe a half-built or missing store.

use anyhow::{anyhow, Context, Result};
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use policybot_core::error::Error;
use policybot_core::traits::Embedder;
use policybot_core::types::Chunk;

use crate::schema::{build_chunk_schema, META_BUILT_AT, META_CHUNK_COUNT, META_DIM, META_EMBEDDER_ID, META_TABLE};
use crate::table::{ensure_table, open_db, set_meta};

const INSERT_BATCH: usize = 1000;
const MOVE_ATTEMPTS: usize = 3;
const MOVE_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct IndexReport {
	pub path: PathBuf,
	pub chunk_count: usize,
	pub dim: usize,
	pub embedder_id: String,
}

pub struct IndexBuilder {
	target: PathBuf,
	table_name: String,
	embedder: Arc<dyn Embedder>,
	batch_size: usize,
}

impl IndexBuilder {
	pub fn new(target: impl Into<PathBuf>, table_name: &str, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
		Self { target: target.into(), table_name: table_name.to_string(), embedder, batch_size: batch_size.max(1) }
	}

	/// Replace the store at the target path with one holding exactly `chunks`.
	pub async fn rebuild(&self, chunks: &[Chunk]) -> Result<IndexReport, Error> {
		let parent = self.target.parent().filter(|p| !p.as_os_str().is_empty()).map_or_else(|| PathBuf::from("."), Path::to_path_buf);
		fs::create_dir_all(&parent).map_err(|e| Error::IndexRebuild(format!("creating {}: {e}", parent.display())))?;
		let staging = tempfile::Builder::new()
			.prefix(&format!(".{}.staging-", dir_name(&self.target)))
			.tempdir_in(&parent)
			.map_err(|e| Error::IndexRebuild(format!("creating staging dir in {}: {e}", parent.display())))?;
		info!(path = %self.target.display(), staging = %staging.path().display(), chunks = chunks.len(), "building vector index");

		let embeddings = self.embed_all(chunks).await.map_err(|e| Error::IndexRebuild(format!("embedding failed: {e:#}")))?;
		self.write_store(staging.path(), chunks, &embeddings)
			.await
			.map_err(|e| Error::IndexRebuild(format!("writing store failed: {e:#}")))?;

		let staged = staging.path().to_path_buf();
		let target = self.target.clone();
		tokio::task::spawn_blocking(move || swap_into_place(&staged, &target))
			.await
			.map_err(|e| Error::IndexRebuild(format!("swap task failed: {e}")))?
			.map_err(|e| Error::IndexRebuild(format!("{e:#}")))?;
		// staging dir has been renamed away; dropping the guard is a no-op
		drop(staging);

		info!(path = %self.target.display(), chunks = chunks.len(), "vector index ready");
		Ok(IndexReport {
			path: self.target.clone(),
			chunk_count: chunks.len(),
			dim: self.embedder.dim(),
			embedder_id: self.embedder.model_id().to_string(),
		})
	}

	async fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
		let pb = ProgressBar::new(chunks.len() as u64);
		pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?.progress_chars("#>-"));
		let dim = self.embedder.dim();
		let mut out = Vec::with_capacity(chunks.len());
		for batch in chunks.chunks(self.batch_size) {
			let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
			let embedder = Arc::clone(&self.embedder);
			let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts)).await??;
			if vectors.len() != batch.len() { return Err(anyhow!("embedder returned {} vectors for {} chunks", vectors.len(), batch.len())); }
			if let Some(v) = vectors.iter().find(|v| v.len() != dim) { return Err(anyhow!("dim mismatch: got {} expected {}", v.len(), dim)); }
			out.extend(vectors);
			pb.inc(batch.len() as u64);
		}
		pb.finish_with_message("embedded");
		Ok(out)
	}

	async fn write_store(&self, dir: &Path, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
		let db = open_db(&dir.to_string_lossy()).await?;
		let dim = i32::try_from(self.embedder.dim()).context("embedding dim out of range")?;
		if chunks.is_empty() {
			ensure_table(&db, &self.table_name, build_chunk_schema(dim)).await?;
		}
		for (i, (chunk_batch, emb_batch)) in chunks.chunks(INSERT_BATCH).zip(embeddings.chunks(INSERT_BATCH)).enumerate() {
			self.insert_batch(&db, chunk_batch, emb_batch, dim).await?;
			debug!(batch = i, rows = chunk_batch.len(), "inserted batch");
		}
		set_meta(&db, META_TABLE, META_EMBEDDER_ID, self.embedder.model_id()).await?;
		set_meta(&db, META_TABLE, META_DIM, &self.embedder.dim().to_string()).await?;
		set_meta(&db, META_TABLE, META_CHUNK_COUNT, &chunks.len().to_string()).await?;
		set_meta(&db, META_TABLE, META_BUILT_AT, &Utc::now().to_rfc3339()).await?;
		Ok(())
	}

	async fn insert_batch(&self, db: &Connection, chunks: &[Chunk], embeddings: &[Vec<f32>], dim: i32) -> Result<()> {
		let record_batch = chunks_to_record_batch(chunks, embeddings, dim)?;
		let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		if db.table_names().execute().await?.contains(&self.table_name) {
			db.open_table(&self.table_name).execute().await?.add(reader).execute().await?;
		} else {
			db.create_table(&self.table_name, reader).execute().await?;
		}
		Ok(())
	}
}

pub(crate) fn chunks_to_record_batch(chunks: &[Chunk], embeddings: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
	let schema = build_chunk_schema(dim);
	let mut ids = Vec::new(); let mut sources = Vec::new(); let mut pages = Vec::new(); let mut chunk_indices = Vec::new(); let mut total_chunks = Vec::new(); let mut contents = Vec::new(); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
	for (chunk, embedding) in chunks.iter().zip(embeddings) {
		ids.push(chunk.id.clone());
		sources.push(chunk.source.tag());
		pages.push(chunk.page.map(i32::try_from).transpose()?);
		chunk_indices.push(i32::try_from(chunk.chunk_index)?);
		total_chunks.push(i32::try_from(chunk.total_chunks)?);
		contents.push(chunk.content.clone());
		vectors.push(Some(embedding.iter().map(|&x| Some(x)).collect()));
	}
	let record_batch = RecordBatch::try_new(schema, vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(sources)),
		Arc::new(Int32Array::from(pages)),
		Arc::new(Int32Array::from(chunk_indices)),
		Arc::new(Int32Array::from(total_chunks)),
		Arc::new(StringArray::from(contents)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
	])?;
	Ok(record_batch)
}

fn dir_name(path: &Path) -> String {
	path.file_name().map_or_else(|| "store".to_string(), |n| n.to_string_lossy().to_string())
}

fn retry<T>(what: &str, mut op: impl FnMut() -> std::io::Result<T>) -> std::io::Result<T> {
	let mut attempt = 1;
	loop {
		match op() {
			Ok(v) => return Ok(v),
			Err(e) if attempt < MOVE_ATTEMPTS => {
				warn!(attempt, error = %e, "{what} failed, retrying");
				std::thread::sleep(MOVE_PAUSE);
				attempt += 1;
			}
			Err(e) => return Err(e),
		}
	}
}

/// Move `staged` to `target`. An existing target is first renamed aside and
/// restored if the final rename fails; it is deleted only once the new
/// store is in place.
pub fn swap_into_place(staged: &Path, target: &Path) -> Result<()> {
	let backup = if target.exists() {
		let name = format!(".{}.old-{}", dir_name(target), Utc::now().format("%Y%m%d%H%M%S%3f"));
		let backup = target.with_file_name(name);
		retry("moving old store aside", || fs::rename(target, &backup)).map_err(|e| {
			anyhow!("could not move existing store {} aside (is it open elsewhere?): {e}", target.display())
		})?;
		Some(backup)
	} else {
		None
	};

	if let Err(e) = fs::rename(staged, target) {
		if let Some(backup) = &backup {
			if let Err(restore) = fs::rename(backup, target) {
				warn!(backup = %backup.display(), error = %restore, "could not restore previous store");
			}
		}
		return Err(anyhow!("could not move new store into {}: {e}", target.display()));
	}

	if let Some(backup) = backup {
		if let Err(e) = retry("removing old store", || fs::remove_dir_all(&backup)) {
			warn!(backup = %backup.display(), error = %e, "new store is live but the previous one could not be removed");
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use arrow_array::Array;
	use policybot_core::types::SourceKind;

	#[test]
	fn swap_replaces_existing_directory() {
		let tmp = tempfile::tempdir().expect("tmp");
		let target = tmp.path().join("db");
		let staged = tmp.path().join("staged");
		fs::create_dir_all(&target).expect("mk target");
		fs::write(target.join("old.txt"), "old").expect("write old");
		fs::create_dir_all(&staged).expect("mk staged");
		fs::write(staged.join("new.txt"), "new").expect("write new");

		swap_into_place(&staged, &target).expect("swap");

		assert!(target.join("new.txt").exists());
		assert!(!target.join("old.txt").exists());
		assert!(!staged.exists());
		let leftovers: Vec<_> = fs::read_dir(tmp.path()).expect("ls").filter_map(|e| e.ok()).collect();
		assert_eq!(leftovers.len(), 1, "backup is removed after a successful swap");
	}

	#[test]
	fn failed_swap_restores_previous_store() {
		let tmp = tempfile::tempdir().expect("tmp");
		let target = tmp.path().join("db");
		fs::create_dir_all(&target).expect("mk target");
		fs::write(target.join("old.txt"), "old").expect("write old");

		let missing = tmp.path().join("never-built");
		assert!(swap_into_place(&missing, &target).is_err());
		assert!(target.join("old.txt").exists(), "old store is back in place");
	}

	#[test]
	fn record_batch_keeps_nullable_pages() {
		let chunks = vec![
			Chunk { id: "a".into(), source: SourceKind::Pdf, page: Some(2), content: "x".into(), chunk_index: 0, total_chunks: 1 },
			Chunk { id: "b".into(), source: SourceKind::Spreadsheet, page: None, content: "y".into(), chunk_index: 0, total_chunks: 1 },
		];
		let rb = chunks_to_record_batch(&chunks, &[vec![0.0; 3], vec![1.0; 3]], 3).expect("batch");
		assert_eq!(rb.num_rows(), 2);
		let pages = rb.column_by_name("page").and_then(|c| c.as_any().downcast_ref::<Int32Array>()).expect("page col");
		assert_eq!(pages.value(0), 2);
		assert!(pages.is_null(1));
	}
}
