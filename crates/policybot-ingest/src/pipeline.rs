use std::sync::Arc;
use tracing::info;

use policybot_core::chunker::Chunker;
use policybot_core::config::Settings;
use policybot_core::error::Result;
use policybot_core::traits::Embedder;
use policybot_vector::{IndexBuilder, IndexReport};

use crate::extractor::{DocumentExtractor, ExtractionReport};

#[derive(Debug, Clone)]
pub struct IngestionSummary {
	pub extraction: ExtractionReport,
	pub index: IndexReport,
}

/// Extract, chunk and index both sources, replacing the store at
/// `data.db_dir`. Nothing on disk changes if extraction yields nothing.
pub async fn run_ingestion(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<IngestionSummary> {
	let extraction = DocumentExtractor::from_settings(settings).extract()?;
	let chunks = Chunker::new(settings.chunking).split_units(&extraction.units);
	info!(units = extraction.units.len(), chunks = chunks.len(), "documents chunked");

	let builder = IndexBuilder::new(settings.db_dir(), &settings.data.table_name, embedder, settings.embedding.batch_size);
	let index = builder.rebuild(&chunks).await?;
	Ok(IngestionSummary { extraction: extraction.report, index })
}
