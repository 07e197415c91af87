//! Document ingestion: the insurance-product PDF (page text plus
//! reconstructed tables) and the FAQ spreadsheet become text units, which
//! are chunked and written to the vector store.

pub mod extractor;
pub mod pdf;
pub mod pipeline;
pub mod spreadsheet;
pub mod tables;

pub use extractor::{DocumentExtractor, Extraction, ExtractionReport};
pub use pipeline::{run_ingestion, IngestionSummary};
