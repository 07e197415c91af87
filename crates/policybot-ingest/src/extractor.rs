//! Reads both input documents into text units.
//!
//! A source that is missing or fails to parse is logged and skipped; the
//! other source is still read. Only when neither yields anything does
//! extraction fail.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use policybot_core::config::Settings;
use policybot_core::error::{Error, Result};
use policybot_core::types::{SourceKind, TextUnit};

use crate::pdf::extract_pdf;
use crate::spreadsheet::extract_spreadsheet;

#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
	pub pdf_units: usize,
	pub spreadsheet_units: usize,
	/// Sources that contributed nothing, with the reason.
	pub skipped: Vec<(SourceKind, String)>,
}

impl ExtractionReport {
	pub fn total_units(&self) -> usize {
		self.pdf_units + self.spreadsheet_units
	}
}

impl fmt::Display for ExtractionReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} PDF page(s), {} FAQ row(s)", self.pdf_units, self.spreadsheet_units)?;
		for (kind, reason) in &self.skipped {
			write!(f, "; {kind} skipped: {reason}")?;
		}
		Ok(())
	}
}

#[derive(Debug, Clone)]
pub struct Extraction {
	pub units: Vec<TextUnit>,
	pub report: ExtractionReport,
}

#[derive(Debug, Clone)]
pub struct DocumentExtractor {
	pdf_path: PathBuf,
	spreadsheet_path: PathBuf,
	spreadsheet_has_header: bool,
}

impl DocumentExtractor {
	pub fn new(pdf_path: impl Into<PathBuf>, spreadsheet_path: impl Into<PathBuf>) -> Self {
		Self { pdf_path: pdf_path.into(), spreadsheet_path: spreadsheet_path.into(), spreadsheet_has_header: true }
	}

	pub fn from_settings(settings: &Settings) -> Self {
		Self::new(settings.pdf_path(), settings.spreadsheet_path()).with_header(settings.data.spreadsheet_has_header)
	}

	pub fn with_header(mut self, has_header: bool) -> Self {
		self.spreadsheet_has_header = has_header;
		self
	}

	/// PDF units first (page order), then FAQ units (row order).
	pub fn extract(&self) -> Result<Extraction> {
		let mut report = ExtractionReport::default();
		let mut units = Vec::new();

		match read_source(SourceKind::Pdf, &self.pdf_path, extract_pdf) {
			Ok(pdf) => {
				info!(path = %self.pdf_path.display(), pages = pdf.len(), "PDF read");
				report.pdf_units = pdf.len();
				units.extend(pdf);
			}
			Err(e) => skip(&mut report, SourceKind::Pdf, &e),
		}

		let has_header = self.spreadsheet_has_header;
		match read_source(SourceKind::Spreadsheet, &self.spreadsheet_path, |p| extract_spreadsheet(p, has_header)) {
			Ok(faq) => {
				info!(path = %self.spreadsheet_path.display(), rows = faq.len(), "spreadsheet read");
				report.spreadsheet_units = faq.len();
				units.extend(faq);
			}
			Err(e) => skip(&mut report, SourceKind::Spreadsheet, &e),
		}

		if units.is_empty() {
			error!(%report, "no documents extracted");
			return Err(Error::NoSources);
		}
		info!(%report, "extraction finished");
		Ok(Extraction { units, report })
	}
}

fn read_source(kind: SourceKind, path: &Path, read: impl FnOnce(&Path) -> anyhow::Result<Vec<TextUnit>>) -> Result<Vec<TextUnit>> {
	if !path.exists() {
		return Err(Error::SourceMissing { kind, path: path.to_path_buf() });
	}
	read(path).map_err(|e| Error::Parse { kind, path: path.to_path_buf(), message: format!("{e:#}") })
}

fn skip(report: &mut ExtractionReport, kind: SourceKind, err: &Error) {
	warn!(%kind, error = %err, "source skipped");
	report.skipped.push((kind, err.to_string()));
}
