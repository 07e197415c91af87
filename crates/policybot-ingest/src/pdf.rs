use anyhow::{anyhow, Result};
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

use policybot_core::types::TextUnit;

use crate::tables::{page_tables, render_tables, Table};

/// Plain text of every page, in page order.
///
/// `pdf-extract` handles font encodings better but can fail or panic on
/// unusual files; `lopdf`'s own extractor is the fallback.
fn page_texts(path: &Path, doc: &Document) -> Result<Vec<String>> {
	let attempt = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pdf_extract::extract_text_by_pages(path)));
	let reason = match attempt {
		Ok(Ok(pages)) => return Ok(pages),
		Ok(Err(e)) => e.to_string(),
		Err(panic) => panic
			.downcast_ref::<&str>()
			.map(|s| (*s).to_string())
			.or_else(|| panic.downcast_ref::<String>().cloned())
			.unwrap_or_else(|| "unknown panic".to_string()),
	};
	warn!(path = %path.display(), %reason, "pdf-extract failed, falling back to lopdf");
	let mut texts = Vec::new();
	for page_num in doc.get_pages().keys() {
		texts.push(doc.extract_text(&[*page_num]).unwrap_or_default());
	}
	if texts.iter().all(|t| t.trim().is_empty()) {
		return Err(anyhow!("no text could be extracted ({reason})"));
	}
	Ok(texts)
}

/// One unit per page with content: the page text followed by any tables
/// found on it. Pages left empty after that are skipped.
pub fn extract_pdf(path: &Path) -> Result<Vec<TextUnit>> {
	let doc = Document::load(path).map_err(|e| anyhow!("failed to load PDF: {e}"))?;
	let pages = doc.get_pages();
	let texts = page_texts(path, &doc)?;

	let mut units = Vec::new();
	for (idx, (page_num, page_id)) in pages.iter().enumerate() {
		let mut text = texts.get(idx).cloned().unwrap_or_default();
		let tables: Vec<Table> = page_tables(&doc, *page_id).unwrap_or_else(|e| {
			warn!(page = page_num, error = %e, "table detection failed; keeping page text only");
			Vec::new()
		});
		text.push_str(&render_tables(&tables));
		if text.trim().is_empty() {
			debug!(page = page_num, "skipping empty page");
			continue;
		}
		debug!(page = page_num, chars = text.chars().count(), tables = tables.len(), "page extracted");
		units.push(TextUnit::pdf_page(text, *page_num));
	}
	Ok(units)
}
