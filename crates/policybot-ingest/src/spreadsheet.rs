use anyhow::{anyhow, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use tracing::debug;

use policybot_core::types::{FaqPair, TextUnit};

/// Cell text, or `None` for cells that count as missing.
fn cell_value(cell: &Data) -> Option<String> {
	let text = match cell {
		Data::Empty | Data::Error(_) => return None,
		Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
		Data::Int(i) => i.to_string(),
		Data::Float(f) if f.fract() == 0.0 => format!("{f:.0}"),
		Data::Float(f) => f.to_string(),
		Data::Bool(b) => b.to_string(),
		Data::DateTime(dt) => dt.to_string(),
	};
	let trimmed = text.trim();
	if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// FAQ pairs from the first two columns of each row; rows missing either
/// value are dropped.
pub fn faq_pairs(rows: &[Vec<Data>], has_header: bool) -> Vec<FaqPair> {
	let skip = usize::from(has_header);
	rows.iter()
		.skip(skip)
		.filter_map(|row| {
			let question = row.first().and_then(cell_value)?;
			let answer = row.get(1).and_then(cell_value)?;
			Some(FaqPair { question, answer })
		})
		.collect()
}

pub fn extract_spreadsheet(path: &Path, has_header: bool) -> Result<Vec<TextUnit>> {
	let mut workbook = open_workbook_auto(path).map_err(|e| anyhow!("failed to open workbook: {e}"))?;
	let sheet = workbook.sheet_names().first().cloned().ok_or_else(|| anyhow!("workbook has no worksheets"))?;
	let range = workbook.worksheet_range(&sheet).map_err(|e| anyhow!("failed to read worksheet '{sheet}': {e}"))?;
	let rows: Vec<Vec<Data>> = range.rows().map(<[Data]>::to_vec).collect();
	let pairs = faq_pairs(&rows, has_header);
	debug!(sheet = %sheet, rows = rows.len(), pairs = pairs.len(), "worksheet read");
	Ok(pairs.into_iter().map(TextUnit::from).collect())
}
