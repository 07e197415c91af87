//! Table reconstruction from PDF content streams.
//!
//! Text-showing operators are replayed into positioned runs. Runs sharing a
//! baseline form a line, wide horizontal gaps split a line into cells, and
//! consecutive lines whose cells line up on shared column anchors form a
//! candidate table. Glyph widths are not read from font metrics; a run is
//! assumed to be `chars * font_size * 0.5` wide, which is close enough for
//! the gap test.
//!
//! Alignment alone also matches pages set in two text columns, so a candidate
//! is kept only when drawn rules frame its rows, or when its cells are short
//! values rather than wrapped sentences.

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

pub const TABLE_BANNER: &str = "--- REFERENCE TABLES ---";
pub const TABLE_DIVIDER: &str = "----------------------------";
pub const EMPTY_CELL: &str = "N/A";
pub const CELL_SEPARATOR: &str = " | ";

const GLYPH_WIDTH: f32 = 0.5;
const BASELINE_TOLERANCE: f32 = 2.0;
const CELL_GAP: f32 = 1.5;
const ANCHOR_TOLERANCE: f32 = 10.0;
const MAX_ROW_GAP: f32 = 2.5;
const RULE_SLACK: f32 = 1.0;
const RULE_REACH: f32 = 1.5;
const PROSE_CELL_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
	pub x: f32,
	pub y: f32,
	pub font_size: f32,
	pub text: String,
}

impl TextRun {
	fn width(&self) -> f32 {
		self.text.chars().count() as f32 * self.font_size * GLYPH_WIDTH
	}
}

#[derive(Debug, Clone)]
struct Cell {
	x: f32,
	end: f32,
	text: String,
}

#[derive(Debug, Clone)]
struct Line {
	y: f32,
	font_size: f32,
	cells: Vec<Cell>,
}

/// A straight path segment, normalised so `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
	pub x0: f32,
	pub y0: f32,
	pub x1: f32,
	pub y1: f32,
}

impl Rule {
	fn new((ax, ay): (f32, f32), (bx, by): (f32, f32)) -> Self {
		Self { x0: ax.min(bx), y0: ay.min(by), x1: ax.max(bx), y1: ay.max(by) }
	}

	fn is_horizontal(&self) -> bool {
		self.y1 - self.y0 <= RULE_SLACK && self.x1 - self.x0 > RULE_SLACK
	}
}

/// Text runs and drawn segments of one page, in page space.
#[derive(Debug, Clone, Default)]
pub struct PageMarks {
	pub runs: Vec<TextRun>,
	pub rules: Vec<Rule>,
}

/// Rows of cells; `None` marks a cell with no text in it.
pub type Table = Vec<Vec<Option<String>>>;

#[derive(Debug, Clone, Copy)]
struct TextState {
	font_size: f32,
	leading: f32,
	scale: f32,
	line_x: f32,
	line_y: f32,
	x: f32,
	y: f32,
}

impl Default for TextState {
	fn default() -> Self {
		Self { font_size: 12.0, leading: 0.0, scale: 1.0, line_x: 0.0, line_y: 0.0, x: 0.0, y: 0.0 }
	}
}

impl TextState {
	fn move_line(&mut self, tx: f32, ty: f32) {
		self.line_x += tx * self.scale;
		self.line_y += ty * self.scale;
		self.x = self.line_x;
		self.y = self.line_y;
	}

	fn next_line(&mut self) {
		let leading = self.leading;
		self.move_line(0.0, -leading);
	}

	fn effective_size(&self) -> f32 {
		(self.font_size * self.scale).abs().max(1.0)
	}
}

/// Affine transform `[a b c d e f]` as used by `cm`.
#[derive(Debug, Clone, Copy)]
struct Matrix([f32; 6]);

impl Default for Matrix {
	fn default() -> Self {
		Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
	}
}

impl Matrix {
	fn apply(&self, x: f32, y: f32) -> (f32, f32) {
		let [a, b, c, d, e, f] = self.0;
		(a * x + c * y + e, b * x + d * y + f)
	}

	/// `self` first, then `outer`.
	fn then(&self, outer: &Matrix) -> Matrix {
		let [a, b, c, d, e, f] = self.0;
		let [oa, ob, oc, od, oe, of] = outer.0;
		Matrix([
			a * oa + b * oc,
			a * ob + b * od,
			c * oa + d * oc,
			c * ob + d * od,
			e * oa + f * oc + oe,
			e * ob + f * od + of,
		])
	}

	fn y_scale(&self) -> f32 {
		let [_, _, c, d, _, _] = self.0;
		c.hypot(d)
	}
}

fn number(obj: &Object) -> Option<f32> {
	match obj {
		Object::Integer(i) => Some(*i as f32),
		Object::Real(r) => Some(*r as f32),
		_ => None,
	}
}

/// Decode a PDF string operand: UTF-16BE with BOM, then UTF-8, then Latin-1.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
	if let [0xFE, 0xFF, rest @ ..] = bytes {
		let units: Vec<u16> = rest.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
		return String::from_utf16_lossy(&units);
	}
	match std::str::from_utf8(bytes) {
		Ok(s) => s.to_string(),
		Err(_) => bytes.iter().map(|&b| b as char).collect(),
	}
}

fn push_run(runs: &mut Vec<TextRun>, state: &mut TextState, ctm: &Matrix, text: String) {
	if text.is_empty() {
		return;
	}
	let size = state.effective_size();
	let (x, y) = ctm.apply(state.x, state.y);
	state.x += text.chars().count() as f32 * size * GLYPH_WIDTH;
	if !text.trim().is_empty() {
		runs.push(TextRun { x, y, font_size: (size * ctm.y_scale()).max(1.0), text });
	}
}

/// Replay one page's content stream: text operators into runs, path
/// construction operators into rules. Curves only move the current point.
pub fn page_marks(content: &Content) -> PageMarks {
	let mut marks = PageMarks::default();
	let mut state = TextState::default();
	let mut ctm = Matrix::default();
	let mut saved: Vec<Matrix> = Vec::new();
	let mut current: Option<(f32, f32)> = None;
	let mut subpath_start: Option<(f32, f32)> = None;
	for op in &content.operations {
		let operands = &op.operands;
		let nums: Vec<f32> = operands.iter().filter_map(number).collect();
		match op.operator.as_str() {
			"q" => saved.push(ctm),
			"Q" => {
				if let Some(m) = saved.pop() {
					ctm = m;
				}
			}
			"cm" => {
				if let [a, b, c, d, e, f] = nums[..] {
					ctm = Matrix([a, b, c, d, e, f]).then(&ctm);
				}
			}
			"m" => {
				if let [x, y] = nums[..] {
					current = Some(ctm.apply(x, y));
					subpath_start = current;
				}
			}
			"l" => {
				if let [x, y] = nums[..] {
					let to = ctm.apply(x, y);
					if let Some(from) = current {
						marks.rules.push(Rule::new(from, to));
					}
					current = Some(to);
				}
			}
			"c" | "v" | "y" => {
				if let [.., x, y] = nums[..] {
					current = Some(ctm.apply(x, y));
				}
			}
			"h" => {
				if let (Some(from), Some(to)) = (current, subpath_start) {
					if from != to {
						marks.rules.push(Rule::new(from, to));
					}
				}
				current = subpath_start;
			}
			"re" => {
				if let [x, y, w, h] = nums[..] {
					let corners = [(x, y), (x + w, y), (x + w, y + h), (x, y + h)].map(|(px, py)| ctm.apply(px, py));
					for (i, corner) in corners.iter().enumerate() {
						marks.rules.push(Rule::new(*corner, corners[(i + 1) % 4]));
					}
					current = Some(corners[0]);
					subpath_start = current;
				}
			}
			"BT" => {
				let TextState { font_size, leading, .. } = state;
				state = TextState { font_size, leading, ..TextState::default() };
			}
			"Tf" => {
				if let Some(size) = operands.get(1).and_then(number) {
					state.font_size = size;
				}
			}
			"TL" => {
				if let Some(l) = operands.first().and_then(number) {
					state.leading = l;
				}
			}
			"Tm" => {
				if let [_, _, _, d, e, f] = nums[..] {
					state.scale = if d == 0.0 { 1.0 } else { d.abs() };
					state.line_x = e;
					state.line_y = f;
					state.x = e;
					state.y = f;
				}
			}
			"Td" | "TD" => {
				let tx = nums.first().copied().unwrap_or(0.0);
				let ty = nums.get(1).copied().unwrap_or(0.0);
				if op.operator == "TD" {
					state.leading = -ty;
				}
				state.move_line(tx, ty);
			}
			"T*" => state.next_line(),
			"Tj" => {
				if let Some(Object::String(bytes, _)) = operands.first() {
					push_run(&mut marks.runs, &mut state, &ctm, decode_pdf_string(bytes));
				}
			}
			"'" => {
				state.next_line();
				if let Some(Object::String(bytes, _)) = operands.first() {
					push_run(&mut marks.runs, &mut state, &ctm, decode_pdf_string(bytes));
				}
			}
			"\"" => {
				state.next_line();
				if let Some(Object::String(bytes, _)) = operands.get(2) {
					push_run(&mut marks.runs, &mut state, &ctm, decode_pdf_string(bytes));
				}
			}
			"TJ" => {
				if let Some(Object::Array(items)) = operands.first() {
					let mut text = String::new();
					for item in items {
						match item {
							Object::String(bytes, _) => text.push_str(&decode_pdf_string(bytes)),
							other => {
								// large negative kerning reads as a word gap
								if number(other).is_some_and(|n| n < -200.0) {
									text.push(' ');
								}
							}
						}
					}
					push_run(&mut marks.runs, &mut state, &ctm, text);
				}
			}
			_ => {}
		}
	}
	marks
}

fn group_lines(mut runs: Vec<TextRun>) -> Vec<Line> {
	runs.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));
	let mut grouped: Vec<Vec<TextRun>> = Vec::new();
	for run in runs {
		match grouped.last_mut() {
			Some(line) if (line[0].y - run.y).abs() <= BASELINE_TOLERANCE => line.push(run),
			_ => grouped.push(vec![run]),
		}
	}
	grouped.into_iter().map(split_cells).collect()
}

fn split_cells(mut runs: Vec<TextRun>) -> Line {
	runs.sort_by(|a, b| a.x.total_cmp(&b.x));
	let y = runs.first().map_or(0.0, |r| r.y);
	let font_size = runs.iter().map(|r| r.font_size).fold(0.0, f32::max);
	let mut cells: Vec<Cell> = Vec::new();
	for run in runs {
		let end = run.x + run.width();
		match cells.last_mut() {
			Some(cell) if run.x - cell.end <= CELL_GAP * run.font_size => {
				if run.x - cell.end > 0.15 * run.font_size && !cell.text.ends_with(' ') {
					cell.text.push(' ');
				}
				cell.text.push_str(&run.text);
				cell.end = cell.end.max(end);
			}
			_ => cells.push(Cell { x: run.x, end, text: run.text }),
		}
	}
	Line { y, font_size, cells }
}

fn column_anchors(lines: &[&Line]) -> Vec<f32> {
	let mut xs: Vec<f32> = lines.iter().flat_map(|l| l.cells.iter().map(|c| c.x)).collect();
	xs.sort_by(f32::total_cmp);
	let mut anchors: Vec<(f32, usize)> = Vec::new();
	for x in xs {
		match anchors.last_mut() {
			Some((a, n)) if x - *a / *n as f32 <= ANCHOR_TOLERANCE => {
				*a += x;
				*n += 1;
			}
			_ => anchors.push((x, 1)),
		}
	}
	anchors.into_iter().map(|(sum, n)| sum / n as f32).collect()
}

fn nearest_anchor(anchors: &[f32], x: f32) -> Option<usize> {
	anchors
		.iter()
		.enumerate()
		.filter(|(_, a)| (x - **a).abs() <= ANCHOR_TOLERANCE)
		.min_by(|a, b| (x - a.1).abs().total_cmp(&(x - b.1).abs()))
		.map(|(i, _)| i)
}

/// A line with a single cell joins a table only when it sits on a column
/// anchor and stays inside that column.
fn fits_columns(line: &Line, anchors: &[f32]) -> bool {
	line.cells.iter().all(|cell| match nearest_anchor(anchors, cell.x) {
		Some(i) => anchors.get(i + 1).map_or(true, |next| cell.end < *next),
		None => false,
	})
}

fn to_rows(lines: &[&Line], anchors: &[f32]) -> Table {
	lines
		.iter()
		.map(|line| {
			let mut row: Vec<Option<String>> = vec![None; anchors.len()];
			for cell in &line.cells {
				let Some(i) = nearest_anchor(anchors, cell.x) else { continue };
				match &mut row[i] {
					Some(existing) => {
						existing.push(' ');
						existing.push_str(&cell.text);
					}
					slot => *slot = Some(cell.text.clone()),
				}
			}
			row
		})
		.collect()
}

/// At least two distinct horizontal rules cross the block's rows from the
/// first column to the last.
fn is_ruled(block: &[&Line], anchors: &[f32], rules: &[Rule]) -> bool {
	let (Some(first), Some(last)) = (block.first(), block.last()) else {
		return false;
	};
	let (Some(left), Some(right)) = (anchors.first(), anchors.last()) else {
		return false;
	};
	let reach = block.iter().map(|l| l.font_size).fold(0.0, f32::max) * RULE_REACH;
	let (top, bottom) = (first.y + reach, last.y - reach);
	let mut ys: Vec<f32> = rules
		.iter()
		.filter(|r| r.is_horizontal() && r.y0 <= top && r.y0 >= bottom)
		.filter(|r| r.x0 <= left + ANCHOR_TOLERANCE && r.x1 >= *right)
		.map(|r| r.y0)
		.collect();
	ys.sort_by(f32::total_cmp);
	ys.dedup_by(|a, b| (*a - *b).abs() <= RULE_SLACK);
	ys.len() >= 2
}

/// Most cells hold long runs of words: wrapped sentences, not values.
fn reads_as_prose(block: &[&Line]) -> bool {
	let cells: Vec<&Cell> = block.iter().flat_map(|l| &l.cells).collect();
	let long = cells.iter().filter(|c| c.text.chars().count() > PROSE_CELL_CHARS).count();
	long * 2 > cells.len()
}

fn detect_in_lines(lines: &[Line], rules: &[Rule]) -> Vec<Table> {
	let mut tables = Vec::new();
	let mut i = 0;
	while i < lines.len() {
		if lines[i].cells.len() < 2 {
			i += 1;
			continue;
		}
		// grow the block over multi-cell lines first, then admit aligned single-cell rows
		let mut block: Vec<&Line> = vec![&lines[i]];
		let mut j = i + 1;
		while j < lines.len() {
			let prev = block[block.len() - 1];
			let gap = prev.y - lines[j].y;
			if gap > MAX_ROW_GAP * prev.font_size.max(lines[j].font_size) {
				break;
			}
			if lines[j].cells.len() >= 2 {
				block.push(&lines[j]);
			} else {
				let multi: Vec<&Line> = block.iter().copied().filter(|l| l.cells.len() >= 2).collect();
				if !fits_columns(&lines[j], &column_anchors(&multi)) {
					break;
				}
				block.push(&lines[j]);
			}
			j += 1;
		}
		let multi: Vec<&Line> = block.iter().copied().filter(|l| l.cells.len() >= 2).collect();
		let anchors = column_anchors(&multi);
		if multi.len() >= 2 && anchors.len() >= 2 {
			if is_ruled(&block, &anchors, rules) || !reads_as_prose(&block) {
				debug!(rows = block.len(), columns = anchors.len(), "table detected");
				tables.push(to_rows(&block, &anchors));
			} else {
				debug!(rows = block.len(), columns = anchors.len(), "aligned block reads as column text, skipped");
			}
			i = j;
		} else {
			i += 1;
		}
	}
	tables
}

pub fn detect_tables(marks: PageMarks) -> Vec<Table> {
	let PageMarks { runs, rules } = marks;
	detect_in_lines(&group_lines(runs), &rules)
}

/// Tables found on one page of a loaded document.
pub fn page_tables(doc: &Document, page_id: ObjectId) -> anyhow::Result<Vec<Table>> {
	let bytes = doc.get_page_content(page_id)?;
	let content = Content::decode(&bytes)?;
	Ok(detect_tables(page_marks(&content)))
}

fn clean_cell(cell: Option<&String>) -> String {
	let text = cell.map(|c| c.replace('\n', " ")).unwrap_or_default();
	let text = text.trim();
	if text.is_empty() { EMPTY_CELL.to_string() } else { text.to_string() }
}

/// Text appended to a page holding tables. Empty when there are none.
pub fn render_tables(tables: &[Table]) -> String {
	if tables.is_empty() {
		return String::new();
	}
	let mut out = format!("\n\n{TABLE_BANNER}\n");
	for table in tables {
		for row in table {
			let cells: Vec<String> = row.iter().map(|c| clean_cell(c.as_ref())).collect();
			out.push_str(&cells.join(CELL_SEPARATOR));
			out.push('\n');
		}
		out.push_str(TABLE_DIVIDER);
		out.push('\n');
	}
	out
}
