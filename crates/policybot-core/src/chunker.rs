//! Length-bounded, overlapping text splitter.
//!
//! Lengths are counted in characters. A unit that already fits becomes a
//! single chunk equal to its text. Longer units are walked window by window:
//! each chunk ends on the coarsest natural boundary found in the back part of
//! the window (paragraph, line, sentence, word, then any character) and the
//! next chunk starts at least `chunk_overlap` characters before that end.

use tracing::debug;

use crate::config::ChunkingSettings;
use crate::types::{Chunk, TextUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

const BOUNDARIES: [Boundary; 4] = [Boundary::Paragraph, Boundary::Line, Boundary::Sentence, Boundary::Word];

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkingSettings::default())
    }
}

impl Chunker {
    pub fn new(settings: ChunkingSettings) -> Self {
        let chunk_size = settings.chunk_size.max(1);
        let chunk_overlap = settings.chunk_overlap.min(chunk_size - 1);
        Self { chunk_size, chunk_overlap }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split every unit, keeping each unit's source metadata on its chunks.
    pub fn split_units(&self, units: &[TextUnit]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for (ordinal, unit) in units.iter().enumerate() {
            let pieces = self.split_text(&unit.text);
            let total_chunks = pieces.len();
            for (chunk_index, content) in pieces.into_iter().enumerate() {
                let id = chunk_id(unit, ordinal, chunk_index, &content);
                chunks.push(Chunk {
                    id,
                    source: unit.source,
                    page: unit.page,
                    content,
                    chunk_index,
                    total_chunks,
                });
            }
        }
        debug!(units = units.len(), chunks = chunks.len(), "split text units");
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        if n <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut pieces = Vec::new();
        let mut start = 0usize;
        loop {
            let window_end = (start + self.chunk_size).min(n);
            if window_end == n {
                pieces.push(chars[start..n].iter().collect());
                break;
            }
            let end = self.find_break(&chars, start, window_end);
            pieces.push(chars[start..end].iter().collect());
            start = self.next_start(&chars, start, end);
        }
        pieces
    }

    /// Characters of slack allowed when snapping a chunk start to a word.
    fn snap_slack(&self) -> usize {
        self.chunk_overlap / 4
    }

    /// Earliest offset (relative to `start`) a chunk may end at.
    fn min_chunk_len(&self) -> usize {
        let wanted = (self.chunk_size / 2).max(self.chunk_overlap + self.snap_slack() + 1);
        wanted.min(self.chunk_size)
    }

    fn find_break(&self, chars: &[char], start: usize, window_end: usize) -> usize {
        let lo = start + self.min_chunk_len();
        for boundary in BOUNDARIES {
            if let Some(p) = (lo..=window_end).rev().find(|&p| is_boundary(chars, p, boundary)) {
                return p;
            }
        }
        window_end
    }

    fn next_start(&self, chars: &[char], start: usize, end: usize) -> usize {
        let target = end.saturating_sub(self.chunk_overlap).max(start + 1);
        let floor = target.saturating_sub(self.snap_slack()).max(start + 1);
        (floor..=target)
            .rev()
            .find(|&p| chars[p - 1].is_whitespace() && !chars[p].is_whitespace())
            .unwrap_or(target)
    }
}

/// Whether a chunk may end right before position `p`.
fn is_boundary(chars: &[char], p: usize, boundary: Boundary) -> bool {
    if p == 0 || p >= chars.len() {
        return false;
    }
    match boundary {
        Boundary::Paragraph => chars[p] == '\n' && chars.get(p + 1) == Some(&'\n'),
        Boundary::Line => chars[p] == '\n',
        Boundary::Sentence => matches!(chars[p - 1], '.' | '!' | '?') && chars[p].is_whitespace(),
        Boundary::Word => chars[p].is_whitespace(),
    }
}

fn chunk_id(unit: &TextUnit, ordinal: usize, chunk_index: usize, content: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(unit.source.tag().as_bytes());
    hasher.update(&unit.page.unwrap_or(0).to_le_bytes());
    hasher.update(&(ordinal as u64).to_le_bytes());
    hasher.update(&(chunk_index as u64).to_le_bytes());
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prose(paragraphs: usize) -> String {
        (0..paragraphs)
            .map(|p| {
                (0..12)
                    .map(|s| format!("Clause {p}.{s} describes coverage terms for the insured party."))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn assert_bounded_and_overlapping(chunker: &Chunker, pieces: &[String]) {
        for piece in pieces {
            assert!(piece.chars().count() <= chunker.chunk_size(), "chunk too long: {}", piece.chars().count());
        }
        for pair in pieces.windows(2) {
            let head: String = pair[1].chars().take(chunker.chunk_overlap()).collect();
            assert!(pair[0].contains(&head), "next chunk must start inside the previous one");
        }
    }

    #[test]
    fn short_text_is_one_identical_chunk() {
        let chunker = Chunker::default();
        let text = "  Short page\n\nwith two paragraphs.  ";
        assert_eq!(chunker.split_text(text), vec![text.to_string()]);

        let exact: String = "x".repeat(2000);
        assert_eq!(chunker.split_text(&exact), vec![exact.clone()]);
    }

    #[test]
    fn blank_text_yields_nothing() {
        assert!(Chunker::default().split_text(" \n\n\t ").is_empty());
    }

    #[test]
    fn long_prose_respects_size_and_overlap() {
        let chunker = Chunker::default();
        let text = prose(12);
        assert!(text.chars().count() > 2000);
        let pieces = chunker.split_text(&text);
        assert!(pieces.len() > 1);
        assert_bounded_and_overlapping(&chunker, &pieces);
        assert!(text.ends_with(pieces.last().expect("last")));
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let chunker = Chunker::default();
        let para = "a".repeat(1500);
        let text = format!("{para}\n\n{para}");
        let pieces = chunker.split_text(&text);
        assert_eq!(pieces[0], para);
        assert_bounded_and_overlapping(&chunker, &pieces);
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let chunker = Chunker::default();
        let text = "z".repeat(5000);
        let pieces = chunker.split_text(&text);
        assert!(pieces.len() >= 3);
        assert_eq!(pieces[0].len(), 2000);
        assert_bounded_and_overlapping(&chunker, &pieces);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunker = Chunker::default();
        let text = "ñ".repeat(2000);
        assert_eq!(chunker.split_text(&text).len(), 1);
        let longer = "póliza vigente ".repeat(300);
        let pieces = chunker.split_text(&longer);
        assert_bounded_and_overlapping(&chunker, &pieces);
    }

    #[test]
    fn small_windows_still_make_progress() {
        let chunker = Chunker::new(ChunkingSettings { chunk_size: 50, chunk_overlap: 45 });
        let text = prose(2);
        let pieces = chunker.split_text(&text);
        assert!(!pieces.is_empty());
        assert_bounded_and_overlapping(&chunker, &pieces);
    }

    #[test]
    fn units_keep_metadata_and_positions() {
        let chunker = Chunker::default();
        let units = vec![
            TextUnit::pdf_page(prose(10), 3),
            TextUnit::spreadsheet("QUESTION: a\nANSWER: b".to_string()),
        ];
        let chunks = chunker.split_units(&units);
        let (pdf, faq): (Vec<_>, Vec<_>) = chunks.iter().partition(|c| c.page.is_some());
        assert!(pdf.len() > 1);
        for (i, c) in pdf.iter().enumerate() {
            assert_eq!(c.page, Some(3));
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.total_chunks, pdf.len());
        }
        assert_eq!(faq.len(), 1);
        assert_eq!(faq[0].content, "QUESTION: a\nANSWER: b");
    }

    #[test]
    fn splitting_is_deterministic() {
        let chunker = Chunker::default();
        let units = vec![TextUnit::pdf_page(prose(9), 1), TextUnit::spreadsheet("QUESTION: x\nANSWER: y".into())];
        assert_eq!(chunker.split_units(&units), chunker.split_units(&units));
    }

    #[test]
    fn duplicate_units_get_distinct_ids() {
        let chunker = Chunker::default();
        let unit = TextUnit::spreadsheet("QUESTION: x\nANSWER: y".into());
        let chunks = chunker.split_units(&[unit.clone(), unit]);
        assert_ne!(chunks[0].id, chunks[1].id);
    }
}
