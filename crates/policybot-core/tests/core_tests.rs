use policybot_core::chunker::Chunker;
use policybot_core::config::ChunkingSettings;
use policybot_core::types::{SourceKind, TextUnit};

fn long_page(words: usize) -> String {
    (0..words).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ")
}

#[test]
fn short_units_pass_through_unchanged() {
    let chunker = Chunker::default();
    let units = vec![
        TextUnit::pdf_page("Page one text".to_string(), 1),
        TextUnit::spreadsheet("QUESTION: q\nANSWER: a".to_string()),
    ];
    let chunks = chunker.split_units(&units);

    assert_eq!(chunks.len(), 2, "each short unit becomes one chunk");
    assert_eq!(chunks[0].content, "Page one text");
    assert_eq!(chunks[0].source, SourceKind::Pdf);
    assert_eq!(chunks[0].page, Some(1));
    assert_eq!(chunks[1].source, SourceKind::Spreadsheet);
    assert_eq!(chunks[1].page, None);
}

#[test]
fn long_unit_chunks_are_bounded_and_overlap() {
    let chunker = Chunker::new(ChunkingSettings { chunk_size: 2000, chunk_overlap: 400 });
    let text = long_page(1500);
    let chunks = chunker.split_units(&[TextUnit::pdf_page(text.clone(), 7)]);

    assert!(chunks.len() > 1);
    for c in &chunks {
        assert!(c.content.chars().count() <= 2000);
        assert_eq!(c.page, Some(7));
        assert_eq!(c.total_chunks, chunks.len());
    }
    for pair in chunks.windows(2) {
        let head: String = pair[1].content.chars().take(400).collect();
        assert!(pair[0].content.contains(&head), "consecutive chunks share at least 400 chars");
    }
    // every word of the page survives somewhere
    for probe in ["word0", "word777", "word1499"] {
        assert!(chunks.iter().any(|c| c.content.split_whitespace().any(|w| w == probe)));
    }
}

#[test]
fn empty_units_produce_no_chunks() {
    let chunker = Chunker::default();
    let chunks = chunker.split_units(&[TextUnit::pdf_page("   \n".to_string(), 2)]);
    assert!(chunks.is_empty());
}
