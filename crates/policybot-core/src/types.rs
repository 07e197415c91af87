//! Domain types shared by the extractor, chunker, vector store and answer engine.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChunkId = String;

/// Which input document a piece of text came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Pdf,
    Spreadsheet,
}

impl SourceKind {
    /// Tag stored alongside every chunk in the vector store.
    pub fn tag(self) -> &'static str {
        match self {
            SourceKind::Pdf => "PDF",
            SourceKind::Spreadsheet => "Spreadsheet",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "PDF" => Some(SourceKind::Pdf),
            "Spreadsheet" => Some(SourceKind::Spreadsheet),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One extracted piece of source text.
///
/// - `text`: page text (with any rendered tables appended) or a FAQ pair
/// - `source`: originating document
/// - `page`: 1-based page number, PDF units only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub text: String,
    pub source: SourceKind,
    pub page: Option<u32>,
}

impl TextUnit {
    pub fn pdf_page(text: String, page: u32) -> Self {
        Self { text, source: SourceKind::Pdf, page: Some(page) }
    }

    pub fn spreadsheet(text: String) -> Self {
        Self { text, source: SourceKind::Spreadsheet, page: None }
    }
}

/// A question/answer row read from the FAQ spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaqPair {
    pub question: String,
    pub answer: String,
}

impl FaqPair {
    pub fn render(&self) -> String {
        format!("QUESTION: {}\nANSWER: {}", self.question, self.answer)
    }
}

impl From<FaqPair> for TextUnit {
    fn from(pair: FaqPair) -> Self {
        TextUnit::spreadsheet(pair.render())
    }
}

/// A bounded slice of a `TextUnit`, the unit of embedding and retrieval.
///
/// `chunk_index`/`total_chunks` give the position within the parent unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source: SourceKind,
    pub page: Option<u32>,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// A stored chunk returned by a similarity query. Higher `score` is closer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a chat session transcript. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}
