use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use policybot_answer::{ChatMessage, ChatModel, ChatRole, Engine, Session, TurnState, NO_INFORMATION_ANSWER, WELCOME_MESSAGE};
use policybot_core::chunker::Chunker;
use policybot_core::error::Error;
use policybot_core::traits::{Embedder, Retriever};
use policybot_core::types::{Chunk, FaqPair, RetrievedChunk, Role, SourceKind, TextUnit};
use policybot_embed::{FakeEmbedder, MINILM_DIM};
use policybot_vector::{IndexBuilder, VectorStore};

/// Replies with the system message it was given, so tests can see the context.
struct EchoChat {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for EchoChat {
    fn model_id(&self) -> &str {
        "echo"
    }

    async fn complete(&self, messages: &[ChatMessage], _temperature: f32) -> policybot_core::error::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1].role, ChatRole::User);
        Ok(messages[0].content.clone())
    }
}

struct FailingChat;

#[async_trait]
impl ChatModel for FailingChat {
    fn model_id(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _messages: &[ChatMessage], _temperature: f32) -> policybot_core::error::Result<String> {
        Err(Error::Generation("chat endpoint returned 429 Too Many Requests: rate limited".to_string()))
    }
}

struct FixedRetriever(Vec<RetrievedChunk>);

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(&self, _query: &str, k: usize) -> anyhow::Result<Vec<RetrievedChunk>> {
        Ok(self.0.iter().take(k).cloned().collect())
    }
}

struct BrokenRetriever;

#[async_trait]
impl Retriever for BrokenRetriever {
    async fn retrieve(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<RetrievedChunk>> {
        anyhow::bail!("store unavailable")
    }
}

fn hit(content: &str) -> RetrievedChunk {
    RetrievedChunk {
        chunk: Chunk {
            id: content.to_string(),
            source: SourceKind::Spreadsheet,
            page: None,
            content: content.to_string(),
            chunk_index: 0,
            total_chunks: 1,
        },
        score: 0.5,
    }
}

fn echo() -> Arc<EchoChat> {
    Arc::new(EchoChat { calls: AtomicUsize::new(0) })
}

#[tokio::test]
async fn empty_retrieval_answers_without_calling_the_model() {
    let chat = echo();
    let engine = Engine::new(Arc::new(FixedRetriever(Vec::new())), chat.clone(), 0.3, 4);
    let outcome = engine.ask("What is the grace period?").await.expect("ask");
    assert_eq!(outcome.state, TurnState::AnsweredFallback);
    assert_eq!(outcome.answer, NO_INFORMATION_ANSWER);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retrieved_chunks_become_the_context() {
    let chat = echo();
    let chunks = vec![hit("QUESTION: a\nANSWER: b"), hit("second chunk")];
    let engine = Engine::new(Arc::new(FixedRetriever(chunks)), chat.clone(), 0.3, 4);
    let outcome = engine.ask("anything").await.expect("ask");
    assert_eq!(outcome.state, TurnState::Answered);
    assert!(outcome.answer.ends_with("CONTEXT FOUND:\n- QUESTION: a\nANSWER: b\n\n- second chunk"));
    assert_eq!(outcome.sources.len(), 2);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn top_k_limits_what_is_retrieved() {
    let chunks = (0..10).map(|i| hit(&format!("chunk {i}"))).collect();
    let engine = Engine::new(Arc::new(FixedRetriever(chunks)), echo(), 0.3, 4);
    assert_eq!(engine.ask("q").await.expect("ask").sources.len(), 4);
}

#[tokio::test]
async fn remote_failure_is_reported_not_answered() {
    let engine = Engine::new(Arc::new(FixedRetriever(vec![hit("ctx")])), Arc::new(FailingChat), 0.3, 4);
    assert!(matches!(engine.ask("q").await, Err(Error::Generation(_))));

    let engine = Engine::new(Arc::new(BrokenRetriever), echo(), 0.3, 4);
    assert!(matches!(engine.ask("q").await, Err(Error::Generation(_))));
}

#[tokio::test]
async fn session_keeps_history_across_failures() {
    let failing = Engine::new(Arc::new(FixedRetriever(vec![hit("ctx")])), Arc::new(FailingChat), 0.3, 4);
    let working = Engine::new(Arc::new(FixedRetriever(Vec::new())), echo(), 0.3, 4);

    let mut session = Session::new();
    assert_eq!(session.turns().len(), 1);
    assert_eq!(session.turns()[0].role, Role::Assistant);
    assert_eq!(session.turns()[0].content, WELCOME_MESSAGE);

    assert!(session.ask(&failing, "first try").await.is_err());
    assert_eq!(session.turns().len(), 2);
    assert_eq!(session.turns()[1].role, Role::User);

    session.ask(&working, "first try").await.expect("retry");
    let roles: Vec<Role> = session.turns().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User, Role::User, Role::Assistant]);
    assert_eq!(session.turns()[3].content, NO_INFORMATION_ANSWER);
    assert!(session.transcript().starts_with("bot: Hi team!"));
}

#[tokio::test]
async fn grace_period_question_is_answered_from_stored_chunks() {
    let tmp = tempfile::tempdir().expect("tmp");
    let db = tmp.path().join("db");
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(MINILM_DIM));

    let mut units: Vec<TextUnit> = vec![
        FaqPair { question: "What is the grace period?".into(), answer: "The grace period is 30 days.".into() }.into(),
        FaqPair { question: "Who can be insured?".into(), answer: "Adults between 18 and 65.".into() }.into(),
    ];
    for (page, text) in [
        "Hospital cash benefit pays a daily amount.",
        "Premiums may be paid monthly or yearly.",
        "Surrender value applies after three years.",
        "Claims require the original policy document.",
    ]
    .iter()
    .enumerate()
    {
        units.push(TextUnit::pdf_page(text.to_string(), page as u32 + 1));
    }
    let chunks = Chunker::default().split_units(&units);
    IndexBuilder::new(&db, "chunks", Arc::clone(&embedder), 16).rebuild(&chunks).await.expect("rebuild");

    let store = VectorStore::open(&db, "chunks", embedder).await.expect("open");
    let chat = echo();
    let engine = Engine::new(Arc::new(store), chat.clone(), 0.3, 4);
    let outcome = engine.ask("What is the grace period?").await.expect("ask");

    assert_eq!(outcome.sources.len(), 4);
    assert!(outcome.sources.iter().any(|s| s.chunk.content.contains("grace period")));
    let context = outcome.answer.split("CONTEXT FOUND:\n").nth(1).expect("context section");
    for source in &outcome.sources {
        assert!(context.contains(&source.chunk.content));
    }
    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
}
