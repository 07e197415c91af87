//! Process-wide question answering handle.
//!
//! Built once at startup (`Engine::start`) and shared by reference with
//! every session; nothing in it is mutated after construction.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use policybot_core::config::Settings;
use policybot_core::error::{Error, Result};
use policybot_core::traits::Retriever;
use policybot_core::types::RetrievedChunk;
use policybot_embed::get_default_embedder;
use policybot_vector::VectorStore;

use crate::chat::{ChatModel, OpenAiCompatibleChat};
use crate::generator::AnswerGenerator;
use crate::prompt::NO_INFORMATION_ANSWER;
use crate::turn::{TurnEvent, TurnState};

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: TurnState,
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
}

pub struct Engine {
    retriever: Arc<dyn Retriever>,
    generator: AnswerGenerator,
    top_k: usize,
}

impl Engine {
    pub fn new(retriever: Arc<dyn Retriever>, chat: Arc<dyn ChatModel>, temperature: f32, top_k: usize) -> Self {
        Self { retriever, generator: AnswerGenerator::new(chat, temperature), top_k }
    }

    /// Load the embedding model, open the store and build the chat client.
    pub async fn start(settings: &Settings) -> Result<Self> {
        let embedder = get_default_embedder(&settings.embedding, &settings.model_dir())
            .map_err(|e| Error::EngineInit(format!("embedding model: {e:#}")))?;
        let store = VectorStore::open(&settings.db_dir(), &settings.data.table_name, embedder).await?;
        let chat = OpenAiCompatibleChat::new(&settings.chat)?;
        info!(db = %settings.db_dir().display(), model = chat.model_id(), top_k = settings.retrieval.top_k, "engine ready");
        Ok(Self::new(Arc::new(store), Arc::new(chat), settings.chat.temperature, settings.retrieval.top_k))
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Run one turn from `Idle` to a terminal state. A turn that ends in
    /// `Failed` is returned as `Error::Generation`.
    pub async fn ask(&self, question: &str) -> Result<TurnOutcome> {
        let mut turn = Turn::default();
        turn.advance(TurnEvent::Start)?;

        let chunks = match self.retriever.retrieve(question, self.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                turn.advance(TurnEvent::Errored)?;
                error!(error = %e, "retrieval failed");
                return Err(Error::Generation(format!("retrieval failed: {e:#}")));
            }
        };
        turn.advance(TurnEvent::Retrieved { count: chunks.len() })?;

        if turn.state == TurnState::NoResults {
            turn.advance(TurnEvent::FallbackGiven)?;
            return Ok(TurnOutcome { state: turn.state, answer: NO_INFORMATION_ANSWER.to_string(), sources: chunks });
        }

        turn.advance(TurnEvent::Generate)?;
        match self.generator.generate(question, &chunks).await {
            Ok(answer) => {
                turn.advance(TurnEvent::Completed)?;
                Ok(TurnOutcome { state: turn.state, answer, sources: chunks })
            }
            Err(e) => {
                turn.advance(TurnEvent::Errored)?;
                warn!(error = %e, "generation failed");
                Err(e)
            }
        }
    }
}

#[derive(Debug, Default)]
struct Turn {
    state: TurnState,
}

impl Turn {
    fn advance(&mut self, event: TurnEvent) -> Result<()> {
        let next = self
            .state
            .advance(event)
            .ok_or_else(|| Error::Generation(format!("illegal turn transition from {} on {event:?}", self.state)))?;
        debug!(from = %self.state, to = %next, "turn state");
        self.state = next;
        Ok(())
    }
}
