use tracing::debug;

use policybot_core::error::Result;
use policybot_core::types::{ConversationTurn, Role};

use crate::engine::{Engine, TurnOutcome};
use crate::prompt::WELCOME_MESSAGE;

/// In-memory transcript of one user's conversation.
#[derive(Debug, Clone)]
pub struct Session {
    turns: Vec<ConversationTurn>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self { turns: vec![ConversationTurn::assistant(WELCOME_MESSAGE)] }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Ask `engine` and record the exchange. The question is always kept; the
    /// answer only when the turn succeeded, so a failed turn can be retried.
    pub async fn ask(&mut self, engine: &Engine, question: &str) -> Result<TurnOutcome> {
        self.turns.push(ConversationTurn::user(question));
        let outcome = engine.ask(question).await?;
        self.turns.push(ConversationTurn::assistant(outcome.answer.clone()));
        debug!(turns = self.turns.len(), state = %outcome.state, "session updated");
        Ok(outcome)
    }

    /// Transcript as `role: text` lines, oldest first.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| {
                let who = match t.role {
                    Role::User => "you",
                    Role::Assistant => "bot",
                };
                format!("{who}: {}", t.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
