use std::sync::Arc;
use tracing::{debug, info};

use policybot_core::error::Result;
use policybot_core::types::RetrievedChunk;

use crate::chat::{ChatMessage, ChatModel};
use crate::prompt::{build_context, build_system_prompt, NO_INFORMATION_ANSWER};

pub struct AnswerGenerator {
    chat: Arc<dyn ChatModel>,
    temperature: f32,
}

impl AnswerGenerator {
    pub fn new(chat: Arc<dyn ChatModel>, temperature: f32) -> Self {
        Self { chat, temperature }
    }

    /// System + user messages sent for `question` over `chunks`.
    pub fn messages(question: &str, chunks: &[RetrievedChunk]) -> Vec<ChatMessage> {
        let system = build_system_prompt(&build_context(chunks));
        vec![ChatMessage::system(system), ChatMessage::user(question)]
    }

    /// The model's reply, unmodified. With no chunks the model is not called.
    pub async fn generate(&self, question: &str, chunks: &[RetrievedChunk]) -> Result<String> {
        if chunks.is_empty() {
            debug!("no context retrieved; skipping model call");
            return Ok(NO_INFORMATION_ANSWER.to_string());
        }
        let messages = Self::messages(question, chunks);
        let answer = self.chat.complete(&messages, self.temperature).await?;
        info!(model = self.chat.model_id(), chunks = chunks.len(), answer_chars = answer.chars().count(), "answer generated");
        Ok(answer)
    }
}
