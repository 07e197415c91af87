//! Retrieval-then-generate answering for the chat shell.
//!
//! [`Engine`] ties a [`Retriever`](policybot_core::traits::Retriever) to a
//! [`ChatModel`]; [`Session`] keeps the per-user transcript.

pub mod chat;
pub mod engine;
pub mod generator;
pub mod prompt;
pub mod session;
pub mod turn;

pub use chat::{ChatMessage, ChatModel, ChatRole, OpenAiCompatibleChat};
pub use engine::{Engine, TurnOutcome};
pub use generator::AnswerGenerator;
pub use prompt::{NO_INFORMATION_ANSWER, OUT_OF_CONTEXT_ANSWER, WELCOME_MESSAGE};
pub use session::Session;
pub use turn::{TurnEvent, TurnState};
