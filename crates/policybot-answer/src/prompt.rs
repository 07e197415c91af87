//! Fixed wording of the assistant and the system message built per turn.

use policybot_core::types::RetrievedChunk;

/// Returned without calling the model when retrieval finds nothing.
pub const NO_INFORMATION_ANSWER: &str = "I couldn't find any information in the documents.";

/// The sentence the model is told to give when the context lacks the answer.
pub const OUT_OF_CONTEXT_ANSWER: &str =
    "Oops! I don't have that information in my current manuals, but you can check with someone on the team.";

pub const WELCOME_MESSAGE: &str = "Hi team! 👋 I'm PolicyBot 🤖, your new teammate and virtual assistant. \
I'm here to help you master everything about Met99. What question can we solve today?";

const PERSONA: &str = "You are PolicyBot, the star virtual assistant and teammate of our insurance agency.
Your personality is empathetic, energetic and professional, and you are always ready to help (you may use emojis occasionally to be friendly).

Your main mission is to support insurance agents with their questions about the \"Met99\" product from MetLife, the only product we focus on.";

/// Chunks as a bulleted list separated by blank lines.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks.iter().map(|c| format!("- {}", c.chunk.content)).collect::<Vec<_>>().join("\n\n")
}

pub fn build_system_prompt(context: &str) -> String {
    format!(
        "{PERSONA}\n\nRULES:\n\
         1. Answer the question based ONLY on the provided context.\n\
         2. If the answer is not in the context, kindly say: \"{OUT_OF_CONTEXT_ANSWER}\"\n\
         3. Keep a motivating tone that builds the agent's confidence and drives sales.\n\n\
         CONTEXT FOUND:\n{context}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use policybot_core::types::{Chunk, SourceKind};

    fn hit(content: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: content.to_string(),
                source: SourceKind::Pdf,
                page: Some(1),
                content: content.to_string(),
                chunk_index: 0,
                total_chunks: 1,
            },
            score: 0.9,
        }
    }

    #[test]
    fn context_is_bulleted_and_blank_line_separated() {
        let ctx = build_context(&[hit("first"), hit("second\nline")]);
        assert_eq!(ctx, "- first\n\n- second\nline");
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn system_prompt_has_three_rules_then_context() {
        let prompt = build_system_prompt("- some context");
        let rules = prompt.find("RULES:").expect("rules");
        let context = prompt.find("CONTEXT FOUND:\n- some context").expect("context");
        assert!(rules < context);
        assert!(prompt.contains(OUT_OF_CONTEXT_ANSWER));
        for n in ["1. ", "2. ", "3. "] {
            assert!(prompt.contains(&format!("\n{n}")));
        }
        assert!(!prompt.contains("\n4. "));
        assert!(prompt.contains("Met99"));
    }
}
