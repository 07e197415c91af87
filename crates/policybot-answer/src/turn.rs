//! Lifecycle of a single question.
//!
//! ```text
//! Idle -> Retrieving -> NoResults  -> AnsweredFallback
//!                    -> HasResults -> Generating -> Answered | Failed
//! ```
//!
//! A retrieval error also ends the turn in `Failed`.

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnState {
    #[default]
    Idle,
    Retrieving,
    NoResults,
    HasResults,
    Generating,
    AnsweredFallback,
    Answered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    Start,
    Retrieved { count: usize },
    FallbackGiven,
    Generate,
    Completed,
    Errored,
}

impl TurnState {
    /// Next state for `event`, or `None` when the edge does not exist.
    pub fn advance(self, event: TurnEvent) -> Option<TurnState> {
        use TurnEvent as E;
        use TurnState as S;
        match (self, event) {
            (S::Idle, E::Start) => Some(S::Retrieving),
            (S::Retrieving, E::Retrieved { count: 0 }) => Some(S::NoResults),
            (S::Retrieving, E::Retrieved { .. }) => Some(S::HasResults),
            (S::Retrieving, E::Errored) => Some(S::Failed),
            (S::NoResults, E::FallbackGiven) => Some(S::AnsweredFallback),
            (S::HasResults, E::Generate) => Some(S::Generating),
            (S::Generating, E::Completed) => Some(S::Answered),
            (S::Generating, E::Errored) => Some(S::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::AnsweredFallback | TurnState::Answered | TurnState::Failed)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::Retrieving => "retrieving",
            TurnState::NoResults => "no_results",
            TurnState::HasResults => "has_results",
            TurnState::Generating => "generating",
            TurnState::AnsweredFallback => "answered_fallback",
            TurnState::Answered => "answered",
            TurnState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: &[TurnEvent]) -> Option<TurnState> {
        events.iter().try_fold(TurnState::Idle, |s, e| s.advance(*e))
    }

    #[test]
    fn happy_paths_reach_terminal_states() {
        let answered = run(&[TurnEvent::Start, TurnEvent::Retrieved { count: 4 }, TurnEvent::Generate, TurnEvent::Completed]);
        assert_eq!(answered, Some(TurnState::Answered));
        let fallback = run(&[TurnEvent::Start, TurnEvent::Retrieved { count: 0 }, TurnEvent::FallbackGiven]);
        assert_eq!(fallback, Some(TurnState::AnsweredFallback));
        let failed = run(&[TurnEvent::Start, TurnEvent::Retrieved { count: 1 }, TurnEvent::Generate, TurnEvent::Errored]);
        assert_eq!(failed, Some(TurnState::Failed));
        assert!([answered, fallback, failed].iter().flatten().all(|s| s.is_terminal()));
    }

    #[test]
    fn illegal_edges_are_rejected() {
        assert_eq!(TurnState::Idle.advance(TurnEvent::Generate), None);
        assert_eq!(TurnState::NoResults.advance(TurnEvent::Generate), None);
        assert_eq!(TurnState::HasResults.advance(TurnEvent::FallbackGiven), None);
        assert_eq!(TurnState::Answered.advance(TurnEvent::Start), None);
        assert!(!TurnState::Generating.is_terminal());
    }

    #[test]
    fn display_uses_snake_case() {
        assert_eq!(TurnState::AnsweredFallback.to_string(), "answered_fallback");
    }
}
