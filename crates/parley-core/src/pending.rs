//! Per-session pending "teach me" questions.

use crate::shared::SessionContext;
use dashmap::DashMap;

/// Session id -> question awaiting an answer. At most one question per session.
#[derive(Debug, Default)]
pub struct PendingQuestions {
    slots: DashMap<String, String>,
}

impl PendingQuestions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `question` in the session's slot, returning any question it replaced.
    pub fn set(&self, ctx: &SessionContext, question: impl Into<String>) -> Option<String> {
        self.slots
            .insert(ctx.resolved_session_id().to_string(), question.into())
    }

    /// Removes and returns the session's pending question.
    pub fn take(&self, ctx: &SessionContext) -> Option<String> {
        self.slots
            .remove(ctx.resolved_session_id())
            .map(|(_, question)| question)
    }

    pub fn peek(&self, ctx: &SessionContext) -> Option<String> {
        self.slots
            .get(ctx.resolved_session_id())
            .map(|q| q.value().clone())
    }

    /// Number of sessions with a pending question.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
