//! Intent classification: decides which handler answers a message.

use crate::expression::{self, Number};
use crate::knowledge::KnowledgeBase;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static CITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"weather(?: in)? ([\w\s]+)").expect("city pattern is valid")
});

/// Classified purpose of a message, in decision order.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// The session had a pending question; this message is its answer.
    AnswerPending { question: String },
    Weather { city: String },
    Math(Number),
    /// Exact (case-insensitive) match in the knowledge base.
    Knowledge { answer: String },
    /// Free-form chat, handed to the chat-completion skill.
    Chat,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::AnswerPending { .. } => "answer_pending",
            Intent::Weather { .. } => "weather",
            Intent::Math(_) => "math",
            Intent::Knowledge { .. } => "knowledge",
            Intent::Chat => "chat",
        }
    }

    /// First match wins: pending answer, weather, arithmetic, stored answer, chat.
    pub fn classify(
        message: &str,
        pending: Option<String>,
        knowledge: &KnowledgeBase,
        fallback_city: &str,
    ) -> Self {
        if let Some(question) = pending {
            return Intent::AnswerPending { question };
        }
        if message.to_lowercase().contains("weather") {
            let city = extract_city(message).unwrap_or_else(|| fallback_city.to_string());
            return Intent::Weather { city };
        }
        match expression::evaluate(message) {
            Ok(n) => return Intent::Math(n),
            Err(e) => tracing::debug!(target: "parley::router", error = %e, "Not an expression"),
        }
        if let Some(answer) = knowledge.find_answer(message) {
            return Intent::Knowledge {
                answer: answer.to_string(),
            };
        }
        Intent::Chat
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// City named after "weather" / "weather in", lowercased and trimmed.
pub fn extract_city(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    CITY_PATTERN
        .captures(&lowered)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|city| !city.is_empty())
}
