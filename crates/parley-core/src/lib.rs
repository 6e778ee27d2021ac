//! parley-core: chat routing core (shared types, expression evaluator, knowledge base,
//! pending questions, intent router).
//!
//! The gateway and the skills crate depend only on this crate's public API.

pub mod expression;
mod knowledge;
mod pending;
mod router;
mod shared;

pub use shared::{
    CoreConfig, LlmConfig, RetryPolicy, RetrySettings, SessionContext, WeatherConfig,
    DEFAULT_SESSION_ID,
};

pub use expression::{evaluate, evaluate_opt, EvalError, Number};

pub use knowledge::{KnowledgeBase, KnowledgeEntry, KnowledgeStore, StoreError};

pub use pending::PendingQuestions;

pub use router::{
    extract_city, AgentSkill, Intent, IntentRouter, SkillRegistry, UnknownSkill, CHAT_SKILL,
    LEARNED_ACK, WEATHER_SKILL,
};
