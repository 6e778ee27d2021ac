//! Message router: classifies each chat message and dispatches it to a handler or skill.

mod intent;

pub use intent::{extract_city, Intent};

use crate::knowledge::{KnowledgeEntry, KnowledgeStore};
use crate::pending::PendingQuestions;
use crate::shared::SessionContext;
use std::fmt;
use std::sync::Arc;

/// Registered name of the weather skill.
pub const WEATHER_SKILL: &str = "WeatherReport";
/// Registered name of the chat-completion skill.
pub const CHAT_SKILL: &str = "ChatCompletion";

/// Reply after a pending question (or a learn request) is stored.
pub const LEARNED_ACK: &str = "Thanks! Learned something new.";
const WEATHER_UNAVAILABLE: &str = "Weather error.";
const CHAT_UNAVAILABLE: &str = "Chat service is unavailable right now.";
const DEFAULT_FALLBACK_CITY: &str = "Delhi";

#[derive(Debug)]
pub struct UnknownSkill(pub String);

impl fmt::Display for UnknownSkill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown skill: {}", self.0)
    }
}

impl std::error::Error for UnknownSkill {}

/// Trait implemented by the outbound collaborators (skills).
#[async_trait::async_trait]
pub trait AgentSkill: Send + Sync {
    /// Unique skill name for routing.
    fn name(&self) -> &str;

    /// Executes the skill with the given context and optional payload.
    async fn execute(
        &self,
        ctx: &SessionContext,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, Box<dyn std::error::Error + Send + Sync>>;
}

/// Registry of skills that can be dispatched by name.
pub struct SkillRegistry {
    skills: Vec<Arc<dyn AgentSkill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self { skills: Vec::new() }
    }

    pub fn register(&mut self, skill: Arc<dyn AgentSkill>) {
        self.skills.push(skill);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentSkill>> {
        self.skills.iter().find(|s| s.name() == name).cloned()
    }

    /// Returns the names of all registered skills (for the status endpoint).
    pub fn skill_names(&self) -> Vec<String> {
        self.skills.iter().map(|s| s.name().to_string()).collect()
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes chat messages. One instance is shared by all requests.
pub struct IntentRouter {
    registry: Arc<SkillRegistry>,
    knowledge: Arc<KnowledgeStore>,
    pending: Arc<PendingQuestions>,
    fallback_city: String,
}

impl IntentRouter {
    pub fn new(
        registry: Arc<SkillRegistry>,
        knowledge: Arc<KnowledgeStore>,
        pending: Arc<PendingQuestions>,
    ) -> Self {
        Self {
            registry,
            knowledge,
            pending,
            fallback_city: DEFAULT_FALLBACK_CITY.to_string(),
        }
    }

    pub fn with_fallback_city(mut self, city: impl Into<String>) -> Self {
        self.fallback_city = city.into();
        self
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn pending(&self) -> &PendingQuestions {
        &self.pending
    }

    pub fn skill_names(&self) -> Vec<String> {
        self.registry.skill_names()
    }

    /// Takes (clears) the session's pending question and classifies the message with it.
    async fn take_intent(&self, ctx: &SessionContext, message: &str) -> Intent {
        let pending = self.pending.take(ctx);
        let base = self.knowledge.read().await;
        Intent::classify(message, pending, &base, &self.fallback_city)
    }

    /// Answers one chat message. Never fails: every path yields a reply string.
    pub async fn route(&self, ctx: &SessionContext, message: &str) -> String {
        let message = message.trim();
        let intent = self.take_intent(ctx, message).await;
        tracing::debug!(
            target: "parley::router",
            session = ctx.resolved_session_id(),
            correlation_id = ctx.correlation_id.as_deref().unwrap_or(""),
            intent = intent.label(),
            "Message classified"
        );
        self.dispatch(ctx, message, intent).await
    }

    async fn dispatch(&self, ctx: &SessionContext, message: &str, intent: Intent) -> String {
        match intent {
            Intent::AnswerPending { question } => self.learn(question, message).await,
            Intent::Weather { city } => {
                let payload = serde_json::json!({ "city": city });
                self.run_skill(ctx, WEATHER_SKILL, payload, "text")
                    .await
                    .unwrap_or_else(|| WEATHER_UNAVAILABLE.to_string())
            }
            Intent::Math(n) => n.to_string(),
            Intent::Knowledge { answer } => answer,
            Intent::Chat => {
                let payload = serde_json::json!({ "prompt": message });
                self.run_skill(ctx, CHAT_SKILL, payload, "generated")
                    .await
                    .unwrap_or_else(|| CHAT_UNAVAILABLE.to_string())
            }
        }
    }

    /// Stores a question/answer pair and returns the acknowledgment.
    /// A failed write is logged; the user still gets the acknowledgment.
    pub async fn learn(&self, question: impl Into<String>, answer: impl Into<String>) -> String {
        let entry = KnowledgeEntry::new(question, answer);
        if let Err(e) = self.knowledge.append(entry).await {
            tracing::error!(target: "parley::router", error = %e, "Failed to save knowledge entry");
        }
        LEARNED_ACK.to_string()
    }

    /// Places a question in the session's pending slot; the session's next message answers it.
    pub fn teach(&self, ctx: &SessionContext, question: impl Into<String>) -> String {
        let question = question.into();
        let reply = format!("Please tell me the answer to: {}", question);
        if let Some(previous) = self.pending.set(ctx, question) {
            tracing::debug!(
                target: "parley::router",
                session = ctx.resolved_session_id(),
                replaced = %previous,
                "Pending question replaced"
            );
        }
        reply
    }

    /// Runs a skill and pulls a string field out of its result. None on any failure.
    async fn run_skill(
        &self,
        ctx: &SessionContext,
        name: &str,
        payload: serde_json::Value,
        field: &str,
    ) -> Option<String> {
        let result = match self.registry.get(name) {
            Some(skill) => skill.execute(ctx, Some(payload)).await,
            None => Err(UnknownSkill(name.to_string()).into()),
        };
        match result {
            Ok(value) => {
                let text = value.get(field).and_then(|v| v.as_str()).map(str::to_string);
                if text.is_none() {
                    tracing::warn!(target: "parley::router", skill = name, field, "Skill result missing field");
                }
                text
            }
            Err(e) => {
                tracing::warn!(target: "parley::router", skill = name, error = %e, "Skill failed");
                None
            }
        }
    }
}
