//! Chat handlers: `/chat` routes a message through the intent router, `/learn` stores a
//! question/answer pair directly, and `/teach` parks a question until the session answers it.

use axum::extract::{Json, State};
use parley_core::SessionContext;
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatRequest {
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LearnRequest {
    pub(crate) question: String,
    pub(crate) answer: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TeachRequest {
    pub(crate) question: String,
    #[serde(default)]
    pub(crate) session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatResponse {
    pub(crate) response: String,
}

impl From<String> for ChatResponse {
    fn from(response: String) -> Self {
        Self { response }
    }
}

/// POST /chat
pub(crate) async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let ctx = SessionContext::new(req.session_id);
    tracing::info!(
        session = ctx.resolved_session_id(),
        correlation_id = ctx.correlation_id.as_deref().unwrap_or(""),
        chars = req.message.len(),
        "Chat request received"
    );
    Json(state.router.route(&ctx, &req.message).await.into())
}

/// POST /learn
pub(crate) async fn learn(
    State(state): State<AppState>,
    Json(req): Json<LearnRequest>,
) -> Json<ChatResponse> {
    tracing::info!(question = %req.question, "Learn request received");
    Json(state.router.learn(req.question, req.answer).await.into())
}

/// POST /teach
pub(crate) async fn teach(
    State(state): State<AppState>,
    Json(req): Json<TeachRequest>,
) -> Json<ChatResponse> {
    let ctx = SessionContext::new(req.session_id);
    Json(state.router.teach(&ctx, req.question).into())
}
