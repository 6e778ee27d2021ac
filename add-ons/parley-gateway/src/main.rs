//! Axum-based chat gateway: entry point for Parley. Config-driven via CoreConfig.

mod handlers;

use axum::http::Method;
use axum::{extract::State, routing::get, routing::post, Router};
use parley_core::{CoreConfig, IntentRouter, KnowledgeStore, PendingQuestions};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[parley-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(CoreConfig::load()?);
    if config.llm.api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY is not set; chat completions will be sent without credentials");
    }

    let knowledge = Arc::new(KnowledgeStore::open_path(&config.knowledge_path));
    let entries = knowledge.read().await.len();
    tracing::info!(
        target: "parley::knowledge",
        path = %knowledge.path().display(),
        entries,
        "Knowledge base ready"
    );

    let registry = Arc::new(parley_skills::default_registry(&config)?);
    let router = Arc::new(
        IntentRouter::new(registry, knowledge, Arc::new(PendingQuestions::new()))
            .with_fallback_city(config.fallback_city.clone()),
    );

    let app = build_app(AppState {
        config: Arc::clone(&config),
        router,
    });

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!("{} listening on {}", config.app_name, listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn frontend_root_dir() -> std::path::PathBuf {
    // Prefer a working-directory relative path (run from workspace root), then the
    // workspace-root-relative path from add-ons/parley-gateway.
    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let from_cwd = cwd.join("parley-frontend");
    if from_cwd.exists() {
        return from_cwd;
    }

    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("parley-frontend")
}

fn build_app(state: AppState) -> Router {
    let frontend_enabled = state.config.frontend_enabled;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/learn", post(handlers::chat::learn))
        .route("/teach", post(handlers::chat::teach))
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(status))
        .with_state(state);

    if frontend_enabled {
        let frontend_dir = frontend_root_dir();
        // `/` -> parley-frontend/index.html, `/ui/*` -> parley-frontend/*
        app = app.route_service("/", ServeFile::new(frontend_dir.join("index.html")));
        app = app.nest_service("/ui", ServeDir::new(frontend_dir));
    }

    app.layer(cors)
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) router: Arc<IntentRouter>,
}

/// GET /api/v1/health – liveness check for UI and scripts.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/v1/status – app identity, knowledge size, open pending questions, skills.
async fn status(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let mut skills = state.router.skill_names();
    skills.sort();
    let knowledge_entries = state.router.knowledge().read().await.len();
    axum::Json(serde_json::json!({
        "app_name": state.config.app_name,
        "port": state.config.port,
        "knowledge_entries": knowledge_entries,
        "pending_questions": state.router.pending().len(),
        "skills": skills,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use parley_core::{
        KnowledgeBase, KnowledgeEntry, LlmConfig, RetryPolicy, SkillRegistry, LEARNED_ACK,
    };
    use parley_skills::ChatCompletion;
    use tower::ServiceExt;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> CoreConfig {
        CoreConfig {
            app_name: "Test Gateway".to_string(),
            port: 8001,
            frontend_enabled: false,
            ..CoreConfig::default()
        }
    }

    fn test_state(dir: &tempfile::TempDir, registry: SkillRegistry) -> AppState {
        let knowledge = Arc::new(KnowledgeStore::open_path(dir.path().join("kb.json")));
        AppState {
            config: Arc::new(test_config()),
            router: Arc::new(IntentRouter::new(
                Arc::new(registry),
                knowledge,
                Arc::new(PendingQuestions::new()),
            )),
        }
    }

    /// Chat skill against a mock server that must not be called.
    async fn silent_chat(server: &MockServer) -> SkillRegistry {
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(server)
            .await;
        let llm = LlmConfig {
            api_url: format!("{}/api/v1/chat/completions", server.uri()),
            ..LlmConfig::default()
        };
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(ChatCompletion::new(
            reqwest::Client::new(),
            llm,
            RetryPolicy::immediate(1),
        )));
        registry
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(&dir, SkillRegistry::new()));
        let req = Request::builder()
            .uri("/api/v1/health")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_reports_knowledge_and_pending() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, SkillRegistry::new());
        let mut base = KnowledgeBase::default();
        base.push(KnowledgeEntry::new("a", "b"));
        base.push(KnowledgeEntry::new("c", "d"));
        state.router.knowledge().save(&base).unwrap();
        state
            .router
            .teach(&parley_core::SessionContext::new(Some("s1".into())), "Why?");

        let app = Router::new()
            .route("/api/v1/status", get(status))
            .with_state(state);
        let req = Request::builder()
            .uri("/api/v1/status")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["app_name"], "Test Gateway");
        assert_eq!(json["knowledge_entries"], 2);
        assert_eq!(json["pending_questions"], 1);
    }

    #[tokio::test]
    async fn test_chat_evaluates_arithmetic() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(&dir, SkillRegistry::new()));
        let (status, json) = post_json(app, "/chat", serde_json::json!({ "message": "2 + 3 * 4" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["response"], "14");
    }

    #[tokio::test]
    async fn test_chat_survives_oversized_expression() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(&dir, SkillRegistry::new()));
        let chain = vec!["1"; 100_000].join("+");
        let (status, json) = post_json(app, "/chat", serde_json::json!({ "message": chain })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["response"], "Chat service is unavailable right now.");
    }

    #[tokio::test]
    async fn test_chat_without_message_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(&dir, SkillRegistry::new()));
        let (status, _) = post_json(app, "/chat", serde_json::json!({ "text": "hi" })).await;
        assert!(status.is_client_error(), "got {}", status);
    }

    #[tokio::test]
    async fn test_teach_then_answer_is_learned() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, SkillRegistry::new());
        let app = build_app(state.clone());

        let (_, json) = post_json(
            app.clone(),
            "/teach",
            serde_json::json!({ "question": "What is your favorite color?", "session_id": "abc" }),
        )
        .await;
        assert_eq!(json["response"], "Please tell me the answer to: What is your favorite color?");

        let (_, json) = post_json(
            app,
            "/chat",
            serde_json::json!({ "message": "Blue", "session_id": "abc" }),
        )
        .await;
        assert_eq!(json["response"], LEARNED_ACK);

        let base = state.router.knowledge().load();
        assert_eq!(base.find_answer("what is your favorite color?"), Some("Blue"));
        assert!(state.router.pending().is_empty());
    }

    #[tokio::test]
    async fn test_learned_answer_skips_chat_completion() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(&dir, silent_chat(&server).await));

        let (_, json) = post_json(
            app.clone(),
            "/learn",
            serde_json::json!({ "question": "Who made you?", "answer": "A small team." }),
        )
        .await;
        assert_eq!(json["response"], LEARNED_ACK);

        let (status, json) = post_json(app, "/chat", serde_json::json!({ "message": "WHO MADE YOU?" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["response"], "A small team.");
    }

    #[tokio::test]
    async fn test_frontend_index_served_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state(&dir, SkillRegistry::new());
        state.config = Arc::new(CoreConfig {
            frontend_enabled: true,
            ..test_config()
        });
        let app = build_app(state);
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8_lossy(&bytes);
        assert!(html.contains("chat-box"));
    }
}
