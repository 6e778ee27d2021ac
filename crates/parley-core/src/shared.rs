//! Shared types used across all Parley crates.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Session key used when a client does not send one. Matches the single shared
/// slot older clients relied on.
pub const DEFAULT_SESSION_ID: &str = "session";

/// Per-request session context. Pending questions are keyed by this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// Client-supplied session id. When None or empty, [`DEFAULT_SESSION_ID`] is used.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Optional correlation id for request tracing.
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl SessionContext {
    /// Context for the given (optional) session id with a fresh correlation id.
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id,
            correlation_id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Resolved session id (never empty).
    pub fn resolved_session_id(&self) -> &str {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SESSION_ID)
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Chat-completion (OpenRouter) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: String,
    pub model: String,
    /// Bearer token. Also read from the legacy `OPENROUTER_API_KEY` variable.
    #[serde(default)]
    pub api_key: Option<String>,
    pub referer: String,
    pub title: String,
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            model: "meta-llama/llama-3.3-70b-instruct:free".to_string(),
            api_key: None,
            referer: "http://localhost:5000".to_string(),
            title: "My Flask Chatbot".to_string(),
            system_prompt: "You are a helpful AI assistant.".to_string(),
        }
    }
}

/// Open-Meteo endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    pub geocode_url: String,
    pub forecast_url: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            geocode_url: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout_secs: 15,
        }
    }
}

/// Retry settings as they appear in config files. See [`RetryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            multiplier: 2.0,
            max_backoff_ms: 8000,
            attempt_timeout_secs: 30,
        }
    }
}

/// Exponential backoff policy for outbound calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never zero.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    /// `initial_backoff * multiplier^(attempt-1)`, capped at `max_backoff`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31) as i32;
        let factor = self.multiplier.max(1.0).powi(exp);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Policy with no sleeping between attempts (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetrySettings::default().policy()
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            multiplier: self.multiplier,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs.max(1)),
        }
    }
}

/// Global application configuration (gateway + collaborators). Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity shown by the status endpoint.
    pub app_name: String,
    /// Bind address for the gateway.
    pub host: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// JSON file holding the taught question/answer pairs.
    pub knowledge_path: String,
    /// City used when a weather message names none.
    pub fallback_city: String,
    /// If true, the gateway serves the chat page from `parley-frontend/`. (Config alias: `ui_enabled`)
    #[serde(default, alias = "ui_enabled")]
    pub frontend_enabled: bool,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_name: "Parley".to_string(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            knowledge_path: "knowledge_base.json".to_string(),
            fallback_city: "Delhi".to_string(),
            frontend_enabled: true,
            llm: LlmConfig::default(),
            weather: WeatherConfig::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl CoreConfig {
    /// Load config from file and environment. Precedence: env `PARLEY_CONFIG` path > `config/parley` > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("PARLEY_CONFIG").unwrap_or_else(|_| "config/parley".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load config from the given file (skipped if absent), then `PARLEY__*` env vars,
    /// then the legacy `PORT` / `OPENROUTER_API_KEY` variables.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let d = Self::default();
        let builder = config::Config::builder()
            .set_default("app_name", d.app_name)?
            .set_default("host", d.host)?
            .set_default("port", i64::from(d.port))?
            .set_default("knowledge_path", d.knowledge_path)?
            .set_default("fallback_city", d.fallback_city)?
            .set_default("frontend_enabled", d.frontend_enabled)?
            .set_default("llm.api_url", d.llm.api_url)?
            .set_default("llm.model", d.llm.model)?
            .set_default("llm.referer", d.llm.referer)?
            .set_default("llm.title", d.llm.title)?
            .set_default("llm.system_prompt", d.llm.system_prompt)?
            .set_default("weather.geocode_url", d.weather.geocode_url)?
            .set_default("weather.forecast_url", d.weather.forecast_url)?
            .set_default("weather.timeout_secs", d.weather.timeout_secs)?
            .set_default("retry.max_attempts", i64::from(d.retry.max_attempts))?
            .set_default("retry.initial_backoff_ms", d.retry.initial_backoff_ms)?
            .set_default("retry.multiplier", d.retry.multiplier)?
            .set_default("retry.max_backoff_ms", d.retry.max_backoff_ms)?
            .set_default("retry.attempt_timeout_secs", d.retry.attempt_timeout_secs)?;

        let builder = builder.add_source(config::File::from(path).required(false));

        let port_override = std::env::var("PORT")
            .ok()
            .and_then(|p| p.trim().parse::<i64>().ok());

        let built = builder
            .add_source(config::Environment::with_prefix("PARLEY").separator("__"))
            .set_override_option("port", port_override)?
            .set_override_option("llm.api_key", std::env::var("OPENROUTER_API_KEY").ok())?
            .build()?;

        built.try_deserialize()
    }
}
