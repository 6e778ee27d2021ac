//! Outbound skills used by the intent router: weather lookup and chat completion.

pub use parley_core::{AgentSkill, SkillRegistry};

mod chat_completion;
mod weather_report;

pub use chat_completion::{ChatCompletion, CompletionError};
pub use weather_report::{WeatherError, WeatherReport};

use parley_core::CoreConfig;
use std::sync::Arc;

/// Registry with both skills built from the core config.
pub fn default_registry(config: &CoreConfig) -> Result<SkillRegistry, reqwest::Error> {
    let mut registry = SkillRegistry::new();
    registry.register(Arc::new(WeatherReport::from_config(config.weather.clone())?));
    registry.register(Arc::new(ChatCompletion::from_config(config)));
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{
        IntentRouter, KnowledgeStore, LlmConfig, PendingQuestions, RetrySettings, SessionContext,
        WeatherConfig,
    };
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> CoreConfig {
        CoreConfig {
            llm: LlmConfig {
                api_url: format!("{}/api/v1/chat/completions", server.uri()),
                ..LlmConfig::default()
            },
            weather: WeatherConfig {
                geocode_url: format!("{}/v1/search", server.uri()),
                forecast_url: format!("{}/v1/forecast", server.uri()),
                timeout_secs: 5,
            },
            retry: RetrySettings {
                max_attempts: 2,
                initial_backoff_ms: 0,
                ..RetrySettings::default()
            },
            ..CoreConfig::default()
        }
    }

    fn router(config: &CoreConfig, dir: &tempfile::TempDir) -> IntentRouter {
        IntentRouter::new(
            Arc::new(default_registry(config).unwrap()),
            Arc::new(KnowledgeStore::open_path(dir.path().join("kb.json"))),
            Arc::new(PendingQuestions::new()),
        )
        .with_fallback_city(config.fallback_city.clone())
    }

    #[test]
    fn registry_holds_both_skills() {
        let mut names = default_registry(&CoreConfig::default()).unwrap().skill_names();
        names.sort();
        assert_eq!(names, vec!["ChatCompletion", "WeatherReport"]);
    }

    #[tokio::test]
    async fn weather_message_reaches_open_meteo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("name", "paris"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{ "name": "Paris", "latitude": 48.85, "longitude": 2.35 }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "current_weather": { "temperature": 12.4, "windspeed": 9.0 }
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let router = router(&config_for(&server), &dir);
        let reply = router.route(&SessionContext::default(), "weather in Paris").await;
        assert_eq!(reply, "Weather in Paris: 12.4°C, Wind 9.0 km/h");
    }

    #[tokio::test]
    async fn unmatched_message_falls_back_to_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let router = router(&config_for(&server), &dir);
        let reply = router.route(&SessionContext::default(), "hello there").await;
        assert_eq!(reply, "OpenRouter API failed after 2 attempts.");
    }
}
