//! Weather skill: geocodes a city with Open-Meteo, then reads its current weather.

use parley_core::expression::format_float;
use parley_core::{AgentSkill, SessionContext, WeatherConfig, WEATHER_SKILL};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const CITY_NOT_FOUND: &str = "City not found.";
const WEATHER_ERROR: &str = "Weather error.";

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("no geocoding result for {0:?}")]
    CityNotFound(String),
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("forecast response missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Option<Vec<Place>>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: Option<CurrentWeather>,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: Option<serde_json::Number>,
    windspeed: Option<serde_json::Number>,
}

/// JSON numbers render as sent: integers without a decimal point, floats with one.
fn render_number(n: &serde_json::Number) -> String {
    if n.is_f64() {
        n.as_f64().map(format_float).unwrap_or_else(|| n.to_string())
    } else {
        n.to_string()
    }
}

/// Open-Meteo weather lookup.
pub struct WeatherReport {
    client: reqwest::Client,
    config: WeatherConfig,
}

impl WeatherReport {
    pub fn new(client: reqwest::Client, config: WeatherConfig) -> Self {
        Self { client, config }
    }

    /// Builds its own client with the configured request timeout.
    pub fn from_config(config: WeatherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self::new(client, config))
    }

    /// `"Weather in {name}: {temp}°C, Wind {wind} km/h"` for the first geocoding match.
    pub async fn report(&self, city: &str) -> Result<String, WeatherError> {
        let geo: GeocodeResponse = self
            .client
            .get(&self.config.geocode_url)
            .query(&[("name", city), ("count", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        // No `results` key means no match; a present but empty list is a malformed reply.
        let place = geo
            .results
            .ok_or_else(|| WeatherError::CityNotFound(city.to_string()))?
            .into_iter()
            .next()
            .ok_or(WeatherError::MissingField("results[0]"))?;

        let forecast: ForecastResponse = self
            .client
            .get(&self.config.forecast_url)
            .query(&[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let current = forecast
            .current_weather
            .ok_or(WeatherError::MissingField("current_weather"))?;
        let temp = current
            .temperature
            .ok_or(WeatherError::MissingField("temperature"))?;
        let wind = current
            .windspeed
            .ok_or(WeatherError::MissingField("windspeed"))?;

        Ok(format!(
            "Weather in {}: {}°C, Wind {} km/h",
            place.name,
            render_number(&temp),
            render_number(&wind)
        ))
    }

    /// User-facing sentence: the report, or a short failure sentence.
    pub async fn describe(&self, city: &str) -> String {
        match self.report(city).await {
            Ok(text) => text,
            Err(WeatherError::CityNotFound(_)) => CITY_NOT_FOUND.to_string(),
            Err(e) => {
                tracing::warn!(target: "parley::skills", city, error = %e, "Weather lookup failed");
                WEATHER_ERROR.to_string()
            }
        }
    }
}

#[async_trait::async_trait]
impl AgentSkill for WeatherReport {
    fn name(&self) -> &str {
        WEATHER_SKILL
    }

    async fn execute(
        &self,
        _ctx: &SessionContext,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, Box<dyn std::error::Error + Send + Sync>> {
        let city = payload
            .as_ref()
            .and_then(|p| p.get("city"))
            .and_then(|v| v.as_str())
            .ok_or("WeatherReport requires payload: { city: string }")?
            .to_string();
        let text = self.describe(&city).await;
        Ok(serde_json::json!({
            "status": "ok",
            "skill": WEATHER_SKILL,
            "city": city,
            "text": text,
        }))
    }
}
