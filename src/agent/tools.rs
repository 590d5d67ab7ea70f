//! Tools the chat agent can call: a die roll and a current-weather lookup.

use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::llm::ToolDef;
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDef;
    async fn call(&self, input: &Value) -> Result<String>;
}

/// Run the named tool. Returns `(result_text, is_error)`; failures are reported back to the
/// model instead of ending the run.
pub async fn dispatch(tools: &[Box<dyn Tool>], name: &str, input: &Value) -> (String, bool) {
    let Some(tool) = tools.iter().find(|t| t.definition().name == name) else {
        return (format!("Unknown tool: {name}"), true);
    };
    debug!(tool = name, %input, "calling tool");
    match tool.call(input).await {
        Ok(text) => (text, false),
        Err(e) => (format!("Tool {name} failed: {e}"), true),
    }
}

pub struct RollDice;

#[async_trait]
impl Tool for RollDice {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "roll_dice".into(),
            description: "Roll a six-sided die and return a number between 1 and 6.".into(),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, _input: &Value) -> Result<String> {
        let roll: u8 = rand::rng().random_range(1..=6);
        Ok(roll.to_string())
    }
}

const WEATHER_BASE_URL: &str = "https://api.weatherapi.com/v1";

pub struct CheckWeather {
    http: HttpClient,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct WeatherResponse {
    location: WeatherLocation,
    current: CurrentWeather,
}

#[derive(Deserialize)]
struct WeatherLocation {
    name: String,
    #[serde(default)]
    country: String,
}

#[derive(Deserialize)]
struct CurrentWeather {
    temp_c: f64,
    condition: WeatherCondition,
    #[serde(default)]
    humidity: Option<u32>,
    #[serde(default)]
    wind_kph: Option<f64>,
}

#[derive(Deserialize)]
struct WeatherCondition {
    text: String,
}

impl CheckWeather {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new("structured-llm/0.1.0", Duration::from_secs(30))?,
            api_key,
            base_url: base_url.unwrap_or_else(|| WEATHER_BASE_URL.into()),
        })
    }

    /// Reads the key from `WEATHER_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("WEATHER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::config("WEATHER_API_KEY not set. Export it or add it to .env")
            })?;
        Self::new(api_key, None)
    }
}

#[async_trait]
impl Tool for CheckWeather {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "check_weather".into(),
            description: "Get the current weather for a city.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "city": {
                        "type": "string",
                        "description": "City name, e.g. 'Warsaw'."
                    }
                },
                "required": ["city"]
            }),
        }
    }

    async fn call(&self, input: &Value) -> Result<String> {
        let city = input
            .get("city")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::invalid_input("check_weather requires a 'city' string"))?;

        let url = format!("{}/current.json", self.base_url);
        let resp: WeatherResponse = self
            .http
            .get_json_query(&url, &[("key", self.api_key.as_str()), ("q", city)])
            .await?;

        let mut summary = format!(
            "{}, {}: {}, {:.1}°C",
            resp.location.name, resp.location.country, resp.current.condition.text, resp.current.temp_c
        );
        if let Some(h) = resp.current.humidity {
            summary.push_str(&format!(", humidity {h}%"));
        }
        if let Some(w) = resp.current.wind_kph {
            summary.push_str(&format!(", wind {w:.1} km/h"));
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dice_stays_in_range() {
        for _ in 0..50 {
            let n: u8 = RollDice.call(&json!({})).await.unwrap().parse().unwrap();
            assert!((1..=6).contains(&n));
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(RollDice)];
        let (text, is_error) = dispatch(&tools, "launch_rocket", &json!({})).await;
        assert!(is_error);
        assert_eq!(text, "Unknown tool: launch_rocket");
    }

    #[tokio::test]
    async fn weather_failure_keeps_key_out_of_result() {
        let tool = CheckWeather::new("SECRET123".into(), Some("http://127.0.0.1:1".into())).unwrap();
        let (text, is_error) = dispatch(
            &[Box::new(tool) as Box<dyn Tool>],
            "check_weather",
            &json!({"city": "Warsaw"}),
        )
        .await;
        assert!(is_error);
        assert!(text.starts_with("Tool check_weather failed: HTTP error"), "{text}");
        assert!(!text.contains("SECRET123"), "{text}");
    }

    #[tokio::test]
    async fn weather_requires_city() {
        let tool = CheckWeather::new("k".into(), Some("http://localhost:1".into())).unwrap();
        let (text, is_error) = dispatch(
            &[Box::new(tool) as Box<dyn Tool>],
            "check_weather",
            &json!({}),
        )
        .await;
        assert!(is_error);
        assert!(text.contains("'city'"));
    }
}
