use anyhow::{Result, anyhow};
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::{Tool, response_cache};

const WEATHERSTACK_URL: &str = "https://api.weatherstack.com/current";

#[derive(Debug, Default, Deserialize)]
struct WeatherstackResponse {
    #[serde(default)]
    request: Option<WeatherRequest>,
    #[serde(default)]
    location: Option<WeatherLocation>,
    #[serde(default)]
    current: Option<WeatherCurrent>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WeatherRequest {
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WeatherLocation {
    name: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WeatherCurrent {
    temperature: Option<f64>,
    #[serde(default)]
    weather_descriptions: Vec<String>,
}

/// Current conditions for a location via WeatherStack.
pub struct WeatherTool {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    cache: Cache<String, Value>,
}

impl WeatherTool {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            endpoint: WEATHERSTACK_URL.to_string(),
            cache: response_cache(Duration::from_secs(10 * 60)),
        }
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    async fn fetch(&self, query: &str) -> Result<Value> {
        let cache_key = format!("weather:{}", query.trim().to_lowercase());
        if let Some(hit) = self.cache.get(&cache_key).await {
            debug!("weather cache hit for {}", query);
            return Ok(hit);
        }

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            anyhow!("Weather API key is missing. Please set WEATHERSTACK_API_KEY in your environment.")
        })?;
        let url = format!(
            "{}?access_key={}&query={}",
            self.endpoint,
            api_key,
            urlencoding::encode(query)
        );
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            return Err(anyhow!("Weather API error: [{}]", res.status()));
        }
        let data: Value = res.json().await?;
        // WeatherStack reports failures with HTTP 200 and an `error` body.
        if data.get("error").is_none() {
            self.cache.insert(cache_key, data.clone()).await;
        }
        Ok(data)
    }
}

fn summarize(raw: &Value) -> Result<Value> {
    let parsed: WeatherstackResponse = serde_json::from_value(raw.clone()).unwrap_or_default();
    if let Some(err) = parsed.error {
        return Err(anyhow!("Weather API error: {}", err));
    }
    let units = match parsed.request.and_then(|r| r.unit).as_deref() {
        Some("m") => "Celsius",
        _ => "Fahrenheit",
    };
    let (name, country) = parsed
        .location
        .map(|l| (l.name, l.country))
        .unwrap_or((None, None));
    let (temperature, description) = parsed
        .current
        .map(|c| (c.temperature, c.weather_descriptions.join(",")))
        .unwrap_or((None, String::new()));
    Ok(json!({
        "name": name,
        "country": country,
        "units": units,
        "temperature": temperature,
        "description": description,
    }))
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Get the current weather in a location. The parameter is called 'name'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| anyhow!("weather requires a 'name' argument"))?;
        let raw = self.fetch(name).await?;
        summarize(&raw)
    }
}
