use anyhow::{Result, anyhow};
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Tool, response_cache};

const FIXER_URL: &str = "http://data.fixer.io/api/latest";
const DEFAULT_BASE: &str = "EUR";

#[derive(Debug, Deserialize)]
struct FixerResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// Converts `amount` between two currencies given EUR-based rates.
/// Returns `(result, rate)`.
pub fn convert_currency(
    rates: &HashMap<String, f64>,
    from: &str,
    to: &str,
    amount: f64,
) -> Result<(f64, f64)> {
    let rate_of = |code: &str| {
        rates
            .get(code)
            .copied()
            .filter(|r| *r != 0.0)
            .ok_or_else(|| anyhow!("Unsupported currency code: {}", code))
    };
    let from_rate = rate_of(from)?;
    let to_rate = rate_of(to)?;

    let rate = if from == DEFAULT_BASE {
        to_rate
    } else if to == DEFAULT_BASE {
        1.0 / from_rate
    } else {
        to_rate / from_rate
    };
    Ok((amount * rate, rate))
}

/// Currency conversion backed by Fixer's latest rates.
pub struct CurrencyTool {
    client: Client,
    api_key: Option<String>,
    cache: Cache<String, Value>,
}

impl CurrencyTool {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            cache: response_cache(Duration::from_secs(6 * 60 * 60)),
        }
    }

    async fn latest_rates(&self) -> Result<HashMap<String, f64>> {
        let cache_key = format!("currency:latest:{}", DEFAULT_BASE);
        if let Some(hit) = self.cache.get(&cache_key).await {
            debug!("currency cache hit");
            let cached: FixerResponse = serde_json::from_value(hit)?;
            return Ok(cached.rates);
        }

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            anyhow!("Fixer API key is missing. Please set FIXER_API_KEY in your environment.")
        })?;
        let url = format!("{}?access_key={}", FIXER_URL, api_key);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            return Err(anyhow!("Currency API error: [{}]", res.status()));
        }
        let raw: Value = res.json().await?;
        let data: FixerResponse = serde_json::from_value(raw.clone())?;
        if !data.success {
            return Err(anyhow!("Currency API error: {}", raw));
        }
        let base = data.base.clone().unwrap_or_else(|| DEFAULT_BASE.to_string());
        if base != DEFAULT_BASE {
            warn!("Fixer API base currency changed to {}", base);
        }
        self.cache
            .insert(format!("currency:latest:{}", base), raw)
            .await;
        Ok(data.rates)
    }
}

#[async_trait]
impl Tool for CurrencyTool {
    fn name(&self) -> &str {
        "currency"
    }

    fn description(&self) -> &str {
        "Convert an amount between two currencies using ISO codes, e.g. from 'USD' to 'JPY'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": { "type": "string" },
                "to": { "type": "string" },
                "amount": { "type": "number" }
            },
            "required": ["from", "to"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let code = |key: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_uppercase())
                .ok_or_else(|| anyhow!("currency requires a '{}' argument", key))
        };
        let from = code("from")?;
        let to = code("to")?;
        let amount = args.get("amount").and_then(Value::as_f64).unwrap_or(1.0);

        let rates = self.latest_rates().await?;
        let (result, rate) = convert_currency(&rates, &from, &to, amount)?;
        Ok(json!({
            "from": from,
            "to": to,
            "amount": amount,
            "rate": rate,
            "result": result,
        }))
    }
}
