mod currency;
mod weather;

pub use currency::{CurrencyTool, convert_currency};
pub use weather::WeatherTool;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use moka::future::Cache;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::HarnessConfig;

/// A capability the model may call during generation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<Value>;
}

/// Function definition sent to the completion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Default, Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin(config: &HarnessConfig, client: reqwest::Client) -> Self {
        Self::new()
            .with(WeatherTool::new(
                client.clone(),
                config.weatherstack_api_key.clone(),
            ))
            .with(CurrencyTool::new(client, config.fixer_api_key.clone()))
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", name))?;
        tool.execute(args).await
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

const RESPONSE_CACHE_CAPACITY: u64 = 1_000;

/// Response cache keyed by normalized request. Entries expire `ttl` after
/// insertion.
pub(crate) fn response_cache(ttl: Duration) -> Cache<String, Value> {
    Cache::builder()
        .max_capacity(RESPONSE_CACHE_CAPACITY)
        .time_to_live(ttl)
        .build()
}

#[cfg(test)]
pub(crate) struct EchoTool(pub &'static str);

#[cfg(test)]
#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        self.0
    }

    fn description(&self) -> &str {
        "Echoes its arguments"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        if args.get("fail").is_some() {
            return Err(anyhow!("echo failed"));
        }
        Ok(serde_json::json!({ "echo": args }))
    }
}
