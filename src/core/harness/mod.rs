pub mod summary;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::error::{HarnessError, HarnessResult};
use crate::core::llm::registry::{ModelBinding, ModelRegistry};
use crate::core::llm::{CompletionGateway, ToolInvocation, Usage};
use crate::core::store::EvalStore;
use crate::core::store::types::{NewModelRun, QueryRecord};

pub use summary::{ModelSummary, SummaryAggregator, SummaryFilter};

pub const DEFAULT_MODEL_DELAY: Duration = Duration::from_secs(1);

/// Telemetry of one successful model run, as returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunData {
    pub request_id: String,
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
    pub usage: Usage,
    pub total_steps: usize,
    pub total_tool_calls: usize,
    pub tool_results: Vec<ToolInvocation>,
    pub tools_used: Vec<String>,
    pub missing_tools: Vec<String>,
    pub unexpected_tools: Vec<String>,
}

impl RunData {
    pub fn is_fully_correct(&self) -> bool {
        self.missing_tools.is_empty() && self.unexpected_tools.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ModelOutcome {
    Success { message: String, data: RunData },
    Error { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PerModelResult {
    pub provider: String,
    pub model: String,
    #[serde(flatten)]
    pub outcome: ModelOutcome,
}

impl PerModelResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ModelOutcome::Success { .. })
    }

    pub fn data(&self) -> Option<&RunData> {
        match &self.outcome {
            ModelOutcome::Success { data, .. } => Some(data),
            ModelOutcome::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ModelOutcome::Error { error } => Some(error),
            ModelOutcome::Success { .. } => None,
        }
    }
}

/// Distinct tool names in first-invocation order.
pub fn distinct_tool_names(results: &[ToolInvocation]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for r in results {
        if !names.contains(&r.tool_name) {
            names.push(r.tool_name.clone());
        }
    }
    names
}

/// `(expected \ used, used \ expected)`, each keeping its source order.
/// Names compare exactly.
pub fn diff_tools(expected: &[String], used: &[String]) -> (Vec<String>, Vec<String>) {
    let missing = expected
        .iter()
        .filter(|t| !used.contains(t))
        .cloned()
        .collect();
    let unexpected = used
        .iter()
        .filter(|t| !expected.contains(t))
        .cloned()
        .collect();
    (missing, unexpected)
}

/// Drives every registered model through one stored query.
pub struct TestRunner {
    store: EvalStore,
    registry: Arc<ModelRegistry>,
    gateway: Arc<dyn CompletionGateway>,
    delay: Duration,
}

impl TestRunner {
    pub fn new(store: EvalStore, registry: Arc<ModelRegistry>, gateway: Arc<dyn CompletionGateway>) -> Self {
        Self {
            store,
            registry,
            gateway,
            delay: DEFAULT_MODEL_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// One result per registry model, in registry order. Only a missing
    /// query or a store failure aborts the batch.
    pub async fn run_test_for_query(&self, query_id: &str) -> HarnessResult<Vec<PerModelResult>> {
        let query = self
            .store
            .get_query(query_id)
            .await?
            .ok_or_else(|| HarnessError::query_not_found(query_id))?;

        let bindings = self.registry.bindings();
        let mut results = Vec::with_capacity(bindings.len());
        for (idx, binding) in bindings.iter().enumerate() {
            if idx > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            info!("Testing {}/{} on query {}", binding.provider, binding.model, query.id);

            let outcome = match self.evaluate(&query, binding).await {
                Ok((message, data)) => {
                    info!(
                        "{} used {:?} (missing {:?}, unexpected {:?})",
                        binding.model, data.tools_used, data.missing_tools, data.unexpected_tools
                    );
                    ModelOutcome::Success { message, data }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("{} failed on query {} ({}): {}", binding.model, query.id, e.kind(), e);
                    ModelOutcome::Error { error: e.to_string() }
                }
            };
            results.push(PerModelResult {
                provider: binding.provider.clone(),
                model: binding.model.clone(),
                outcome,
            });
        }
        Ok(results)
    }

    async fn evaluate(&self, query: &QueryRecord, binding: &ModelBinding) -> HarnessResult<(String, RunData)> {
        let resolved = self
            .gateway
            .resolve(Some(binding.provider.as_str()), Some(binding.model.as_str()))?;
        let completion = self.gateway.invoke(&resolved, &query.prompt).await?;

        let tools_used = distinct_tool_names(&completion.tool_results);
        let (missing_tools, unexpected_tools) = diff_tools(&query.expected_tools, &tools_used);

        let run = NewModelRun {
            external_id: completion.response_id.clone(),
            query_id: Some(query.id.clone()),
            model_id: completion.model_id.clone(),
            timestamp: completion.timestamp,
            usage: completion.usage,
            total_steps: completion.steps as u64,
            total_tool_calls: completion.tool_results.len() as u64,
            tools_used: tools_used.clone(),
            missing_tools: missing_tools.clone(),
            unexpected_tools: unexpected_tools.clone(),
            error_message: None,
        };
        self.store.record_run(&run, &completion.tool_results).await?;

        let data = RunData {
            request_id: completion.response_id,
            model_id: completion.model_id,
            timestamp: completion.timestamp,
            usage: completion.usage,
            total_steps: completion.steps,
            total_tool_calls: completion.tool_results.len(),
            tool_results: completion.tool_results,
            tools_used,
            missing_tools,
            unexpected_tools,
        };
        Ok((completion.text, data))
    }
}

#[cfg(test)]
mod tests;
