pub mod generic_provider;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::core::error::HarnessResult;
use crate::core::tools::ToolSet;
use registry::ModelBinding;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One tool call executed while the model was generating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_name: String,
    pub tool_call_id: String,
    pub args: Value,
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of driving one model to completion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Gateway-assigned id, unique per completion.
    pub response_id: String,
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub usage: Usage,
    pub steps: usize,
    pub tool_results: Vec<ToolInvocation>,
}

/// A model binding together with the tools it may invoke.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub binding: ModelBinding,
    pub tools: Arc<ToolSet>,
}

#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Validation step. Unknown provider/model pairings fail with
    /// `HarnessError::Validation`.
    fn resolve(&self, provider: Option<&str>, model: Option<&str>) -> HarnessResult<ResolvedModel>;

    /// Run the model against `prompt` until it stops calling tools.
    async fn invoke(&self, model: &ResolvedModel, prompt: &str) -> HarnessResult<Completion>;
}
