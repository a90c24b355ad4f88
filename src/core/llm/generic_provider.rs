use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::registry::ModelRegistry;
use super::{Completion, CompletionGateway, ResolvedModel, ToolInvocation, Usage};
use crate::core::error::{HarnessError, HarnessResult};
use crate::core::tools::{ToolDefinition, ToolSet};

// ── OpenAI-compatible request/response ──

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool>,
}

#[derive(Serialize)]
struct FunctionTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn tool(call_id: &str, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Deserialize)]
struct ChatResponse {
    id: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    created: Option<i64>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

/// Arguments arrive as a JSON-encoded string; keep the raw text if it does
/// not parse.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// ── Gateway ──

/// Gateway for providers speaking the OpenAI chat-completions protocol
/// with function tools.
pub struct GenericProvider {
    registry: Arc<ModelRegistry>,
    tools: Arc<ToolSet>,
    client: Client,
    max_steps: usize,
}

impl GenericProvider {
    pub fn new(
        registry: Arc<ModelRegistry>,
        tools: Arc<ToolSet>,
        client: Client,
        max_steps: usize,
    ) -> Self {
        Self {
            registry,
            tools,
            client,
            max_steps: max_steps.max(1),
        }
    }

    async fn send(
        &self,
        url: &str,
        api_key: &str,
        provider_name: &str,
        req: &ChatRequest<'_>,
    ) -> HarnessResult<ChatResponse> {
        let res = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(req)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            return Err(HarnessError::Gateway(format!(
                "{} API Error ({}): {}",
                provider_name,
                status,
                res.text().await.unwrap_or_default()
            )));
        }
        res.json::<ChatResponse>()
            .await
            .map_err(|e| HarnessError::Gateway(format!("{} returned a malformed response: {}", provider_name, e)))
    }
}

#[async_trait]
impl CompletionGateway for GenericProvider {
    fn resolve(&self, provider: Option<&str>, model: Option<&str>) -> HarnessResult<ResolvedModel> {
        let binding = self.registry.resolve(provider, model)?;
        Ok(ResolvedModel {
            binding,
            tools: self.tools.clone(),
        })
    }

    async fn invoke(&self, model: &ResolvedModel, prompt: &str) -> HarnessResult<Completion> {
        let provider = self
            .registry
            .get_provider(&model.binding.provider)
            .ok_or_else(|| HarnessError::Validation("Invalid provider".to_string()))?;
        let api_key = std::env::var(&provider.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                HarnessError::Gateway(format!("Missing {} in environment", provider.api_key_env))
            })?;

        let tool_defs: Vec<ToolDefinition> = model.tools.definitions();
        let mut messages = vec![ChatMessage::user(prompt)];
        let mut usage = Usage::default();
        let mut tool_results = Vec::new();
        let mut text = String::new();
        let mut steps = 0;
        let mut first: Option<(String, Option<String>, Option<i64>)> = None;

        while steps < self.max_steps {
            let req = ChatRequest {
                model: &model.binding.model,
                messages: &messages,
                tools: tool_defs
                    .iter()
                    .cloned()
                    .map(|function| FunctionTool {
                        kind: "function",
                        function,
                    })
                    .collect(),
            };
            let res = self
                .send(&provider.base_url, &api_key, &provider.name, &req)
                .await?;
            steps += 1;
            usage.add(res.usage.unwrap_or_default().into());
            if first.is_none() {
                first = Some((res.id.clone(), res.model.clone(), res.created));
            }

            let message = res
                .choices
                .into_iter()
                .next()
                .map(|c| c.message)
                .ok_or_else(|| HarnessError::Gateway(format!("{} returned no choices", provider.name)))?;
            text = message.content.clone().unwrap_or_default();

            let calls = message.tool_calls.clone().unwrap_or_default();
            if calls.is_empty() {
                break;
            }
            messages.push(message);

            for call in calls {
                let args = parse_arguments(&call.function.arguments);
                debug!("{} called tool {}", model.binding.model, call.function.name);
                let (result, error) = match model.tools.execute(&call.function.name, args.clone()).await {
                    Ok(result) => (result, None),
                    Err(e) => {
                        warn!("tool {} failed: {}", call.function.name, e);
                        (serde_json::json!({ "error": e.to_string() }), Some(e.to_string()))
                    }
                };
                messages.push(ChatMessage::tool(&call.id, result.to_string()));
                tool_results.push(ToolInvocation {
                    tool_name: call.function.name,
                    tool_call_id: call.id,
                    args,
                    result,
                    error,
                });
            }
        }

        let (response_id, model_id, created) = first
            .ok_or_else(|| HarnessError::Gateway("no completion step ran".to_string()))?;
        let timestamp: DateTime<Utc> = created
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(Completion {
            response_id,
            model_id: model_id.unwrap_or_else(|| model.binding.model.clone()),
            timestamp,
            text,
            usage,
            steps,
            tool_results,
        })
    }
}
