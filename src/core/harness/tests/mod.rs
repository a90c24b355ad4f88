//! Harness tests against an in-memory store and a scripted gateway.

mod summary;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::core::error::{HarnessError, HarnessResult};
use crate::core::harness::TestRunner;
use crate::core::llm::registry::{ModelBinding, test_registry};
use crate::core::llm::{Completion, CompletionGateway, ResolvedModel, ToolInvocation, Usage};
use crate::core::store::EvalStore;
use crate::core::tools::ToolSet;

pub(super) enum Script {
    Tools(Vec<&'static str>),
    Fail(&'static str),
}

/// Gateway whose per-model behaviour is fixed up front.
#[derive(Default)]
pub(super) struct ScriptedGateway {
    scripts: HashMap<String, Script>,
    invalid: Vec<String>,
    fixed_response_id: Option<String>,
    counter: AtomicUsize,
    pub calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, model: &str, script: Script) -> Self {
        self.scripts.insert(model.to_string(), script);
        self
    }

    pub fn reject(mut self, model: &str) -> Self {
        self.invalid.push(model.to_string());
        self
    }

    /// Every completion reuses the same id.
    pub fn fixed_response_id(mut self, id: &str) -> Self {
        self.fixed_response_id = Some(id.to_string());
        self
    }

    pub fn invoked_models(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    fn resolve(&self, provider: Option<&str>, model: Option<&str>) -> HarnessResult<ResolvedModel> {
        let model = model.unwrap_or_default();
        if self.invalid.iter().any(|m| m == model) {
            return Err(HarnessError::Validation("Invalid model for provider".to_string()));
        }
        Ok(ResolvedModel {
            binding: ModelBinding {
                provider: provider.unwrap_or("mock").to_string(),
                model: model.to_string(),
            },
            tools: Arc::new(ToolSet::new()),
        })
    }

    async fn invoke(&self, model: &ResolvedModel, _prompt: &str) -> HarnessResult<Completion> {
        let name = model.binding.model.clone();
        self.calls.lock().unwrap().push((name.clone(), Instant::now()));
        let n = self.counter.fetch_add(1, Ordering::SeqCst);

        let tools = match self.scripts.get(&name) {
            Some(Script::Tools(tools)) => tools.clone(),
            Some(Script::Fail(msg)) => return Err(HarnessError::Gateway(msg.to_string())),
            None => Vec::new(),
        };
        let tool_results = tools
            .iter()
            .enumerate()
            .map(|(i, tool)| ToolInvocation {
                tool_name: tool.to_string(),
                tool_call_id: format!("call_{}", i),
                args: json!({}),
                result: json!({"ok": true}),
                error: None,
            })
            .collect::<Vec<_>>();

        Ok(Completion {
            response_id: self
                .fixed_response_id
                .clone()
                .unwrap_or_else(|| format!("resp-{}-{}", name, n)),
            model_id: name,
            timestamp: Utc::now(),
            text: "done".to_string(),
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            steps: tool_results.len() + 1,
            tool_results,
        })
    }
}

pub(super) fn runner(store: &EvalStore, models: &[&str], gateway: Arc<ScriptedGateway>) -> TestRunner {
    TestRunner::new(store.clone(), Arc::new(test_registry(models)), gateway)
        .with_delay(std::time::Duration::ZERO)
}

pub(super) fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
