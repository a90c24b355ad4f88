use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::core::error::{HarnessError, HarnessResult};

const PROVIDERS_JSON: &str = include_str!("providers.json");

/// Providers and the models eligible for evaluation, in declaration order.
/// Built once at start-up and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRegistry {
    providers: Vec<ProviderDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDef {
    pub id: String,
    pub name: String,
    /// OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    pub api_key_env: String,
    pub models: Vec<ModelDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDef {
    pub id: String,
    pub name: String,
}

/// A validated provider/model pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelBinding {
    pub provider: String,
    pub model: String,
}

impl ModelRegistry {
    pub fn embedded() -> Result<Self> {
        Self::from_json(PROVIDERS_JSON).context("embedded providers.json is invalid")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading registry {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing registry {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let registry: Self = serde_json::from_str(raw)?;
        registry.check()?;
        Ok(registry)
    }

    fn check(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(anyhow!("registry declares no providers"));
        }
        let mut seen = HashSet::new();
        for p in &self.providers {
            if !seen.insert(p.id.as_str()) {
                return Err(anyhow!("duplicate provider '{}'", p.id));
            }
            if p.models.is_empty() {
                return Err(anyhow!("provider '{}' declares no models", p.id));
            }
        }
        Ok(())
    }

    pub fn providers(&self) -> &[ProviderDef] {
        &self.providers
    }

    pub fn get_provider(&self, id: &str) -> Option<&ProviderDef> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn is_valid_provider(&self, provider: &str) -> bool {
        self.get_provider(provider).is_some()
    }

    pub fn is_valid_model(&self, provider: &str, model: &str) -> bool {
        self.get_provider(provider)
            .is_some_and(|p| p.models.iter().any(|m| m.id == model))
    }

    pub fn list_models(&self, provider: &str) -> Vec<&str> {
        self.get_provider(provider)
            .map(|p| p.models.iter().map(|m| m.id.as_str()).collect())
            .unwrap_or_default()
    }

    /// Every provider/model pair, providers in order, models in order.
    pub fn bindings(&self) -> Vec<ModelBinding> {
        self.providers
            .iter()
            .flat_map(|p| {
                p.models.iter().map(|m| ModelBinding {
                    provider: p.id.clone(),
                    model: m.id.clone(),
                })
            })
            .collect()
    }

    /// Missing provider defaults to the first one, missing model to that
    /// provider's first model.
    pub fn resolve(&self, provider: Option<&str>, model: Option<&str>) -> HarnessResult<ModelBinding> {
        let provider_def = match provider {
            Some(id) => self
                .get_provider(id)
                .ok_or_else(|| HarnessError::Validation("Invalid provider".to_string()))?,
            None => self
                .providers
                .first()
                .ok_or_else(|| HarnessError::Validation("Invalid provider".to_string()))?,
        };
        let model_id = match model {
            Some(id) => id,
            None => provider_def
                .models
                .first()
                .map(|m| m.id.as_str())
                .ok_or_else(|| HarnessError::Validation("Invalid model for provider".to_string()))?,
        };
        if !self.is_valid_model(&provider_def.id, model_id) {
            return Err(HarnessError::Validation(
                "Invalid model for provider".to_string(),
            ));
        }
        Ok(ModelBinding {
            provider: provider_def.id.clone(),
            model: model_id.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_registry(models: &[&str]) -> ModelRegistry {
    let registry = ModelRegistry {
        providers: vec![ProviderDef {
        id: "mock".to_string(),
        name: "Mock".to_string(),
        base_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
        api_key_env: "MOCK_API_KEY".to_string(),
        models: models
            .iter()
            .map(|m| ModelDef {
                id: m.to_string(),
                name: m.to_uppercase(),
            })
            .collect(),
        }],
    };
    registry.check().expect("test registry is valid");
    registry
}
