use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

pub const CONFIG_FILE: &str = "config.toml";
const DATA_DIR_ENV: &str = "TOOLBENCH_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub max_steps: usize,
    /// Pause between two models of one batch (upstream rate limits).
    pub model_delay_ms: u64,
    /// JSON file replacing the embedded provider registry.
    pub registry_path: Option<PathBuf>,
    pub weatherstack_api_key: Option<String>,
    pub fixer_api_key: Option<String>,
    pub log_level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_steps: 5,
            model_delay_ms: 1000,
            registry_path: None,
            weatherstack_api_key: None,
            fixer_api_key: None,
            log_level: "info".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Read `config.toml` from `data_dir` (defaults when absent), then apply
    /// environment overrides for tool secrets.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(key) = std::env::var("WEATHERSTACK_API_KEY")
            && !key.is_empty()
        {
            config.weatherstack_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("FIXER_API_KEY")
            && !key.is_empty()
        {
            config.fixer_api_key = Some(key);
        }
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        if config.max_steps == 0 {
            return Err(anyhow!("max_steps must be at least 1"));
        }
        Ok(config)
    }

    pub fn model_delay(&self) -> Duration {
        Duration::from_millis(self.model_delay_ms)
    }

    pub fn log_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}

/// `$TOOLBENCH_DATA_DIR`, else `~/.toolbench`.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".toolbench"))
        .ok_or_else(|| anyhow!("Could not find home directory; set {}", DATA_DIR_ENV))
}
