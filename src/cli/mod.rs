mod query;
mod report;

use anyhow::{Result, anyhow};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::core::config::{self, HarnessConfig};
use crate::core::harness::SummaryFilter;
use crate::core::llm::generic_provider::GenericProvider;
use crate::core::llm::registry::ModelRegistry;
use crate::core::store::EvalStore;
use crate::core::store::types::QueryCategory;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::core::tools::ToolSet;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Queries")
        .command("query add", "Store a prompt with the tools it should use")
        .command("query list", "List stored queries")
        .print();

    GuideSection::new("Evaluation")
        .command("run <query-id>", "Run every registered model against a query")
        .command("summary <query-id>", "Per-model accuracy for a query")
        .command("metrics", "Recent model runs, newest first")
        .command("models [provider]", "Registered providers and models")
        .print();

    GuideSection::new("Flags")
        .bullet("--prompt, -p <text>      prompt for query add")
        .bullet("--expect, -e <a,b>       expected tool names for query add")
        .bullet("--category, -c <name>    simple | complex | verbose | obvious | ambiguous")
        .bullet("--missing                only models that missed expected tools")
        .bullet("--unexpected             only models that called unexpected tools")
        .bullet("--limit <n>              rows shown by metrics")
        .bullet("--json                   machine-readable output")
        .print();

    println!(
        "\n {} {} <command> [subcommand]\n",
        style("Usage:").bold(),
        style("toolbench").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueryAddArgs {
    pub prompt: String,
    pub expected_tools: Vec<String>,
    pub category: QueryCategory,
}

pub(crate) fn parse_query_add_args(args: &[String], start: usize) -> Result<QueryAddArgs> {
    let mut prompt = String::new();
    let mut expected_tools = Vec::new();
    let mut category = QueryCategory::Simple;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--prompt" | "-p" if i + 1 < args.len() => {
                prompt = args[i + 1].clone();
                i += 2;
            }
            "--expect" | "-e" if i + 1 < args.len() => {
                expected_tools.extend(
                    args[i + 1]
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string),
                );
                i += 2;
            }
            "--category" | "-c" if i + 1 < args.len() => {
                category = QueryCategory::parse(&args[i + 1])
                    .ok_or_else(|| anyhow!("Unknown category '{}'", args[i + 1]))?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    if prompt.trim().is_empty() {
        return Err(anyhow!("--prompt is required"));
    }
    Ok(QueryAddArgs {
        prompt,
        expected_tools,
        category,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SummaryArgs {
    pub query_id: String,
    pub filter: SummaryFilter,
    pub json: bool,
}

pub(crate) fn parse_summary_args(args: &[String], start: usize) -> Result<SummaryArgs> {
    let mut query_id = None;
    let mut filter = SummaryFilter::default();
    let mut json = false;
    for arg in args.iter().skip(start) {
        match arg.as_str() {
            "--missing" => filter.has_missing_tools = Some(true),
            "--unexpected" => filter.has_unexpected_tools = Some(true),
            "--json" => json = true,
            other if !other.starts_with('-') && query_id.is_none() => {
                query_id = Some(other.to_string())
            }
            _ => {}
        }
    }
    Ok(SummaryArgs {
        query_id: query_id.ok_or_else(|| anyhow!("a query id is required"))?,
        filter,
        json,
    })
}

/// First positional argument after `start`, if any.
fn positional(args: &[String], start: usize) -> Option<&str> {
    args.iter()
        .skip(start)
        .map(String::as_str)
        .find(|a| !a.starts_with('-'))
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

pub(crate) fn parse_limit(args: &[String], default: usize) -> usize {
    args.iter()
        .position(|a| a == "--limit")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Everything a command needs, built once from the data directory.
pub(crate) struct HarnessContext {
    pub config: HarnessConfig,
    pub store: EvalStore,
    pub registry: Arc<ModelRegistry>,
}

impl HarnessContext {
    async fn load(data_dir: PathBuf) -> Result<Self> {
        let config = HarnessConfig::load(&data_dir)?;
        crate::logging::init(config.log_level());

        let registry = match &config.registry_path {
            Some(path) if path.is_absolute() => ModelRegistry::from_file(path)?,
            Some(path) => ModelRegistry::from_file(&data_dir.join(path))?,
            None => ModelRegistry::embedded()?,
        };
        debug!("registry has {} models", registry.bindings().len());
        let store = EvalStore::open(&data_dir).await?;
        Ok(Self {
            config,
            store,
            registry: Arc::new(registry),
        })
    }

    pub fn gateway(&self) -> GenericProvider {
        let client = reqwest::Client::new();
        let tools = ToolSet::builtin(&self.config, client.clone());
        GenericProvider::new(
            self.registry.clone(),
            Arc::new(tools),
            client,
            self.config.max_steps,
        )
    }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(cmd) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let ctx = HarnessContext::load(config::data_dir()?).await?;
    let json = has_flag(&args, "--json");

    match cmd {
        "query" => match args.get(2).map(String::as_str) {
            Some("add") => match parse_query_add_args(&args, 3) {
                Ok(parsed) => query::add(&ctx, parsed, json).await?,
                Err(e) => {
                    print_error(&format!("Error: {}", e));
                    GuideSection::new("toolbench query add")
                        .hint(
                            "toolbench query add -p \"Weather in Oslo?\" -e weather -c obvious",
                            "store a query",
                        )
                        .print();
                }
            },
            Some("list") => query::list(&ctx, json).await?,
            _ => {
                GuideSection::new("toolbench query")
                    .command("add", "Store a prompt with its expected tools")
                    .command("list", "List stored queries")
                    .print();
            }
        },
        "run" => match positional(&args, 2) {
            Some(query_id) => report::run(&ctx, query_id, json).await?,
            None => print_error("Error: run needs a query id. See 'toolbench query list'."),
        },
        "summary" => match parse_summary_args(&args, 2) {
            Ok(parsed) => report::summary(&ctx, parsed).await?,
            Err(e) => print_error(&format!("Error: {}", e)),
        },
        "metrics" => report::metrics(&ctx, parse_limit(&args, 20), json).await?,
        "models" => report::models(&ctx, positional(&args, 2), json)?,
        other => {
            print_error(&format!("Unknown command '{}'", other));
            print_help();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_query_add_args_reads_all_flags() {
        let args = argv(&[
            "toolbench", "query", "add", "--prompt", "Convert 5 EUR to USD", "--expect",
            "currency, weather", "-c", "Complex",
        ]);
        let parsed = parse_query_add_args(&args, 3).unwrap();
        assert_eq!(parsed.prompt, "Convert 5 EUR to USD");
        assert_eq!(parsed.expected_tools, vec!["currency", "weather"]);
        assert_eq!(parsed.category, QueryCategory::Complex);
    }

    #[test]
    fn parse_query_add_args_defaults_category_and_requires_prompt() {
        let parsed = parse_query_add_args(&argv(&["t", "query", "add", "-p", "hi"]), 3).unwrap();
        assert_eq!(parsed.category, QueryCategory::Simple);
        assert!(parsed.expected_tools.is_empty());

        assert!(parse_query_add_args(&argv(&["t", "query", "add", "-e", "weather"]), 3).is_err());
        assert!(parse_query_add_args(&argv(&["t", "query", "add", "-p", "x", "-c", "odd"]), 3).is_err());
    }

    #[test]
    fn parse_summary_args_reads_filter_flags() {
        let args = argv(&["toolbench", "summary", "--missing", "abc-123", "--json"]);
        let parsed = parse_summary_args(&args, 2).unwrap();
        assert_eq!(parsed.query_id, "abc-123");
        assert_eq!(parsed.filter.has_missing_tools, Some(true));
        assert_eq!(parsed.filter.has_unexpected_tools, None);

        let both = parse_summary_args(&argv(&["t", "summary", "q", "--unexpected", "--missing"]), 2).unwrap();
        assert_eq!(both.filter.has_unexpected_tools, Some(true));
        assert!(parsed.json);
    }

    #[test]
    fn parse_summary_args_requires_query_id() {
        assert!(parse_summary_args(&argv(&["toolbench", "summary", "--json"]), 2).is_err());
        let parsed = parse_summary_args(&argv(&["toolbench", "summary", "q1"]), 2).unwrap();
        assert!(parsed.filter.is_empty());
    }

    #[test]
    fn parse_limit_falls_back_on_bad_input() {
        assert_eq!(parse_limit(&argv(&["t", "metrics", "--limit", "5"]), 20), 5);
        assert_eq!(parse_limit(&argv(&["t", "metrics", "--limit", "x"]), 20), 20);
        assert_eq!(parse_limit(&argv(&["t", "metrics"]), 20), 20);
    }

    #[test]
    fn positional_skips_flags() {
        let args = argv(&["t", "run", "--json", "q-9"]);
        assert_eq!(positional(&args, 2), Some("q-9"));
        assert_eq!(positional(&argv(&["t", "run"]), 2), None);
    }
}
