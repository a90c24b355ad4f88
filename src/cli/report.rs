use anyhow::Result;
use console::style;
use std::sync::Arc;

use super::{HarnessContext, SummaryArgs};
use crate::core::harness::{ModelSummary, SummaryAggregator, TestRunner};
use crate::core::terminal::{self, GuideSection};

fn names_or_dash(names: &[String]) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

fn accuracy_label(summary: &ModelSummary) -> String {
    match summary.tool_accuracy {
        Some(pct) => format!("{:.1}%", pct),
        None => "n/a".to_string(),
    }
}

pub(super) async fn run(ctx: &HarnessContext, query_id: &str, json: bool) -> Result<()> {
    let runner = TestRunner::new(ctx.store.clone(), ctx.registry.clone(), Arc::new(ctx.gateway()))
        .with_delay(ctx.config.model_delay());

    if !json {
        terminal::print_step(&format!(
            "Running {} models against {}",
            ctx.registry.bindings().len(),
            query_id
        ));
    }
    let results = runner.run_test_for_query(query_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for result in &results {
        let title = format!("{}/{}", result.provider, result.model);
        match (result.data(), result.error()) {
            (Some(data), _) => {
                let verdict = if data.is_fully_correct() {
                    style("correct").green().to_string()
                } else {
                    style("incorrect").red().to_string()
                };
                GuideSection::new(&title)
                    .status("Result", &verdict)
                    .status("Tools used", &names_or_dash(&data.tools_used))
                    .status("Missing", &names_or_dash(&data.missing_tools))
                    .status("Unexpected", &names_or_dash(&data.unexpected_tools))
                    .status(
                        "Tokens",
                        &format!("{} ({} steps, {} tool calls)", data.usage.total_tokens, data.total_steps, data.total_tool_calls),
                    )
                    .print();
            }
            (None, error) => {
                GuideSection::new(&title)
                    .status("Result", &style("error").yellow().to_string())
                    .text(&format!("  {}", error.unwrap_or("unknown error")))
                    .print();
            }
        }
    }
    let ok = results.iter().filter(|r| r.is_success()).count();
    if ok == results.len() {
        terminal::print_success(&format!("{}/{} models completed", ok, results.len()));
    } else {
        terminal::print_warn(&format!(
            "{}/{} models completed, {} failed",
            ok,
            results.len(),
            results.len() - ok
        ));
    }
    Ok(())
}

pub(super) async fn summary(ctx: &HarnessContext, args: SummaryArgs) -> Result<()> {
    let aggregator = SummaryAggregator::new(ctx.store.clone());
    let filter = (!args.filter.is_empty()).then_some(&args.filter);
    let summary = aggregator
        .get_model_summary_for_query(&args.query_id, filter)
        .await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    GuideSection::new("Query")
        .status("Id", &summary.query.id)
        .status("Prompt", &summary.query.prompt)
        .status("Expects", &names_or_dash(&summary.query.expected_tools))
        .print();

    if summary.summary_by_model.is_empty() {
        terminal::print_info("No runs match. Use 'toolbench run <query-id>' first.");
        return Ok(());
    }
    for (model, s) in &summary.summary_by_model {
        let missing: Vec<String> = s.all_missing_tools.iter().cloned().collect();
        let unexpected: Vec<String> = s.all_unexpected_tools.iter().cloned().collect();
        GuideSection::new(model)
            .status("Accuracy", &accuracy_label(s))
            .status("Runs", &format!("{} ({} correct)", s.count, s.correct_runs()))
            .status("Tokens", &s.total_tokens.to_string())
            .status("Tool calls", &s.total_tool_calls.to_string())
            .status("Missing", &names_or_dash(&missing))
            .status("Unexpected", &names_or_dash(&unexpected))
            .print();
    }
    Ok(())
}

pub(super) async fn metrics(ctx: &HarnessContext, limit: usize, json: bool) -> Result<()> {
    let mut runs = ctx.store.list_recent().await?;
    runs.truncate(limit);
    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        terminal::print_info("No model runs recorded yet.");
        return Ok(());
    }

    let mut section = GuideSection::new("Recent runs");
    for run in &runs {
        let label = run.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let line = match &run.error_message {
            Some(err) => format!("{} {}", run.model_id, style(err).red()),
            None => format!(
                "{} {} tokens, {} tool calls, query {}",
                run.model_id,
                run.total_tokens,
                run.total_tool_calls,
                run.query_id.as_deref().unwrap_or("-")
            ),
        };
        section = section.status(&label, &line);
    }
    section.print();
    Ok(())
}

pub(super) fn models(ctx: &HarnessContext, provider: Option<&str>, json: bool) -> Result<()> {
    if let Some(id) = provider
        && !ctx.registry.is_valid_provider(id)
    {
        terminal::print_error(&format!("Unknown provider '{}'", id));
        return Ok(());
    }
    let bindings: Vec<_> = ctx
        .registry
        .bindings()
        .into_iter()
        .filter(|b| provider.is_none_or(|id| b.provider == id))
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&bindings)?);
        return Ok(());
    }
    for provider in ctx
        .registry
        .providers()
        .iter()
        .filter(|p| bindings.iter().any(|b| b.provider == p.id))
    {
        let mut section = GuideSection::new(&format!("{} ({})", provider.name, provider.id))
            .status("Endpoint", &provider.base_url)
            .status("Key", &format!("${}", provider.api_key_env));
        for model in ctx.registry.list_models(&provider.id) {
            section = section.bullet(model);
        }
        section.print();
    }
    Ok(())
}
