use anyhow::Result;
use console::style;

use super::{HarnessContext, QueryAddArgs};
use crate::core::terminal::{self, GuideSection};

pub(super) async fn add(ctx: &HarnessContext, args: QueryAddArgs, json: bool) -> Result<()> {
    let query = ctx
        .store
        .create_query(&args.prompt, &args.expected_tools, args.category)
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&query)?);
        return Ok(());
    }
    terminal::print_success(&format!("Query stored: {}", query.id));
    GuideSection::new("Next")
        .hint(&format!("toolbench run {}", query.id), "evaluate every model")
        .print();
    Ok(())
}

pub(super) async fn list(ctx: &HarnessContext, json: bool) -> Result<()> {
    let queries = ctx.store.list_queries().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&queries)?);
        return Ok(());
    }
    if queries.is_empty() {
        terminal::print_info("No queries yet. Add one with 'toolbench query add'.");
        return Ok(());
    }

    let mut section = GuideSection::new("Queries");
    for q in &queries {
        let expected = if q.expected_tools.is_empty() {
            "(none)".to_string()
        } else {
            q.expected_tools.join(", ")
        };
        section = section
            .status(&q.id, &format!("[{}] {}", q.category, q.prompt))
            .text(&format!("    expects {}", style(expected).cyan()));
    }
    section.print();
    Ok(())
}
