use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Row, params};
use serde_json::Value;
use std::collections::HashMap;

use super::EvalStore;
use super::types::{ModelRunRow, NewModelRun, ToolCallRow};
use crate::core::error::HarnessResult;
use crate::core::llm::ToolInvocation;

const RUN_COLUMNS: &str = "external_id, query_id, model_id, timestamp, prompt_tokens, completion_tokens, \
     total_tokens, total_steps, total_tool_calls, tools_used, missing_tools, unexpected_tools, error_message";

fn count(v: Option<i64>) -> u64 {
    v.unwrap_or(0).max(0) as u64
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn json_column(raw: Option<String>) -> Value {
    match raw {
        None => Value::Null,
        Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<ModelRunRow> {
    Ok(ModelRunRow {
        external_id: row.get(0)?,
        query_id: row.get(1)?,
        model_id: row.get(2)?,
        timestamp: timestamp(row.get(3)?),
        prompt_tokens: count(row.get(4)?),
        completion_tokens: count(row.get(5)?),
        total_tokens: count(row.get(6)?),
        total_steps: count(row.get(7)?),
        total_tool_calls: count(row.get(8)?),
        tools_used: row.get(9)?,
        missing_tools: row.get(10)?,
        unexpected_tools: row.get(11)?,
        error_message: row.get(12)?,
        tool_calls: Vec::new(),
    })
}

impl EvalStore {
    /// Append one run and its tool calls in a single transaction.
    pub async fn record_run(&self, run: &NewModelRun, tool_calls: &[ToolInvocation]) -> HarnessResult<()> {
        let tools_used = serde_json::to_string(&run.tools_used)?;
        let missing = serde_json::to_string(&run.missing_tools)?;
        let unexpected = serde_json::to_string(&run.unexpected_tools)?;

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO ai_requests ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                RUN_COLUMNS
            ),
            params![
                run.external_id,
                run.query_id,
                run.model_id,
                run.timestamp.timestamp(),
                run.usage.prompt_tokens as i64,
                run.usage.completion_tokens as i64,
                run.usage.total_tokens as i64,
                run.total_steps as i64,
                run.total_tool_calls as i64,
                tools_used,
                missing,
                unexpected,
                run.error_message,
            ],
        )?;
        for call in tool_calls {
            tx.execute(
                "INSERT INTO tool_calls (request_id, tool_name, tool_call_id, args, result, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run.external_id,
                    call.tool_name,
                    call.tool_call_id,
                    call.args.to_string(),
                    call.result.to_string(),
                    call.error,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Every run, newest first, without tool-call detail.
    pub async fn list_recent(&self) -> HarnessResult<Vec<ModelRunRow>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM ai_requests ORDER BY timestamp DESC, id DESC",
            RUN_COLUMNS
        ))?;
        let rows = stmt.query_map([], run_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Runs recorded for one query, each with its tool calls.
    pub async fn list_by_query(&self, query_id: &str) -> HarnessResult<Vec<ModelRunRow>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM ai_requests WHERE query_id = ?1 ORDER BY id ASC",
            RUN_COLUMNS
        ))?;
        let mut runs = Vec::new();
        for row in stmt.query_map(params![query_id], run_from_row)? {
            runs.push(row?);
        }

        let mut stmt = db.prepare(
            "SELECT tc.request_id, tc.tool_name, tc.tool_call_id, tc.args, tc.result, tc.error_message
             FROM tool_calls tc
             JOIN ai_requests r ON r.external_id = tc.request_id
             WHERE r.query_id = ?1
             ORDER BY tc.id ASC",
        )?;
        let calls = stmt.query_map(params![query_id], |row| {
            Ok(ToolCallRow {
                request_id: row.get(0)?,
                tool_name: row.get(1)?,
                tool_call_id: row.get(2)?,
                args: json_column(row.get(3)?),
                result: json_column(row.get(4)?),
                error_message: row.get(5)?,
            })
        })?;

        let mut by_request: HashMap<String, Vec<ToolCallRow>> = HashMap::new();
        for call in calls {
            let call = call?;
            by_request.entry(call.request_id.clone()).or_default().push(call);
        }
        for run in &mut runs {
            run.tool_calls = by_request.remove(&run.external_id).unwrap_or_default();
        }
        Ok(runs)
    }
}
