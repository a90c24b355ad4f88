use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::core::error::{HarnessError, HarnessResult};
use crate::core::store::EvalStore;
use crate::core::store::types::{ModelRunRow, QueryRecord, RawToolField, ToolCallRow};

/// Post-aggregation predicate. `Some(true)` keeps only the models whose
/// corresponding flag is set; `Some(false)` and `None` keep everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryFilter {
    pub has_missing_tools: Option<bool>,
    pub has_unexpected_tools: Option<bool>,
}

impl SummaryFilter {
    pub fn is_empty(&self) -> bool {
        self.has_missing_tools != Some(true) && self.has_unexpected_tools != Some(true)
    }

    pub fn matches(&self, summary: &ModelSummary) -> bool {
        (self.has_missing_tools != Some(true) || summary.has_missing_tools)
            && (self.has_unexpected_tools != Some(true) || summary.has_unexpected_tools)
    }
}

/// A persisted run with its tool-name columns decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRun {
    pub external_id: String,
    pub query_id: Option<String>,
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub total_steps: u64,
    pub total_tool_calls: u64,
    pub tools_used: Vec<String>,
    pub missing_tools: Vec<String>,
    pub unexpected_tools: Vec<String>,
    pub error_message: Option<String>,
    pub tool_calls: Vec<ToolCallRow>,
}

fn decode_field(run_id: &str, column: &str, field: &RawToolField) -> Vec<String> {
    field.decode().unwrap_or_else(|e| {
        warn!("run {}: treating {} as empty: {}", run_id, column, e);
        Vec::new()
    })
}

impl NormalizedRun {
    pub fn from_row(row: ModelRunRow) -> Self {
        let tools_used = decode_field(&row.external_id, "tools_used", &row.tools_used);
        let missing_tools = decode_field(&row.external_id, "missing_tools", &row.missing_tools);
        let unexpected_tools = decode_field(&row.external_id, "unexpected_tools", &row.unexpected_tools);
        Self {
            external_id: row.external_id,
            query_id: row.query_id,
            model_id: row.model_id,
            timestamp: row.timestamp,
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            total_tokens: row.total_tokens,
            total_steps: row.total_steps,
            total_tool_calls: row.total_tool_calls,
            tools_used,
            missing_tools,
            unexpected_tools,
            error_message: row.error_message,
            tool_calls: row.tool_calls,
        }
    }

    pub fn is_fully_correct(&self) -> bool {
        self.missing_tools.is_empty() && self.unexpected_tools.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub count: usize,
    pub total_tokens: u64,
    pub total_tool_calls: u64,
    pub has_missing_tools: bool,
    pub has_unexpected_tools: bool,
    pub all_missing_tools: BTreeSet<String>,
    pub all_unexpected_tools: BTreeSet<String>,
    pub tool_accuracy: Option<f64>,
    /// Ordered by `(timestamp, external_id)`.
    pub runs: Vec<NormalizedRun>,
    #[serde(skip)]
    correct: usize,
}

impl ModelSummary {
    fn empty() -> Self {
        Self {
            count: 0,
            total_tokens: 0,
            total_tool_calls: 0,
            has_missing_tools: false,
            has_unexpected_tools: false,
            all_missing_tools: BTreeSet::new(),
            all_unexpected_tools: BTreeSet::new(),
            tool_accuracy: None,
            runs: Vec::new(),
            correct: 0,
        }
    }

    fn absorb(&mut self, run: NormalizedRun) {
        self.count += 1;
        self.total_tokens += run.total_tokens;
        self.total_tool_calls += run.total_tool_calls;
        if !run.missing_tools.is_empty() {
            self.has_missing_tools = true;
            self.all_missing_tools.extend(run.missing_tools.iter().cloned());
        }
        if !run.unexpected_tools.is_empty() {
            self.has_unexpected_tools = true;
            self.all_unexpected_tools.extend(run.unexpected_tools.iter().cloned());
        }
        if run.is_fully_correct() {
            self.correct += 1;
        }
        self.runs.push(run);
    }

    fn finish(&mut self) {
        self.tool_accuracy = tool_accuracy(self.correct, self.count);
        self.runs
            .sort_by(|a, b| (a.timestamp, &a.external_id).cmp(&(b.timestamp, &b.external_id)));
    }

    /// Runs with neither missing nor unexpected tools.
    pub fn correct_runs(&self) -> usize {
        self.correct
    }
}

/// Percentage of fully correct runs, `None` when there are no runs.
pub fn tool_accuracy(correct: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| 100.0 * correct as f64 / total as f64)
}

/// Group runs by model id. The result does not depend on input order.
pub fn summarize_runs(runs: impl IntoIterator<Item = NormalizedRun>) -> BTreeMap<String, ModelSummary> {
    let mut by_model: BTreeMap<String, ModelSummary> = BTreeMap::new();
    for run in runs {
        by_model
            .entry(run.model_id.clone())
            .or_insert_with(ModelSummary::empty)
            .absorb(run);
    }
    for summary in by_model.values_mut() {
        summary.finish();
    }
    by_model
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySummary {
    pub query: QueryRecord,
    pub summary_by_model: BTreeMap<String, ModelSummary>,
}

/// Read-side view over the metrics store.
pub struct SummaryAggregator {
    store: EvalStore,
}

impl SummaryAggregator {
    pub fn new(store: EvalStore) -> Self {
        Self { store }
    }

    pub async fn get_model_summary_for_query(
        &self,
        query_id: &str,
        filter: Option<&SummaryFilter>,
    ) -> HarnessResult<QuerySummary> {
        let query = self
            .store
            .get_query(query_id)
            .await?
            .ok_or_else(|| HarnessError::query_not_found(query_id))?;

        let rows = self.store.list_by_query(query_id).await?;
        debug!("summarizing {} runs for query {}", rows.len(), query_id);
        let mut summary_by_model = summarize_runs(rows.into_iter().map(NormalizedRun::from_row));

        if let Some(filter) = filter
            && !filter.is_empty()
        {
            summary_by_model.retain(|_, summary| filter.matches(summary));
        }

        Ok(QuerySummary {
            query,
            summary_by_model,
        })
    }
}
