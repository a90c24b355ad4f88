use chrono::{TimeZone, Utc};
use std::sync::Arc;

use super::{Script, ScriptedGateway, names, runner};
use crate::core::error::HarnessError;
use crate::core::harness::summary::{NormalizedRun, SummaryAggregator, SummaryFilter, summarize_runs, tool_accuracy};
use crate::core::store::test_eval_store;
use crate::core::store::types::{ModelRunRow, QueryCategory, RawToolField};

fn row(id: &str, model: &str, secs: i64, missing: RawToolField, unexpected: RawToolField) -> ModelRunRow {
    ModelRunRow {
        external_id: id.to_string(),
        query_id: Some("q".to_string()),
        model_id: model.to_string(),
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        prompt_tokens: 7,
        completion_tokens: 3,
        total_tokens: 10,
        total_steps: 1,
        total_tool_calls: 1,
        tools_used: RawToolField::Absent,
        missing_tools: missing,
        unexpected_tools: unexpected,
        error_message: None,
        tool_calls: Vec::new(),
    }
}

fn structured(list: &[&str]) -> RawToolField {
    RawToolField::Structured(names(list))
}

fn sample_runs() -> Vec<NormalizedRun> {
    vec![
        row("r1", "alpha", 1, RawToolField::Absent, RawToolField::Absent),
        row("r2", "alpha", 2, structured(&["weather"]), RawToolField::Absent),
        row("r3", "beta", 3, RawToolField::Absent, structured(&["currency"])),
        row("r4", "alpha", 4, RawToolField::Absent, RawToolField::Absent),
        row("r5", "gamma", 5, RawToolField::Absent, RawToolField::Absent),
        row("r6", "beta", 6, structured(&["weather"]), structured(&["news", "currency"])),
    ]
    .into_iter()
    .map(NormalizedRun::from_row)
    .collect()
}

#[test]
fn accuracy_is_null_without_runs() {
    assert_eq!(tool_accuracy(0, 0), None);
    assert_eq!(tool_accuracy(2, 3), Some(100.0 * 2.0 / 3.0));
    assert_eq!(tool_accuracy(3, 3), Some(100.0));
}

#[test]
fn groups_and_totals_by_model() {
    let summary = summarize_runs(sample_runs());
    let keys: Vec<&str> = summary.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["alpha", "beta", "gamma"]);

    let alpha = &summary["alpha"];
    assert_eq!(alpha.count, 3);
    assert_eq!(alpha.total_tokens, 30);
    assert_eq!(alpha.total_tool_calls, 3);
    assert!(alpha.has_missing_tools);
    assert!(!alpha.has_unexpected_tools);
    assert_eq!(alpha.correct_runs(), 2);
    assert_eq!(alpha.tool_accuracy, Some(100.0 * 2.0 / 3.0));

    let beta = &summary["beta"];
    assert_eq!(beta.tool_accuracy, Some(0.0));
    assert_eq!(
        beta.all_unexpected_tools.iter().collect::<Vec<_>>(),
        vec!["currency", "news"]
    );
    assert_eq!(summary["gamma"].tool_accuracy, Some(100.0));
}

#[test]
fn aggregation_ignores_read_order() {
    let forward = summarize_runs(sample_runs());
    let mut reversed_input = sample_runs();
    reversed_input.reverse();
    let mut rotated_input = sample_runs();
    rotated_input.rotate_left(2);

    assert_eq!(forward, summarize_runs(reversed_input));
    assert_eq!(forward, summarize_runs(rotated_input));
    let ids: Vec<&str> = forward["alpha"].runs.iter().map(|r| r.external_id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r4"]);
}

fn filter(missing: Option<bool>, unexpected: Option<bool>) -> SummaryFilter {
    SummaryFilter {
        has_missing_tools: missing,
        has_unexpected_tools: unexpected,
    }
}

fn kept_models(filter: SummaryFilter) -> Vec<String> {
    summarize_runs(sample_runs())
        .into_iter()
        .filter(|(_, s)| filter.matches(s))
        .map(|(model, _)| model)
        .collect()
}

#[test]
fn true_flags_keep_only_flagged_models() {
    let full = summarize_runs(sample_runs());
    assert!(full["alpha"].has_missing_tools && full["beta"].has_missing_tools);
    assert!(!full["gamma"].has_missing_tools);

    assert_eq!(kept_models(filter(Some(true), None)), vec!["alpha", "beta"]);
    let unexpected: Vec<String> = full
        .iter()
        .filter(|(_, s)| s.has_unexpected_tools)
        .map(|(m, _)| m.clone())
        .collect();
    assert_eq!(kept_models(filter(None, Some(true))), unexpected);
    let both: Vec<String> = full
        .iter()
        .filter(|(_, s)| s.has_missing_tools && s.has_unexpected_tools)
        .map(|(m, _)| m.clone())
        .collect();
    assert_eq!(kept_models(filter(Some(true), Some(true))), both);
}

#[test]
fn false_flags_impose_no_constraint() {
    let all = vec!["alpha", "beta", "gamma"];
    assert_eq!(kept_models(filter(Some(false), None)), all);
    assert_eq!(kept_models(filter(None, Some(false))), all);
    assert_eq!(kept_models(filter(Some(false), Some(false))), all);
    assert_eq!(kept_models(SummaryFilter::default()), all);

    assert!(SummaryFilter::default().is_empty());
    assert!(filter(Some(false), Some(false)).is_empty());
    assert!(!filter(Some(true), Some(false)).is_empty());
}

#[test]
fn legacy_encodings_normalize_identically() {
    let double_encoded = RawToolField::classify(r#""[\"weather\"]""#);
    let runs = vec![
        row("r1", "m", 1, structured(&["weather"]), RawToolField::Absent),
        row("r2", "m", 2, double_encoded, RawToolField::Absent),
    ];
    let normalized: Vec<NormalizedRun> = runs.into_iter().map(NormalizedRun::from_row).collect();
    assert_eq!(normalized[0].missing_tools, normalized[1].missing_tools);

    let summary = summarize_runs(normalized);
    assert_eq!(summary["m"].all_missing_tools.len(), 1);
    assert_eq!(summary["m"].tool_accuracy, Some(0.0));
}

#[test]
fn undecodable_field_counts_as_empty() {
    let broken = RawToolField::Serialized("{oops".to_string());
    let run = NormalizedRun::from_row(row("r1", "m", 1, broken, RawToolField::Absent));
    assert!(run.missing_tools.is_empty());
    assert!(run.is_fully_correct());
}

#[tokio::test]
async fn summary_of_query_without_runs_is_empty() {
    let store = test_eval_store();
    let q = store
        .create_query("Weather?", &names(&["weather"]), QueryCategory::Simple)
        .await
        .unwrap();
    let summary = SummaryAggregator::new(store)
        .get_model_summary_for_query(&q.id, None)
        .await
        .unwrap();
    assert_eq!(summary.query.id, q.id);
    assert!(summary.summary_by_model.is_empty());
}

#[tokio::test]
async fn summary_of_unknown_query_is_not_found() {
    let store = test_eval_store();
    let err = SummaryAggregator::new(store)
        .get_model_summary_for_query("ghost", None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::NotFound(_)));
}

#[tokio::test]
async fn stored_runs_summarize_and_filter() {
    let store = test_eval_store();
    let q = store
        .create_query("Weather in Lima?", &names(&["weather"]), QueryCategory::Obvious)
        .await
        .unwrap();
    let gateway = Arc::new(
        ScriptedGateway::new()
            .script("A", Script::Tools(vec!["weather"]))
            .script("B", Script::Tools(vec!["currency"])),
    );
    let runner = runner(&store, &["A", "B"], gateway);
    runner.run_test_for_query(&q.id).await.unwrap();
    runner.run_test_for_query(&q.id).await.unwrap();

    let aggregator = SummaryAggregator::new(store.clone());
    let full = aggregator.get_model_summary_for_query(&q.id, None).await.unwrap();
    assert_eq!(full.summary_by_model["A"].count, 2);
    assert_eq!(full.summary_by_model["A"].total_tokens, 30);
    assert_eq!(full.summary_by_model["B"].runs[0].tool_calls.len(), 1);

    let filter = SummaryFilter {
        has_missing_tools: None,
        has_unexpected_tools: Some(true),
    };
    let filtered = aggregator
        .get_model_summary_for_query(&q.id, Some(&filter))
        .await
        .unwrap();
    let keys: Vec<&str> = filtered.summary_by_model.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["B"]);
    assert_eq!(filtered.summary_by_model["B"], full.summary_by_model["B"]);

    let v = serde_json::to_value(&filtered).unwrap();
    assert_eq!(v["summaryByModel"]["B"]["toolAccuracy"], 0.0);
    assert_eq!(v["summaryByModel"]["B"]["allMissingTools"][0], "weather");
    assert!(v["summaryByModel"]["B"].get("correct").is_none());

    let no_constraint = SummaryFilter {
        has_missing_tools: Some(false),
        has_unexpected_tools: Some(false),
    };
    let unfiltered = aggregator
        .get_model_summary_for_query(&q.id, Some(&no_constraint))
        .await
        .unwrap();
    assert_eq!(unfiltered.summary_by_model, full.summary_by_model);
}

#[tokio::test]
async fn legacy_rows_in_the_database_are_read() {
    let store = test_eval_store();
    let q = store
        .create_query("Weather?", &names(&["weather"]), QueryCategory::Simple)
        .await
        .unwrap();
    store
        .execute_raw(&format!(
            "INSERT INTO ai_requests (external_id, query_id, model_id, timestamp, total_tokens, missing_tools)
             VALUES ('legacy-1', '{id}', 'old-model', 5, 12, NULL);
             INSERT INTO ai_requests (external_id, query_id, model_id, timestamp, total_tokens, missing_tools)
             VALUES ('legacy-2', '{id}', 'old-model', 6, 8, '\"[\\\"weather\\\"]\"');",
            id = q.id
        ))
        .await
        .unwrap();

    let summary = SummaryAggregator::new(store)
        .get_model_summary_for_query(&q.id, None)
        .await
        .unwrap();
    let old = &summary.summary_by_model["old-model"];
    assert_eq!(old.count, 2);
    assert_eq!(old.total_tokens, 20);
    assert!(old.has_missing_tools);
    assert_eq!(old.tool_accuracy, Some(50.0));
}
