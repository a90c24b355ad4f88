use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::core::llm::Usage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Simple,
    Complex,
    Verbose,
    Obvious,
    Ambiguous,
}

impl QueryCategory {
    pub const ALL: [QueryCategory; 5] = [
        QueryCategory::Simple,
        QueryCategory::Complex,
        QueryCategory::Verbose,
        QueryCategory::Obvious,
        QueryCategory::Ambiguous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::Simple => "simple",
            QueryCategory::Complex => "complex",
            QueryCategory::Verbose => "verbose",
            QueryCategory::Obvious => "obvious",
            QueryCategory::Ambiguous => "ambiguous",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored evaluation prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub id: String,
    pub prompt: String,
    pub expected_tools: Vec<String>,
    pub category: QueryCategory,
    pub created_at: DateTime<Utc>,
}

/// A tool-name list column as it was found on disk.
///
/// Current rows hold a JSON array. Older rows hold the array encoded a
/// second time as a JSON string, or nothing at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawToolField {
    Absent,
    Serialized(String),
    Structured(Vec<String>),
}

impl RawToolField {
    pub fn classify(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return RawToolField::Absent;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Null) => RawToolField::Absent,
            Ok(Value::String(inner)) => RawToolField::Serialized(inner),
            Ok(Value::Array(items)) if items.iter().all(Value::is_string) => {
                RawToolField::Structured(
                    items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                )
            }
            _ => RawToolField::Serialized(trimmed.to_string()),
        }
    }

    /// Decode to a list of distinct names, first occurrence wins.
    pub fn decode(&self) -> Result<Vec<String>, String> {
        let names = match self {
            RawToolField::Absent => Vec::new(),
            RawToolField::Structured(names) => names.clone(),
            RawToolField::Serialized(text) if text.trim().is_empty() => Vec::new(),
            RawToolField::Serialized(text) => serde_json::from_str::<Vec<String>>(text)
                .map_err(|e| format!("undecodable tool list {:?}: {}", text, e))?,
        };
        let mut out: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Ok(out)
    }
}

impl FromSql for RawToolField {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(RawToolField::Absent),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                Ok(RawToolField::classify(text))
            }
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl Serialize for RawToolField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.decode() {
            Ok(names) => names.serialize(serializer),
            Err(_) => match self {
                RawToolField::Serialized(text) => serializer.serialize_str(text),
                _ => serializer.serialize_none(),
            },
        }
    }
}

/// One `tool_calls` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRow {
    pub request_id: String,
    pub tool_name: String,
    pub tool_call_id: String,
    pub args: Value,
    pub result: Value,
    pub error_message: Option<String>,
}

/// One `ai_requests` row, tool-name columns left undecoded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRunRow {
    pub external_id: String,
    pub query_id: Option<String>,
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub total_steps: u64,
    pub total_tool_calls: u64,
    pub tools_used: RawToolField,
    pub missing_tools: RawToolField,
    pub unexpected_tools: RawToolField,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRow>,
}

/// A run about to be appended to `ai_requests`.
#[derive(Debug, Clone)]
pub struct NewModelRun {
    pub external_id: String,
    pub query_id: Option<String>,
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
    pub usage: Usage,
    pub total_steps: u64,
    pub total_tool_calls: u64,
    pub tools_used: Vec<String>,
    pub missing_tools: Vec<String>,
    pub unexpected_tools: Vec<String>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(QueryCategory::parse("Obvious"), Some(QueryCategory::Obvious));
        assert_eq!(QueryCategory::parse(" simple "), Some(QueryCategory::Simple));
        assert_eq!(QueryCategory::parse("weird"), None);
    }

    #[test]
    fn classify_recognizes_each_encoding() {
        assert_eq!(RawToolField::classify(""), RawToolField::Absent);
        assert_eq!(RawToolField::classify("null"), RawToolField::Absent);
        assert_eq!(
            RawToolField::classify(r#"["weather","currency"]"#),
            RawToolField::Structured(vec!["weather".into(), "currency".into()])
        );
        assert_eq!(
            RawToolField::classify(r#""[\"weather\"]""#),
            RawToolField::Serialized(r#"["weather"]"#.into())
        );
    }

    #[test]
    fn both_encodings_decode_to_the_same_names() {
        let structured = RawToolField::classify(r#"["weather"]"#).decode().unwrap();
        let serialized = RawToolField::classify(r#""[\"weather\"]""#).decode().unwrap();
        assert_eq!(structured, serialized);
        assert_eq!(structured, vec!["weather".to_string()]);
    }

    #[test]
    fn decode_drops_duplicates_and_rejects_garbage() {
        let field = RawToolField::Structured(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(field.decode().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert!(RawToolField::classify("{not json").decode().is_err());
        assert!(RawToolField::Serialized("  ".into()).decode().unwrap().is_empty());
    }
}
