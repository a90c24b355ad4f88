use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use super::EvalStore;
use super::types::{QueryCategory, QueryRecord};
use crate::core::error::{HarnessError, HarnessResult};

type RawQuery = (String, String, String, String, String);

fn decode_query((id, prompt, expected, category, created_at): RawQuery) -> HarnessResult<QueryRecord> {
    let expected_tools: Vec<String> = serde_json::from_str(&expected)?;
    let category = QueryCategory::parse(&category).ok_or_else(|| {
        HarnessError::Store(format!("query {} has unknown category '{}'", id, category))
    })?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| HarnessError::Store(format!("query {} has bad created_at: {}", id, e)))?;
    Ok(QueryRecord {
        id,
        prompt,
        expected_tools,
        category,
        created_at,
    })
}

/// Trim, drop blanks and repeated names, keep first-seen order.
fn normalize_tools(tools: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tool in tools.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|t| t == tool) {
            out.push(tool.to_string());
        }
    }
    out
}

impl EvalStore {
    pub async fn create_query(
        &self,
        prompt: &str,
        expected_tools: &[String],
        category: QueryCategory,
    ) -> HarnessResult<QueryRecord> {
        if prompt.trim().is_empty() {
            return Err(HarnessError::Validation("prompt must not be empty".to_string()));
        }
        let record = QueryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.to_string(),
            expected_tools: normalize_tools(expected_tools),
            category,
            created_at: Utc::now(),
        };

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO queries (id, prompt, expected_tools, category, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.prompt,
                serde_json::to_string(&record.expected_tools)?,
                record.category.as_str(),
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(record)
    }

    pub async fn get_query(&self, id: &str) -> HarnessResult<Option<QueryRecord>> {
        let raw: Option<RawQuery> = {
            let db = self.db.lock().await;
            db.query_row(
                "SELECT id, prompt, expected_tools, category, created_at FROM queries WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?
        };
        raw.map(decode_query).transpose()
    }

    pub async fn list_queries(&self) -> HarnessResult<Vec<QueryRecord>> {
        let raw: Vec<RawQuery> = {
            let db = self.db.lock().await;
            let mut stmt = db.prepare(
                "SELECT id, prompt, expected_tools, category, created_at FROM queries ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            results
        };
        raw.into_iter().map(decode_query).collect()
    }
}
