/// Error type for the evaluation harness.
///
/// `Validation` and `Gateway` are per-model failures: the runner folds them
/// into a result entry and moves on. `NotFound` and `Store` leave the batch.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Gateway(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl HarnessError {
    pub fn query_not_found(query_id: &str) -> Self {
        HarnessError::NotFound(format!("Query with id {} not found", query_id))
    }

    /// Failures that abort `run_test_for_query` instead of becoming a
    /// per-model entry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::NotFound(_) | HarnessError::Store(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::NotFound(_) => "not_found",
            HarnessError::Validation(_) => "validation",
            HarnessError::Gateway(_) => "gateway",
            HarnessError::Store(_) => "store",
        }
    }
}

impl From<rusqlite::Error> for HarnessError {
    fn from(e: rusqlite::Error) -> Self {
        HarnessError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(e: serde_json::Error) -> Self {
        HarnessError::Store(format!("serialization failed: {}", e))
    }
}

impl From<reqwest::Error> for HarnessError {
    fn from(e: reqwest::Error) -> Self {
        HarnessError::Gateway(e.to_string())
    }
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
