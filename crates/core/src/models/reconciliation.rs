use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a reconciliation sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Running,
    Completed,
    Failed,
}

/// A record of a single whole-population reconciliation sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRun {
    pub id: i64,
    pub status: ReconciliationStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub students_attempted: i64,
    pub refreshed: i64,
    pub credential_failures: i64,
    pub transient_failures: i64,
    pub skipped: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
