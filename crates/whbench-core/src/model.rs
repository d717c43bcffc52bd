use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel response time written for attempts that failed before timing completed.
pub const FAILED_RESPONSE_TIME_MS: f64 = -1.0;

pub const DEFAULT_RUN_TYPE: &str = "Linear";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub description: String,
    pub sql: String,
}

impl QuerySpec {
    pub fn new(description: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            sql: sql.into(),
        }
    }
}

/// What a backend hands back from a single `execute` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    /// Job id, statement handle or query id, when the backend reports one inline.
    pub query_id: Option<String>,
    pub rows: Option<u64>,
    pub first_row: Option<String>,
}

/// Warehouse-reported statistics for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_scanned: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_produced: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits_used: Option<f64>,
    /// Backend-specific figures (queue time, planning time, slot ms, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl QueryStats {
    /// Statistics count as materialized once the official time is positive.
    pub fn is_resolved(&self) -> bool {
        matches!(self.official_time_ms, Some(t) if t > 0.0)
    }

    pub fn mb_scanned(&self) -> Option<f64> {
        self.bytes_scanned
            .map(|b| round_to(b as f64 / 1024.0 / 1024.0, 4))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub description: String,
    pub response_time_ms: f64,
    pub query_id: Option<String>,
    pub rows_produced: Option<u64>,
    pub stats: Option<QueryStats>,
    pub backend: String,
    pub target: String,
    pub run_type: String,
    pub tag: String,
    pub executed_at: String,
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, rec: &ExecutionRecord) {
        self.attempted += 1;
        if rec.is_failure() {
            self.failed += 1;
        } else {
            self.succeeded += 1;
        }
    }
}

pub fn round_to(v: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (v * factor).round() / factor
}
