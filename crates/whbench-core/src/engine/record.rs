use crate::model::{round_to, ExecutionRecord, QueryOutcome, QueryStats, FAILED_RESPONSE_TIME_MS};
use chrono::{SecondsFormat, Utc};

/// Columns shared by every record of one run.
#[derive(Debug, Clone)]
pub struct RecordContext {
    pub backend: String,
    pub target: String,
    pub run_type: String,
    pub tag: String,
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl RecordContext {
    fn base(&self, description: &str) -> ExecutionRecord {
        ExecutionRecord {
            description: description.to_string(),
            response_time_ms: FAILED_RESPONSE_TIME_MS,
            query_id: None,
            rows_produced: None,
            stats: None,
            backend: self.backend.clone(),
            target: self.target.clone(),
            run_type: self.run_type.clone(),
            tag: self.tag.clone(),
            executed_at: now_rfc3339(),
            error: None,
        }
    }

    pub fn success(
        &self,
        description: &str,
        response_time_ms: f64,
        outcome: &QueryOutcome,
        stats: Option<QueryStats>,
    ) -> ExecutionRecord {
        let mut rec = self.base(description);
        rec.response_time_ms = round_to(response_time_ms, 2);
        rec.query_id = outcome.query_id.clone();
        rec.rows_produced = stats
            .as_ref()
            .and_then(|s| s.rows_produced)
            .or(outcome.rows);
        rec.stats = stats;
        rec
    }

    pub fn failure(&self, description: &str, error: &anyhow::Error) -> ExecutionRecord {
        let mut rec = self.base(description);
        let msg = format!("{:#}", error);
        rec.error = Some(if msg.trim().is_empty() {
            "query failed".to_string()
        } else {
            msg
        });
        rec
    }
}
