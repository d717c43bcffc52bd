//! Databricks SQL warehouses through the Statement Execution API.

use super::http::{self, STATUS_POLL_INTERVAL};
use super::{preview_row, Backend, RunContext};
use crate::config::DatabricksConfig;
use crate::model::{QueryOutcome, QueryStats};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct DatabricksBackend {
    cfg: DatabricksConfig,
    warehouse_id: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementState {
    Running,
    Succeeded,
    Failed,
}

fn state_of(body: &Value) -> StatementState {
    match body.pointer("/status/state").and_then(Value::as_str) {
        Some("SUCCEEDED") => StatementState::Succeeded,
        Some("FAILED") | Some("CANCELED") | Some("CLOSED") => StatementState::Failed,
        _ => StatementState::Running,
    }
}

impl DatabricksBackend {
    pub async fn connect(cfg: &DatabricksConfig, _ctx: &RunContext) -> anyhow::Result<Self> {
        let host = cfg
            .server_hostname
            .trim_start_matches("https://")
            .trim_end_matches('/');
        Self::connect_at(cfg, format!("https://{}", host)).await
    }

    /// Connects against an explicit workspace URL.
    pub async fn connect_at(cfg: &DatabricksConfig, base_url: impl Into<String>) -> anyhow::Result<Self> {
        let warehouse_id = cfg
            .warehouse_id()
            .ok_or_else(|| anyhow::anyhow!("http path '{}' does not name a warehouse", cfg.http_path))?
            .to_string();
        let backend = Self {
            cfg: cfg.clone(),
            warehouse_id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::client()?,
        };

        let resp = backend
            .client
            .get(format!("{}/api/2.0/sql/warehouses/{}", backend.base_url, backend.warehouse_id))
            .bearer_auth(backend.cfg.access_token.expose())
            .send()
            .await?;
        let (_, info) = http::read_json(resp, "databricks").await?;
        let state = info
            .get("state")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        tracing::info!(
            url = %backend.base_url,
            warehouse_id = %backend.warehouse_id,
            warehouse_state = state,
            "connected to databricks"
        );
        Ok(backend)
    }

    fn statement_body(&self, sql: &str) -> Value {
        let mut body = json!({
            "statement": sql,
            "warehouse_id": self.warehouse_id,
            "wait_timeout": "30s",
            "on_wait_timeout": "CONTINUE",
            "disposition": "INLINE",
            "format": "JSON_ARRAY",
        });
        if let Some(c) = &self.cfg.catalog {
            body["catalog"] = json!(c);
        }
        if let Some(s) = &self.cfg.schema {
            body["schema"] = json!(s);
        }
        body
    }
}

fn outcome_from(body: &Value) -> QueryOutcome {
    let first_row = body
        .pointer("/result/data_array/0")
        .and_then(Value::as_array)
        .map(|cells| preview_row(cells.iter().map(http::cell_text)));
    QueryOutcome {
        query_id: body
            .get("statement_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        rows: http::as_u64(body.pointer("/manifest/total_row_count")),
        first_row,
    }
}

/// Maps the first entry of a query-history listing, when it has finished.
pub(crate) fn stats_from_history(body: &Value) -> Option<QueryStats> {
    let q = body.pointer("/res/0")?;
    if q.get("status").and_then(Value::as_str) != Some("FINISHED") {
        return None;
    }
    let metrics = q.get("metrics");
    let metric = |k: &str| metrics.and_then(|m| m.get(k));
    let mut out = QueryStats {
        official_time_ms: http::as_f64(metric("total_time_ms")).or_else(|| http::as_f64(q.get("duration"))),
        bytes_scanned: http::as_u64(metric("read_bytes")),
        rows_produced: http::as_u64(metric("rows_produced_count")),
        ..Default::default()
    };
    for key in ["execution_time_ms", "compilation_time_ms", "result_fetch_time_ms"] {
        if let Some(v) = http::as_u64(metric(key)) {
            out.extra.insert(key.to_string(), json!(v));
        }
    }
    if let Some(hit) = metric("result_from_cache").and_then(Value::as_bool) {
        out.extra.insert("result_from_cache".into(), json!(hit));
    }
    Some(out)
}

#[async_trait]
impl Backend for DatabricksBackend {
    fn name(&self) -> &'static str {
        "databricks"
    }

    fn target(&self) -> String {
        self.warehouse_id.clone()
    }

    async fn execute(&mut self, sql: &str) -> anyhow::Result<QueryOutcome> {
        let url = format!("{}/api/2.0/sql/statements", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.cfg.access_token.expose())
            .json(&self.statement_body(sql))
            .send()
            .await?;
        let (_, mut body) = http::read_json(resp, "databricks").await?;

        loop {
            match state_of(&body) {
                StatementState::Succeeded => return Ok(outcome_from(&body)),
                StatementState::Failed => {
                    anyhow::bail!("databricks: {}", http::error_message(&body))
                }
                StatementState::Running => {}
            }
            let id = body
                .get("statement_id")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("databricks: running statement without id"))?
                .to_string();
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
            let resp = self
                .client
                .get(format!("{}/{}", url, id))
                .bearer_auth(self.cfg.access_token.expose())
                .send()
                .await?;
            body = http::read_json(resp, "databricks").await?.1;
        }
    }

    fn supports_stats(&self) -> bool {
        true
    }

    async fn fetch_stats(&mut self, outcome: &QueryOutcome) -> anyhow::Result<Option<QueryStats>> {
        let Some(id) = outcome.query_id.as_deref() else {
            return Ok(None);
        };
        let resp = self
            .client
            .get(format!("{}/api/2.0/sql/history/queries", self.base_url))
            .bearer_auth(self.cfg.access_token.expose())
            .query(&[
                ("filter_by.statement_ids", id),
                ("include_metrics", "true"),
                ("max_results", "1"),
            ])
            .send()
            .await?;
        let (_, body) = http::read_json(resp, "databricks").await?;
        Ok(stats_from_history(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping() {
        assert_eq!(state_of(&json!({"status": {"state": "PENDING"}})), StatementState::Running);
        assert_eq!(state_of(&json!({"status": {"state": "SUCCEEDED"}})), StatementState::Succeeded);
        assert_eq!(state_of(&json!({"status": {"state": "CANCELED"}})), StatementState::Failed);
    }

    #[test]
    fn test_outcome_from_statement() {
        let body = json!({
            "statement_id": "01ef-aa",
            "status": {"state": "SUCCEEDED"},
            "manifest": {"total_row_count": 25},
            "result": {"data_array": [["3", "BUILDING"]]}
        });
        let o = outcome_from(&body);
        assert_eq!(o.query_id.as_deref(), Some("01ef-aa"));
        assert_eq!(o.rows, Some(25));
        assert_eq!(o.first_row.as_deref(), Some("(3, BUILDING)"));
    }

    #[test]
    fn test_stats_from_history() {
        let running = json!({"res": [{"status": "RUNNING"}]});
        assert!(stats_from_history(&running).is_none());

        let done = json!({"res": [{
            "status": "FINISHED",
            "duration": 900,
            "metrics": {"total_time_ms": 812, "read_bytes": 1048576, "rows_produced_count": 4, "execution_time_ms": 700}
        }]});
        let s = stats_from_history(&done).unwrap();
        assert_eq!(s.official_time_ms, Some(812.0));
        assert_eq!(s.mb_scanned(), Some(1.0));
        assert_eq!(s.rows_produced, Some(4));
        assert_eq!(s.extra["execution_time_ms"], json!(700));
    }
}
