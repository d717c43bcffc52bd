//! Snowflake through the SQL API v2.
//!
//! Every statement carries the run's `QUERY_TAG` and disables the result
//! cache. Statistics come from `INFORMATION_SCHEMA.QUERY_HISTORY()`, which
//! lags a little behind statement completion.

use super::http::{self, STATUS_POLL_INTERVAL};
use super::{is_safe_id, preview_row, Backend, RunContext};
use crate::config::SnowflakeConfig;
use crate::model::{QueryOutcome, QueryStats};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

const STATEMENT_TIMEOUT_SECS: u64 = 3600;

pub struct SnowflakeBackend {
    cfg: SnowflakeConfig,
    query_tag: String,
    base_url: String,
    client: reqwest::Client,
}

impl SnowflakeBackend {
    pub async fn connect(cfg: &SnowflakeConfig, ctx: &RunContext) -> anyhow::Result<Self> {
        let base_url = format!("https://{}.snowflakecomputing.com", cfg.account);
        Self::connect_at(cfg, ctx, base_url).await
    }

    /// Connects against an explicit API root instead of the account URL.
    pub async fn connect_at(
        cfg: &SnowflakeConfig,
        ctx: &RunContext,
        base_url: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let backend = Self {
            cfg: cfg.clone(),
            query_tag: ctx.query_tag.clone(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::client()?,
        };
        // The SQL API is stateless; a trivial statement validates account and token.
        backend.submit("SELECT CURRENT_VERSION()").await?;
        tracing::info!(account = %backend.cfg.account, warehouse = %backend.cfg.warehouse, "connected to snowflake");
        Ok(backend)
    }

    fn statement_body(&self, sql: &str) -> Value {
        let mut body = json!({
            "statement": sql,
            "timeout": STATEMENT_TIMEOUT_SECS,
            "warehouse": self.cfg.warehouse,
            "database": self.cfg.database,
            "schema": self.cfg.schema,
            "parameters": {
                "QUERY_TAG": self.query_tag,
                "USE_CACHED_RESULT": "false",
            }
        });
        if let Some(role) = &self.cfg.role {
            body["role"] = json!(role);
        }
        body
    }

    fn request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(self.cfg.token.expose())
            .header("X-Snowflake-Authorization-Token-Type", &self.cfg.token_type)
            .header("Accept", "application/json")
    }

    /// Submits a statement and waits for it to finish. Returns the final result page.
    async fn submit(&self, sql: &str) -> anyhow::Result<Value> {
        let url = format!("{}/api/v2/statements", self.base_url);
        let resp = self
            .request(self.client.post(&url))
            .json(&self.statement_body(sql))
            .send()
            .await?;
        let (mut status, mut body) = http::read_json(resp, "snowflake").await?;

        while status == StatusCode::ACCEPTED {
            let handle = body
                .get("statementHandle")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("snowflake: running statement without a handle"))?
                .to_string();
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
            let resp = self
                .request(self.client.get(format!("{}/{}", url, handle)))
                .send()
                .await?;
            (status, body) = http::read_json(resp, "snowflake").await?;
        }
        Ok(body)
    }
}

fn outcome_from(body: &Value) -> QueryOutcome {
    let first_row = body
        .pointer("/data/0")
        .and_then(Value::as_array)
        .map(|cells| preview_row(cells.iter().map(http::cell_text)));
    QueryOutcome {
        query_id: body
            .get("statementHandle")
            .and_then(Value::as_str)
            .map(str::to_string),
        rows: http::as_u64(body.pointer("/resultSetMetaData/numRows")),
        first_row,
    }
}

/// Maps a `QUERY_HISTORY` row `[id, elapsed_ms, bytes, rows, credits]`.
pub(crate) fn stats_from_history(body: &Value) -> Option<QueryStats> {
    let row = body.pointer("/data/0")?.as_array()?;
    Some(QueryStats {
        official_time_ms: http::as_f64(row.get(1)),
        bytes_scanned: http::as_u64(row.get(2)),
        rows_produced: http::as_u64(row.get(3)),
        credits_used: http::as_f64(row.get(4)),
        ..Default::default()
    })
}

#[async_trait]
impl Backend for SnowflakeBackend {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn target(&self) -> String {
        self.cfg.warehouse.clone()
    }

    async fn execute(&mut self, sql: &str) -> anyhow::Result<QueryOutcome> {
        let body = self.submit(sql).await?;
        Ok(outcome_from(&body))
    }

    fn supports_stats(&self) -> bool {
        true
    }

    async fn fetch_stats(&mut self, outcome: &QueryOutcome) -> anyhow::Result<Option<QueryStats>> {
        let Some(id) = outcome.query_id.as_deref().filter(|id| is_safe_id(id)) else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT QUERY_ID, TOTAL_ELAPSED_TIME, BYTES_SCANNED, ROWS_PRODUCED, CREDITS_USED_CLOUD_SERVICES \
             FROM TABLE({}.INFORMATION_SCHEMA.QUERY_HISTORY()) WHERE QUERY_ID = '{}'",
            self.cfg.database, id
        );
        let body = self.submit(&sql).await?;
        Ok(stats_from_history(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_result_page() {
        let body = json!({
            "statementHandle": "01b2-abc",
            "resultSetMetaData": {"numRows": 3},
            "data": [["42", null], ["1", "2"]]
        });
        let o = outcome_from(&body);
        assert_eq!(o.query_id.as_deref(), Some("01b2-abc"));
        assert_eq!(o.rows, Some(3));
        assert_eq!(o.first_row.as_deref(), Some("(42, NULL)"));
    }

    #[test]
    fn test_stats_from_history_row() {
        let body = json!({"data": [["01b2-abc", "1530", "2097152", "10", "0.000041"]]});
        let s = stats_from_history(&body).unwrap();
        assert_eq!(s.official_time_ms, Some(1530.0));
        assert_eq!(s.mb_scanned(), Some(2.0));
        assert_eq!(s.rows_produced, Some(10));
        assert_eq!(s.credits_used, Some(0.000041));

        assert!(stats_from_history(&json!({"data": []})).is_none());
    }
}
