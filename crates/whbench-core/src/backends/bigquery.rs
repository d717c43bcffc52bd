//! BigQuery through the v2 REST API.
//!
//! `jobs.query` runs the statement with the query cache disabled; long jobs
//! are followed with `jobs.getQueryResults`. Statistics come from
//! `jobs.get` and stay unresolved until the job reports `DONE`.

use super::http::{self, STATUS_POLL_INTERVAL};
use super::{preview_row, Backend, RunContext};
use crate::config::{BigQueryAuth, BigQueryConfig, Secret};
use crate::model::{QueryOutcome, QueryStats};
use anyhow::Context;
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde_json::{json, Value};

const API: &str = "https://bigquery.googleapis.com/bigquery/v2";
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/bigquery"];
const WAIT_TIMEOUT_MS: u64 = 10_000;

/// Where bearer tokens come from. A service account refreshes its token
/// before expiry, so long batches keep authenticating.
enum TokenSource {
    Static(Secret),
    ServiceAccount(CustomServiceAccount),
}

impl TokenSource {
    fn from_auth(auth: &BigQueryAuth) -> anyhow::Result<Self> {
        match auth {
            BigQueryAuth::AccessToken(t) => Ok(TokenSource::Static(t.clone())),
            BigQueryAuth::ServiceAccountFile(path) => CustomServiceAccount::from_file(path)
                .map(TokenSource::ServiceAccount)
                .with_context(|| format!("failed to load service account key {}", path.display())),
        }
    }

    async fn bearer(&self) -> anyhow::Result<String> {
        match self {
            TokenSource::Static(t) => Ok(t.expose().to_string()),
            TokenSource::ServiceAccount(sa) => {
                let token = sa.token(SCOPES).await.context("failed to obtain bigquery access token")?;
                Ok(token.as_str().to_string())
            }
        }
    }
}

pub struct BigQueryBackend {
    cfg: BigQueryConfig,
    label: String,
    api: String,
    tokens: TokenSource,
    client: reqwest::Client,
    location: Option<String>,
}

/// Label values are kept to lowercase letters, digits and `_`, 63 chars max.
pub fn sanitize_label(tag: &str) -> String {
    tag.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .take(63)
        .collect()
}

impl BigQueryBackend {
    pub async fn connect(cfg: &BigQueryConfig, ctx: &RunContext) -> anyhow::Result<Self> {
        Self::connect_at(cfg, ctx, API).await
    }

    /// Connects against an explicit API root (everything before `/projects`).
    pub async fn connect_at(
        cfg: &BigQueryConfig,
        ctx: &RunContext,
        api: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let backend = Self {
            cfg: cfg.clone(),
            label: sanitize_label(&ctx.query_tag),
            api: api.into().trim_end_matches('/').to_string(),
            tokens: TokenSource::from_auth(&cfg.auth)?,
            client: http::client()?,
            location: cfg.location.clone(),
        };
        // Fails fast on bad credentials or an unknown project/dataset.
        let url = format!(
            "{}/projects/{}/datasets/{}",
            backend.api, backend.cfg.project_id, backend.cfg.dataset
        );
        backend.get(url, &[]).await?;
        tracing::info!(project = %backend.cfg.project_id, dataset = %backend.cfg.dataset, "connected to bigquery");
        Ok(backend)
    }

    fn query_body(&self, sql: &str) -> Value {
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "useQueryCache": false,
            "timeoutMs": WAIT_TIMEOUT_MS,
            "maxResults": 1,
        });
        if !self.label.is_empty() {
            body["labels"] = json!({ "query_tag": self.label });
        }
        if let Some(loc) = &self.location {
            body["location"] = json!(loc);
        }
        body
    }

    fn location_query(&self) -> Vec<(&'static str, String)> {
        self.location
            .iter()
            .map(|loc| ("location", loc.clone()))
            .collect()
    }

    async fn get(&self, url: String, query: &[(&str, String)]) -> anyhow::Result<Value> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.tokens.bearer().await?)
            .query(query)
            .send()
            .await?;
        Ok(http::read_json(resp, "bigquery").await?.1)
    }

    async fn get_job(&self, id: &str) -> anyhow::Result<Value> {
        let url = format!("{}/projects/{}/jobs/{}", self.api, self.cfg.project_id, id);
        self.get(url, &self.location_query()).await
    }
}

fn job_id(body: &Value) -> Option<String> {
    body.pointer("/jobReference/jobId")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn outcome_from(body: &Value) -> QueryOutcome {
    let first_row = body
        .pointer("/rows/0/f")
        .and_then(Value::as_array)
        .map(|cells| preview_row(cells.iter().map(|c| c.get("v").and_then(http::cell_text))));
    QueryOutcome {
        query_id: job_id(body),
        rows: http::as_u64(body.get("totalRows")),
        first_row,
    }
}

/// A finished job's statistics; `None` while it is still pending or running.
pub(crate) fn stats_from_job(job: &Value) -> Option<QueryStats> {
    if job.pointer("/status/state").and_then(Value::as_str) != Some("DONE") {
        return None;
    }
    let stats = job.get("statistics")?;
    let started = http::as_f64(stats.get("startTime"));
    let ended = http::as_f64(stats.get("endTime"));
    let mut out = QueryStats {
        official_time_ms: started.zip(ended).map(|(s, e)| e - s),
        bytes_scanned: http::as_u64(stats.get("totalBytesProcessed")),
        ..Default::default()
    };
    if let Some(slot_ms) = http::as_u64(stats.pointer("/query/totalSlotMs")) {
        out.extra.insert("total_slot_ms".into(), json!(slot_ms));
    }
    if let Some(billed) = http::as_u64(stats.pointer("/query/totalBytesBilled")) {
        out.extra.insert("bytes_billed".into(), json!(billed));
    }
    if let Some(hit) = stats.pointer("/query/cacheHit").and_then(Value::as_bool) {
        out.extra.insert("cache_hit".into(), json!(hit));
    }
    Some(out)
}

#[async_trait]
impl Backend for BigQueryBackend {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn target(&self) -> String {
        format!("{}.{}", self.cfg.project_id, self.cfg.dataset)
    }

    async fn execute(&mut self, sql: &str) -> anyhow::Result<QueryOutcome> {
        let url = format!("{}/projects/{}/queries", self.api, self.cfg.project_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.tokens.bearer().await?)
            .json(&self.query_body(sql))
            .send()
            .await?;
        let (_, mut body) = http::read_json(resp, "bigquery").await?;

        if let Some(loc) = body.pointer("/jobReference/location").and_then(Value::as_str) {
            self.location = Some(loc.to_string());
        }

        while body.get("jobComplete").and_then(Value::as_bool) == Some(false) {
            let id = job_id(&body).ok_or_else(|| anyhow::anyhow!("bigquery: pending job without id"))?;
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
            let mut q = vec![
                ("timeoutMs", WAIT_TIMEOUT_MS.to_string()),
                ("maxResults", "1".to_string()),
            ];
            q.extend(self.location_query());
            body = self.get(format!("{}/{}", url, id), &q).await?;
        }

        // `errors` may hold warnings only; the job status is authoritative.
        let reported = body
            .get("errors")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        if reported > 0 {
            if let Some(id) = job_id(&body) {
                let job = self.get_job(&id).await?;
                if let Some(err) = job.pointer("/status/errorResult") {
                    anyhow::bail!("bigquery: {}", http::error_message(err));
                }
            }
            tracing::warn!(count = reported, "bigquery job finished with warnings");
        }
        Ok(outcome_from(&body))
    }

    fn supports_stats(&self) -> bool {
        true
    }

    async fn fetch_stats(&mut self, outcome: &QueryOutcome) -> anyhow::Result<Option<QueryStats>> {
        let Some(id) = outcome.query_id.as_deref() else {
            return Ok(None);
        };
        let job = self.get_job(id).await?;
        Ok(stats_from_job(&job))
    }
}
