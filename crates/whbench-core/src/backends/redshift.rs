//! Amazon Redshift over the PostgreSQL wire protocol.
//!
//! The session disables the result cache and labels itself with the run tag
//! through `query_group`. After each statement `PG_LAST_QUERY_ID()` gives the
//! id used to read `SYS_QUERY_HISTORY`, whose rows appear with some delay.

use super::{is_safe_id, preview_row, Backend, RunContext};
use crate::config::{RedshiftConfig, SslMode};
use crate::model::{QueryOutcome, QueryStats};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, SimpleQueryMessage};

pub struct RedshiftBackend {
    client: Option<Client>,
    connection: Option<JoinHandle<()>>,
    database: String,
}

/// Rows and first-row preview of a simple-query response.
fn summarize(messages: &[SimpleQueryMessage]) -> (u64, Option<String>) {
    let mut rows = 0u64;
    let mut first = None;
    for m in messages {
        if let SimpleQueryMessage::Row(row) = m {
            if first.is_none() {
                first = Some(preview_row((0..row.len()).map(|i| row.get(i))));
            }
            rows += 1;
        }
    }
    (rows, first)
}

fn first_row_cells(messages: &[SimpleQueryMessage]) -> Option<Vec<Option<String>>> {
    messages.iter().find_map(|m| match m {
        SimpleQueryMessage::Row(row) => {
            Some((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect())
        }
        _ => None,
    })
}

/// `SYS_QUERY_HISTORY` reports microseconds.
pub(crate) fn stats_from_history(cells: &[Option<String>]) -> Option<QueryStats> {
    let micros = |i: usize| -> Option<f64> { cells.get(i)?.as_deref()?.trim().parse::<f64>().ok() };
    let execution = micros(1)?;
    let mut out = QueryStats {
        official_time_ms: Some(micros(2).unwrap_or(0.0) / 1000.0),
        rows_produced: cells
            .get(5)
            .and_then(|c| c.as_deref())
            .and_then(|v| v.trim().parse().ok()),
        ..Default::default()
    };
    out.extra.insert("execution_time_ms".into(), json!(execution / 1000.0));
    out.extra
        .insert("queue_time_ms".into(), json!(micros(3).unwrap_or(0.0) / 1000.0));
    out.extra
        .insert("planning_time_ms".into(), json!(micros(4).unwrap_or(0.0) / 1000.0));
    Some(out)
}

fn quote_literal(v: &str) -> String {
    format!("'{}'", v.replace('\'', "''"))
}

impl RedshiftBackend {
    pub async fn connect(cfg: &RedshiftConfig, ctx: &RunContext) -> anyhow::Result<Self> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&cfg.host)
            .port(cfg.port)
            .dbname(&cfg.database)
            .user(&cfg.user)
            .password(cfg.password.expose())
            .application_name("whbench");

        let (client, connection) = match cfg.ssl_mode {
            SslMode::Disable => {
                pg.ssl_mode(tokio_postgres::config::SslMode::Disable);
                let (client, conn) = pg.connect(tokio_postgres::NoTls).await?;
                (client, spawn_connection(conn))
            }
            SslMode::Require => {
                pg.ssl_mode(tokio_postgres::config::SslMode::Require);
                let tls = native_tls::TlsConnector::builder()
                    .build()
                    .context("failed to initialise TLS")?;
                let (client, conn) = pg
                    .connect(postgres_native_tls::MakeTlsConnector::new(tls))
                    .await?;
                (client, spawn_connection(conn))
            }
        };

        let mut setup = vec!["SET enable_result_cache_for_session TO OFF".to_string()];
        if !ctx.query_tag.is_empty() {
            setup.push(format!("SET query_group TO {}", quote_literal(&ctx.query_tag)));
        }
        for stmt in &setup {
            if let Err(e) = client.simple_query(stmt).await {
                tracing::warn!(statement = %stmt, error = %e, "redshift session setup failed");
            }
        }

        tracing::info!(host = %cfg.host, database = %cfg.database, "connected to redshift");
        Ok(Self {
            client: Some(client),
            connection: Some(connection),
            database: cfg.database.clone(),
        })
    }

    fn client(&self) -> anyhow::Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("redshift connection already closed"))
    }
}

fn spawn_connection<S, T>(conn: tokio_postgres::Connection<S, T>) -> JoinHandle<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::warn!(error = %e, "redshift connection terminated");
        }
    })
}

#[async_trait]
impl Backend for RedshiftBackend {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn target(&self) -> String {
        self.database.clone()
    }

    async fn execute(&mut self, sql: &str) -> anyhow::Result<QueryOutcome> {
        let messages = self.client()?.simple_query(sql).await?;
        let (rows, first_row) = summarize(&messages);
        Ok(QueryOutcome {
            query_id: None,
            rows: Some(rows),
            first_row,
        })
    }

    async fn resolve_query_id(&mut self) -> anyhow::Result<Option<String>> {
        let messages = self.client()?.simple_query("SELECT PG_LAST_QUERY_ID()").await?;
        Ok(first_row_cells(&messages)
            .and_then(|cells| cells.into_iter().next().flatten())
            .filter(|id| is_safe_id(id)))
    }

    fn supports_stats(&self) -> bool {
        true
    }

    async fn fetch_stats(&mut self, outcome: &QueryOutcome) -> anyhow::Result<Option<QueryStats>> {
        let Some(id) = outcome.query_id.as_deref().filter(|id| is_safe_id(id)) else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT query_id, execution_time, elapsed_time, queue_time, planning_time, returned_rows \
             FROM SYS_QUERY_HISTORY WHERE query_id = {}",
            quote_literal(id)
        );
        let messages = self.client()?.simple_query(&sql).await?;
        Ok(first_row_cells(&messages).and_then(|cells| stats_from_history(&cells)))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        // Dropping the client ends the connection task.
        drop(self.client.take());
        if let Some(handle) = self.connection.take() {
            handle.await.context("redshift connection task panicked")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(v: &[Option<&str>]) -> Vec<Option<String>> {
        v.iter().map(|c| c.map(str::to_string)).collect()
    }

    #[test]
    fn test_stats_from_history_converts_micros() {
        let row = cells(&[
            Some("123"),
            Some("1500000"),
            Some("1750000"),
            Some("2000"),
            None,
            Some("42"),
        ]);
        let s = stats_from_history(&row).unwrap();
        assert_eq!(s.official_time_ms, Some(1750.0));
        assert_eq!(s.rows_produced, Some(42));
        assert_eq!(s.extra["execution_time_ms"], json!(1500.0));
        assert_eq!(s.extra["queue_time_ms"], json!(2.0));
        assert_eq!(s.extra["planning_time_ms"], json!(0.0));
    }

    #[test]
    fn test_missing_execution_time_is_not_ready() {
        let row = cells(&[Some("123"), None, Some("10"), None, None, None]);
        assert!(stats_from_history(&row).is_none());
    }

    #[test]
    fn test_zero_elapsed_is_unresolved() {
        let row = cells(&[Some("123"), Some("0"), Some("0"), None, None, None]);
        let s = stats_from_history(&row).unwrap();
        assert!(!s.is_resolved());
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }
}
