use crate::config::BackendConfig;
use crate::errors::ConnectionError;
use crate::model::{QueryOutcome, QueryStats};
use async_trait::async_trait;

pub mod bigquery;
pub mod databricks;
pub mod fabric;
pub mod fake;
pub mod redshift;
pub mod snowflake;

mod http;

/// One warehouse client. The runner drives it strictly sequentially.
#[async_trait]
pub trait Backend: Send {
    fn name(&self) -> &'static str;

    /// Compute/database label written into every row (warehouse, database, project).
    fn target(&self) -> String;

    async fn execute(&mut self, sql: &str) -> anyhow::Result<QueryOutcome>;

    /// Looks up the id of the statement just executed when `execute` could not report it.
    async fn resolve_query_id(&mut self) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn supports_stats(&self) -> bool {
        false
    }

    /// A single statistics poll. `Ok(None)` means "not materialized yet".
    async fn fetch_stats(&mut self, _outcome: &QueryOutcome) -> anyhow::Result<Option<QueryStats>> {
        Ok(None)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Session-wide values some backends attach to every statement.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub query_tag: String,
}

pub async fn connect(cfg: &BackendConfig, ctx: &RunContext) -> anyhow::Result<Box<dyn Backend>> {
    let kind = cfg.kind();
    let res: anyhow::Result<Box<dyn Backend>> = match cfg {
        BackendConfig::Redshift(c) => redshift::RedshiftBackend::connect(c, ctx)
            .await
            .map(|b| Box::new(b) as Box<dyn Backend>),
        BackendConfig::Snowflake(c) => snowflake::SnowflakeBackend::connect(c, ctx)
            .await
            .map(|b| Box::new(b) as Box<dyn Backend>),
        BackendConfig::BigQuery(c) => bigquery::BigQueryBackend::connect(c, ctx)
            .await
            .map(|b| Box::new(b) as Box<dyn Backend>),
        BackendConfig::Databricks(c) => databricks::DatabricksBackend::connect(c, ctx)
            .await
            .map(|b| Box::new(b) as Box<dyn Backend>),
        BackendConfig::Fabric(c) => fabric::FabricBackend::connect(c)
            .await
            .map(|b| Box::new(b) as Box<dyn Backend>),
        BackendConfig::Fake(c) => {
            let mut fake = fake::FakeBackend::new();
            if let Some(pat) = &c.fail_on {
                fake = fake.fail_on(pat.clone(), "simulated failure");
            }
            Ok(Box::new(fake))
        }
    };

    res.map_err(|e| {
        anyhow::Error::new(ConnectionError {
            backend: kind.as_str(),
            message: format!("{:#}", e),
        })
    })
}

/// Renders the first row of a result for console preview.
pub(crate) fn preview_row<I, S>(cells: I) -> String
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let parts: Vec<String> = cells
        .into_iter()
        .map(|c| match c {
            Some(v) => v.as_ref().to_string(),
            None => "NULL".to_string(),
        })
        .collect();
    format!("({})", parts.join(", "))
}

/// Only ids made of these characters are ever spliced into follow-up SQL.
pub(crate) fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
