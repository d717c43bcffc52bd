//! Microsoft Fabric warehouses (and other SQL Server endpoints) over TDS.
//!
//! No statistics are collected; Fabric exposes them only through delayed
//! `queryinsights` views without a reliable per-statement key.

use super::{preview_row, Backend};
use crate::config::{FabricAuth, FabricConfig};
use crate::model::QueryOutcome;
use async_trait::async_trait;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type TdsClient = Client<Compat<TcpStream>>;

pub struct FabricBackend {
    client: Option<TdsClient>,
    database: String,
}

fn tds_config(cfg: &FabricConfig) -> Config {
    let mut config = Config::new();
    config.host(&cfg.server);
    config.port(cfg.port);
    config.database(&cfg.database);
    config.encryption(EncryptionLevel::Required);
    config.application_name("whbench");
    match &cfg.auth {
        FabricAuth::SqlLogin { username, password } => {
            config.authentication(AuthMethod::sql_server(username, password.expose()));
        }
        FabricAuth::AccessToken(token) => {
            config.authentication(AuthMethod::aad_token(token.expose()));
        }
    }
    config
}

async fn open(config: Config) -> anyhow::Result<TdsClient> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Gateways answer the login with the address of the node to use.
        Err(tiberius::error::Error::Routing { host, port }) => {
            let mut config = config;
            config.host(&host);
            config.port(port);
            tracing::debug!(%host, port, "following tds routing redirect");
            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

fn cell_text(data: &ColumnData<'static>) -> Option<String> {
    match data {
        ColumnData::U8(v) => v.map(|x| x.to_string()),
        ColumnData::I16(v) => v.map(|x| x.to_string()),
        ColumnData::I32(v) => v.map(|x| x.to_string()),
        ColumnData::I64(v) => v.map(|x| x.to_string()),
        ColumnData::F32(v) => v.map(|x| x.to_string()),
        ColumnData::F64(v) => v.map(|x| x.to_string()),
        ColumnData::Bit(v) => v.map(|x| x.to_string()),
        ColumnData::String(v) => v.as_ref().map(|s| s.to_string()),
        ColumnData::Numeric(v) => v.map(|n| n.to_string()),
        ColumnData::Guid(v) => v.map(|g| g.to_string()),
        other => Some(format!("{:?}", other)),
    }
}

impl FabricBackend {
    pub async fn connect(cfg: &FabricConfig) -> anyhow::Result<Self> {
        let client = open(tds_config(cfg)).await?;
        tracing::info!(server = %cfg.server, database = %cfg.database, "connected to fabric");
        Ok(Self {
            client: Some(client),
            database: cfg.database.clone(),
        })
    }
}

#[async_trait]
impl Backend for FabricBackend {
    fn name(&self) -> &'static str {
        "fabric"
    }

    fn target(&self) -> String {
        self.database.clone()
    }

    async fn execute(&mut self, sql: &str) -> anyhow::Result<QueryOutcome> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("fabric connection already closed"))?;
        let rows = client.simple_query(sql).await?.into_first_result().await?;
        let count = rows.len() as u64;
        let first_row = rows
            .into_iter()
            .next()
            .map(|row| preview_row(row.into_iter().map(|c| cell_text(&c))));
        Ok(QueryOutcome {
            query_id: None,
            rows: Some(count),
            first_row,
        })
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await?;
        }
        Ok(())
    }
}
