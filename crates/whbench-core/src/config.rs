use crate::errors::ConfigError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub mod env;

use env::{EnvLookup, EnvReader};

pub const DEFAULT_OUTPUT_FILE: &str = "query_stats.csv";
pub const DEFAULT_QUERY_DELAY_MS: u64 = 3000;
pub const DEFAULT_STATS_ATTEMPTS: u32 = 3;
pub const DEFAULT_STATS_RETRY_MS: u64 = 1000;

/// Bounded retry budget for fetching warehouse statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for StatsPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_STATS_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_STATS_RETRY_MS),
        }
    }
}

/// Run-level settings, built once at process entry.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub output: PathBuf,
    pub query_tag: String,
    pub run_type: String,
    /// Pause between consecutive queries; zero disables it.
    pub query_delay: Duration,
    pub stats: StatsPolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT_FILE),
            query_tag: String::new(),
            run_type: crate::model::DEFAULT_RUN_TYPE.to_string(),
            query_delay: Duration::from_millis(DEFAULT_QUERY_DELAY_MS),
            stats: StatsPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Redshift,
    Snowflake,
    BigQuery,
    Databricks,
    Fabric,
    Fake,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Redshift => "redshift",
            BackendKind::Snowflake => "snowflake",
            BackendKind::BigQuery => "bigquery",
            BackendKind::Databricks => "databricks",
            BackendKind::Fabric => "fabric",
            BackendKind::Fake => "fake",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redshift" => Ok(BackendKind::Redshift),
            "snowflake" => Ok(BackendKind::Snowflake),
            "bigquery" => Ok(BackendKind::BigQuery),
            "databricks" => Ok(BackendKind::Databricks),
            "fabric" | "azure" | "azure-fabric" => Ok(BackendKind::Fabric),
            "fake" => Ok(BackendKind::Fake),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(v: impl Into<String>) -> Self {
        Self(v.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Require,
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            other => Err(format!("unsupported ssl mode '{}' (disable|require)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedshiftConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub schema: String,
    pub user: String,
    pub password: Secret,
    pub ssl_mode: SslMode,
}

#[derive(Debug, Clone)]
pub struct SnowflakeConfig {
    pub account: String,
    pub token: Secret,
    pub token_type: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub enum BigQueryAuth {
    /// Service-account key file; access tokens are minted and refreshed from it.
    ServiceAccountFile(PathBuf),
    /// Pre-issued OAuth token, used as is for the whole run.
    AccessToken(Secret),
}

#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub project_id: String,
    pub dataset: String,
    pub auth: BigQueryAuth,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabricksConfig {
    pub server_hostname: String,
    pub http_path: String,
    pub access_token: Secret,
    pub catalog: Option<String>,
    pub schema: Option<String>,
}

impl DatabricksConfig {
    /// `/sql/1.0/warehouses/<id>` -> `<id>`
    pub fn warehouse_id(&self) -> Option<&str> {
        let mut parts = self.http_path.trim_end_matches('/').rsplit('/');
        let id = parts.next()?;
        match parts.next() {
            Some("warehouses") | Some("endpoints") if !id.is_empty() => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FabricAuth {
    SqlLogin { username: String, password: Secret },
    /// Microsoft Entra access token, e.g. from `az account get-access-token`.
    AccessToken(Secret),
}

#[derive(Debug, Clone)]
pub struct FabricConfig {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub schema: String,
    pub auth: FabricAuth,
}

#[derive(Debug, Clone, Default)]
pub struct FakeConfig {
    pub fail_on: Option<String>,
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    Redshift(RedshiftConfig),
    Snowflake(SnowflakeConfig),
    BigQuery(BigQueryConfig),
    Databricks(DatabricksConfig),
    Fabric(FabricConfig),
    Fake(FakeConfig),
}

impl BackendConfig {
    /// Reads the backend's variables; every missing required key and every
    /// unparsable value is reported at once.
    pub fn from_env(kind: BackendKind, lookup: &dyn EnvLookup) -> Result<Self, ConfigError> {
        let mut r = EnvReader::new(lookup, kind.as_str());
        let cfg = match kind {
            BackendKind::Redshift => BackendConfig::Redshift(RedshiftConfig {
                host: r.required("REDSHIFT_HOST"),
                database: r.required("REDSHIFT_DATABASE"),
                user: r.required("REDSHIFT_USER"),
                password: Secret::new(r.required("REDSHIFT_PASSWORD")),
                port: r.parsed("REDSHIFT_PORT", 5439),
                schema: r.or_default("REDSHIFT_SCHEMA", "public"),
                ssl_mode: r.parsed("REDSHIFT_SSLMODE", SslMode::Require),
            }),
            BackendKind::Snowflake => BackendConfig::Snowflake(SnowflakeConfig {
                account: r.required("SNOWFLAKE_ACCOUNT"),
                token: Secret::new(r.required("SNOWFLAKE_TOKEN")),
                warehouse: r.required("SNOWFLAKE_WAREHOUSE"),
                database: r.required("SNOWFLAKE_DATABASE"),
                schema: r.or_default("SNOWFLAKE_SCHEMA", "PUBLIC"),
                role: r.optional("SNOWFLAKE_ROLE"),
                token_type: r.or_default("SNOWFLAKE_TOKEN_TYPE", "OAUTH").to_uppercase(),
            }),
            BackendKind::BigQuery => {
                let project_id = r.required("BIGQUERY_PROJECT_ID");
                let dataset = r.required("BIGQUERY_DATASET");
                let auth = match r.optional("GOOGLE_APPLICATION_CREDENTIALS") {
                    Some(path) => {
                        let path = PathBuf::from(path);
                        if !path.is_file() {
                            r.reject(
                                "GOOGLE_APPLICATION_CREDENTIALS",
                                format!("'{}' is not a readable file", path.display()),
                            );
                        }
                        BigQueryAuth::ServiceAccountFile(path)
                    }
                    None => BigQueryAuth::AccessToken(Secret::new(r.required("BIGQUERY_ACCESS_TOKEN"))),
                };
                BackendConfig::BigQuery(BigQueryConfig {
                    project_id,
                    dataset,
                    auth,
                    location: r.optional("BIGQUERY_LOCATION"),
                })
            }
            BackendKind::Databricks => BackendConfig::Databricks(DatabricksConfig {
                server_hostname: r.required("DATABRICKS_SERVER_HOSTNAME"),
                http_path: r.required("DATABRICKS_HTTP_PATH"),
                access_token: Secret::new(r.required("DATABRICKS_ACCESS_TOKEN")),
                catalog: r.optional("DATABRICKS_CATALOG"),
                schema: r.optional("DATABRICKS_SCHEMA"),
            }),
            BackendKind::Fabric => {
                let server = r.required("FABRIC_SERVER");
                let database = r.required("FABRIC_DATABASE");
                let auth = match r.optional("FABRIC_ACCESS_TOKEN") {
                    Some(token) => FabricAuth::AccessToken(Secret::new(token)),
                    None => FabricAuth::SqlLogin {
                        username: r.required("FABRIC_USERNAME"),
                        password: Secret::new(r.required("FABRIC_PASSWORD")),
                    },
                };
                BackendConfig::Fabric(FabricConfig {
                    server,
                    database,
                    auth,
                    port: r.parsed("FABRIC_PORT", 1433),
                    schema: r.or_default("FABRIC_SCHEMA", "dbo"),
                })
            }
            BackendKind::Fake => BackendConfig::Fake(FakeConfig {
                fail_on: r.optional("WHBENCH_FAKE_FAIL_ON"),
            }),
        };
        r.finish()?;

        if let BackendConfig::Databricks(db) = &cfg {
            if db.warehouse_id().is_none() {
                return Err(ConfigError::invalid(
                    "DATABRICKS_HTTP_PATH",
                    format!("'{}' does not name a SQL warehouse", db.http_path),
                ));
            }
        }
        Ok(cfg)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Redshift(_) => BackendKind::Redshift,
            BackendConfig::Snowflake(_) => BackendKind::Snowflake,
            BackendConfig::BigQuery(_) => BackendKind::BigQuery,
            BackendConfig::Databricks(_) => BackendKind::Databricks,
            BackendConfig::Fabric(_) => BackendKind::Fabric,
            BackendConfig::Fake(_) => BackendKind::Fake,
        }
    }

    /// Placeholder values offered to the query catalog.
    pub fn catalog_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        let mut put = |k: &str, v: &str| {
            vars.insert(k.to_string(), v.to_string());
        };
        match self {
            BackendConfig::Redshift(c) => {
                put("database", &c.database);
                put("schema", &c.schema);
            }
            BackendConfig::Snowflake(c) => {
                put("database", &c.database);
                put("schema", &c.schema);
                put("warehouse", &c.warehouse);
            }
            BackendConfig::BigQuery(c) => {
                put("project", &c.project_id);
                put("dataset", &format!("{}.{}", c.project_id, c.dataset));
            }
            BackendConfig::Databricks(c) => {
                if let Some(cat) = &c.catalog {
                    put("catalog", cat);
                }
                if let Some(schema) = &c.schema {
                    put("schema", schema);
                }
            }
            BackendConfig::Fabric(c) => {
                put("database", &c.database);
                put("schema", &c.schema);
            }
            BackendConfig::Fake(_) => {}
        }
        vars
    }
}

/// Reads the run tag, accepting the lowercase spelling some `.env` files use.
pub fn query_tag_from_env(lookup: &dyn EnvLookup) -> String {
    lookup
        .get("QUERY_TAG")
        .or_else(|| lookup.get("query_tag"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("BigQuery".parse::<BackendKind>().unwrap(), BackendKind::BigQuery);
        assert_eq!("azure".parse::<BackendKind>().unwrap(), BackendKind::Fabric);
        assert!("oracle".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_redshift_defaults() {
        let vars = env(&[
            ("REDSHIFT_HOST", "h"),
            ("REDSHIFT_DATABASE", "dev"),
            ("REDSHIFT_USER", "u"),
            ("REDSHIFT_PASSWORD", "p"),
        ]);
        let BackendConfig::Redshift(c) = BackendConfig::from_env(BackendKind::Redshift, &vars).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(c.port, 5439);
        assert_eq!(c.schema, "public");
        assert_eq!(c.ssl_mode, SslMode::Require);
        assert_eq!(format!("{:?}", c.password), "***");
    }

    #[test]
    fn test_bad_port_is_reported_with_missing_keys() {
        let vars = env(&[("REDSHIFT_HOST", "h"), ("REDSHIFT_PORT", "54x")]);
        match BackendConfig::from_env(BackendKind::Redshift, &vars) {
            Err(ConfigError::MissingEnv { keys, invalid, .. }) => {
                assert_eq!(
                    keys,
                    vec!["REDSHIFT_DATABASE", "REDSHIFT_USER", "REDSHIFT_PASSWORD"]
                );
                assert_eq!(invalid.len(), 1);
                assert!(invalid[0].starts_with("REDSHIFT_PORT='54x'"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_bigquery_dataset_var_is_qualified() {
        let vars = env(&[
            ("BIGQUERY_PROJECT_ID", "proj"),
            ("BIGQUERY_DATASET", "tpch"),
            ("BIGQUERY_ACCESS_TOKEN", "t"),
        ]);
        let cfg = BackendConfig::from_env(BackendKind::BigQuery, &vars).unwrap();
        assert_eq!(cfg.catalog_vars()["dataset"], "proj.tpch");
    }

    #[test]
    fn test_bigquery_prefers_service_account_file() {
        let key = tempfile::NamedTempFile::new().unwrap();
        let path = key.path().to_string_lossy().to_string();
        let vars = env(&[
            ("BIGQUERY_PROJECT_ID", "proj"),
            ("BIGQUERY_DATASET", "tpch"),
            ("BIGQUERY_ACCESS_TOKEN", "t"),
            ("GOOGLE_APPLICATION_CREDENTIALS", &path),
        ]);
        let BackendConfig::BigQuery(c) = BackendConfig::from_env(BackendKind::BigQuery, &vars).unwrap() else {
            panic!("wrong variant");
        };
        assert!(matches!(c.auth, BigQueryAuth::ServiceAccountFile(ref p) if p.as_path() == key.path()));

        let vars = env(&[
            ("BIGQUERY_PROJECT_ID", "proj"),
            ("BIGQUERY_DATASET", "tpch"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/nonexistent/key.json"),
        ]);
        match BackendConfig::from_env(BackendKind::BigQuery, &vars) {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "GOOGLE_APPLICATION_CREDENTIALS"),
            other => panic!("unexpected: {:?}", other),
        }

        let vars = env(&[("BIGQUERY_PROJECT_ID", "proj"), ("BIGQUERY_DATASET", "tpch")]);
        match BackendConfig::from_env(BackendKind::BigQuery, &vars) {
            Err(ConfigError::MissingEnv { keys, .. }) => assert_eq!(keys, vec!["BIGQUERY_ACCESS_TOKEN"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_databricks_warehouse_id() {
        let vars = env(&[
            ("DATABRICKS_SERVER_HOSTNAME", "adb.example.net"),
            ("DATABRICKS_HTTP_PATH", "/sql/1.0/warehouses/abc123"),
            ("DATABRICKS_ACCESS_TOKEN", "t"),
        ]);
        let BackendConfig::Databricks(c) = BackendConfig::from_env(BackendKind::Databricks, &vars).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(c.warehouse_id(), Some("abc123"));

        let vars = env(&[
            ("DATABRICKS_SERVER_HOSTNAME", "adb.example.net"),
            ("DATABRICKS_HTTP_PATH", "/sql/protocolv1/o/1/0123"),
            ("DATABRICKS_ACCESS_TOKEN", "t"),
        ]);
        assert!(BackendConfig::from_env(BackendKind::Databricks, &vars).is_err());
    }

    #[test]
    fn test_fabric_token_replaces_login() {
        let vars = env(&[
            ("FABRIC_SERVER", "x.datawarehouse.fabric.microsoft.com"),
            ("FABRIC_DATABASE", "tpch"),
            ("FABRIC_ACCESS_TOKEN", "eyJ0"),
        ]);
        let BackendConfig::Fabric(c) = BackendConfig::from_env(BackendKind::Fabric, &vars).unwrap() else {
            panic!("wrong variant");
        };
        assert!(matches!(c.auth, FabricAuth::AccessToken(_)));

        let vars = env(&[("FABRIC_SERVER", "x"), ("FABRIC_DATABASE", "tpch")]);
        match BackendConfig::from_env(BackendKind::Fabric, &vars) {
            Err(ConfigError::MissingEnv { keys, .. }) => {
                assert_eq!(keys, vec!["FABRIC_USERNAME", "FABRIC_PASSWORD"])
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_query_tag_lowercase_fallback() {
        assert_eq!(query_tag_from_env(&env(&[("query_tag", "nightly")])), "nightly");
        assert_eq!(
            query_tag_from_env(&env(&[("QUERY_TAG", "a"), ("query_tag", "b")])),
            "a"
        );
        assert_eq!(query_tag_from_env(&env(&[])), "");
    }
}
