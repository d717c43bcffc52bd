use super::args::*;
use std::collections::BTreeMap;
use whbench_core::config::{BackendConfig, BackendKind};
use whbench_core::config::env::EnvLookup;
use whbench_core::errors::{is_config_error, is_connection_error, ConfigError};

pub mod catalog;
pub mod datagen;
pub mod run;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const QUERY_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const CONNECTION_ERROR: i32 = 3;
    /// The run stopped part way, e.g. the results file could not be written.
    pub const RUNTIME_ERROR: i32 = 4;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let res = match cli.cmd {
        Command::Run(args) => run::cmd_run(args).await,
        Command::Catalog(args) => catalog::cmd_catalog(args),
        Command::GeneratePartsupp(args) => datagen::cmd_generate(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    };
    res.or_else(classify)
}

/// Maps fatal errors to their exit code; anything unclassified stays fatal.
fn classify(e: anyhow::Error) -> anyhow::Result<i32> {
    if is_config_error(&e) {
        eprintln!("config error: {:#}", e);
        Ok(exit_codes::CONFIG_ERROR)
    } else if is_connection_error(&e) {
        eprintln!("connection error: {:#}", e);
        Ok(exit_codes::CONNECTION_ERROR)
    } else {
        Err(e)
    }
}

/// Parses repeated `--var key=value` flags.
pub fn parse_vars(raw: &[String]) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut out = BTreeMap::new();
    for item in raw {
        let (k, v) = item
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::invalid("--var", format!("expected KEY=VALUE, got '{}'", item)))?;
        out.insert(k.trim().to_string(), v.to_string());
    }
    Ok(out)
}

/// Resolves backend settings and catalog variables; `--var` overrides backend values.
pub fn backend_setup(
    backend: &str,
    vars: &[String],
    lookup: &dyn EnvLookup,
) -> Result<(BackendConfig, BTreeMap<String, String>), ConfigError> {
    let kind: BackendKind = backend.parse()?;
    let cfg = BackendConfig::from_env(kind, lookup)?;
    let mut merged = cfg.catalog_vars();
    merged.extend(parse_vars(vars)?);
    Ok((cfg, merged))
}
