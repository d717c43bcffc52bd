use super::exit_codes;
use super::parse_vars;
use crate::cli::args::{CatalogArgs, CatalogFormat};
use whbench_core::catalog::load_catalog;
use whbench_core::config::env::ProcessEnv;
use whbench_core::config::{BackendConfig, BackendKind};
use whbench_core::errors::ConfigError;

/// Renders a catalog offline. Backend credentials are optional here; without
/// them only `--var` values and the catalog's own defaults are available.
pub fn cmd_catalog(args: CatalogArgs) -> anyhow::Result<i32> {
    let kind: BackendKind = args.backend.parse()?;
    let mut vars = match BackendConfig::from_env(kind, &ProcessEnv) {
        Ok(cfg) => cfg.catalog_vars(),
        Err(ConfigError::MissingEnv { keys, invalid, .. }) if invalid.is_empty() => {
            tracing::info!(missing = ?keys, "backend environment incomplete, using --var values only");
            Default::default()
        }
        Err(e) => return Err(e.into()),
    };
    vars.extend(parse_vars(&args.vars)?);
    let queries = load_catalog(&args.catalog, &vars)?;

    match args.format {
        CatalogFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&queries)?);
        }
        CatalogFormat::Text => {
            for q in &queries {
                println!("-- {}", q.description);
                println!("{}\n", q.sql.trim_end());
            }
        }
    }
    Ok(exit_codes::OK)
}
