use super::exit_codes;
use super::backend_setup;
use crate::cli::args::RunArgs;
use std::time::Duration;
use whbench_core::backends::{self, RunContext};
use whbench_core::catalog::{load_catalog, select};
use whbench_core::config::env::ProcessEnv;
use whbench_core::config::{query_tag_from_env, RunSettings, StatsPolicy};
use whbench_core::engine::runner::Runner;

pub async fn cmd_run(args: RunArgs) -> anyhow::Result<i32> {
    // Everything that can be checked locally is checked before connecting.
    let (backend_cfg, vars) = backend_setup(&args.backend, &args.vars, &ProcessEnv)?;
    let queries = select(load_catalog(&args.catalog, &vars)?, &args.only)?;

    let query_tag = args
        .query_tag
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| query_tag_from_env(&ProcessEnv));
    let settings = RunSettings {
        output: args.output.clone(),
        query_tag: query_tag.clone(),
        run_type: args.run_type.clone(),
        query_delay: Duration::from_millis(args.delay_ms),
        stats: StatsPolicy {
            max_attempts: args.stats_attempts.max(1),
            retry_delay: Duration::from_millis(args.stats_retry_ms),
        },
    };

    let backend = backends::connect(&backend_cfg, &RunContext { query_tag }).await?;
    let summary = Runner::new(settings).run(backend, &queries).await?;

    if args.strict && summary.failed > 0 {
        return Ok(exit_codes::QUERY_FAILED);
    }
    Ok(exit_codes::OK)
}
