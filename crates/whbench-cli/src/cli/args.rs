use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use whbench_core::config::{
    DEFAULT_OUTPUT_FILE, DEFAULT_QUERY_DELAY_MS, DEFAULT_STATS_ATTEMPTS, DEFAULT_STATS_RETRY_MS,
};
use whbench_core::datagen::partsupp::{DEFAULT_BATCH_SIZE, DEFAULT_OUTPUT_DIR, DEFAULT_TOTAL_RECORDS};
use whbench_core::model::DEFAULT_RUN_TYPE;

#[derive(Parser)]
#[command(
    name = "whbench",
    version,
    about = "Sequential query benchmarks against cloud data warehouses"
)]
pub struct Cli {
    /// tracing filter, e.g. `info` or `whbench_core=debug`
    #[arg(long, global = true, env = "WHBENCH_LOG", default_value = "warn")]
    pub log_level: String,

    /// emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a query catalog against one backend and append results to CSV
    Run(RunArgs),
    /// Print the resolved queries of a catalog without connecting
    Catalog(CatalogArgs),
    /// Write synthetic TPC-H partsupp data as CSV batches
    GeneratePartsupp(GenerateArgs),
    Version,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// redshift|snowflake|bigquery|databricks|fabric|fake
    #[arg(long, env = "WHBENCH_BACKEND")]
    pub backend: String,

    #[arg(long)]
    pub catalog: PathBuf,

    #[arg(long, default_value = DEFAULT_OUTPUT_FILE)]
    pub output: PathBuf,

    /// label attached to every statement and written into each row
    #[arg(long, env = "QUERY_TAG")]
    pub query_tag: Option<String>,

    #[arg(long, default_value = DEFAULT_RUN_TYPE)]
    pub run_type: String,

    /// pause between consecutive queries (0 disables)
    #[arg(long, default_value_t = DEFAULT_QUERY_DELAY_MS)]
    pub delay_ms: u64,

    #[arg(long, default_value_t = DEFAULT_STATS_ATTEMPTS)]
    pub stats_attempts: u32,

    #[arg(long, default_value_t = DEFAULT_STATS_RETRY_MS)]
    pub stats_retry_ms: u64,

    /// catalog placeholder override (key=value), repeatable
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// run only these query descriptions, repeatable
    #[arg(long)]
    pub only: Vec<String>,

    /// exit 1 when any query failed
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Clone)]
pub struct CatalogArgs {
    #[arg(long, env = "WHBENCH_BACKEND")]
    pub backend: String,

    #[arg(long)]
    pub catalog: PathBuf,

    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    #[arg(long, value_enum, default_value_t = CatalogFormat::Text)]
    pub format: CatalogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CatalogFormat {
    Text,
    Json,
}

#[derive(Parser, Clone)]
pub struct GenerateArgs {
    #[arg(long, default_value_t = DEFAULT_TOTAL_RECORDS)]
    pub total_records: u64,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u64,

    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub seed: Option<u64>,
}
