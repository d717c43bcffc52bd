//! Synthetic TPC-H `partsupp` rows written as numbered CSV batches.

use crate::errors::ConfigError;
use crate::model::round_to;
use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

pub const DEFAULT_TOTAL_RECORDS: u64 = 800_000;
pub const DEFAULT_BATCH_SIZE: u64 = 100_000;
pub const DEFAULT_OUTPUT_DIR: &str = "data";

/// Keys are random numbers of at most this many digits.
const KEY_DIGITS: u32 = 8;
const MAX_COMMENT_LEN: usize = 200;

const WORDS: &[&str] = &[
    "carefully", "final", "deposits", "detect", "slyly", "regular", "requests", "among",
    "the", "quickly", "express", "packages", "haggle", "furiously", "ironic", "accounts",
    "pending", "theodolites", "boost", "blithely", "bold", "instructions", "sleep", "along",
    "even", "foxes", "nag", "special", "pinto", "beans", "unusual", "dependencies", "cajole",
    "platelets", "silent", "courts", "wake", "above", "fluffily", "asymptotes",
];

#[derive(Debug, Clone)]
pub struct PartSuppOptions {
    pub total_records: u64,
    pub batch_size: u64,
    pub output_dir: PathBuf,
    /// Fixed seed for reproducible output.
    pub seed: Option<u64>,
}

impl Default for PartSuppOptions {
    fn default() -> Self {
        Self {
            total_records: DEFAULT_TOTAL_RECORDS,
            batch_size: DEFAULT_BATCH_SIZE,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateSummary {
    pub files: Vec<PathBuf>,
    pub records: u64,
}

#[derive(Debug, Serialize)]
struct PartSuppRow {
    partkey: u64,
    suppkey: u64,
    availqty: u32,
    supplycost: f64,
    comment: String,
}

pub fn calculate_batches(total_records: u64, batch_size: u64) -> u64 {
    if batch_size == 0 {
        return 0;
    }
    total_records.div_ceil(batch_size)
}

/// Draws keys that were not handed out before in this run.
struct UniqueKeys {
    seen: HashSet<u64>,
    upper: u64,
}

impl UniqueKeys {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            upper: 10u64.pow(KEY_DIGITS),
        }
    }

    fn draw<R: Rng>(&mut self, rng: &mut R) -> u64 {
        loop {
            let k = rng.gen_range(0..self.upper);
            if self.seen.insert(k) {
                return k;
            }
        }
    }
}

fn comment<R: Rng>(rng: &mut R) -> String {
    // Leaves room for the closing period.
    let target = rng.gen_range(20..MAX_COMMENT_LEN);
    let mut out = String::with_capacity(target);
    loop {
        let w = WORDS[rng.gen_range(0..WORDS.len())];
        let extra = if out.is_empty() { w.len() } else { w.len() + 1 };
        if out.len() + extra > target {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(w);
    }
    out.push('.');
    out
}

pub fn generate_partsupp(opts: &PartSuppOptions) -> anyhow::Result<GenerateSummary> {
    if opts.total_records == 0 {
        return Err(ConfigError::invalid("total_records", "must be greater than zero").into());
    }
    if opts.batch_size == 0 {
        return Err(ConfigError::invalid("batch_size", "must be greater than zero").into());
    }
    let key_space = 10u64.pow(KEY_DIGITS);
    if opts.total_records > key_space {
        return Err(ConfigError::invalid(
            "total_records",
            format!("at most {} rows have unique {}-digit keys", key_space, KEY_DIGITS),
        )
        .into());
    }

    std::fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("failed to create {}", opts.output_dir.display()))?;

    let mut rng = match opts.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let capacity = usize::try_from(opts.total_records).unwrap_or(usize::MAX);
    let mut partkeys = UniqueKeys::new(capacity);
    let mut suppkeys = UniqueKeys::new(capacity);

    let batches = calculate_batches(opts.total_records, opts.batch_size);
    tracing::info!(
        total_records = opts.total_records,
        batch_size = opts.batch_size,
        batches,
        "starting partsupp generation"
    );

    let mut files = Vec::with_capacity(batches as usize);
    let mut remaining = opts.total_records;
    for i in 1..=batches {
        let rows = remaining.min(opts.batch_size);
        let path = opts.output_dir.join(format!("partsupp_batch_{}.csv", i));
        tracing::info!(batch = i, of = batches, rows, "generating partsupp batch");

        let mut w = csv::Writer::from_path(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        for _ in 0..rows {
            w.serialize(PartSuppRow {
                partkey: partkeys.draw(&mut rng),
                suppkey: suppkeys.draw(&mut rng),
                availqty: rng.gen_range(1..=9999),
                supplycost: round_to(rng.gen_range(1.0..=1000.0), 2),
                comment: comment(&mut rng),
            })?;
        }
        w.flush()?;

        remaining -= rows;
        files.push(path);
    }

    tracing::info!(batches, "partsupp generation completed");
    Ok(GenerateSummary {
        files,
        records: opts.total_records,
    })
}
