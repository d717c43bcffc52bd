use super::exit_codes;
use crate::cli::args::GenerateArgs;
use whbench_core::datagen::{generate_partsupp, PartSuppOptions};

pub fn cmd_generate(args: GenerateArgs) -> anyhow::Result<i32> {
    let summary = generate_partsupp(&PartSuppOptions {
        total_records: args.total_records,
        batch_size: args.batch_size,
        output_dir: args.output_dir.clone(),
        seed: args.seed,
    })?;
    eprintln!(
        "wrote {} partsupp records in {} files to {}",
        summary.records,
        summary.files.len(),
        args.output_dir.display()
    );
    Ok(exit_codes::OK)
}
