pub mod partsupp;

pub use partsupp::{calculate_batches, generate_partsupp, GenerateSummary, PartSuppOptions};
