pub mod clock;
pub mod record;
pub mod runner;
pub mod stats;
