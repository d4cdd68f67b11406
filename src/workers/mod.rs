pub mod retention;

pub use retention::{RetentionWorker, SweepReport};
