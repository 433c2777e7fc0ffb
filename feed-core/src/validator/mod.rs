mod engine;
pub mod checks;

pub use engine::{DatasetOutcome, Engine};
