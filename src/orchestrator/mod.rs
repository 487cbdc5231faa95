pub mod runner;

pub use runner::{Advance, Materialized, Orchestrator, Outcome, StageProgress, Suspension};
