//! Dependency graph and scheduling for review stages.
//!
//! The graph is small and fixed per run, so it is an explicit adjacency
//! structure validated once at construction:
//!
//! 1. **Builder** - indexes stages, resolves dependencies, rejects cycles
//! 2. **Scheduler** - computes a stable topological order and picks the next
//!    eligible stage from persisted records
//!
//! ## Example
//!
//! ```
//! use prereview::dag::PipelineScheduler;
//! use prereview::stage::builtin_stages;
//!
//! # fn example() -> prereview::errors::Result<()> {
//! let scheduler = PipelineScheduler::new(builtin_stages())?;
//! let order: Vec<_> = scheduler.ordered_stages().map(|s| s.id().to_string()).collect();
//! assert_eq!(order[0], "status_analysis");
//! assert_eq!(order[3], "final_consolidation");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod builder;
mod scheduler;

pub use builder::{GraphBuilder, PipelineGraph, StageIndex};
pub use scheduler::{PipelineScheduler, Selection};
