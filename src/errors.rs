//! Typed error hierarchy for the review pipeline.
//!
//! `PipelineError` covers every failure the engine can surface:
//! - change inspection (`InspectionIo`, `NoActiveBranch`)
//! - graph structure (`CycleDetected`, `UnknownDependency`, `DuplicateStage`,
//!   `UnknownStage`, `Deadlock`)
//! - stage contracts (`DependencyNotReady`, `MalformedResponse`)
//! - session persistence (`Store`, `CorruptArtifact`)
//!
//! Fatal messages name the offending stage or path and say how to recover.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the pipeline engine.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "Failed to query version control in {path}: {message}. Make sure the directory is a git repository"
    )]
    InspectionIo { path: PathBuf, message: String },

    #[error("No active branch to review: {reason}. Check out a branch or pass --base <ref>")]
    NoActiveBranch { reason: String },

    #[error(
        "Stage '{stage}' references '{dependency}' which is not completed. This is a pipeline ordering bug; run 'prereview clean' to reset the session"
    )]
    DependencyNotReady { stage: String, dependency: String },

    #[error("Response for stage '{stage}' is malformed: {reason}. Resupply the response and run again")]
    MalformedResponse { stage: String, reason: String },

    #[error(
        "Pipeline deadlocked: stages {blocked:?} can never run. Check the stage graph or run 'prereview clean'"
    )]
    Deadlock { blocked: Vec<String> },

    #[error("Cycle detected in stage dependencies. Involved stages: {stages:?}")]
    CycleDetected { stages: Vec<String> },

    #[error("Unknown dependency '{dependency}' in stage '{stage}': no stage with that id exists")]
    UnknownDependency { stage: String, dependency: String },

    #[error("Duplicate stage id: {0}")]
    DuplicateStage(String),

    #[error("Unknown stage '{0}'. Run 'prereview status' to list stages")]
    UnknownStage(String),

    #[error("Session store I/O failed at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt session artifact at {path}: {source}. Run 'prereview clean' to wipe the session")]
    CorruptArtifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Build a `Store` error from an I/O failure on `path`.
    pub fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller can retry the same operation after fixing its input.
    ///
    /// Only malformed responses are recoverable; the stage stays in flight.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
