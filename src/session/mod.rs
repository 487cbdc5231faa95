//! Durable session records.
//!
//! A session is the directory of persisted [`StageRecord`]s for one working
//! context (one reviewed branch). It is the unit of resumability: everything
//! needed to continue a run after a process restart lives on disk.
//!
//! ```text
//! .pr_review/
//! ├── review.toml                      # optional configuration
//! └── feature-login-<hash>/            # one session per branch
//!     ├── session.json                 # manifest
//!     ├── status_analysis.request.json
//!     ├── status_analysis.request.md   # readable copy for the external actor
//!     ├── status_analysis.response.json
//!     ├── coverage_analysis.request.json
//!     ├── coverage_analysis.output.md  # inbox written by the external actor
//!     └── accessibility_analysis.skipped.json
//! ```

mod store;

pub use store::{SessionLocator, SessionStore, StageArtifact};

use crate::changeset::ChangeSet;
use crate::stage::{RequestPayload, ResponsePayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of one stage within a session.
///
/// `Pending → RequestReady → AwaitingResponse → Completed`, with
/// `Pending → Skipped` taken when the stage's gate is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    /// Request built but not yet persisted
    RequestReady,
    /// Request persisted, waiting on the external actor
    AwaitingResponse,
    Completed,
    Skipped,
}

impl StageStatus {
    /// Completed or skipped: dependents may proceed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    /// A request exists and its response has not been folded in yet.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::RequestReady | Self::AwaitingResponse)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::RequestReady => "request_ready",
            Self::AwaitingResponse => "awaiting_response",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// One stage's persisted progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub status: StageStatus,
    /// Empty for skipped stages
    pub request: RequestPayload,
    /// Absent until the external actor supplies it
    pub response: Option<ResponsePayload>,
    /// Time of the last lifecycle transition
    pub timestamp: DateTime<Utc>,
}

impl StageRecord {
    pub fn awaiting(stage: &str, request: RequestPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            stage: stage.to_string(),
            status: StageStatus::AwaitingResponse,
            request,
            response: None,
            timestamp,
        }
    }

    pub fn skipped(stage: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            stage: stage.to_string(),
            status: StageStatus::Skipped,
            request: RequestPayload::default(),
            response: None,
            timestamp,
        }
    }

    pub fn complete(mut self, response: ResponsePayload, timestamp: DateTime<Utc>) -> Self {
        self.status = StageStatus::Completed;
        self.response = Some(response);
        self.timestamp = timestamp;
        self
    }
}

/// All records of a session, keyed by stage id.
pub type StageRecords = BTreeMap<String, StageRecord>;

/// Status of `stage` in `records`; stages without a record are pending.
pub fn status_of(records: &StageRecords, stage: &str) -> StageStatus {
    records
        .get(stage)
        .map(|r| r.status)
        .unwrap_or(StageStatus::Pending)
}

/// Metadata written when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub base: String,
    /// [`ChangeSet::fingerprint`] at session start
    pub fingerprint: String,
}

impl SessionManifest {
    pub fn new(change_set: &ChangeSet) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            branch: change_set.branch().map(String::from),
            base: change_set.base().to_string(),
            fingerprint: change_set.fingerprint(),
        }
    }

    /// Whether the reviewed changes moved since the session started.
    pub fn is_stale(&self, change_set: &ChangeSet) -> bool {
        self.fingerprint != change_set.fingerprint()
    }
}
