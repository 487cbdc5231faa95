//! Drives a review session across suspensions.
//!
//! Every call starts from disk: load the records, rebuild the state by folding
//! completed responses in topological order, then do at most one unit of
//! external work. A request is persisted before control returns to the
//! caller, so the awaiting state survives a process restart.

use crate::changeset::{ChangeSet, ChangeSetInspector};
use crate::dag::PipelineScheduler;
use crate::errors::{PipelineError, Result};
use crate::session::{
    SessionLocator, SessionManifest, SessionStore, StageRecord, StageRecords, StageStatus,
    status_of,
};
use crate::stage::{RequestContext, RequestPayload, ResponsePayload, SessionState, Stage};
use crate::tracker::ChangeSource;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Control handed back to the caller while a stage awaits its response.
#[derive(Debug, Clone, PartialEq)]
pub struct Suspension {
    pub stage: String,
    pub title: String,
    pub request: RequestPayload,
    /// Readable copy of the request
    pub request_path: PathBuf,
    /// Where the external actor writes the response
    pub inbox_path: PathBuf,
    /// `true` when the request was issued by an earlier invocation
    pub resumed: bool,
}

/// Terminal result of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub state: SessionState,
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
}

/// What one [`Orchestrator::advance`] call achieved.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Suspended(Suspension),
    Finished(Outcome),
}

/// Result of materializing a single stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    /// Request persisted (or already outstanding)
    Request(Suspension),
    /// Stage already completed; its stored response, nothing written
    Replayed {
        stage: String,
        response: ResponsePayload,
    },
    /// Gate is false for this change set
    Skipped { stage: String },
}

/// One row of session progress.
#[derive(Debug, Clone, PartialEq)]
pub struct StageProgress {
    pub stage: String,
    pub title: String,
    pub status: StageStatus,
}

/// Runs the pipeline for one change set and one session.
#[derive(Debug)]
pub struct Orchestrator {
    scheduler: PipelineScheduler,
    store: SessionStore,
    change_set: ChangeSet,
}

impl Orchestrator {
    pub fn new(scheduler: PipelineScheduler, store: SessionStore, change_set: ChangeSet) -> Self {
        Self {
            scheduler,
            store,
            change_set,
        }
    }

    /// Inspect the change source and open the session for its branch.
    ///
    /// Inspection failures abort here; nothing is written.
    pub fn start(
        inspector: &ChangeSetInspector,
        source: &dyn ChangeSource,
        review_dir: &Path,
        stages: Vec<Box<dyn Stage>>,
    ) -> Result<Self> {
        let change_set = inspector.inspect(source)?;
        let scheduler = PipelineScheduler::new(stages)?;
        let locator = SessionLocator::for_context(review_dir, change_set.branch());
        debug!(
            session = %locator.dir().display(),
            changes = %change_set.summary(),
            "Opened session"
        );
        Ok(Self::new(scheduler, SessionStore::new(locator), change_set))
    }

    pub fn change_set(&self) -> &ChangeSet {
        &self.change_set
    }

    pub fn scheduler(&self) -> &PipelineScheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn manifest(&self) -> Result<Option<SessionManifest>> {
        self.store.load_manifest()
    }

    /// Per-stage status in topological order.
    pub fn progress(&self) -> Result<Vec<StageProgress>> {
        let records = self.store.load_session()?;
        Ok(self
            .scheduler
            .ordered_stages()
            .map(|s| StageProgress {
                stage: s.id().to_string(),
                title: s.title().to_string(),
                status: status_of(&records, s.id()),
            })
            .collect())
    }

    /// Rebuild the session state from persisted records.
    pub fn session_state(&self) -> Result<SessionState> {
        let records = self.store.load_session()?;
        self.rehydrate(&records)
    }

    fn rehydrate(&self, records: &StageRecords) -> Result<SessionState> {
        let mut state = SessionState::new();
        for stage in self.scheduler.ordered_stages() {
            let Some(record) = records.get(stage.id()) else {
                continue;
            };
            if record.status != StageStatus::Completed {
                continue;
            }
            if let Some(response) = &record.response {
                state = stage.fold_response(state, response)?;
            }
        }
        Ok(state)
    }

    /// Advance the session by one step.
    ///
    /// If a stage is in flight, its response is taken from `response` or the
    /// inbox; without one the same suspension is returned again. A response
    /// is folded before it is persisted, so a malformed one leaves the stage
    /// awaiting and the call can be retried. Afterwards the next eligible
    /// stage is requested, or the session finishes.
    pub fn advance(&self, response: Option<ResponsePayload>) -> Result<Advance> {
        let mut records = self.store.load_session()?;
        self.store.ensure_manifest(&self.change_set)?;
        let mut state = self.rehydrate(&records)?;

        if let Some(stage) = self.scheduler.in_flight_stage(&records) {
            let supplied = match response {
                Some(r) => Some(r),
                None => self.store.read_inbox(stage.id())?,
            };
            let Some(supplied) = supplied else {
                let record = records
                    .get(stage.id())
                    .ok_or_else(|| PipelineError::UnknownStage(stage.id().to_string()))?;
                debug!(stage = stage.id(), "Still awaiting response");
                return Ok(Advance::Suspended(self.suspension(stage, record, true)));
            };

            state = stage.fold_response(state, &supplied)?;
            let record = self.store.save_response(stage.id(), &supplied)?;
            records.insert(stage.id().to_string(), record);
            info!(stage = stage.id(), "Stage completed");
        } else if response.is_some() {
            warn!("No stage is awaiting a response; ignoring the supplied response");
        }

        let selection = self
            .scheduler
            .next_eligible_stage(&mut records, &self.change_set)?;
        for skipped in &selection.skipped {
            let record = self.store.mark_skipped(skipped)?;
            records.insert(skipped.clone(), record);
        }

        let Some(next) = selection.next else {
            info!("All stages finished");
            return Ok(Advance::Finished(self.outcome(state, &records)));
        };

        let stage = self.scheduler.stage(&next)?;
        let record = self.request(stage, &state, &records)?;
        Ok(Advance::Suspended(self.suspension(stage, &record, false)))
    }

    /// Supply the response for `stage`, which must be the stage in flight.
    pub fn respond(&self, stage: &str, response: ResponsePayload) -> Result<Advance> {
        self.scheduler.stage(stage)?;
        let records = self.store.load_session()?;
        let status = status_of(&records, stage);
        if !status.is_in_flight() {
            return Err(PipelineError::Other(anyhow::anyhow!(
                "Stage '{}' is {}, not awaiting a response. Run 'prereview status' to see which stage is",
                stage,
                status
            )));
        }
        self.advance(Some(response))
    }

    /// Materialize one stage without advancing the rest of the graph.
    ///
    /// A completed stage replays its stored response and writes nothing.
    pub fn materialize(&self, stage_id: &str) -> Result<Materialized> {
        let stage = self.scheduler.stage(stage_id)?;
        let mut records = self.store.load_session()?;

        match status_of(&records, stage_id) {
            StageStatus::Completed => {
                let response = records
                    .get(stage_id)
                    .and_then(|r| r.response.clone())
                    .unwrap_or_default();
                debug!(stage = stage_id, "Replaying stored response");
                return Ok(Materialized::Replayed {
                    stage: stage_id.to_string(),
                    response,
                });
            }
            StageStatus::Skipped => {
                return Ok(Materialized::Skipped {
                    stage: stage_id.to_string(),
                });
            }
            StageStatus::RequestReady | StageStatus::AwaitingResponse => {
                if let Some(record) = records.get(stage_id) {
                    return Ok(Materialized::Request(self.suspension(stage, record, true)));
                }
            }
            StageStatus::Pending => {}
        }

        if let Some(blocker) = self.first_unfinished_dependency(stage, &records) {
            return Err(PipelineError::DependencyNotReady {
                stage: stage_id.to_string(),
                dependency: blocker,
            });
        }
        if let Some(other) = self.scheduler.in_flight_stage(&records) {
            return Err(PipelineError::Other(anyhow::anyhow!(
                "Stage '{}' is already awaiting a response. Respond to it before requesting '{}'",
                other.id(),
                stage_id
            )));
        }

        self.store.ensure_manifest(&self.change_set)?;
        if !stage.gate(&self.change_set) {
            let record = self.store.mark_skipped(stage_id)?;
            records.insert(stage_id.to_string(), record);
            return Ok(Materialized::Skipped {
                stage: stage_id.to_string(),
            });
        }

        let state = self.rehydrate(&records)?;
        let record = self.request(stage, &state, &records)?;
        Ok(Materialized::Request(self.suspension(stage, &record, false)))
    }

    /// Discard `stage` and everything downstream of it so they run again.
    ///
    /// Returns the discarded stage ids in topological order.
    pub fn reopen(&self, stage: &str) -> Result<Vec<String>> {
        let mut discarded = vec![stage.to_string()];
        discarded.extend(self.scheduler.transitive_dependents(stage)?);
        for id in &discarded {
            self.store.discard(id)?;
        }
        info!(stage, count = discarded.len(), "Reopened stage");
        Ok(discarded)
    }

    /// Delete the whole session.
    pub fn wipe(&self) -> Result<()> {
        self.store.wipe()
    }

    fn first_unfinished_dependency(
        &self,
        stage: &dyn Stage,
        records: &StageRecords,
    ) -> Option<String> {
        stage
            .depends_on()
            .into_iter()
            .find(|dep| !status_of(records, dep).is_terminal())
            .map(String::from)
    }

    fn request(
        &self,
        stage: &dyn Stage,
        state: &SessionState,
        records: &StageRecords,
    ) -> Result<StageRecord> {
        let inbox = self.store.locator().inbox_path(stage.id());
        let ctx = RequestContext {
            stage: stage.id(),
            state,
            change_set: &self.change_set,
            records,
            inbox: &inbox,
        };
        let request = stage.build_request(&ctx)?;
        self.store.save_request(stage.id(), &request)
    }

    fn suspension(&self, stage: &dyn Stage, record: &StageRecord, resumed: bool) -> Suspension {
        let locator = self.store.locator();
        Suspension {
            stage: stage.id().to_string(),
            title: stage.title().to_string(),
            request: record.request.clone(),
            request_path: locator.request_markdown_path(stage.id()),
            inbox_path: locator.inbox_path(stage.id()),
            resumed,
        }
    }

    fn outcome(&self, state: SessionState, records: &StageRecords) -> Outcome {
        let mut completed = Vec::new();
        let mut skipped = Vec::new();
        for stage in self.scheduler.ordered_stages() {
            match status_of(records, stage.id()) {
                StageStatus::Completed => completed.push(stage.id().to_string()),
                StageStatus::Skipped => skipped.push(stage.id().to_string()),
                _ => {}
            }
        }
        Outcome {
            state,
            completed,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{ChangeContext, ChangeKind, ChangedPath};
    use crate::review_config::InspectorConfig;
    use crate::stage::builtin_stages;
    use crate::tracker::StaticChangeSource;
    use std::fs;
    use tempfile::tempdir;

    fn source(paths: &[&str]) -> StaticChangeSource {
        StaticChangeSource::new(
            ChangeContext {
                branch: Some("feature/login".to_string()),
                base: "main".to_string(),
            },
            paths
                .iter()
                .map(|p| ChangedPath::new(*p, ChangeKind::Modified))
                .collect(),
        )
    }

    fn orchestrator(review_dir: &Path, paths: &[&str]) -> Orchestrator {
        let inspector = ChangeSetInspector::new(&InspectorConfig::default()).unwrap();
        Orchestrator::start(&inspector, &source(paths), review_dir, builtin_stages()).unwrap()
    }

    fn suspended(advance: Advance) -> Suspension {
        match advance {
            Advance::Suspended(s) => s,
            Advance::Finished(_) => panic!("expected a suspension"),
        }
    }

    #[test]
    fn test_first_advance_requests_first_stage() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/lib.rs"]);

        let s = suspended(orch.advance(None).unwrap());
        assert_eq!(s.stage, "status_analysis");
        assert!(!s.resumed);
        assert!(s.request_path.exists());
        let session = SessionLocator::for_context(dir.path(), Some("feature/login"));
        assert!(s.request_path.starts_with(session.dir()));
        assert!(orch.manifest().unwrap().is_some());
    }

    #[test]
    fn test_advance_without_response_resumes_same_stage() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/lib.rs"]);
        let first = suspended(orch.advance(None).unwrap());

        let again = suspended(orch.advance(None).unwrap());
        assert_eq!(again.stage, first.stage);
        assert_eq!(again.request, first.request);
        assert!(again.resumed);
    }

    #[test]
    fn test_inbox_response_is_ingested() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/lib.rs"]);
        let s = suspended(orch.advance(None).unwrap());
        fs::write(&s.inbox_path, "status findings").unwrap();

        let next = suspended(orch.advance(None).unwrap());
        assert_eq!(next.stage, "coverage_analysis");
        assert!(next.request.as_str().contains("status findings"));
    }

    #[test]
    fn test_malformed_response_keeps_stage_awaiting() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/lib.rs"]);
        orch.advance(None).unwrap();

        let err = orch
            .advance(Some(ResponsePayload::new("   ")))
            .unwrap_err();
        assert!(err.is_recoverable());
        let progress = orch.progress().unwrap();
        assert_eq!(progress[0].status, StageStatus::AwaitingResponse);

        // Retry with real content
        let next = suspended(orch.advance(Some(ResponsePayload::new("ok"))).unwrap());
        assert_eq!(next.stage, "coverage_analysis");
    }

    #[test]
    fn test_full_run_without_ui_skips_accessibility() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/lib.rs"]);
        orch.advance(None).unwrap();

        let s = suspended(orch.advance(Some(ResponsePayload::new("status"))).unwrap());
        assert_eq!(s.stage, "coverage_analysis");
        let s = suspended(orch.advance(Some(ResponsePayload::new("coverage"))).unwrap());
        assert_eq!(s.stage, "final_consolidation");

        let outcome = match orch.advance(Some(ResponsePayload::new("checklist"))).unwrap() {
            Advance::Finished(o) => o,
            Advance::Suspended(s) => panic!("unexpected suspension at {}", s.stage),
        };
        assert_eq!(
            outcome.completed,
            vec!["status_analysis", "coverage_analysis", "final_consolidation"]
        );
        assert_eq!(outcome.skipped, vec!["accessibility_analysis"]);
        assert_eq!(outcome.state.artifact(), Some("checklist"));
        assert_eq!(outcome.state.notes(), Some("coverage"));

        // Accessibility never had a request
        let locator = orch.store().locator();
        assert!(!locator.request_path("accessibility_analysis").exists());
        assert!(locator.skipped_path("accessibility_analysis").exists());
    }

    #[test]
    fn test_response_without_in_flight_stage_is_ignored() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/lib.rs"]);
        // Nothing requested yet: the response is dropped and the first stage is requested
        let s = suspended(orch.advance(Some(ResponsePayload::new("stray"))).unwrap());
        assert_eq!(s.stage, "status_analysis");
        assert_eq!(orch.progress().unwrap()[0].status, StageStatus::AwaitingResponse);
    }

    #[test]
    fn test_respond_rejects_wrong_stage() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/lib.rs"]);
        orch.advance(None).unwrap();
        let err = orch
            .respond("coverage_analysis", ResponsePayload::new("x"))
            .unwrap_err();
        assert!(err.to_string().contains("not awaiting"));
        assert!(matches!(
            orch.respond("bogus", ResponsePayload::new("x")),
            Err(PipelineError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_materialize_pending_with_unfinished_dependency() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/lib.rs"]);
        let err = orch.materialize("coverage_analysis").unwrap_err();
        match err {
            PipelineError::DependencyNotReady { stage, dependency } => {
                assert_eq!(stage, "coverage_analysis");
                assert_eq!(dependency, "status_analysis");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!orch.store().exists());
    }

    #[test]
    fn test_materialize_completed_replays() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/lib.rs"]);
        orch.advance(None).unwrap();
        orch.advance(Some(ResponsePayload::new("status"))).unwrap();

        match orch.materialize("status_analysis").unwrap() {
            Materialized::Replayed { response, .. } => assert_eq!(response.as_str(), "status"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_materialize_gated_stage_is_skipped() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/lib.rs"]);
        orch.advance(None).unwrap();
        orch.advance(Some(ResponsePayload::new("status"))).unwrap();
        orch.advance(Some(ResponsePayload::new("coverage"))).unwrap();

        // Already skipped on the way to final consolidation
        assert_eq!(
            orch.materialize("accessibility_analysis").unwrap(),
            Materialized::Skipped {
                stage: "accessibility_analysis".to_string()
            }
        );
    }

    #[test]
    fn test_reopen_discards_dependents() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), &["src/Button.tsx"]);
        orch.advance(None).unwrap();
        orch.advance(Some(ResponsePayload::new("status"))).unwrap();
        orch.advance(Some(ResponsePayload::new("coverage"))).unwrap();

        let discarded = orch.reopen("coverage_analysis").unwrap();
        assert_eq!(
            discarded,
            vec![
                "coverage_analysis",
                "accessibility_analysis",
                "final_consolidation"
            ]
        );
        let s = suspended(orch.advance(None).unwrap());
        assert_eq!(s.stage, "coverage_analysis");
        assert!(!s.resumed);
    }

    #[test]
    fn test_start_propagates_inspection_errors() {
        struct Failing;
        impl ChangeSource for Failing {
            fn changed_paths(&self) -> Result<(ChangeContext, Vec<ChangedPath>)> {
                Err(PipelineError::NoActiveBranch {
                    reason: "detached HEAD".to_string(),
                })
            }
        }

        let dir = tempdir().unwrap();
        let inspector = ChangeSetInspector::new(&InspectorConfig::default()).unwrap();
        let err = Orchestrator::start(&inspector, &Failing, dir.path(), builtin_stages())
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoActiveBranch { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
