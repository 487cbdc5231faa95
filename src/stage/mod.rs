//! Stage contract and the built-in review stages.
//!
//! A stage turns the session so far into a request for an external actor
//! ([`Stage::build_request`]) and folds the actor's response back into the
//! [`SessionState`] ([`Stage::fold_response`]). Stages never talk to each
//! other directly: a stage reads earlier responses through its
//! [`RequestContext`], which refuses forward references.
//!
//! The scheduler only sees `dyn Stage`, so new kinds can be added without
//! touching it.

mod prompts;
mod state;

pub use state::{NarrativeSection, SessionState};

use crate::changeset::ChangeSet;
use crate::errors::{PipelineError, Result};
use crate::session::{StageRecords, StageStatus, status_of};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Request text handed to the external actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestPayload(String);

impl RequestPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Response text supplied by the external actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponsePayload(String);

impl ResponsePayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Read-only inputs to [`Stage::build_request`].
#[derive(Debug)]
pub struct RequestContext<'a> {
    /// Id of the stage building the request
    pub stage: &'a str,
    pub state: &'a SessionState,
    pub change_set: &'a ChangeSet,
    pub records: &'a StageRecords,
    /// Where the external actor should write its response
    pub inbox: &'a Path,
}

impl<'a> RequestContext<'a> {
    /// Response of a completed stage.
    ///
    /// Fails with `DependencyNotReady` for anything not yet completed,
    /// skipped stages included.
    pub fn response_of(&self, dependency: &str) -> Result<&'a str> {
        match self.records.get(dependency) {
            Some(record) if record.status == StageStatus::Completed => record
                .response
                .as_ref()
                .map(|r| r.as_str())
                .ok_or_else(|| self.not_ready(dependency)),
            _ => Err(self.not_ready(dependency)),
        }
    }

    /// Like [`response_of`](Self::response_of), but a skipped stage yields `None`.
    pub fn optional_response_of(&self, dependency: &str) -> Result<Option<&'a str>> {
        if status_of(self.records, dependency) == StageStatus::Skipped {
            return Ok(None);
        }
        self.response_of(dependency).map(Some)
    }

    fn not_ready(&self, dependency: &str) -> PipelineError {
        PipelineError::DependencyNotReady {
            stage: self.stage.to_string(),
            dependency: dependency.to_string(),
        }
    }
}

/// One node in the review pipeline.
pub trait Stage: fmt::Debug {
    /// Stable snake_case identifier; also names the stage's artifacts.
    fn id(&self) -> &str;

    fn title(&self) -> &str;

    /// Ids of the stages that must be completed or skipped first.
    fn depends_on(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Whether the stage applies to this change set. `false` skips it.
    fn gate(&self, _changes: &ChangeSet) -> bool {
        true
    }

    /// Whether an empty response is malformed.
    fn requires_content(&self) -> bool {
        true
    }

    /// Build the request. Deterministic for the same context.
    fn build_request(&self, ctx: &RequestContext<'_>) -> Result<RequestPayload>;

    /// Fold a response into the state.
    fn fold_response(&self, state: SessionState, response: &ResponsePayload)
    -> Result<SessionState>;
}

/// Reject blank responses for stages that require content.
pub fn check_response(stage: &dyn Stage, response: &ResponsePayload) -> Result<()> {
    if stage.requires_content() && response.is_blank() {
        return Err(PipelineError::MalformedResponse {
            stage: stage.id().to_string(),
            reason: "the response is empty".to_string(),
        });
    }
    Ok(())
}

/// The built-in stage kinds, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    StatusAnalysis,
    CoverageAnalysis,
    AccessibilityAnalysis,
    FinalConsolidation,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::StatusAnalysis,
        StageKind::CoverageAnalysis,
        StageKind::AccessibilityAnalysis,
        StageKind::FinalConsolidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::StatusAnalysis => "status_analysis",
            StageKind::CoverageAnalysis => "coverage_analysis",
            StageKind::AccessibilityAnalysis => "accessibility_analysis",
            StageKind::FinalConsolidation => "final_consolidation",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The default review pipeline.
pub fn builtin_stages() -> Vec<Box<dyn Stage>> {
    StageKind::ALL
        .into_iter()
        .map(|k| Box::new(k) as Box<dyn Stage>)
        .collect()
}

impl Stage for StageKind {
    fn id(&self) -> &str {
        self.as_str()
    }

    fn title(&self) -> &str {
        match self {
            StageKind::StatusAnalysis => "PR Status",
            StageKind::CoverageAnalysis => "Test Coverage",
            StageKind::AccessibilityAnalysis => "Accessibility",
            StageKind::FinalConsolidation => "Final Checks",
        }
    }

    fn depends_on(&self) -> Vec<&str> {
        match self {
            StageKind::StatusAnalysis => vec![],
            StageKind::CoverageAnalysis => vec![StageKind::StatusAnalysis.as_str()],
            StageKind::AccessibilityAnalysis => vec![StageKind::CoverageAnalysis.as_str()],
            StageKind::FinalConsolidation => vec![
                StageKind::CoverageAnalysis.as_str(),
                StageKind::AccessibilityAnalysis.as_str(),
            ],
        }
    }

    fn gate(&self, changes: &ChangeSet) -> bool {
        match self {
            StageKind::AccessibilityAnalysis => changes.has_ui_changes(),
            _ => true,
        }
    }

    fn build_request(&self, ctx: &RequestContext<'_>) -> Result<RequestPayload> {
        let changes = ctx.change_set;
        let text = match self {
            StageKind::StatusAnalysis => prompts::status_analysis(changes, ctx.inbox),
            StageKind::CoverageAnalysis => {
                let status = ctx.response_of(StageKind::StatusAnalysis.as_str())?;
                prompts::coverage_analysis(changes, status, ctx.inbox)
            }
            StageKind::AccessibilityAnalysis => {
                let coverage = ctx.response_of(StageKind::CoverageAnalysis.as_str())?;
                prompts::accessibility_analysis(changes, coverage, ctx.inbox)
            }
            StageKind::FinalConsolidation => {
                ctx.response_of(StageKind::StatusAnalysis.as_str())?;
                ctx.response_of(StageKind::CoverageAnalysis.as_str())?;
                let accessibility =
                    ctx.optional_response_of(StageKind::AccessibilityAnalysis.as_str())?;
                prompts::final_consolidation(
                    changes,
                    &ctx.state.render(),
                    accessibility.is_none(),
                    ctx.inbox,
                )
            }
        };
        Ok(RequestPayload::new(text))
    }

    fn fold_response(
        &self,
        state: SessionState,
        response: &ResponsePayload,
    ) -> Result<SessionState> {
        check_response(self, response)?;
        let body = response.as_str().trim();
        let state = state.with_section(self.as_str(), self.title(), body);
        Ok(match self {
            StageKind::CoverageAnalysis => state.with_notes_if_empty(body),
            StageKind::FinalConsolidation => state.with_artifact(body),
            _ => state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{ChangeContext, ChangeKind, ChangeSetInspector, ChangedPath};
    use crate::review_config::InspectorConfig;
    use crate::session::StageRecord;
    use chrono::Utc;

    fn changes(paths: &[&str]) -> ChangeSet {
        let inspector = ChangeSetInspector::new(&InspectorConfig::default()).unwrap();
        let context = ChangeContext {
            branch: Some("feature/login".to_string()),
            base: "origin/main".to_string(),
        };
        inspector.classify(
            context,
            paths
                .iter()
                .map(|p| ChangedPath::new(*p, ChangeKind::Modified))
                .collect(),
        )
    }

    fn completed(records: &mut StageRecords, stage: StageKind, response: &str) {
        let now = Utc::now();
        records.insert(
            stage.as_str().to_string(),
            StageRecord::awaiting(stage.as_str(), RequestPayload::new("req"), now)
                .complete(ResponsePayload::new(response), now),
        );
    }

    fn build(
        stage: StageKind,
        changes: &ChangeSet,
        records: &StageRecords,
    ) -> Result<RequestPayload> {
        let state = SessionState::new();
        let ctx = RequestContext {
            stage: stage.as_str(),
            state: &state,
            change_set: changes,
            records,
            inbox: Path::new(".pr_review/feature-login/out.md"),
        };
        stage.build_request(&ctx)
    }

    #[test]
    fn test_accessibility_gate() {
        let stage = StageKind::AccessibilityAnalysis;
        assert!(stage.gate(&changes(&["src/Button.tsx", "src/Button.test.tsx"])));
        assert!(!stage.gate(&changes(&["src/lib.rs", "src/Button.test.tsx"])));
        assert!(!stage.gate(&changes(&[])));
        assert!(StageKind::StatusAnalysis.gate(&changes(&[])));
    }

    #[test]
    fn test_status_request_lists_files() {
        let cs = changes(&["src/Button.tsx", "README.md"]);
        let request = build(StageKind::StatusAnalysis, &cs, &StageRecords::new()).unwrap();
        let text = request.as_str();
        assert!(text.contains("# PR Status Check"));
        assert!(text.contains("feature/login"));
        assert!(text.contains("origin/main"));
        assert!(text.contains("- `M` src/Button.tsx"));
        assert!(text.contains("### docs"));
        assert!(text.contains(".pr_review/feature-login/out.md"));
    }

    #[test]
    fn test_request_is_deterministic() {
        let cs = changes(&["src/Button.tsx"]);
        let mut records = StageRecords::new();
        completed(&mut records, StageKind::StatusAnalysis, "status ok");
        let a = build(StageKind::CoverageAnalysis, &cs, &records).unwrap();
        let b = build(StageKind::CoverageAnalysis, &cs, &records).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().contains("status ok"));
    }

    #[test]
    fn test_forward_reference_fails() {
        let cs = changes(&["src/Button.tsx"]);
        let err = build(StageKind::CoverageAnalysis, &cs, &StageRecords::new()).unwrap_err();
        match err {
            PipelineError::DependencyNotReady { stage, dependency } => {
                assert_eq!(stage, "coverage_analysis");
                assert_eq!(dependency, "status_analysis");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_awaiting_dependency_is_not_ready() {
        let cs = changes(&["src/lib.rs"]);
        let mut records = StageRecords::new();
        records.insert(
            "status_analysis".to_string(),
            StageRecord::awaiting("status_analysis", RequestPayload::new("r"), Utc::now()),
        );
        assert!(matches!(
            build(StageKind::CoverageAnalysis, &cs, &records),
            Err(PipelineError::DependencyNotReady { .. })
        ));
    }

    #[test]
    fn test_final_tolerates_skipped_accessibility() {
        let cs = changes(&["src/lib.rs"]);
        let mut records = StageRecords::new();
        completed(&mut records, StageKind::StatusAnalysis, "status");
        completed(&mut records, StageKind::CoverageAnalysis, "coverage");
        records.insert(
            "accessibility_analysis".to_string(),
            StageRecord::skipped("accessibility_analysis", Utc::now()),
        );

        let request = build(StageKind::FinalConsolidation, &cs, &records).unwrap();
        assert!(request.as_str().contains("Skipped: no UI changes"));
    }

    #[test]
    fn test_final_request_carries_narrative() {
        let cs = changes(&["src/Button.tsx"]);
        let mut records = StageRecords::new();
        completed(&mut records, StageKind::StatusAnalysis, "status body");
        completed(&mut records, StageKind::CoverageAnalysis, "coverage body");
        completed(&mut records, StageKind::AccessibilityAnalysis, "a11y body");

        let mut state = SessionState::new();
        for kind in [
            StageKind::StatusAnalysis,
            StageKind::CoverageAnalysis,
            StageKind::AccessibilityAnalysis,
        ] {
            let body = records[kind.as_str()].response.clone().unwrap();
            state = kind.fold_response(state, &body).unwrap();
        }

        let ctx = RequestContext {
            stage: StageKind::FinalConsolidation.as_str(),
            state: &state,
            change_set: &cs,
            records: &records,
            inbox: Path::new("out.md"),
        };
        let request = StageKind::FinalConsolidation.build_request(&ctx).unwrap();
        let text = request.as_str();
        assert!(text.contains(&state.render()));
        assert!(text.contains("### Test Coverage\n\ncoverage body"));
        assert!(text.contains("a11y body"));
        assert!(!text.contains("Skipped: no UI changes"));
    }

    #[test]
    fn test_final_replaces_artifact() {
        let state = SessionState::new().with_artifact("earlier draft");
        let state = StageKind::FinalConsolidation
            .fold_response(state, &ResponsePayload::new("checklist"))
            .unwrap();
        assert_eq!(state.artifact(), Some("checklist"));
    }

    #[test]
    fn test_final_requires_coverage() {
        let cs = changes(&["src/lib.rs"]);
        let mut records = StageRecords::new();
        completed(&mut records, StageKind::StatusAnalysis, "status");
        records.insert(
            "coverage_analysis".to_string(),
            StageRecord::skipped("coverage_analysis", Utc::now()),
        );
        assert!(matches!(
            build(StageKind::FinalConsolidation, &cs, &records),
            Err(PipelineError::DependencyNotReady { .. })
        ));
    }

    #[test]
    fn test_fold_appends_and_sets_fields() {
        let state = SessionState::new();
        let state = StageKind::StatusAnalysis
            .fold_response(state, &ResponsePayload::new("status body\n"))
            .unwrap();
        let state = StageKind::CoverageAnalysis
            .fold_response(state, &ResponsePayload::new("coverage body"))
            .unwrap();
        let state = StageKind::FinalConsolidation
            .fold_response(state, &ResponsePayload::new("checklist"))
            .unwrap();

        assert_eq!(state.narrative().len(), 3);
        assert_eq!(state.section("status_analysis").unwrap().body, "status body");
        assert_eq!(state.notes(), Some("coverage body"));
        assert_eq!(state.artifact(), Some("checklist"));
    }

    #[test]
    fn test_fold_rejects_blank_response() {
        let err = StageKind::StatusAnalysis
            .fold_response(SessionState::new(), &ResponsePayload::new("  \n"))
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("status_analysis"));
    }

    #[test]
    fn test_stage_kind_ids() {
        for kind in StageKind::ALL {
            assert_eq!(kind.to_string(), kind.id());
        }
        let ids: Vec<_> = builtin_stages().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "status_analysis",
                "coverage_analysis",
                "accessibility_analysis",
                "final_consolidation"
            ]
        );
    }
}
