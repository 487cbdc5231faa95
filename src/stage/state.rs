use serde::{Deserialize, Serialize};

/// One stage's contribution to the narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeSection {
    pub stage: String,
    pub title: String,
    pub body: String,
}

/// Accumulated result of folding stage responses.
///
/// Values are threaded through [`Stage::fold_response`](super::Stage::fold_response)
/// by value. The narrative only grows. `notes` is set at most once through
/// [`with_notes_if_empty`](Self::with_notes_if_empty); `artifact` changes only
/// through the explicit replace of [`with_artifact`](Self::with_artifact).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    narrative: Vec<NarrativeSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn narrative(&self) -> &[NarrativeSection] {
        &self.narrative
    }

    /// Final deliverable, e.g. the consolidated checklist.
    pub fn artifact(&self) -> Option<&str> {
        self.artifact.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Section written by `stage`, if it has been folded.
    pub fn section(&self, stage: &str) -> Option<&NarrativeSection> {
        self.narrative.iter().find(|s| s.stage == stage)
    }

    pub fn with_section(
        mut self,
        stage: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        self.narrative.push(NarrativeSection {
            stage: stage.into(),
            title: title.into(),
            body: body.into(),
        });
        self
    }

    /// Replace the artifact, whatever it held before.
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn with_notes_if_empty(mut self, notes: impl Into<String>) -> Self {
        if self.notes.is_none() {
            self.notes = Some(notes.into());
        }
        self
    }

    /// Render the narrative as markdown, one `###` heading per section.
    pub fn render(&self) -> String {
        self.narrative
            .iter()
            .map(|s| format!("### {}\n\n{}\n", s.title, s.body.trim_end()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
