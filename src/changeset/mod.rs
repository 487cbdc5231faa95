//! Change set model for the review pipeline.
//!
//! A [`ChangeSet`] is an immutable snapshot of what changed on the reviewed
//! branch relative to its base: the ordered changed paths, how many fall into
//! each [`Category`], and a coarse [`RiskLevel`]. It is built once per run by
//! [`ChangeSetInspector`] and only read afterwards.

mod inspector;

pub use inspector::{ChangeSetInspector, PatternSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// How a path changed relative to the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    /// Single-letter marker in the style of `git status --short`.
    pub fn marker(&self) -> char {
        match self {
            ChangeKind::Added => 'A',
            ChangeKind::Modified => 'M',
            ChangeKind::Deleted => 'D',
            ChangeKind::Renamed => 'R',
        }
    }
}

/// A changed path as reported by the version-control collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPath {
    /// Repository-relative path, `/`-separated
    pub path: String,
    pub kind: ChangeKind,
}

impl ChangedPath {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Classification label for a changed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Ui,
    Test,
    Docs,
    Config,
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Ui => write!(f, "ui"),
            Category::Test => write!(f, "test"),
            Category::Docs => write!(f, "docs"),
            Category::Config => write!(f, "config"),
            Category::Other => write!(f, "other"),
        }
    }
}

/// Per-category counts of changed paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub ui: usize,
    pub test: usize,
    pub docs: usize,
    pub config: usize,
    pub other: usize,
}

impl CategoryCounts {
    pub fn add(&mut self, category: Category) {
        match category {
            Category::Ui => self.ui += 1,
            Category::Test => self.test += 1,
            Category::Docs => self.docs += 1,
            Category::Config => self.config += 1,
            Category::Other => self.other += 1,
        }
    }

    pub fn get(&self, category: Category) -> usize {
        match category {
            Category::Ui => self.ui,
            Category::Test => self.test,
            Category::Docs => self.docs,
            Category::Config => self.config,
            Category::Other => self.other,
        }
    }

    pub fn total(&self) -> usize {
        self.ui + self.test + self.docs + self.config + self.other
    }
}

/// Coarse risk score. Ordered: `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// The base the change set was computed against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeContext {
    /// Checked-out branch, `None` for a detached HEAD
    pub branch: Option<String>,
    /// Resolved base reference (e.g. `origin/main`)
    pub base: String,
}

/// A changed path together with its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedPath {
    pub path: String,
    pub kind: ChangeKind,
    pub category: Category,
}

/// Immutable snapshot of the reviewed changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    context: ChangeContext,
    paths: Vec<ClassifiedPath>,
    counts: CategoryCounts,
    risk: RiskLevel,
}

impl ChangeSet {
    pub(crate) fn new(
        context: ChangeContext,
        paths: Vec<ClassifiedPath>,
        counts: CategoryCounts,
        risk: RiskLevel,
    ) -> Self {
        Self {
            context,
            paths,
            counts,
            risk,
        }
    }

    pub fn context(&self) -> &ChangeContext {
        &self.context
    }

    pub fn branch(&self) -> Option<&str> {
        self.context.branch.as_deref()
    }

    pub fn base(&self) -> &str {
        &self.context.base
    }

    /// Changed paths in the order the collaborator reported them.
    pub fn paths(&self) -> &[ClassifiedPath] {
        &self.paths
    }

    pub fn counts(&self) -> &CategoryCounts {
        &self.counts
    }

    pub fn risk(&self) -> RiskLevel {
        self.risk
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether at least one changed path is UI.
    pub fn has_ui_changes(&self) -> bool {
        self.counts.ui > 0
    }

    /// Paths in a given category.
    pub fn paths_in(&self, category: Category) -> impl Iterator<Item = &ClassifiedPath> {
        self.paths.iter().filter(move |p| p.category == category)
    }

    /// Stable fingerprint of the base and the changed paths.
    ///
    /// Used to tell whether a session was started against the same changes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.context.base.as_bytes());
        for p in &self.paths {
            hasher.update([0u8]);
            hasher.update(p.path.as_bytes());
            hasher.update([p.kind.marker() as u8]);
        }
        let result = hasher.finalize();
        format!("{:x}", result)[..16].to_string()
    }

    /// One-line summary, e.g. `5 files (ui 2, test 1, other 2), risk medium`.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = [
            Category::Ui,
            Category::Test,
            Category::Docs,
            Category::Config,
            Category::Other,
        ]
        .into_iter()
        .filter(|c| self.counts.get(*c) > 0)
        .map(|c| format!("{} {}", c, self.counts.get(c)))
        .collect();

        let files = if self.paths.len() == 1 { "file" } else { "files" };
        if parts.is_empty() {
            format!("0 files, risk {}", self.risk)
        } else {
            format!(
                "{} {} ({}), risk {}",
                self.paths.len(),
                files,
                parts.join(", "),
                self.risk
            )
        }
    }
}
