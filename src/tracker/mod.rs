//! Sources of changed paths.
//!
//! The engine never resolves branches or remotes itself. It asks a
//! [`ChangeSource`] for a resolved base and the ordered changed paths, and
//! gets back either that pair or a `NoActiveBranch` / `InspectionIo` error.

mod git;

pub use git::GitChangeSource;

use crate::changeset::{ChangeContext, ChangedPath};
use crate::errors::Result;

/// A version-control collaborator that reports what changed.
pub trait ChangeSource {
    /// The resolved base and changed paths relative to it, in a stable order.
    fn changed_paths(&self) -> Result<(ChangeContext, Vec<ChangedPath>)>;
}

/// A fixed list of changes, for callers that compute the diff elsewhere.
#[derive(Debug, Clone, Default)]
pub struct StaticChangeSource {
    pub context: ChangeContext,
    pub paths: Vec<ChangedPath>,
}

impl StaticChangeSource {
    pub fn new(context: ChangeContext, paths: Vec<ChangedPath>) -> Self {
        Self { context, paths }
    }
}

impl ChangeSource for StaticChangeSource {
    fn changed_paths(&self) -> Result<(ChangeContext, Vec<ChangedPath>)> {
        Ok((self.context.clone(), self.paths.clone()))
    }
}
