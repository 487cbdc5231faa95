use super::ChangeSource;
use crate::changeset::{ChangeContext, ChangeKind, ChangedPath};
use crate::config::REVIEW_DIR;
use crate::errors::{PipelineError, Result};
use crate::review_config::RepositoryConfig;
use git2::{Delta, DiffFindOptions, DiffOptions, ErrorCode, Repository};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads changed paths from a git repository with libgit2.
pub struct GitChangeSource {
    repo: Repository,
    workdir: PathBuf,
    base_candidates: Vec<String>,
    base_override: Option<String>,
    include_uncommitted: bool,
}

impl GitChangeSource {
    /// Open the repository containing `project_dir`.
    pub fn open(project_dir: &Path, config: &RepositoryConfig) -> Result<Self> {
        let repo = Repository::discover(project_dir).map_err(|e| io_error(project_dir, &e))?;
        Ok(Self {
            repo,
            workdir: project_dir.to_path_buf(),
            base_candidates: config.base_candidates.clone(),
            base_override: None,
            include_uncommitted: config.include_uncommitted,
        })
    }

    /// Use `base` instead of trying the configured candidates.
    pub fn with_base(mut self, base: Option<String>) -> Self {
        self.base_override = base;
        self
    }

    /// The checked-out branch name, `None` when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                return Err(PipelineError::NoActiveBranch {
                    reason: "the current branch has no commits yet".to_string(),
                });
            }
            Err(e) => return Err(io_error(&self.workdir, &e)),
        };
        if head.is_branch() {
            Ok(head.shorthand().map(String::from))
        } else {
            Ok(None)
        }
    }

    /// Resolve the base reference to diff against.
    fn resolve_base(&self, branch: Option<&str>) -> Result<(String, git2::Commit<'_>)> {
        if let Some(base) = &self.base_override {
            let commit = self
                .repo
                .revparse_single(base)
                .and_then(|obj| obj.peel_to_commit())
                .map_err(|_| PipelineError::NoActiveBranch {
                    reason: format!("base reference '{}' does not resolve", base),
                })?;
            return Ok((base.clone(), commit));
        }

        for candidate in &self.base_candidates {
            // Diffing a branch against itself tells us nothing
            if Some(candidate.as_str()) == branch {
                continue;
            }
            if let Ok(commit) = self
                .repo
                .revparse_single(candidate)
                .and_then(|obj| obj.peel_to_commit())
            {
                debug!(base = %candidate, "Resolved base reference");
                return Ok((candidate.clone(), commit));
            }
        }

        let reason = match branch {
            None => format!(
                "HEAD is detached and none of the base references {:?} resolve",
                self.base_candidates
            ),
            Some(b) => format!(
                "branch '{}' has no base: none of {:?} resolve",
                b, self.base_candidates
            ),
        };
        Err(PipelineError::NoActiveBranch { reason })
    }
}

impl ChangeSource for GitChangeSource {
    fn changed_paths(&self) -> Result<(ChangeContext, Vec<ChangedPath>)> {
        let branch = self.current_branch()?;
        let (base, base_commit) = self.resolve_base(branch.as_deref())?;

        let head_commit = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| io_error(&self.workdir, &e))?;

        // Compare against the fork point, like `git diff base...HEAD`
        let fork_commit = match self.repo.merge_base(base_commit.id(), head_commit.id()) {
            Ok(oid) => self
                .repo
                .find_commit(oid)
                .map_err(|e| io_error(&self.workdir, &e))?,
            Err(_) => {
                debug!(base = %base, "No merge base, diffing against base tip");
                base_commit
            }
        };
        let fork_tree = fork_commit
            .tree()
            .map_err(|e| io_error(&self.workdir, &e))?;

        let mut opts = DiffOptions::new();
        let mut diff = if self.include_uncommitted {
            opts.include_untracked(true).recurse_untracked_dirs(true);
            self.repo
                .diff_tree_to_workdir_with_index(Some(&fork_tree), Some(&mut opts))
        } else {
            let head_tree = head_commit
                .tree()
                .map_err(|e| io_error(&self.workdir, &e))?;
            self.repo
                .diff_tree_to_tree(Some(&fork_tree), Some(&head_tree), Some(&mut opts))
        }
        .map_err(|e| io_error(&self.workdir, &e))?;

        let mut find = DiffFindOptions::new();
        find.renames(true);
        diff.find_similar(Some(&mut find))
            .map_err(|e| io_error(&self.workdir, &e))?;

        let mut paths = Vec::new();
        for delta in diff.deltas() {
            let (kind, file) = match delta.status() {
                Delta::Added | Delta::Untracked => (ChangeKind::Added, delta.new_file()),
                Delta::Modified | Delta::Typechange => (ChangeKind::Modified, delta.new_file()),
                Delta::Deleted => (ChangeKind::Deleted, delta.old_file()),
                Delta::Renamed | Delta::Copied => (ChangeKind::Renamed, delta.new_file()),
                _ => continue,
            };
            let Some(path) = file.path() else {
                continue;
            };
            let path = path.to_string_lossy().replace('\\', "/");
            // Session artifacts are not part of the reviewed changes
            if path.split('/').any(|c| c == REVIEW_DIR) {
                continue;
            }
            paths.push(ChangedPath::new(path, kind));
        }

        Ok((ChangeContext { branch, base }, paths))
    }
}

fn io_error(path: &Path, err: &git2::Error) -> PipelineError {
    PipelineError::InspectionIo {
        path: path.to_path_buf(),
        message: err.message().to_string(),
    }
}
