use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::changeset::ChangeSetInspector;
use crate::orchestrator::Orchestrator;
use crate::review_config::{CONFIG_FILE, ReviewToml};
use crate::session::{SessionLocator, SessionStore};
use crate::stage::builtin_stages;
use crate::tracker::GitChangeSource;

/// Directory under the project root that holds config and sessions.
pub const REVIEW_DIR: &str = ".pr_review";

/// Get the review directory for a project.
pub fn get_review_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(REVIEW_DIR)
}

/// Runtime configuration for prereview.
///
/// Bridges `review.toml` with the resolved project paths and the CLI
/// overrides. Layering is defaults, then the file, then flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub review_dir: PathBuf,
    pub config_file: PathBuf,
    pub verbose: bool,
    /// `--base`, bypassing `repository.base_candidates`
    pub base_override: Option<String>,
    review: ReviewToml,
}

impl Config {
    pub fn new(
        project_dir: PathBuf,
        verbose: bool,
        base_override: Option<String>,
        threshold: Option<usize>,
    ) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let review_dir = get_review_dir(&project_dir);
        let config_file = review_dir.join(CONFIG_FILE);

        let mut review = ReviewToml::load_or_default(&review_dir)?;
        if let Some(threshold) = threshold {
            review.inspector.change_count_threshold = threshold;
        }

        Ok(Self {
            project_dir,
            review_dir,
            config_file,
            verbose,
            base_override,
            review,
        })
    }

    /// Effective file configuration, CLI overrides applied.
    pub fn review(&self) -> &ReviewToml {
        &self.review
    }

    pub fn inspector(&self) -> Result<ChangeSetInspector> {
        Ok(ChangeSetInspector::new(&self.review.inspector)?)
    }

    pub fn change_source(&self) -> Result<GitChangeSource> {
        let source = GitChangeSource::open(&self.project_dir, &self.review.repository)?;
        Ok(source.with_base(self.base_override.clone()))
    }

    /// Inspect the repository and open the session for the current branch.
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let inspector = self.inspector()?;
        let source = self.change_source()?;
        let orchestrator =
            Orchestrator::start(&inspector, &source, &self.review_dir, builtin_stages())?;
        Ok(orchestrator)
    }

    /// Session store of the current branch. Only reads HEAD, so it works
    /// when the base reference does not resolve.
    pub fn session_store(&self) -> Result<SessionStore> {
        let branch = self.change_source()?.current_branch()?;
        let locator = SessionLocator::for_context(&self.review_dir, branch.as_deref());
        Ok(SessionStore::new(locator))
    }

    /// Every session directory under the review directory, sorted.
    pub fn session_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.review_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.review_dir)
            .with_context(|| format!("Failed to read {}", self.review_dir.display()))?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        Ok(dirs)
    }
}
