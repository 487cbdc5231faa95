//! File configuration for prereview.
//!
//! Reads `.pr_review/review.toml`. Every key is optional and falls back to a
//! built-in default, so a missing file is the same as an empty one.
//!
//! # Configuration File Format
//!
//! ```toml
//! [inspector]
//! ui_patterns = ["*.tsx", "*.jsx", "*.vue", "*.css"]
//! test_patterns = ["*.test.*", "*.spec.*", "*__tests__*"]
//! doc_patterns = ["*.md", "docs/*"]
//! config_patterns = ["*.toml", "*.yml", "*.json"]
//! change_count_threshold = 20
//!
//! [repository]
//! base_candidates = ["origin/main", "origin/master", "main", "master"]
//! include_uncommitted = false
//! ```
//!
//! The inspector keys also accept their camelCase spellings (`uiPatterns`,
//! `changeCountThreshold`, ...).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the config file inside the review directory.
pub const CONFIG_FILE: &str = "review.toml";

/// Path patterns and thresholds used to classify a change set.
///
/// Patterns are shell-style globs matched against the repository-relative
/// path. `*` crosses directory separators, so `*.tsx` matches `src/Button.tsx`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectorConfig {
    #[serde(default = "default_ui_patterns", alias = "uiPatterns")]
    pub ui_patterns: Vec<String>,
    #[serde(default = "default_test_patterns", alias = "testPatterns")]
    pub test_patterns: Vec<String>,
    #[serde(default = "default_doc_patterns", alias = "docPatterns")]
    pub doc_patterns: Vec<String>,
    #[serde(default = "default_config_patterns", alias = "configPatterns")]
    pub config_patterns: Vec<String>,
    /// More changed files than this makes the change set high risk
    #[serde(
        default = "default_change_count_threshold",
        alias = "changeCountThreshold"
    )]
    pub change_count_threshold: usize,
}

fn to_strings(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

fn default_ui_patterns() -> Vec<String> {
    to_strings(&[
        "*.tsx",
        "*.jsx",
        "*.vue",
        "*.svelte",
        "*.html",
        "*.css",
        "*.scss",
        "*.sass",
        "*.less",
        "*/components/*",
    ])
}

fn default_test_patterns() -> Vec<String> {
    to_strings(&[
        "*.test.*",
        "*.spec.*",
        "*__tests__*",
        "tests/*",
        "*/tests/*",
        "test/*",
        "*/test/*",
        "*test_*.py",
        "*_test.go",
        "*_test.py",
    ])
}

fn default_doc_patterns() -> Vec<String> {
    to_strings(&["*.md", "*.mdx", "*.rst", "*.adoc", "docs/*", "*/docs/*"])
}

fn default_config_patterns() -> Vec<String> {
    to_strings(&[
        "*.toml",
        "*.yaml",
        "*.yml",
        "*.json",
        "*.ini",
        "*.cfg",
        "*.env",
        "*.env.*",
        ".env*",
        "*Dockerfile",
        "*.lock",
    ])
}

fn default_change_count_threshold() -> usize {
    20
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            ui_patterns: default_ui_patterns(),
            test_patterns: default_test_patterns(),
            doc_patterns: default_doc_patterns(),
            config_patterns: default_config_patterns(),
            change_count_threshold: default_change_count_threshold(),
        }
    }
}

/// Settings for resolving the base reference of the review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Base references tried in order until one resolves
    #[serde(default = "default_base_candidates", alias = "baseCandidates")]
    pub base_candidates: Vec<String>,
    /// Also diff staged and unstaged work, not just commits
    #[serde(default, alias = "includeUncommitted")]
    pub include_uncommitted: bool,
}

fn default_base_candidates() -> Vec<String> {
    to_strings(&["origin/main", "origin/master", "main", "master"])
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_candidates: default_base_candidates(),
            include_uncommitted: false,
        }
    }
}

/// The complete review.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewToml {
    #[serde(default)]
    pub inspector: InspectorConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
}

impl ReviewToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse review.toml")
    }

    /// Load `review.toml` from the review directory, or defaults if absent.
    pub fn load_or_default(review_dir: &Path) -> Result<Self> {
        let config_path = review_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize review.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let groups = [
            ("ui_patterns", &self.inspector.ui_patterns),
            ("test_patterns", &self.inspector.test_patterns),
            ("doc_patterns", &self.inspector.doc_patterns),
            ("config_patterns", &self.inspector.config_patterns),
        ];
        for (name, patterns) in groups {
            for pattern in patterns.iter() {
                if let Err(e) = glob::Pattern::new(pattern) {
                    warnings.push(format!("Invalid pattern '{}' in {}: {}", pattern, name, e));
                }
            }
        }

        if self.inspector.change_count_threshold == 0 {
            warnings.push(
                "change_count_threshold is 0: every non-empty change set will be high risk"
                    .to_string(),
            );
        }

        if self.repository.base_candidates.is_empty() {
            warnings.push(
                "repository.base_candidates is empty: pass --base on every run".to_string(),
            );
        }

        warnings
    }
}
