//! Classification of changed paths into categories and a risk level.
//!
//! [`ChangeSetInspector::classify`] is a pure function of the changed-path
//! list and the compiled patterns: identical input always yields an
//! identical [`ChangeSet`].

use super::{
    Category, CategoryCounts, ChangeContext, ChangeKind, ChangeSet, ChangedPath, ClassifiedPath,
    RiskLevel,
};
use crate::errors::{PipelineError, Result};
use crate::review_config::InspectorConfig;
use crate::tracker::ChangeSource;
use glob::{MatchOptions, Pattern};
use tracing::debug;

/// A compiled set of glob patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Compile patterns, failing on the first invalid one.
    pub fn compile(group: &str, patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    PipelineError::Other(anyhow::anyhow!(
                        "Invalid {} pattern '{}': {}. Fix it in .pr_review/review.toml",
                        group,
                        p,
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, path: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        self.patterns
            .iter()
            .any(|p| p.matches_with(path, options))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Derives a [`ChangeSet`] from changed paths using configured patterns.
#[derive(Debug, Clone)]
pub struct ChangeSetInspector {
    ui: PatternSet,
    test: PatternSet,
    docs: PatternSet,
    config: PatternSet,
    change_count_threshold: usize,
}

impl ChangeSetInspector {
    pub fn new(config: &InspectorConfig) -> Result<Self> {
        Ok(Self {
            ui: PatternSet::compile("ui", &config.ui_patterns)?,
            test: PatternSet::compile("test", &config.test_patterns)?,
            docs: PatternSet::compile("doc", &config.doc_patterns)?,
            config: PatternSet::compile("config", &config.config_patterns)?,
            change_count_threshold: config.change_count_threshold,
        })
    }

    /// Query the collaborator for changed paths and classify them.
    ///
    /// Collaborator failures (`InspectionIo`, `NoActiveBranch`) pass through
    /// untouched; nothing is persisted here.
    pub fn inspect(&self, source: &dyn ChangeSource) -> Result<ChangeSet> {
        let (context, paths) = source.changed_paths()?;
        debug!(base = %context.base, count = paths.len(), "Inspecting change set");
        Ok(self.classify(context, paths))
    }

    /// Categorize a single path.
    ///
    /// Test patterns win over UI patterns, so `Button.test.tsx` is a test
    /// even though it also matches `*.tsx`.
    pub fn categorize(&self, path: &str) -> Category {
        if self.test.matches(path) {
            Category::Test
        } else if self.ui.matches(path) {
            Category::Ui
        } else if self.docs.matches(path) {
            Category::Docs
        } else if self.config.matches(path) {
            Category::Config
        } else {
            Category::Other
        }
    }

    /// Build the immutable change set. Pure: no I/O, no clock.
    pub fn classify(&self, context: ChangeContext, paths: Vec<ChangedPath>) -> ChangeSet {
        let mut counts = CategoryCounts::default();
        let classified: Vec<ClassifiedPath> = paths
            .into_iter()
            .map(|p| {
                let category = self.categorize(&p.path);
                counts.add(category);
                ClassifiedPath {
                    path: p.path,
                    kind: p.kind,
                    category,
                }
            })
            .collect();

        let risk = self.score(&classified, &counts);
        ChangeSet::new(context, classified, counts, risk)
    }

    fn score(&self, paths: &[ClassifiedPath], counts: &CategoryCounts) -> RiskLevel {
        let deletes_non_test = paths
            .iter()
            .any(|p| p.kind == ChangeKind::Deleted && p.category != Category::Test);

        if deletes_non_test || paths.len() > self.change_count_threshold {
            RiskLevel::High
        } else if counts.ui > 0 || counts.config > 0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspector() -> ChangeSetInspector {
        ChangeSetInspector::new(&InspectorConfig::default()).unwrap()
    }

    fn classify(paths: &[(&str, ChangeKind)]) -> ChangeSet {
        let paths = paths
            .iter()
            .map(|(p, k)| ChangedPath::new(*p, *k))
            .collect();
        inspector().classify(ChangeContext::default(), paths)
    }

    #[test]
    fn test_button_scenario() {
        let cs = classify(&[
            ("src/Button.tsx", ChangeKind::Modified),
            ("src/Button.test.tsx", ChangeKind::Added),
        ]);
        assert_eq!(cs.counts().ui, 1);
        assert_eq!(cs.counts().test, 1);
        assert_eq!(cs.counts().total(), 2);
        assert!(cs.has_ui_changes());
        assert_eq!(cs.paths()[0].category, Category::Ui);
        assert_eq!(cs.paths()[1].category, Category::Test);
    }

    #[test]
    fn test_categorize_defaults() {
        let i = inspector();
        assert_eq!(i.categorize("web/styles/main.css"), Category::Ui);
        assert_eq!(i.categorize("src/components/Nav.ts"), Category::Ui);
        assert_eq!(i.categorize("tests/integration.rs"), Category::Test);
        assert_eq!(i.categorize("pkg/server_test.go"), Category::Test);
        assert_eq!(i.categorize("README.md"), Category::Docs);
        assert_eq!(i.categorize("docs/guide/setup.txt"), Category::Docs);
        assert_eq!(i.categorize("Cargo.toml"), Category::Config);
        assert_eq!(i.categorize(".github/workflows/ci.yml"), Category::Config);
        assert_eq!(i.categorize("src/lib.rs"), Category::Other);
    }

    #[test]
    fn test_order_is_preserved() {
        let cs = classify(&[
            ("z.rs", ChangeKind::Modified),
            ("a.rs", ChangeKind::Added),
        ]);
        let order: Vec<_> = cs.paths().iter().map(|p| p.path.as_str()).collect();
        assert_eq!(order, vec!["z.rs", "a.rs"]);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let input = [
            ("src/App.vue", ChangeKind::Modified),
            ("config/app.yml", ChangeKind::Added),
            ("src/old.rs", ChangeKind::Deleted),
        ];
        assert_eq!(classify(&input), classify(&input));
    }

    #[test]
    fn test_risk_low_for_plain_source() {
        let cs = classify(&[("src/lib.rs", ChangeKind::Modified)]);
        assert_eq!(cs.risk(), RiskLevel::Low);
    }

    #[test]
    fn test_risk_low_for_empty() {
        assert_eq!(classify(&[]).risk(), RiskLevel::Low);
    }

    #[test]
    fn test_risk_medium_for_ui_or_config() {
        assert_eq!(
            classify(&[("src/App.jsx", ChangeKind::Modified)]).risk(),
            RiskLevel::Medium
        );
        assert_eq!(
            classify(&[("Cargo.toml", ChangeKind::Modified)]).risk(),
            RiskLevel::Medium
        );
    }

    #[test]
    fn test_risk_high_for_deleted_non_test() {
        let cs = classify(&[("src/legacy.rs", ChangeKind::Deleted)]);
        assert_eq!(cs.risk(), RiskLevel::High);
    }

    #[test]
    fn test_deleted_test_file_is_not_high() {
        let cs = classify(&[("src/legacy.test.ts", ChangeKind::Deleted)]);
        assert_eq!(cs.risk(), RiskLevel::Low);
    }

    #[test]
    fn test_risk_high_over_threshold() {
        let config = InspectorConfig {
            change_count_threshold: 2,
            ..Default::default()
        };
        let inspector = ChangeSetInspector::new(&config).unwrap();
        let paths = (0..3)
            .map(|i| ChangedPath::new(format!("src/m{}.rs", i), ChangeKind::Modified))
            .collect();
        let cs = inspector.classify(ChangeContext::default(), paths);
        assert_eq!(cs.risk(), RiskLevel::High);

        // Exactly at the threshold is not over it
        let paths = (0..2)
            .map(|i| ChangedPath::new(format!("src/m{}.rs", i), ChangeKind::Modified))
            .collect();
        let cs = inspector.classify(ChangeContext::default(), paths);
        assert_eq!(cs.risk(), RiskLevel::Low);
    }

    #[test]
    fn test_adding_deleted_non_test_never_lowers_risk() {
        let bases: Vec<Vec<(&str, ChangeKind)>> = vec![
            vec![],
            vec![("src/lib.rs", ChangeKind::Modified)],
            vec![("src/App.tsx", ChangeKind::Modified)],
            vec![("Cargo.toml", ChangeKind::Added)],
            vec![("src/a.test.ts", ChangeKind::Deleted)],
        ];
        for base in bases {
            let before = classify(&base).risk();
            let mut extended = base.clone();
            extended.push(("src/removed.rs", ChangeKind::Deleted));
            let after = classify(&extended).risk();
            assert!(after >= before, "risk dropped for {:?}", base);
            assert_eq!(after, RiskLevel::High);
        }
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let config = InspectorConfig {
            ui_patterns: vec!["[oops".to_string()],
            ..Default::default()
        };
        let err = ChangeSetInspector::new(&config).unwrap_err();
        assert!(err.to_string().contains("[oops"));
        assert!(err.to_string().contains("review.toml"));
    }

    #[test]
    fn test_custom_patterns() {
        let config = InspectorConfig {
            ui_patterns: vec!["*.elm".to_string()],
            test_patterns: vec![],
            ..Default::default()
        };
        let inspector = ChangeSetInspector::new(&config).unwrap();
        assert_eq!(inspector.categorize("src/Main.elm"), Category::Ui);
        assert_eq!(inspector.categorize("src/Button.tsx"), Category::Other);
    }
}
