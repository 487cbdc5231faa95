//! Markdown request bodies for the built-in stages.
//!
//! Every builder is a pure function of its inputs so the same session always
//! produces byte-identical requests.

use crate::changeset::{Category, ChangeSet};
use std::fmt::Write;
use std::path::Path;

const CATEGORIES: [Category; 5] = [
    Category::Ui,
    Category::Test,
    Category::Docs,
    Category::Config,
    Category::Other,
];

/// Shared header: title, branch, base, risk and the categorized file list.
fn header(title: &str, changes: &ChangeSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", title);
    let _ = writeln!(
        out,
        "**Branch:** {}",
        changes.branch().unwrap_or("(detached HEAD)")
    );
    let _ = writeln!(out, "**Base:** {}", changes.base());
    let _ = writeln!(out, "**Risk:** {}", changes.risk());
    let _ = writeln!(out, "**Summary:** {}\n", changes.summary());

    out.push_str("## Changed Files\n\n");
    if changes.is_empty() {
        out.push_str("(no changes detected against the base)\n");
    }
    for category in CATEGORIES {
        let mut paths = changes.paths_in(category).peekable();
        if paths.peek().is_none() {
            continue;
        }
        let _ = writeln!(out, "### {}\n", category);
        for p in paths {
            let _ = writeln!(out, "- `{}` {}", p.kind.marker(), p.path);
        }
        out.push('\n');
    }
    out
}

fn prior(out: &mut String, title: &str, body: &str) {
    let _ = writeln!(out, "## Previous Analysis: {}\n", title);
    let _ = writeln!(out, "{}\n", body.trim_end());
}

fn footer(out: &mut String, inbox: &Path, include: &[&str]) {
    out.push_str("## Output\n\n");
    let _ = writeln!(out, "Write your findings to `{}`.\n", inbox.display());
    if !include.is_empty() {
        out.push_str("Include:\n");
        for item in include {
            let _ = writeln!(out, "- {}", item);
        }
    }
}

pub(super) fn status_analysis(changes: &ChangeSet, inbox: &Path) -> String {
    let mut out = header("PR Status Check", changes);
    out.push_str(
        "## Task\n\n\
         1. Check whether a pull request already exists for this branch \
         (`gh pr view` or `gh pr list --head <branch>`).\n\
         2. Summarize the scope: how many files, which areas of the codebase, \
         and what kind of change (feature, fix, refactor, docs, config).\n\
         3. Confirm or adjust the risk level above and say why.\n\n",
    );
    footer(
        &mut out,
        inbox,
        &[
            "PR URL, or a recommendation to open one",
            "File count and breakdown",
            "What changed and why, based on the commits and diff",
            "Risk assessment",
        ],
    );
    out
}

pub(super) fn coverage_analysis(changes: &ChangeSet, status: &str, inbox: &Path) -> String {
    let mut out = header("Test Coverage Analysis", changes);
    prior(&mut out, "PR Status", status);
    out.push_str(
        "## Task\n\n\
         For each changed file, find new or modified behavior without tests, \
         edge cases and error paths that are not exercised, and integration \
         points that need an integration test.\n\n\
         Describe every gap as:\n\n\
         ```\n\
         File: <path>\n\
         Function: <name>\n\
         Test type: unit | integration | e2e\n\
         Test location: <path>\n\
         What to test: <behaviors, edge cases, error conditions>\n\
         Priority: critical | important | nice-to-have\n\
         ```\n\n",
    );
    footer(
        &mut out,
        inbox,
        &[
            "Total number of gaps",
            "Breakdown by priority",
            "Suggested approach (mocks, fixtures, test data)",
        ],
    );
    out
}

pub(super) fn accessibility_analysis(changes: &ChangeSet, coverage: &str, inbox: &Path) -> String {
    let mut out = header("Accessibility Review (WCAG 2.1)", changes);
    prior(&mut out, "Test Coverage", coverage);
    out.push_str(
        "## Task\n\n\
         Review the UI files listed above for:\n\n\
         - Semantic HTML: landmarks, heading order, real buttons and links\n\
         - ARIA: labels, roles, states, live regions for dynamic content\n\
         - Keyboard: every control reachable, logical focus order, Escape closes dialogs\n\
         - Contrast: 4.5:1 for normal text, 3:1 for large text, color never the only signal\n\
         - Focus management: trapped in modals, restored after interactions, visible outlines\n\n\
         Report each issue as:\n\n\
         ```\n\
         File: <path>\n\
         Line: <line>\n\
         Issue: <description>\n\
         WCAG criterion: <e.g. 1.3.1>\n\
         Severity: critical | important | minor\n\
         Fix: <recommendation>\n\
         ```\n\n",
    );
    footer(
        &mut out,
        inbox,
        &["Every issue found", "Suggested automated checks (e.g. axe-core)"],
    );
    out
}

/// The earlier stages reach the final request through the folded narrative.
pub(super) fn final_consolidation(
    changes: &ChangeSet,
    narrative: &str,
    accessibility_skipped: bool,
    inbox: &Path,
) -> String {
    let mut out = header("Final Pre-PR Checks", changes);
    out.push_str("## Review So Far\n\n");
    if !narrative.is_empty() {
        let _ = writeln!(out, "{}\n", narrative.trim_end());
    }
    if accessibility_skipped {
        out.push_str("### Accessibility\n\nSkipped: no UI changes were detected.\n\n");
    }
    out.push_str(
        "## Task\n\n\
         Consolidate the analyses above into a pre-PR checklist:\n\n\
         1. Test status: gaps found, gaps addressed, critical gaps remaining.\n\
         2. Accessibility status, if UI changed.\n\
         3. Quality reminders: linter, formatter, full test suite, docs, commit messages.\n\
         4. Readiness: ready to submit, minor fixes needed, or significant work needed.\n\
         5. A numbered list of remaining action items.\n\
         6. A PR description: what changed and why, testing performed, \
         accessibility notes, breaking changes.\n\n",
    );
    footer(&mut out, inbox, &[]);
    out
}
