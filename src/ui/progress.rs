use crate::changeset::ChangeKind;
use crate::orchestrator::{Outcome, Suspension};
use crate::session::StageStatus;
use crate::ui::icons::{
    AWAITING, CHECK, CROSS, FILE_DEL, FILE_MOD, FILE_NEW, PENDING, REVIEW, SKIPPED, SPARKLE, WARN,
};
use console::{Emoji, style};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Icon for a stage status.
pub fn status_icon(status: StageStatus) -> Emoji<'static, 'static> {
    match status {
        StageStatus::Pending => PENDING,
        StageStatus::RequestReady | StageStatus::AwaitingResponse => AWAITING,
        StageStatus::Completed => CHECK,
        StageStatus::Skipped => SKIPPED,
    }
}

/// Icon for a changed path.
pub fn change_icon(kind: ChangeKind) -> Emoji<'static, 'static> {
    match kind {
        ChangeKind::Added => FILE_NEW,
        ChangeKind::Modified | ChangeKind::Renamed => FILE_MOD,
        ChangeKind::Deleted => FILE_DEL,
    }
}

/// Terminal UI for a review run.
///
/// A single bar counts terminal stages (completed or skipped). Messages are
/// printed above the bar so they stay visible after it is cleared.
pub struct ReviewUI {
    stage_bar: ProgressBar,
    verbose: bool,
}

impl ReviewUI {
    pub fn new(total_stages: u64, verbose: bool) -> Self {
        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");

        let stage_bar =
            ProgressBar::with_draw_target(Some(total_stages), ProgressDrawTarget::stderr());
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");

        Self { stage_bar, verbose }
    }

    /// Print above the bar. A hidden bar (no terminal) drops `println`, so
    /// fall back to plain stdout there.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.stage_bar.is_hidden() {
            println!("{}", msg.as_ref());
        } else {
            self.stage_bar.println(msg.as_ref());
        }
    }

    /// Set how many stages are already terminal.
    pub fn set_done(&self, done: u64) {
        self.stage_bar.set_position(done);
    }

    pub fn stage_skipped(&self, stage: &str) {
        self.stage_bar.inc(1);
        self.print_line(format!(
            "  {}{} {}",
            SKIPPED,
            style(stage).dim(),
            style("(gate is false)").dim()
        ));
    }

    pub fn stage_completed(&self, stage: &str) {
        self.stage_bar.inc(1);
        self.print_line(format!("  {}{}", CHECK, style(stage).green()));
    }

    /// Show where the request is and where the response should go.
    pub fn suspended(&self, suspension: &Suspension) {
        self.stage_bar.set_message(format!(
            "{} {}",
            style(&suspension.stage).yellow(),
            style("awaiting response").dim()
        ));
        let verb = if suspension.resumed {
            "Still waiting on"
        } else {
            "Requested"
        };
        self.print_line(format!(
            "  {}{} {}",
            REVIEW,
            verb,
            style(&suspension.title).bold()
        ));
        self.print_line(format!(
            "     Request: {}",
            style(suspension.request_path.display()).cyan()
        ));
        self.print_line(format!(
            "     Write the response to: {}",
            style(suspension.inbox_path.display()).cyan()
        ));
        if self.verbose {
            self.print_line(style(suspension.request.as_str()).dim().to_string());
        }
    }

    pub fn malformed(&self, message: &str) {
        self.print_line(format!("  {}{}", WARN, style(message).yellow()));
    }

    pub fn failed(&self, message: &str) {
        self.stage_bar.abandon();
        eprintln!("  {}{}", CROSS, style(message).red());
    }

    /// Clear the bar and leave the outcome on screen.
    pub fn finished(&self, outcome: &Outcome) {
        self.stage_bar.finish_and_clear();
        println!();
        println!(
            "{}Review complete: {} completed, {} skipped",
            SPARKLE,
            outcome.completed.len(),
            outcome.skipped.len()
        );
    }

    /// Hide the bar while `f` runs, e.g. around an interactive prompt.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.stage_bar.suspend(f)
    }

    /// Stop drawing before handing control back to the user.
    pub fn pause(&self) {
        self.stage_bar.finish_and_clear();
    }
}
