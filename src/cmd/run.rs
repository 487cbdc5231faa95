//! Pipeline driving commands: `prereview run`, `stage` and `respond`.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

use prereview::orchestrator::{Advance, Materialized, Orchestrator, StageProgress, Suspension};
use prereview::session::StageStatus;
use prereview::stage::ResponsePayload;
use prereview::ui::ReviewUI;

use super::super::Cli;
use super::load_config;

fn read_response(file: Option<&Path>) -> Result<ResponsePayload> {
    let content = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read response file: {}", path.display()))?,
        None => {
            eprintln!("Enter the response (Ctrl+D when done):");
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read response from stdin")?;
            content
        }
    };
    Ok(ResponsePayload::new(content))
}

/// Report stages that became terminal between two progress snapshots.
fn report_transitions(ui: &ReviewUI, before: &[StageProgress], after: &[StageProgress]) {
    for now in after {
        let was = before
            .iter()
            .find(|p| p.stage == now.stage)
            .map(|p| p.status)
            .unwrap_or_default();
        if was.is_terminal() {
            continue;
        }
        match now.status {
            StageStatus::Completed => ui.stage_completed(&now.stage),
            StageStatus::Skipped => ui.stage_skipped(&now.stage),
            _ => {}
        }
    }
}

fn print_header(orch: &Orchestrator) {
    let changes = orch.change_set();
    println!();
    println!(
        "Reviewing {} against {}",
        changes.branch().unwrap_or("(detached HEAD)"),
        changes.base()
    );
    println!("Changes: {}", changes.summary());
    println!();
}

fn print_suspension(suspension: &Suspension) {
    println!("Stage:    {} ({})", suspension.stage, suspension.title);
    println!("Request:  {}", suspension.request_path.display());
    println!("Response: {}", suspension.inbox_path.display());
}

pub fn cmd_run(
    cli: &Cli,
    project_dir: PathBuf,
    no_wait: bool,
    response_file: Option<&Path>,
) -> Result<()> {
    use dialoguer::Confirm;

    let config = load_config(cli, project_dir)?;
    let orch = config.orchestrator()?;
    let interactive = !no_wait && console::user_attended();

    let mut response = match response_file {
        Some(path) => Some(read_response(Some(path))?),
        None => None,
    };

    print_header(&orch);
    let ui = ReviewUI::new(orch.scheduler().stage_count() as u64, cli.verbose);
    let mut before = orch.progress()?;
    ui.set_done(before.iter().filter(|p| p.status.is_terminal()).count() as u64);

    loop {
        let result = orch.advance(response.take());
        let after = orch.progress()?;
        report_transitions(&ui, &before, &after);
        before = after;

        let inbox = match result {
            Ok(Advance::Finished(outcome)) => {
                ui.finished(&outcome);
                if let Some(artifact) = outcome.state.artifact() {
                    println!();
                    println!("{}", artifact);
                }
                return Ok(());
            }
            Ok(Advance::Suspended(suspension)) => {
                ui.suspended(&suspension);
                suspension.inbox_path
            }
            Err(e) if e.is_recoverable() && interactive => {
                ui.malformed(&e.to_string());
                match orch.scheduler().in_flight_stage(&orch.store().load_session()?) {
                    Some(stage) => orch.store().locator().inbox_path(stage.id()),
                    None => return Err(e.into()),
                }
            }
            Err(e) => {
                ui.failed(&e.to_string());
                return Err(e.into());
            }
        };

        if !interactive {
            ui.pause();
            println!();
            println!("Session saved. Run 'prereview run' again once the response is written.");
            return Ok(());
        }

        let ready = ui.suspend(|| {
            Confirm::new()
                .with_prompt(format!("Response written to {}?", inbox.display()))
                .default(true)
                .interact()
                .unwrap_or(false)
        });
        if !ready {
            ui.pause();
            println!();
            println!("Session saved. Run 'prereview run' to resume.");
            return Ok(());
        }
    }
}

pub fn cmd_stage(cli: &Cli, project_dir: PathBuf, id: &str, force: bool) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let orch = config.orchestrator()?;

    if force {
        let discarded = orch.reopen(id)?;
        println!("Discarded: {}", discarded.join(", "));
    }

    println!();
    match orch.materialize(id)? {
        Materialized::Request(suspension) => {
            if suspension.resumed {
                println!("Stage '{}' is already awaiting a response.", id);
            } else {
                println!("Request written for stage '{}'.", id);
            }
            print_suspension(&suspension);
            println!();
            println!(
                "Supply the response with 'prereview respond {}' or 'prereview run'.",
                id
            );
        }
        Materialized::Replayed { stage, response } => {
            println!("Stage '{}' is already completed. Stored response:", stage);
            println!();
            println!("{}", response.as_str());
            println!();
            println!("Use --force to discard it and request the stage again.");
        }
        Materialized::Skipped { stage } => {
            println!("Stage '{}' does not apply to this change set (skipped).", stage);
        }
    }
    println!();
    Ok(())
}

pub fn cmd_respond(cli: &Cli, project_dir: PathBuf, id: &str, file: Option<&Path>) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let orch = config.orchestrator()?;
    // Fail on an unknown stage before blocking on stdin
    orch.scheduler().stage(id)?;

    let response = read_response(file)?;
    println!();
    match orch.respond(id, response)? {
        Advance::Suspended(next) => {
            println!("Stage '{}' completed. Next request:", id);
            print_suspension(&next);
        }
        Advance::Finished(outcome) => {
            println!(
                "Stage '{}' completed. Review complete: {} completed, {} skipped.",
                id,
                outcome.completed.len(),
                outcome.skipped.len()
            );
        }
    }
    println!();
    Ok(())
}
