//! Session inspection and cleanup: `prereview status`, `view` and `clean`.

use anyhow::{Result, bail};
use console::style;
use std::path::PathBuf;
use tracing::warn;

use prereview::changeset::Category;
use prereview::session::{SessionLocator, SessionStore, StageStatus};
use prereview::ui::{change_icon, status_icon};

use super::super::Cli;
use super::load_config;

pub fn cmd_status(cli: &Cli, project_dir: PathBuf) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let orch = config.orchestrator()?;
    let changes = orch.change_set();

    println!();
    println!("Review Status");
    println!("=============");
    println!();
    println!(
        "Branch: {}",
        changes.branch().unwrap_or("(detached HEAD)")
    );
    println!("Base:   {}", changes.base());
    println!("Risk:   {}", changes.risk());
    println!("Changes: {}", changes.summary());

    for category in [
        Category::Ui,
        Category::Test,
        Category::Docs,
        Category::Config,
        Category::Other,
    ] {
        let paths: Vec<_> = changes.paths_in(category).collect();
        if paths.is_empty() {
            continue;
        }
        println!();
        println!("  {} ({})", style(category).bold(), paths.len());
        for p in paths {
            println!("    {}{}", change_icon(p.kind), p.path);
        }
    }

    println!();
    let store = orch.store();
    match orch.manifest()? {
        Some(manifest) => {
            println!("Session: {}", store.locator().dir().display());
            println!("  id:      {}", manifest.session_id);
            println!(
                "  started: {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if manifest.is_stale(changes) {
                println!(
                    "  {}",
                    style("stale: the changes moved since this session started. Run 'prereview clean' to start over")
                        .yellow()
                );
            }
        }
        None => println!("Session: not started. Run 'prereview run' to begin."),
    }

    println!();
    println!("{:<4}{:<26} Status", "", "Stage");
    let progress = orch.progress()?;
    for row in &progress {
        println!(
            "{:<4}{:<26} {}",
            status_icon(row.status),
            row.stage,
            row.status
        );
    }

    let done = progress.iter().filter(|p| p.status.is_terminal()).count();
    println!();
    println!("{}/{} stages finished", done, progress.len());
    if let Some(row) = progress.iter().find(|p| p.status.is_in_flight()) {
        println!(
            "Awaiting response for '{}' at {}",
            row.stage,
            store.locator().inbox_path(&row.stage).display()
        );
    }
    println!();

    Ok(())
}

pub fn cmd_view(cli: &Cli, project_dir: PathBuf, id: &str, response: bool) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let orch = config.orchestrator()?;
    orch.scheduler().stage(id)?;

    let Some(record) = orch.store().load_record(id)? else {
        bail!(
            "No request stored for stage '{}'. Run 'prereview run' or 'prereview stage {}' first",
            id,
            id
        );
    };

    if record.status == StageStatus::Skipped {
        println!("Stage '{}' was skipped: its gate is false for this change set.", id);
        return Ok(());
    }

    if response {
        match &record.response {
            Some(r) => println!("{}", r.as_str()),
            None => bail!(
                "Stage '{}' is {}: no response stored yet. Write it to {}",
                id,
                record.status,
                orch.store().locator().inbox_path(id).display()
            ),
        }
    } else {
        println!("{}", record.request.as_str());
    }
    Ok(())
}

pub fn cmd_clean(cli: &Cli, project_dir: PathBuf, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let config = load_config(cli, project_dir)?;

    // Only HEAD is read here, so a session whose base no longer resolves
    // can still be cleaned.
    let dirs = match config.session_store() {
        Ok(store) => {
            let dir = store.locator().dir().to_path_buf();
            if !store.exists() {
                println!("No session to clean at {}", dir.display());
                return Ok(());
            }
            vec![dir]
        }
        Err(e) => {
            warn!(error = %e, "Current branch unresolved; offering every session");
            let dirs = config.session_dirs()?;
            if dirs.is_empty() {
                println!("No sessions to clean under {}", config.review_dir.display());
                return Ok(());
            }
            println!("Could not resolve the current branch: {}", e);
            println!("Sessions under {}:", config.review_dir.display());
            for dir in &dirs {
                println!("  {}", dir.display());
            }
            dirs
        }
    };

    if !force {
        let prompt = if dirs.len() == 1 {
            "This will delete every request and response in this session. Are you sure?"
                .to_string()
        } else {
            format!(
                "This will delete all {} sessions listed above. Are you sure?",
                dirs.len()
            )
        };
        let confirm = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Clean cancelled");
            return Ok(());
        }
    }

    for dir in dirs {
        SessionStore::new(SessionLocator::new(&dir)).wipe()?;
        println!("Session wiped: {}", dir.display());
    }
    Ok(())
}
