//! Configuration view and validation commands: `prereview config`.

use anyhow::{Context, Result};
use std::path::PathBuf;

use prereview::review_config::ReviewToml;

use super::super::{Cli, ConfigCommands};
use super::load_config;

fn print_list(name: &str, values: &[String]) {
    let quoted: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
    println!("  {} = [{}]", name, quoted.join(", "));
}

pub fn cmd_config(cli: &Cli, project_dir: PathBuf, command: Option<ConfigCommands>) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let config_path = &config.config_file;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Review Configuration");
            println!("====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No review.toml found at {}", config_path.display());
                println!("Using built-in defaults. Run 'prereview config init' to create one.");
            }
            println!();

            let review = config.review();
            println!("[inspector]");
            print_list("ui_patterns", &review.inspector.ui_patterns);
            print_list("test_patterns", &review.inspector.test_patterns);
            print_list("doc_patterns", &review.inspector.doc_patterns);
            print_list("config_patterns", &review.inspector.config_patterns);
            println!(
                "  change_count_threshold = {}",
                review.inspector.change_count_threshold
            );
            println!();
            println!("[repository]");
            print_list("base_candidates", &review.repository.base_candidates);
            println!(
                "  include_uncommitted = {}",
                review.repository.include_uncommitted
            );
            println!();

            if cli.threshold.is_some() || config.base_override.is_some() {
                println!("CLI overrides:");
                if let Some(t) = cli.threshold {
                    println!("  --threshold {}", t);
                }
                if let Some(base) = &config.base_override {
                    println!("  --base {}", base);
                }
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No review.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ReviewToml::load(config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("review.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.review_dir).with_context(|| {
                format!("Failed to create {}", config.review_dir.display())
            })?;

            ReviewToml::default().save(config_path)?;

            println!("Created review.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [inspector] path patterns and change_count_threshold");
            println!("  - [repository] base_candidates and include_uncommitted");
            println!();
        }
    }

    Ok(())
}
