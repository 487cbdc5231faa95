//! CLI command implementations.
//!
//! | Module    | Commands handled                  |
//! |-----------|-----------------------------------|
//! | `run`     | `Run`, `Stage`, `Respond`         |
//! | `session` | `Status`, `View`, `Clean`         |
//! | `config`  | `Config`                          |

pub mod config;
pub mod run;
pub mod session;

pub use config::cmd_config;
pub use run::{cmd_respond, cmd_run, cmd_stage};
pub use session::{cmd_clean, cmd_status, cmd_view};

use anyhow::Result;
use prereview::config::Config;
use std::path::PathBuf;

use super::Cli;

/// Resolve runtime configuration from the global flags.
pub(crate) fn load_config(cli: &Cli, project_dir: PathBuf) -> Result<Config> {
    Config::new(project_dir, cli.verbose, cli.base.clone(), cli.threshold)
}
