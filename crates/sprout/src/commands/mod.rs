//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod alerts;
pub mod config_cmd;
pub mod history;
pub mod ping;
pub mod set;
pub mod status;
pub mod thresholds;
pub mod util;
pub mod watch;

use sprout_core::SyncConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, config: SyncConfig, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Status => status::handle(config, global).await,
        Command::Watch(args) => watch::handle(config, args, global).await,
        Command::Set(args) => set::handle(config, args, global).await,
        Command::Thresholds(args) => thresholds::handle(config, args, global).await,
        Command::Alerts => alerts::handle(config, global).await,
        Command::History(args) => history::handle(config, args, global).await,
        Command::Ping => ping::handle(config, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "local command routed to the backend dispatcher".into(),
        )),
    }
}
