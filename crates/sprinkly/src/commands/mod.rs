//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod config_cmd;
pub mod programs;
pub mod status;
pub mod system;
pub mod util;
pub mod watch;
pub mod zones;

use std::sync::Arc;

use sprinkly_core::{ControllerConfig, MemoryHost};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: ControllerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let host = Arc::new(MemoryHost::new());
    match cmd {
        Command::Status => status::handle(config, &host, global).await,
        Command::Zone(args) => zones::handle(config, &host, args, global).await,
        Command::Program(args) => programs::handle(config, &host, args, global).await,
        Command::RainDelay(args) => system::rain_delay(config, &host, args, global).await,
        Command::Controller(args) => system::controller(config, &host, args, global).await,
        Command::Watch => watch::handle(config, host, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
