//! Rain delay and controller-wide handlers.

use std::sync::Arc;

use sprinkly_core::{Command as CoreCommand, ControllerConfig, EntityId, MemoryHost};

use crate::cli::{
    ControllerArgs, ControllerCommand, GlobalOpts, RainDelayArgs, RainDelayCommand,
};
use crate::error::CliError;

use super::util;

pub async fn rain_delay(
    config: ControllerConfig,
    host: &Arc<MemoryHost>,
    args: RainDelayArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = EntityId::rain_delay();
    let (command, message) = match args.command {
        RainDelayCommand::Set { hours } => {
            let message = match hours {
                Some(h) => format!("Rain delay set for {h}h"),
                None => format!("Rain delay set for {}h", config.default_rain_delay_hours),
            };
            (CoreCommand::run(id, hours), message)
        }
        RainDelayCommand::Clear => (CoreCommand::stop(id), "Rain delay cleared".into()),
    };

    let outcome = util::execute(config, host, command).await?;
    util::report(&outcome, &message, global);
    Ok(())
}

pub async fn controller(
    config: ControllerConfig,
    host: &Arc<MemoryHost>,
    args: ControllerArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = EntityId::system();
    let (command, message) = match args.command {
        ControllerCommand::Enable => (CoreCommand::run(id, None), "Controller enabled"),
        ControllerCommand::Disable => (CoreCommand::stop(id), "Controller disabled"),
    };

    let outcome = util::execute(config, host, command).await?;
    util::report(&outcome, message, global);
    Ok(())
}
