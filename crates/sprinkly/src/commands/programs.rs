//! Program command handlers.

use std::sync::Arc;

use sprinkly_core::{Command as CoreCommand, ControllerConfig, EntityId, EntityKind, MemoryHost};

use crate::cli::{GlobalOpts, ProgramArgs, ProgramCommand};
use crate::error::CliError;

use super::{status, util};

pub async fn handle(
    config: ControllerConfig,
    host: &Arc<MemoryHost>,
    args: ProgramArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (command, message) = match args.command {
        ProgramCommand::List => {
            return status::list(config, host, global, |k| {
                matches!(k, EntityKind::Program { .. })
            })
            .await;
        }
        ProgramCommand::Run { program, duration } => {
            let id = EntityId::program(util::index_from_number(program, "program")?);
            (
                CoreCommand::run(id, duration),
                format!("Program {program} started"),
            )
        }
        ProgramCommand::Stop { program } => {
            let id = EntityId::program(util::index_from_number(program, "program")?);
            (
                CoreCommand::stop(id),
                format!("Program {program} stopped"),
            )
        }
        ProgramCommand::Enable { program } => {
            let id = EntityId::program(util::index_from_number(program, "program")?);
            (
                CoreCommand::SetEnabled {
                    id,
                    enabled: Some(true),
                },
                format!("Program {program} enabled"),
            )
        }
        ProgramCommand::Disable { program } => {
            let id = EntityId::program(util::index_from_number(program, "program")?);
            (
                CoreCommand::SetEnabled {
                    id,
                    enabled: Some(false),
                },
                format!("Program {program} disabled"),
            )
        }
    };

    tracing::debug!(?command, "executing program command");
    let outcome = util::execute(config, host, command).await?;
    util::report(&outcome, &message, global);
    Ok(())
}
