//! Zone command handlers.

use std::sync::Arc;

use sprinkly_core::{Command as CoreCommand, ControllerConfig, EntityId, EntityKind, MemoryHost};

use crate::cli::{GlobalOpts, ZoneArgs, ZoneCommand};
use crate::error::CliError;

use super::{status, util};

pub async fn handle(
    config: ControllerConfig,
    host: &Arc<MemoryHost>,
    args: ZoneArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (command, message) = match args.command {
        ZoneCommand::List => {
            return status::list(config, host, global, |k| {
                matches!(k, EntityKind::Zone { .. })
            })
            .await;
        }
        ZoneCommand::Run { zone, duration } => {
            let id = EntityId::zone(util::index_from_number(zone, "zone")?);
            let message = match duration {
                Some(secs) => format!("Zone {zone} started for {secs}s"),
                None => format!("Zone {zone} started"),
            };
            (CoreCommand::run(id, duration), message)
        }
        ZoneCommand::Stop { zone } => {
            let id = EntityId::zone(util::index_from_number(zone, "zone")?);
            (CoreCommand::stop(id), format!("Zone {zone} stopped"))
        }
        ZoneCommand::Enable { zone } => {
            let id = EntityId::zone(util::index_from_number(zone, "zone")?);
            (
                CoreCommand::SetEnabled {
                    id,
                    enabled: Some(true),
                },
                format!("Zone {zone} enabled"),
            )
        }
        ZoneCommand::Disable { zone } => {
            let id = EntityId::zone(util::index_from_number(zone, "zone")?);
            (
                CoreCommand::SetEnabled {
                    id,
                    enabled: Some(false),
                },
                format!("Zone {zone} disabled"),
            )
        }
    };

    tracing::debug!(?command, "executing zone command");
    let outcome = util::execute(config, host, command).await?;
    util::report(&outcome, &message, global);
    Ok(())
}
