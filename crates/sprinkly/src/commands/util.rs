//! Shared helpers for controller-bound handlers.

use std::sync::Arc;

use sprinkly_core::{
    Command as CoreCommand, CommandOutcome, Controller, ControllerConfig, EntityHost, MemoryHost,
};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Poll the controller once, filling `host`.
pub async fn load(config: ControllerConfig, host: &Arc<MemoryHost>) -> Result<(), CliError> {
    let host: Arc<dyn EntityHost> = host.clone();
    Controller::oneshot(config, host, |_| async { Ok(()) }).await?;
    Ok(())
}

/// Poll once, then execute `command` against the freshly loaded entities.
pub async fn execute(
    config: ControllerConfig,
    host: &Arc<MemoryHost>,
    command: CoreCommand,
) -> Result<CommandOutcome, CliError> {
    let host: Arc<dyn EntityHost> = host.clone();
    let outcome = Controller::oneshot(config, host, |controller| async move {
        controller.execute(command).await
    })
    .await?;
    Ok(outcome)
}

/// Convert a user-facing 1-based number into a zero-based index.
pub fn index_from_number(number: usize, what: &str) -> Result<usize, CliError> {
    number.checked_sub(1).ok_or_else(|| CliError::Validation {
        field: what.into(),
        reason: "numbering starts at 1".into(),
    })
}

/// Report a completed intent: a one-line message for humans, the full
/// outcome for structured formats.
pub fn report(outcome: &CommandOutcome, message: &str, global: &GlobalOpts) {
    let out = match global.output {
        OutputFormat::Table | OutputFormat::Plain => message.to_owned(),
        format => output::render_single(format, outcome, |_| String::new(), |_| String::new()),
    };
    output::print_output(&out, global.quiet);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_one_based() {
        assert_eq!(index_from_number(1, "zone").unwrap(), 0);
        assert_eq!(index_from_number(12, "zone").unwrap(), 11);
        assert!(matches!(
            index_from_number(0, "zone"),
            Err(CliError::Validation { .. })
        ));
    }
}
