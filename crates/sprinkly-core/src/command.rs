// ── Command API ──
//
// All intents flow through a unified `Command` enum. The engine plans
// each into one or more controller requests, sends them, and applies the
// optimistic attribute effects of the ones that succeeded.

use serde::Serialize;
use sprinkly_api::Verb;

use crate::error::CoreError;
use crate::model::{ChangeSet, EntityId};

/// A command envelope sent through the engine's inbox.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandOutcome, CoreError>>,
}

/// Every intent the engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Enable or disable a zone or program. `None` toggles.
    SetEnabled { id: EntityId, enabled: Option<bool> },
    /// Turn an entity on or off. `None` toggles.
    ///
    /// `duration` is seconds for zones and programs and hours for the
    /// rain delay; `None` uses the configured default.
    SetState {
        id: EntityId,
        on: Option<bool>,
        duration: Option<u32>,
    },
    /// Force a full status poll.
    Refresh,
    /// Drop the push subscription and force a full poll.
    RestartPush,
}

impl Command {
    pub fn run(id: EntityId, duration: Option<u32>) -> Self {
        Self::SetState {
            id,
            on: Some(true),
            duration,
        }
    }

    pub fn stop(id: EntityId) -> Self {
        Self::SetState {
            id,
            on: Some(false),
            duration: None,
        }
    }

    /// Entity the command targets, if any.
    pub fn target(&self) -> Option<&EntityId> {
        match self {
            Self::SetEnabled { id, .. } | Self::SetState { id, .. } => Some(id),
            Self::Refresh | Self::RestartPush => None,
        }
    }
}

/// One request that reached the controller and was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentCommand {
    #[serde(serialize_with = "serialize_verb")]
    pub verb: Verb,
    pub target: EntityId,
    pub params: Vec<(String, String)>,
}

fn serialize_verb<S: serde::Serializer>(verb: &Verb, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(verb.path())
}

/// Result of a successfully executed command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub sent: Vec<SentCommand>,
    pub changed: ChangeSet,
}
