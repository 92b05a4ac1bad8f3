// ── Core error types ──
//
// User-facing errors from sprinkly-core. Transport failures are kept
// retryable; controller result codes are surfaced as-is so callers can
// tell a bad password from an out-of-range value. The
// `From<sprinkly_api::Error>` impl does the translation.

use sprinkly_api::ResultCode;
use thiserror::Error;

use crate::host::HostError;
use crate::model::EntityId;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Transport errors ─────────────────────────────────────────────
    #[error("Cannot reach controller: {message}")]
    Transport { message: String },

    // ── Protocol errors ──────────────────────────────────────────────
    #[error("Controller rejected the request: {0}")]
    Protocol(ResultCode),

    #[error("Unexpected payload: {message}")]
    Decode { message: String },

    // ── Entity errors ────────────────────────────────────────────────
    #[error("Entity not found: {id}")]
    EntityNotFound { id: EntityId },

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    #[error("Entity host error: {0}")]
    Host(#[from] HostError),

    // ── Command errors ───────────────────────────────────────────────
    #[error("Command failed after {attempts} attempts: {reason}")]
    CommandFailed { attempts: u32, reason: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Controller is stopped")]
    Stopped,
}

impl CoreError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Returns `true` for failures that a later attempt may not repeat.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// The controller result code, when the failure carried one.
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            Self::Protocol(code) => Some(*code),
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sprinkly_api::Error> for CoreError {
    fn from(err: sprinkly_api::Error) -> Self {
        match err {
            sprinkly_api::Error::Device { code } => CoreError::Protocol(code),
            sprinkly_api::Error::Deserialization { message, .. } => CoreError::Decode { message },
            sprinkly_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid controller URL: {e}"),
            },
            other @ (sprinkly_api::Error::Transport(_)
            | sprinkly_api::Error::Http { .. }
            | sprinkly_api::Error::Timeout { .. }) => CoreError::Transport {
                message: other.to_string(),
            },
        }
    }
}
