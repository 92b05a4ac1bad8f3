use thiserror::Error;

use crate::result_code::ResultCode;

/// Top-level error type for the `sprinkly-api` crate.
///
/// Covers every failure mode of the controller's surfaces: HTTP transport,
/// the `{result: N}` command envelope and payload decoding. `sprinkly-core`
/// maps these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The controller answered with a non-2xx HTTP status.
    #[error("HTTP {status} from controller")]
    Http { status: u16 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Device protocol ─────────────────────────────────────────────
    /// The controller rejected a command with a non-success result code.
    #[error("Controller rejected command: {code}")]
    Device { code: ResultCode },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// Anything that failed before the controller produced a `{result}`
    /// envelope counts as transport-level and is retryable.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => !e.is_builder(),
            Self::Http { .. } | Self::Timeout { .. } => true,
            Self::InvalidUrl(_) | Self::Device { .. } | Self::Deserialization { .. } => false,
        }
    }

    /// Extract the controller result code, if the failure carried one.
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            Self::Device { code } => Some(*code),
            _ => None,
        }
    }
}
