//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use sprinkly_config::ConfigError;
use sprinkly_core::{CoreError, ResultCode};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach controller: {reason}")]
    #[diagnostic(
        code(sprinkly::connection_failed),
        help(
            "Check that the controller is powered and reachable.\n\
             Try: sprinkly status -v"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Command gave up after {attempts} attempts: {reason}")]
    #[diagnostic(
        code(sprinkly::command_failed),
        help("The controller stopped answering mid-command. Check its state with: sprinkly status")
    )]
    CommandFailed { attempts: u32, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Controller rejected the device password")]
    #[diagnostic(
        code(sprinkly::auth_failed),
        help(
            "Verify the password configured for profile '{profile}'.\n\
             Run: sprinkly config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(sprinkly::no_credentials),
        help(
            "Store one with: sprinkly config set-password\n\
             Or set the SPRINKLY_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Entities ─────────────────────────────────────────────────────
    #[error("'{identifier}' not found on the controller")]
    #[diagnostic(
        code(sprinkly::not_found),
        help("Run: sprinkly status to see available zones and programs")
    )]
    NotFound { identifier: String },

    #[error("Operation '{operation}' is not supported")]
    #[diagnostic(code(sprinkly::unsupported))]
    Unsupported { operation: String },

    // ── Protocol ─────────────────────────────────────────────────────
    #[error("Controller rejected the request: {reason} (result {code})")]
    #[diagnostic(code(sprinkly::rejected))]
    Rejected { code: i64, reason: String },

    #[error("Unexpected response from controller: {message}")]
    #[diagnostic(
        code(sprinkly::decode),
        help("The firmware may be newer than this tool understands.")
    )]
    Decode { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sprinkly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(sprinkly::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(sprinkly::no_config),
        help(
            "Pass --host and --password, or add a profile to {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(sprinkly::config))]
    Config(ConfigError),

    #[error("Keyring error: {0}")]
    #[diagnostic(code(sprinkly::keyring))]
    Keyring(#[from] keyring::Error),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Engine stopped before the request completed")]
    #[diagnostic(code(sprinkly::stopped))]
    Stopped,

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::CommandFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile name to auth failures.
    pub fn for_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { .. } => Self::AuthFailed {
                profile: profile.to_owned(),
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Transport { message } => CliError::ConnectionFailed { reason: message },
            CoreError::Protocol(ResultCode::Unauthorized) => CliError::AuthFailed {
                profile: "default".into(),
            },
            CoreError::Protocol(code) => CliError::Rejected {
                code: code.as_raw(),
                reason: code.description().into(),
            },
            CoreError::Decode { message } => CliError::Decode { message },
            CoreError::EntityNotFound { id } => CliError::NotFound {
                identifier: id.to_string(),
            },
            CoreError::Unsupported { operation } => CliError::Unsupported { operation },
            CoreError::Host(e) => CliError::Validation {
                field: "entity".into(),
                reason: e.to_string(),
            },
            CoreError::CommandFailed { attempts, reason } => {
                CliError::CommandFailed { attempts, reason }
            }
            CoreError::Stopped => CliError::Stopped,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            other => CliError::Config(other),
        }
    }
}
