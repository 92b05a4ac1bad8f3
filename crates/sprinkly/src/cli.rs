//! Clap derive structures for the `sprinkly` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sprinkly -- command-line control for OpenSprinkler
#[derive(Debug, Parser)]
#[command(
    name = "sprinkly",
    version,
    about = "Control OpenSprinkler irrigation controllers from the command line",
    long_about = "Inspect and control OpenSprinkler irrigation controllers.\n\n\
        Polls the controller's JSON API, optionally follows its MQTT push\n\
        channel, and sends zone, program and rain-delay commands.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Controller profile to use
    #[arg(long, short = 'p', env = "SPRINKLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller address (overrides profile)
    #[arg(long, short = 'H', env = "SPRINKLY_HOST", global = true)]
    pub host: Option<String>,

    /// Device password (overrides profile and keyring)
    #[arg(long, env = "SPRINKLY_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SPRINKLY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds
    #[arg(long, env = "SPRINKLY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the controller once and show every entity
    #[command(alias = "st")]
    Status,

    /// Run, stop, enable or disable a zone (station)
    #[command(alias = "z", alias = "station")]
    Zone(ZoneArgs),

    /// Run, stop, enable or disable a program
    #[command(alias = "prog")]
    Program(ProgramArgs),

    /// Set or clear the rain delay
    #[command(alias = "rd")]
    RainDelay(RainDelayArgs),

    /// Enable or disable the whole controller
    Controller(ControllerArgs),

    /// Keep the engine running and print attribute changes until Ctrl-C
    Watch,

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Zones ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ZoneArgs {
    #[command(subcommand)]
    pub command: ZoneCommand,
}

#[derive(Debug, Subcommand)]
pub enum ZoneCommand {
    /// List zones
    #[command(alias = "ls")]
    List,

    /// Start a zone
    Run {
        /// Zone number as shown by the controller (1-based)
        zone: usize,

        /// Run time in seconds (profile default when omitted)
        #[arg(long, short = 'd')]
        duration: Option<u32>,
    },

    /// Stop a running zone
    Stop {
        /// Zone number (1-based)
        zone: usize,
    },

    /// Enable a zone
    Enable {
        /// Zone number (1-based)
        zone: usize,
    },

    /// Disable a zone
    Disable {
        /// Zone number (1-based)
        zone: usize,
    },
}

// ── Programs ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ProgramArgs {
    #[command(subcommand)]
    pub command: ProgramCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProgramCommand {
    /// List programs
    #[command(alias = "ls")]
    List,

    /// Start a program manually
    Run {
        /// Program number (1-based)
        program: usize,

        /// Run time in seconds (profile default when omitted)
        #[arg(long, short = 'd')]
        duration: Option<u32>,
    },

    /// Stop every zone a program is running
    Stop {
        /// Program number (1-based)
        program: usize,
    },

    /// Enable a program
    Enable {
        /// Program number (1-based)
        program: usize,
    },

    /// Disable a program
    Disable {
        /// Program number (1-based)
        program: usize,
    },
}

// ── Rain delay ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RainDelayArgs {
    #[command(subcommand)]
    pub command: RainDelayCommand,
}

#[derive(Debug, Subcommand)]
pub enum RainDelayCommand {
    /// Start a rain delay
    Set {
        /// Delay in hours (profile default when omitted)
        hours: Option<u32>,
    },

    /// Cancel the rain delay
    Clear,
}

// ── Controller ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ControllerArgs {
    #[command(subcommand)]
    pub command: ControllerCommand,
}

#[derive(Debug, Subcommand)]
pub enum ControllerCommand {
    /// Enable scheduled operation
    Enable,

    /// Disable scheduled operation
    Disable,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the device password in the system keyring
    SetPassword,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_valid() {
        Cli::command().debug_assert();
    }
}
