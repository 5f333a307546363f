//! Clap derive structures for the `sprout` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sprout -- watch and drive a greenhouse from the command line
#[derive(Debug, Parser)]
#[command(
    name = "sprout",
    version,
    about = "Monitor greenhouse sensors and drive actuators from the command line",
    long_about = "Keeps a reconciled view of greenhouse channels (temperature, humidity,\n\
        soil moisture, light, pump, fan, LED) over the backend's push stream,\n\
        with REST polling as fallback.",
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
    /// Backend profile to use
    #[arg(long, short = 'p', env = "SPROUT_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend URL (overrides profile)
    #[arg(long, short = 'b', env = "SPROUT_BACKEND", global = true)]
    pub backend: Option<String>,

    /// Feed-service API key
    #[arg(long, env = "SPROUT_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Bearer token from the auth service
    #[arg(long, env = "SPROUT_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SPROUT_OUTPUT",
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

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates (REST only)
    #[arg(long, short = 'k', env = "SPROUT_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "SPROUT_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
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
    /// Poll every channel once and show its classification
    #[command(alias = "st")]
    Status,

    /// Follow live channel updates until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Drive an actuator and wait for the backend to confirm
    Set(SetArgs),

    /// View and change alert thresholds
    #[command(alias = "th")]
    Thresholds(ThresholdsArgs),

    /// List channels currently outside their thresholds
    Alerts,

    /// Show recent data points for a channel
    History(HistoryArgs),

    /// Check that the backend is reachable
    Ping,

    /// Inspect CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only print channels currently in alert
    #[arg(long)]
    pub alerts_only: bool,
}

// ── Set ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Actuator channel (pump, fan, led, ...)
    pub channel: String,

    /// Requested state: on, off, or an integer level
    pub value: String,
}

// ── Thresholds ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ThresholdsArgs {
    #[command(subcommand)]
    pub command: ThresholdsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ThresholdsCommand {
    /// List thresholds in effect
    #[command(alias = "ls")]
    List,

    /// Set or clear a channel's threshold
    Set {
        /// Sensor channel
        channel: String,

        /// Lower bound (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        lower: Option<f64>,

        /// Upper bound (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        upper: Option<f64>,

        /// Remove the threshold entirely
        #[arg(long, conflicts_with_all = ["lower", "upper"])]
        clear: bool,
    },
}

// ── History ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Channel to query
    pub channel: String,

    /// Number of data points (1-1000)
    #[arg(long, short = 'l', default_value = "10", value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub limit: u32,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the effective configuration (secrets masked)
    Show,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }
}
