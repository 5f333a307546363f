//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use sprout_config::ConfigError;
use sprout_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the backend at {url}")]
    #[diagnostic(
        code(sprout::connection_failed),
        help(
            "Check that the backend is running and accessible.\n\
             URL: {url}\n\
             Try: sprout ping --backend <url>"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Request to the backend failed: {message}")]
    #[diagnostic(
        code(sprout::transport),
        help("Self-signed certificate? Use --insecure (-k) or set ca_cert in your profile.")
    )]
    Transport { message: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed")]
    #[diagnostic(
        code(sprout::auth_failed),
        help(
            "Verify the API key or bearer token for profile '{profile}'.\n\
             Set SPROUT_API_KEY / SPROUT_TOKEN, or api_key_env / token_env in the profile."
        )
    )]
    AuthFailed { profile: String },

    // ── Channels ─────────────────────────────────────────────────────

    #[error("Unknown channel '{name}'")]
    #[diagnostic(
        code(sprout::unknown_channel),
        help("Known channels: {available}\nExtra channels can be declared under [profiles.<name>.channels].")
    )]
    UnknownChannel { name: String, available: String },

    #[error("'{channel}' is a sensor and cannot be set")]
    #[diagnostic(code(sprout::not_an_actuator), help("Only actuators (pump, fan, led, ...) accept commands."))]
    NotAnActuator { channel: String },

    #[error("{channel} was not confirmed within {seconds}s and has been rolled back")]
    #[diagnostic(
        code(sprout::unconfirmed),
        help("The backend accepted the request but never echoed the new state.\nCheck the device, or raise ack_timeout in your profile.")
    )]
    Unconfirmed { channel: String, seconds: u64 },

    // ── Backend ──────────────────────────────────────────────────────

    #[error("Backend rejected the request (HTTP {status}): {message}")]
    #[diagnostic(code(sprout::rejected))]
    Rejected { status: u16, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sprout::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(sprout::profile_not_found),
        help("Available profiles: {available}\nConfig file: {path}")
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error("No backend configured")]
    #[diagnostic(
        code(sprout::no_config),
        help(
            "Pass --backend <url>, set SPROUT_BACKEND, or add a profile to\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(sprout::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(sprout::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Internal / IO / Serialization ────────────────────────────────

    #[error("Internal error: {0}")]
    #[diagnostic(code(sprout::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(sprout::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    #[diagnostic(code(sprout::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Transport { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::UnknownChannel { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } | Self::Unconfirmed { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NotAnActuator { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::AuthenticationFailed { message: _ } => CliError::AuthFailed {
                profile: "current".into(),
            },

            CoreError::Disconnected => CliError::ConnectionFailed {
                url: "(disconnected)".into(),
                source: "Backend connection was lost".into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::Transport { message } => CliError::Transport { message },

            CoreError::Rejected { status, message } => CliError::Rejected { status, message },

            CoreError::InvalidThreshold { channel, source } => CliError::Validation {
                field: format!("threshold for {channel}"),
                reason: source.to_string(),
            },

            CoreError::UnknownChannel { name } => CliError::UnknownChannel {
                name,
                available: String::new(),
            },

            CoreError::NotAnActuator { channel } => CliError::NotAnActuator { channel },

            CoreError::Parse(e) => CliError::Validation {
                field: "value".into(),
                reason: e.to_string(),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_exit_with_connection_code() {
        let err = CliError::from(CoreError::Transport {
            message: "connection refused".into(),
        });
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn sensor_commands_are_usage_errors() {
        let err = CliError::from(CoreError::NotAnActuator {
            channel: "temp".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn config_validation_keeps_the_field() {
        let err = CliError::from(ConfigError::Validation {
            field: "ack_timeout".into(),
            reason: "must be at least 1 second".into(),
        });
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "ack_timeout"));
    }
}
