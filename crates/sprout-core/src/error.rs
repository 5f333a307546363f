// ── Core error types ──
//
// User-facing errors from sprout-core. Consumers never see reqwest or
// tungstenite errors directly; the `From<sprout_api::Error>` impl folds
// wire failures into the connection / transport / rejection taxonomy.

use thiserror::Error;

use crate::threshold::ThresholdError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Backend disconnected")]
    Disconnected,

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Request errors ───────────────────────────────────────────────
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Backend rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    // ── Domain errors ────────────────────────────────────────────────
    #[error("Invalid threshold for {channel}: {source}")]
    InvalidThreshold {
        channel: String,
        #[source]
        source: ThresholdError,
    },

    #[error("Unknown channel: {name}")]
    UnknownChannel { name: String },

    #[error("Channel {channel} is a sensor and cannot be commanded")]
    NotAnActuator { channel: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Handshake or reachability failure, as opposed to a failed request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::Disconnected
        )
    }
}

/// A malformed inbound payload. Logged and dropped on the ingest path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown channel `{0}`")]
    UnknownChannel(String),

    #[error("`{value}` is not a valid reading for {channel}")]
    InvalidReading { channel: String, value: String },

    #[error("`{value}` is not a valid state for {channel}")]
    InvalidState { channel: String, value: String },

    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sprout_api::Error> for CoreError {
    fn from(err: sprout_api::Error) -> Self {
        match err {
            sprout_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            sprout_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Transport {
                        message: e.to_string(),
                    }
                }
            }
            sprout_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            sprout_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            sprout_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            sprout_api::Error::Rejected { status, message } => {
                CoreError::Rejected { status, message }
            }
            sprout_api::Error::StreamConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("push stream connection failed: {reason}"),
            },
            sprout_api::Error::StreamClosed { code, reason } => CoreError::Transport {
                message: format!("push stream closed (code {code}): {reason}"),
            },
            sprout_api::Error::Deserialization { message, body: _ } => {
                CoreError::Transport {
                    message: format!("unexpected response body: {message}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_keeps_status() {
        let err = CoreError::from(sprout_api::Error::Rejected {
            status: 422,
            message: "bad value".into(),
        });
        assert!(matches!(err, CoreError::Rejected { status: 422, .. }));
        assert!(!err.is_connection_error());
    }

    #[test]
    fn handshake_failures_are_connection_errors() {
        let timeout = CoreError::from(sprout_api::Error::Timeout { timeout_secs: 20 });
        let refused = CoreError::from(sprout_api::Error::StreamConnect("refused".into()));
        assert!(timeout.is_connection_error());
        assert!(refused.is_connection_error());
    }
}
