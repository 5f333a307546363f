use thiserror::Error;

/// Top-level error type for the `sprout-api` crate.
///
/// Covers every failure mode on the wire: authentication, HTTP transport,
/// explicit backend rejection, and the push stream. `sprout-core` maps these
/// into its own connectivity and command errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Backend refused the credential (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request or handshake timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Backend ─────────────────────────────────────────────────────
    /// The backend answered, but refused the request (HTTP 4xx/5xx).
    #[error("Backend rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    // ── Push stream ─────────────────────────────────────────────────
    /// Push stream connection failed.
    #[error("Push stream connection failed: {0}")]
    StreamConnect(String),

    /// Push stream closed by the server with a non-normal close code.
    #[error("Push stream closed (code {code}): {reason}")]
    StreamClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the backend refused the credential.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::StreamConnect(_) | Self::StreamClosed { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the backend explicitly refused the request.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Authentication { .. })
    }

    /// HTTP status attached to the error, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Authentication { .. } => Some(401),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
