// ── Runtime sync configuration ──
//
// These types describe *how* to reach a greenhouse backend and how the
// engine should pace itself. They carry credential data and tuning, but
// never touch disk. The CLI constructs a `SyncConfig` and hands it in.

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::model::ChannelCatalog;
use crate::threshold::Threshold;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs on the greenhouse LAN).
    DangerAcceptInvalid,
}

/// Configuration for synchronizing with one backend.
///
/// Built by the CLI, passed to `Controller`; core never reads config files.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Dashboard backend (`/devices/{channel}`, `/config`).
    pub backend_url: Url,
    /// Feed service base (`/{channel}/data/last`).
    pub feed_url: Url,
    /// Push stream endpoint.
    pub stream_url: Url,
    /// Feed-service API key, sent as `X-AIO-Key`.
    pub api_key: Option<SecretString>,
    /// Bearer credential from the external auth collaborator.
    pub token: Option<SecretString>,
    pub tls: TlsVerification,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Push stream handshake budget.
    pub handshake_timeout: Duration,
    /// How long a command waits for its echo before rolling back.
    pub ack_timeout: Duration,
    /// REST fallback polling cadence while the stream is down. Zero
    /// disables fallback polling.
    pub polling_interval: Duration,
    /// Cap on consecutive reconnect failures; `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Enable the push stream. Off for one-shot CLI requests.
    pub stream_enabled: bool,
    pub channels: ChannelCatalog,
    /// Local threshold overrides, applied over the defaults and before the
    /// backend's `/config` is loaded.
    pub thresholds: BTreeMap<String, Threshold>,
}

impl SyncConfig {
    /// Defaults for a backend at `backend_url`: feed service on the same
    /// host, push stream at the same address over `ws`/`wss`.
    pub fn new(backend_url: Url) -> Self {
        let stream_url = stream_url_for(&backend_url);
        Self {
            feed_url: backend_url.clone(),
            stream_url,
            backend_url,
            api_key: None,
            token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(20),
            ack_timeout: Duration::from_secs(5),
            polling_interval: Duration::from_secs(10),
            max_reconnect_attempts: None,
            stream_enabled: true,
            channels: ChannelCatalog::greenhouse(),
            thresholds: BTreeMap::new(),
        }
    }
}

/// `http://host/path` → `ws://host/path`, `https` → `wss`.
pub fn stream_url_for(base: &Url) -> Url {
    let mut url = base.clone();
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    // Switching between special schemes cannot fail.
    let _ = url.set_scheme(scheme);
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_backend_url() {
        let config = SyncConfig::new(Url::parse("https://greenhouse.local:8443/").unwrap());

        assert_eq!(config.stream_url.as_str(), "wss://greenhouse.local:8443/");
        assert_eq!(config.feed_url, config.backend_url);
        assert_eq!(config.handshake_timeout, Duration::from_secs(20));
        assert_eq!(config.ack_timeout, Duration::from_secs(5));
        assert_eq!(config.channels.len(), 7);
    }

    #[test]
    fn plain_http_maps_to_ws() {
        let url = stream_url_for(&Url::parse("http://127.0.0.1:5000").unwrap());
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port(), Some(5000));
    }
}
