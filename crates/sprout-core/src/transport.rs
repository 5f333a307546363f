// ── Transport seam ──
//
// The engine talks to the outside world only through `Transport`, so it
// can run against the real backend (`RestTransport`) or an in-memory
// double in tests.

use std::sync::{Mutex, PoisonError};

use futures_util::future::BoxFuture;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use sprout_api::transport::{TlsMode, TransportConfig};
use sprout_api::{
    BackendClient, FeedRecord, ReconnectConfig, StreamEvent, StreamHandle, ThresholdBounds,
    ThresholdTable,
};

use crate::config::{SyncConfig, TlsVerification};
use crate::error::CoreError;

/// Push channel plus REST fallback.
///
/// `connect` hands back a receiver of stream events; reconnection after a
/// drop is the implementation's job and is reported through that
/// receiver (`ConnectionLost`, `Reconnected`, `GaveUp`).
pub trait Transport: Send + Sync {
    /// Open the push channel, bounded by the handshake timeout.
    fn connect(&self) -> BoxFuture<'_, Result<broadcast::Receiver<StreamEvent>, CoreError>>;

    /// Abandon any pending backoff and retry the push channel right away.
    fn reconnect_now(&self);

    /// Release the push channel and its timers. Idempotent.
    fn disconnect(&self);

    /// Issue a command to an actuator.
    fn send<'a>(&'a self, channel: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), CoreError>>;

    /// Latest datum for one channel, or `None` if it has never reported.
    fn poll<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, Result<Option<FeedRecord>, CoreError>>;

    /// The backend's threshold table.
    fn thresholds(&self) -> BoxFuture<'_, Result<ThresholdTable, CoreError>> {
        Box::pin(async { Ok(ThresholdTable::new()) })
    }

    /// Persist one channel's threshold on the backend.
    fn write_threshold<'a>(
        &'a self,
        _channel: &'a str,
        _bounds: ThresholdBounds,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async { Ok(()) })
    }

    /// Recent data points for one channel, newest first.
    fn history<'a>(
        &'a self,
        _channel: &'a str,
        _limit: u32,
    ) -> BoxFuture<'a, Result<Vec<FeedRecord>, CoreError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    /// Backend liveness probe; returns whatever the backend says.
    fn health(&self) -> BoxFuture<'_, Result<String, CoreError>> {
        Box::pin(async { Ok(String::new()) })
    }
}

// ── RestTransport ───────────────────────────────────────────────────

/// [`Transport`] over the backend's REST API and WebSocket push stream.
pub struct RestTransport {
    client: BackendClient,
    stream_url: Url,
    reconnect: ReconnectConfig,
    bearer: Option<String>,
    cancel: CancellationToken,
    handle: Mutex<Option<StreamHandle>>,
}

impl RestTransport {
    pub fn new(config: &SyncConfig) -> Result<Self, CoreError> {
        let transport = build_transport(config);
        let client = BackendClient::new(
            config.backend_url.clone(),
            config.feed_url.clone(),
            &transport,
        )?;

        Ok(Self {
            client,
            stream_url: config.stream_url.clone(),
            reconnect: ReconnectConfig {
                max_retries: config.max_reconnect_attempts,
                handshake_timeout: config.handshake_timeout,
                ..ReconnectConfig::default()
            },
            bearer: transport.bearer_header(),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    fn replace_handle(&self, next: Option<StreamHandle>) {
        let previous = {
            let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, next)
        };
        if let Some(handle) = previous {
            handle.shutdown();
        }
    }
}

impl Transport for RestTransport {
    fn connect(&self) -> BoxFuture<'_, Result<broadcast::Receiver<StreamEvent>, CoreError>> {
        Box::pin(async move {
            // Only one stream is ever live.
            self.replace_handle(None);

            let (handle, events) = StreamHandle::connect(
                self.stream_url.clone(),
                self.reconnect.clone(),
                self.cancel.child_token(),
                self.bearer.clone(),
            )
            .await
            .map_err(|e| match e {
                sprout_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
                other => CoreError::ConnectionFailed {
                    url: self.stream_url.to_string(),
                    reason: other.to_string(),
                },
            })?;

            self.replace_handle(Some(handle));
            info!(url = %self.stream_url, "push stream open");
            Ok(events)
        })
    }

    fn reconnect_now(&self) {
        let slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.as_ref() {
            handle.reconnect_now();
        }
    }

    fn disconnect(&self) {
        self.replace_handle(None);
        debug!("push stream released");
    }

    fn send<'a>(&'a self, channel: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            self.client.send_command(channel, value).await?;
            Ok(())
        })
    }

    fn poll<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, Result<Option<FeedRecord>, CoreError>> {
        Box::pin(async move {
            match self.client.last_value(channel).await {
                Ok(record) => Ok(Some(record)),
                Err(sprout_api::Error::Rejected { status: 404, .. }) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn thresholds(&self) -> BoxFuture<'_, Result<ThresholdTable, CoreError>> {
        Box::pin(async move { Ok(self.client.thresholds().await?) })
    }

    fn write_threshold<'a>(
        &'a self,
        channel: &'a str,
        bounds: ThresholdBounds,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move { Ok(self.client.update_threshold(channel, bounds).await?) })
    }

    fn history<'a>(
        &'a self,
        channel: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<FeedRecord>, CoreError>> {
        Box::pin(async move { Ok(self.client.history(channel, limit).await?) })
    }

    fn health(&self) -> BoxFuture<'_, Result<String, CoreError>> {
        Box::pin(async move { Ok(self.client.health().await?) })
    }
}

impl Drop for RestTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Build a [`TransportConfig`] from the sync configuration.
fn build_transport(config: &SyncConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
        api_key: config.api_key.clone(),
        bearer_token: config.token.clone(),
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
