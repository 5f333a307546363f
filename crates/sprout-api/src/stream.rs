//! Push stream with handshake timeout and auto-reconnect.
//!
//! Connects to the backend's WebSocket push endpoint and streams parsed
//! [`PushMessage`]s through a [`tokio::sync::broadcast`] channel. The first
//! handshake is awaited by [`StreamHandle::connect`] so callers learn about
//! an unreachable backend immediately; later drops are handled in the
//! background with exponential backoff + jitter.
//!
//! # Example
//!
//! ```rust,ignore
//! use sprout_api::stream::{ReconnectConfig, StreamEvent, StreamHandle};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("ws://127.0.0.1:5000/stream")?;
//!
//! let (handle, mut rx) = StreamHandle::connect(url, ReconnectConfig::default(), cancel, None).await?;
//!
//! while let Ok(event) = rx.recv().await {
//!     if let StreamEvent::Message(msg) = event {
//!         println!("{} = {}", msg.channel, msg.value);
//!     }
//! }
//!
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::PushMessage;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── StreamEvent ──────────────────────────────────────────────────────

/// Everything the background loop reports to subscribers.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// One parsed inbound message.
    Message(Arc<PushMessage>),

    /// The connection dropped. Reconnection is already scheduled.
    ConnectionLost { reason: String },

    /// A reconnection attempt succeeded after a [`ConnectionLost`](Self::ConnectionLost).
    Reconnected,

    /// `max_retries` exhausted; the loop has exited.
    GaveUp,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Handshake and exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,

    /// Time allowed for a single WebSocket handshake. Default: 20s.
    pub handshake_timeout: Duration,

    /// A connection that stays up at least this long resets the backoff.
    /// Shorter-lived connections count as failed attempts. Default: 10s.
    pub stable_after: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
            handshake_timeout: Duration::from_secs(20),
            stable_after: Duration::from_secs(10),
        }
    }
}

// ── StreamHandle ─────────────────────────────────────────────────────

/// Handle to a running push stream.
///
/// Call [`shutdown`](Self::shutdown) to tear down the background task;
/// it is idempotent.
pub struct StreamHandle {
    event_tx: broadcast::Sender<StreamEvent>,
    cancel: CancellationToken,
    reconnect: Arc<Notify>,
}

impl StreamHandle {
    /// Perform the first handshake, then spawn the read/reconnect loop.
    ///
    /// Fails with [`Error::Timeout`] if the handshake does not complete
    /// within `config.handshake_timeout`, or [`Error::StreamConnect`] if the
    /// server refuses it. The returned receiver is subscribed before the
    /// loop starts, so no message is lost between connect and consume.
    pub async fn connect(
        url: Url,
        config: ReconnectConfig,
        cancel: CancellationToken,
        bearer: Option<String>,
    ) -> Result<(Self, broadcast::Receiver<StreamEvent>), Error> {
        let socket = open(&url, bearer.as_deref(), config.handshake_timeout).await?;

        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let reconnect = Arc::new(Notify::new());

        let ctx = LoopContext {
            url,
            bearer,
            config,
            event_tx: event_tx.clone(),
            cancel: cancel.clone(),
            reconnect: Arc::clone(&reconnect),
        };
        tokio::spawn(stream_loop(ctx, socket));

        Ok((
            Self {
                event_tx,
                cancel,
                reconnect,
            },
            event_rx,
        ))
    }

    /// Get an additional receiver. It only sees events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    /// Skip any pending backoff and abandon an in-progress handshake in
    /// favor of a fresh attempt right away.
    pub fn reconnect_now(&self) {
        self.reconnect.notify_one();
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ── Background reconnection loop ─────────────────────────────────────

struct LoopContext {
    url: Url,
    bearer: Option<String>,
    config: ReconnectConfig,
    event_tx: broadcast::Sender<StreamEvent>,
    cancel: CancellationToken,
    reconnect: Arc<Notify>,
}

/// Main loop: read → on drop, backoff → reconnect → read.
///
/// Only one handshake is ever in flight: the loop is the sole caller of
/// [`open`] after the initial connect.
async fn stream_loop(ctx: LoopContext, first: Socket) {
    let mut socket = Some(first);
    let mut connected_at = Instant::now();
    let mut attempt: u32 = 0;
    let mut skip_delay = false;

    loop {
        if let Some(ws) = socket.take() {
            let result = read_frames(ws, &ctx).await;
            if ctx.cancel.is_cancelled() {
                break;
            }

            let reason = match result {
                Ok(()) => "stream closed by server".to_owned(),
                Err(e) => e.to_string(),
            };
            let uptime = connected_at.elapsed();
            tracing::warn!(
                %reason,
                uptime_ms = u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX),
                "push stream lost"
            );
            let _ = ctx.event_tx.send(StreamEvent::ConnectionLost { reason });
            attempt = next_attempt(attempt, uptime, &ctx.config);
        }

        if let Some(max) = ctx.config.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "push stream reconnection limit reached, giving up");
                let _ = ctx.event_tx.send(StreamEvent::GaveUp);
                break;
            }
        }

        if !skip_delay {
            let delay = calculate_backoff(attempt, &ctx.config);
            tracing::info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "waiting before reconnect"
            );

            tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => break,
                () = ctx.reconnect.notified() => {
                    tracing::debug!("reconnect requested, skipping backoff");
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
        skip_delay = false;

        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => break,
            () = ctx.reconnect.notified() => {
                tracing::debug!("reconnect requested, restarting handshake");
                skip_delay = true;
            }
            result = open(&ctx.url, ctx.bearer.as_deref(), ctx.config.handshake_timeout) => {
                match result {
                    Ok(ws) => {
                        tracing::info!(attempt, "push stream reconnected");
                        connected_at = Instant::now();
                        let _ = ctx.event_tx.send(StreamEvent::Reconnected);
                        socket = Some(ws);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "push stream reconnect failed");
                        attempt = attempt.saturating_add(1);
                    }
                }
            }
        }
    }

    tracing::debug!("push stream loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Perform one WebSocket handshake, bounded by `timeout`.
///
/// If `bearer` is provided, it is sent as the `Authorization` header on the
/// upgrade request.
async fn open(url: &Url, bearer: Option<&str>, timeout: Duration) -> Result<Socket, Error> {
    tracing::info!(url = %url, "connecting to push stream");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::StreamConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(value) = bearer {
        request = request.with_header("Authorization", value);
    }

    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request)).await {
        Err(_) => Err(Error::Timeout {
            timeout_secs: timeout.as_secs(),
        }),
        Ok(Err(e)) => Err(Error::StreamConnect(e.to_string())),
        Ok(Ok((ws, _response))) => {
            tracing::info!("push stream connected");
            Ok(ws)
        }
    }
}

/// Read frames until the connection drops or the loop is cancelled.
async fn read_frames(ws: Socket, ctx: &LoopContext) -> Result<(), Error> {
    let (_write, mut read) = ws.split();

    loop {
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        publish_frame(&text, &ctx.event_tx);
                    }
                    Some(Ok(tungstenite::Message::Binary(bytes))) => {
                        match std::str::from_utf8(&bytes) {
                            Ok(text) => {
                                publish_frame(text, &ctx.event_tx);
                            }
                            Err(e) => tracing::debug!(error = %e, "dropping non-UTF-8 binary frame"),
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("push stream ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        return match frame {
                            Some(cf) if !matches!(cf.code, CloseCode::Normal | CloseCode::Away) => {
                                Err(Error::StreamClosed {
                                    code: u16::from(cf.code),
                                    reason: cf.reason.to_string(),
                                })
                            }
                            _ => {
                                tracing::info!("push stream close frame received");
                                Ok(())
                            }
                        };
                    }
                    Some(Err(e)) => {
                        return Err(Error::StreamConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("push stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Pong, raw Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// A text frame carries either one message or a batch of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Frame {
    One(PushMessage),
    Batch(Vec<PushMessage>),
}

/// Parse a text frame and broadcast every message inside.
///
/// Malformed frames are logged and dropped; they never tear down the
/// connection. Returns how many messages were published.
fn publish_frame(text: &str, event_tx: &broadcast::Sender<StreamEvent>) -> usize {
    let messages = match serde_json::from_str::<Frame>(text) {
        Ok(Frame::One(msg)) => vec![msg],
        Ok(Frame::Batch(batch)) => batch,
        Err(e) => {
            tracing::debug!(error = %e, frame = text, "dropping malformed push frame");
            return 0;
        }
    };

    let count = messages.len();
    for msg in messages {
        // Ignore send errors -- just means no active subscribers right now
        let _ = event_tx.send(StreamEvent::Message(Arc::new(msg)));
    }
    count
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Attempt counter after a connection that lasted `uptime` dropped.
fn next_attempt(attempt: u32, uptime: Duration, config: &ReconnectConfig) -> u32 {
    if uptime >= config.stable_after {
        0
    } else {
        attempt.saturating_add(1)
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`
///
/// Jitter is +-25% to spread out reconnection storms from many dashboards.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.handshake_timeout, Duration::from_secs(20));
        assert_eq!(config.stable_after, Duration::from_secs(10));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn short_lived_connection_keeps_backing_off() {
        let config = ReconnectConfig::default();

        assert_eq!(next_attempt(0, Duration::from_millis(50), &config), 1);
        assert_eq!(next_attempt(3, Duration::from_secs(9), &config), 4);
        assert_eq!(next_attempt(u32::MAX, Duration::ZERO, &config), u32::MAX);
    }

    #[test]
    fn stable_connection_resets_backoff() {
        let config = ReconnectConfig::default();

        assert_eq!(next_attempt(5, Duration::from_secs(10), &config), 0);
        assert_eq!(next_attempt(5, Duration::from_secs(600), &config), 0);
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            max_delay: Duration::from_secs(10),
            ..ReconnectConfig::default()
        };

        // With jitter factor up to 1.25, max effective is 12.5s
        let d10 = calculate_backoff(10, &config);
        assert!(d10 <= Duration::from_secs(13), "delay {d10:?} not capped");

        // Huge attempt counts must not overflow
        let dmax = calculate_backoff(u32::MAX, &config);
        assert!(dmax <= Duration::from_secs(13));
    }

    #[test]
    fn publish_single_message() {
        let (tx, mut rx) = broadcast::channel(16);

        let n = publish_frame(r#"{"channel":"temp","value":"31.5"}"#, &tx);
        assert_eq!(n, 1);

        match rx.try_recv().unwrap() {
            StreamEvent::Message(msg) => {
                assert_eq!(msg.channel, "temp");
                assert_eq!(msg.value, "31.5");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publish_batch_frame() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = serde_json::json!([
            { "type": "humidity", "value": "62" },
            { "type": "pump", "value": "1", "timestamp": "2026-02-10T12:00:00Z" }
        ]);
        assert_eq!(publish_frame(&raw.to_string(), &tx), 2);
        assert!(matches!(rx.try_recv().unwrap(), StreamEvent::Message(_)));
        assert!(matches!(rx.try_recv().unwrap(), StreamEvent::Message(_)));
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let (tx, mut rx) = broadcast::channel::<StreamEvent>(16);

        assert_eq!(publish_frame("not json at all", &tx), 0);
        assert_eq!(publish_frame(r#"{"value":"1"}"#, &tx), 0);

        assert!(rx.try_recv().is_err());
    }
}
