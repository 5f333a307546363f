// ── Command dispatcher ──
//
// Turns actuator intent into an outbound request and drives its lifecycle:
//
//   begin ─▶ InFlight ─┬─ send error ───────────────▶ Failed    (rollback)
//                      ├─ matching echo in window ──▶ Acknowledged
//                      ├─ window elapses ───────────▶ TimedOut  (rollback)
//                      └─ newer command, same chan ─▶ Superseded (silent)
//
// The three phases are separate so the controller can serialize `begin` and
// `send` in submission order while the acknowledgment waits run
// concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{ChannelId, ChannelValue, CommandStatus, PendingCommand};
use crate::store::ChannelStore;
use crate::transport::Transport;

/// A command that has been registered and predicted but not yet resolved.
pub struct InFlight {
    command: PendingCommand,
    status: oneshot::Receiver<CommandStatus>,
}

impl InFlight {
    pub fn command(&self) -> &PendingCommand {
        &self.command
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    store: Arc<ChannelStore>,
    transport: Arc<dyn Transport>,
    ack_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(store: Arc<ChannelStore>, transport: Arc<dyn Transport>, ack_timeout: Duration) -> Self {
        Self {
            store,
            transport,
            ack_timeout,
        }
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// Send `value` to the actuator behind `channel` and wait for the
    /// outcome.
    ///
    /// Returns the command with its terminal status: `Acknowledged`,
    /// `TimedOut`, or `Superseded`. A failed send is returned as the error
    /// instead, after rolling back.
    pub async fn dispatch(
        &self,
        channel: &ChannelId,
        value: ChannelValue,
    ) -> Result<PendingCommand, CoreError> {
        let inflight = self.begin(channel, value)?;
        self.send(&inflight).await?;
        self.await_ack(inflight).await
    }

    /// Register the command and apply its optimistic prediction.
    ///
    /// Supersedes any command already pending for the channel.
    pub fn begin(&self, channel: &ChannelId, value: ChannelValue) -> Result<InFlight, CoreError> {
        if !channel.is_actuator() {
            return Err(CoreError::NotAnActuator {
                channel: channel.name().to_owned(),
            });
        }
        let (command, status) = self.store.begin_command(channel, value);
        debug!(channel = %channel, %value, command = %command.id, "command issued");
        Ok(InFlight { command, status })
    }

    /// Deliver the command to the backend. On failure the command is
    /// marked failed and rolled back, and the error is returned.
    pub async fn send(&self, inflight: &InFlight) -> Result<(), CoreError> {
        let command = &inflight.command;
        let channel = command.channel.name();

        match self.transport.send(channel, &command.value.to_wire()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(channel, command = %command.id, error = %e, "command send failed");
                self.store.fail_command(channel, command.id, &e.to_string());
                Err(e)
            }
        }
    }

    /// Wait for the matching echo. Rolls back on timeout.
    pub async fn await_ack(&self, inflight: InFlight) -> Result<PendingCommand, CoreError> {
        let InFlight {
            mut command,
            mut status,
        } = inflight;
        let channel = command.channel.name().to_owned();

        let resolved = match tokio::time::timeout(self.ack_timeout, &mut status).await {
            Ok(Ok(resolved)) => resolved,
            Ok(Err(_)) => {
                return Err(CoreError::Internal(format!(
                    "tracking for command {} was dropped",
                    command.id
                )));
            }
            Err(_) => {
                if self.store.expire_command(&channel, command.id) {
                    warn!(channel, command = %command.id, "command not confirmed in time");
                    CommandStatus::TimedOut
                } else {
                    // Resolved between the deadline and the expiry attempt.
                    status.try_recv().unwrap_or(CommandStatus::TimedOut)
                }
            }
        };

        command.status = resolved;
        Ok(command)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use futures_util::future::BoxFuture;
    use tokio::sync::broadcast;

    use sprout_api::{FeedRecord, StreamEvent};

    use super::*;
    use crate::model::UpdateSource;

    /// Records sends; fails them when `reject` is set.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
        reject: bool,
    }

    impl Transport for RecordingTransport {
        fn connect(&self) -> BoxFuture<'_, Result<broadcast::Receiver<StreamEvent>, CoreError>> {
            Box::pin(async { Err(CoreError::Disconnected) })
        }

        fn reconnect_now(&self) {}

        fn disconnect(&self) {}

        fn send<'a>(&'a self, channel: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), CoreError>> {
            Box::pin(async move {
                self.sent
                    .lock()
                    .unwrap()
                    .push((channel.to_owned(), value.to_owned()));
                if self.reject {
                    Err(CoreError::Rejected {
                        status: 503,
                        message: "device offline".into(),
                    })
                } else {
                    Ok(())
                }
            })
        }

        fn poll<'a>(&'a self, _channel: &'a str) -> BoxFuture<'a, Result<Option<FeedRecord>, CoreError>> {
            Box::pin(async { Ok(None) })
        }
    }

    fn setup(reject: bool) -> (Arc<ChannelStore>, Arc<RecordingTransport>, CommandDispatcher) {
        let store = Arc::new(ChannelStore::new());
        let transport = Arc::new(RecordingTransport {
            reject,
            ..RecordingTransport::default()
        });
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Duration::from_secs(5),
        );
        (store, transport, dispatcher)
    }

    #[tokio::test]
    async fn sensors_cannot_be_commanded() {
        let (store, transport, dispatcher) = setup(false);

        let err = dispatcher
            .dispatch(&ChannelId::sensor("temp"), ChannelValue::Reading(20.0))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::NotAnActuator { .. }));
        assert!(transport.sent.lock().unwrap().is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn send_failure_rolls_back_and_surfaces_error() {
        let (store, _transport, dispatcher) = setup(true);
        let fan = ChannelId::actuator("fan");
        store.apply_update(&fan, ChannelValue::State(0), UpdateSource::Poll, Utc::now());
        let mut resolutions = store.resolutions();

        let err = dispatcher.dispatch(&fan, ChannelValue::State(1)).await.unwrap_err();

        assert!(matches!(err, CoreError::Rejected { status: 503, .. }));
        assert_eq!(store.snapshot().value("fan"), Some(ChannelValue::State(0)));
        let resolution = resolutions.try_recv().unwrap();
        assert_eq!(resolution.status, CommandStatus::Failed);
        assert_eq!(resolution.error.as_deref(), Some("Backend rejected request (HTTP 503): device offline"));
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_command_times_out_and_rolls_back() {
        let (store, transport, dispatcher) = setup(false);
        let pump = ChannelId::actuator("pump");
        store.apply_update(&pump, ChannelValue::State(0), UpdateSource::Stream, Utc::now());

        let done = dispatcher.dispatch(&pump, ChannelValue::State(1)).await.unwrap();

        assert_eq!(done.status, CommandStatus::TimedOut);
        assert_eq!(
            transport.sent.lock().unwrap().as_slice(),
            &[("pump".to_owned(), "1".to_owned())]
        );
        let state = store.snapshot().get("pump").cloned().unwrap();
        assert_eq!(state.value, ChannelValue::State(0));
        assert!(!state.provisional);
    }

    #[tokio::test(start_paused = true)]
    async fn echo_within_window_acknowledges() {
        let (store, _transport, dispatcher) = setup(false);
        let led = ChannelId::actuator("led");

        let inflight = dispatcher.begin(&led, ChannelValue::State(1)).unwrap();
        dispatcher.send(&inflight).await.unwrap();

        let echo_store = Arc::clone(&store);
        let echo = led.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            echo_store.apply_update(&echo, ChannelValue::State(1), UpdateSource::Stream, Utc::now());
        });

        let done = dispatcher.await_ack(inflight).await.unwrap();
        assert_eq!(done.status, CommandStatus::Acknowledged);
        assert!(!store.snapshot().get("led").unwrap().provisional);
    }

    #[tokio::test(start_paused = true)]
    async fn second_dispatch_supersedes_first() {
        let (store, _transport, dispatcher) = setup(false);
        let pump = ChannelId::actuator("pump");
        let mut resolutions = store.resolutions();

        let first = dispatcher.begin(&pump, ChannelValue::State(1)).unwrap();
        let second = dispatcher.begin(&pump, ChannelValue::State(0)).unwrap();

        let first = dispatcher.await_ack(first).await.unwrap();
        assert_eq!(first.status, CommandStatus::Superseded);

        let second = dispatcher.await_ack(second).await.unwrap();
        assert_eq!(second.status, CommandStatus::TimedOut);

        let only = resolutions.try_recv().unwrap();
        assert_eq!(only.id, second.id);
        assert!(resolutions.try_recv().is_err());
    }
}
