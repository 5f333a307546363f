// ── Controller abstraction ──
//
// Full lifecycle for one greenhouse backend: push stream ingestion,
// staleness and reconciliation, REST fallback polling, serialized command
// routing, and threshold evaluation over the reconciled store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use sprout_api::{FeedRecord, PushMessage, StreamEvent, ThresholdBounds};

use crate::command::{Command, CommandDispatcher, CommandEnvelope, CommandResult, InFlight};
use crate::config::SyncConfig;
use crate::convert;
use crate::error::{CoreError, ParseError};
use crate::model::{ChannelCatalog, ChannelId, ChannelValue, CommandResolution, PendingCommand};
use crate::store::{ChannelStore, Snapshot};
use crate::stream::SnapshotStream;
use crate::threshold::{self, Alert, Classification, Threshold, ThresholdEvaluator};
use crate::transport::{RestTransport, Transport};

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Push stream up and the store reconciled.
    Connected,
    /// Push stream down; values are stale and REST polling fills in.
    Degraded,
}

impl ConnectionState {
    /// Whether commands are accepted in this state.
    pub fn accepts_commands(self) -> bool {
        matches!(self, Self::Connected | Self::Degraded)
    }
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. All state mutations go
/// through the [`ChannelStore`]; observers read snapshots.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: SyncConfig,
    store: Arc<ChannelStore>,
    evaluator: Arc<ThresholdEvaluator>,
    transport: Arc<dyn Transport>,
    dispatcher: CommandDispatcher,
    connection_state: watch::Sender<ConnectionState>,
    /// Push stream currently delivering.
    stream_up: AtomicBool,
    command_tx: Mutex<mpsc::Sender<CommandEnvelope>>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    /// Child token for the current connection. Cancelled on disconnect,
    /// replaced on the next connect.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Build a controller talking to the real backend. Does NOT connect.
    pub fn new(config: SyncConfig) -> Result<Self, CoreError> {
        let transport = RestTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a controller over an arbitrary [`Transport`].
    pub fn with_transport(config: SyncConfig, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(ChannelStore::new());
        let evaluator = Arc::new(ThresholdEvaluator::with_defaults());
        for (channel, threshold) in &config.thresholds {
            evaluator.insert(channel.clone(), *threshold);
        }
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            config.ack_timeout,
        );
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(ControllerInner {
                config,
                store,
                evaluator,
                transport,
                dispatcher,
                connection_state,
                stream_up: AtomicBool::new(false),
                command_tx: Mutex::new(command_tx),
                command_rx: Mutex::new(Some(command_rx)),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &ChannelCatalog {
        &self.inner.config.channels
    }

    /// Access the underlying store.
    pub fn store(&self) -> &Arc<ChannelStore> {
        &self.inner.store
    }

    pub fn evaluator(&self) -> &Arc<ThresholdEvaluator> {
        &self.inner.evaluator
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect to the backend.
    ///
    /// Loads the threshold table, opens the push stream (when enabled),
    /// reconciles every channel, and spawns the background tasks. A call
    /// while already connecting or connected is a no-op.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let claimed = self.inner.connection_state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!(state = %self.state(), "connect ignored");
            return Ok(());
        }

        let config = &self.inner.config;

        match self.inner.transport.thresholds().await {
            Ok(table) => {
                let applied = self.inner.evaluator.load(&table);
                debug!(applied, "thresholds loaded from backend");
            }
            Err(e) => warn!(error = %e, "threshold table unavailable (non-fatal)"),
        }

        let child = {
            let mut guard = self.inner.cancel_child.lock().await;
            if guard.is_cancelled() {
                *guard = self.inner.cancel.child_token();
            }
            guard.clone()
        };

        let events = if config.stream_enabled {
            match self.inner.transport.connect().await {
                Ok(events) => Some(events),
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    return Err(e);
                }
            }
        } else {
            None
        };
        self.inner
            .stream_up
            .store(events.is_some(), Ordering::SeqCst);

        // Without a stream, the initial poll is the only source of truth.
        // With one, an incomplete poll leaves the store stale and the
        // fallback poller finishes the job.
        let target = match self.reconcile().await {
            Ok(reported) => {
                debug!(reported, "initial reconciliation done");
                self.inner.store.mark_stale(false);
                ConnectionState::Connected
            }
            Err(e) if events.is_none() => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "initial reconciliation incomplete, starting degraded");
                self.inner.store.mark_stale(true);
                ConnectionState::Degraded
            }
        };

        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            let ctrl = self.clone();
            handles.push(tokio::spawn(command_processor_task(ctrl, rx, child.clone())));
        }

        if let Some(events) = events {
            let ctrl = self.clone();
            handles.push(tokio::spawn(stream_task(ctrl, events, child.clone())));

            let period = config.polling_interval;
            if !period.is_zero() {
                let ctrl = self.clone();
                handles.push(tokio::spawn(fallback_poll_task(ctrl, period, child.clone())));
            }
        }

        drop(handles);

        // The stream task may already have reported a loss; keep it.
        let settled = self.inner.connection_state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = target;
                true
            } else {
                false
            }
        });
        info!(
            backend = %config.backend_url,
            stream = config.stream_enabled,
            state = %self.state(),
            settled,
            "connected"
        );
        Ok(())
    }

    /// Disconnect from the backend.
    ///
    /// Stops the background tasks, releases the push stream, and marks the
    /// store stale. Values are kept. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        // Cancel the child token (not the parent) so a later connect works.
        self.inner.cancel_child.lock().await.cancel();
        self.inner.transport.disconnect();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        // The previous receiver was consumed by the command processor task.
        {
            let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
            *self.inner.command_tx.lock().await = tx;
            *self.inner.command_rx.lock().await = Some(rx);
        }

        self.inner.stream_up.store(false, Ordering::SeqCst);
        self.inner.store.mark_stale(true);
        self.set_state(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// Skip any pending reconnect backoff and retry the push stream now.
    pub fn reconnect_now(&self) {
        self.inner.transport.reconnect_now();
    }

    /// Poll every catalogued channel and merge the results.
    ///
    /// Returns how many channels reported a decodable value, whether or not
    /// it changed the store. Polls run concurrently; every successful one
    /// is applied even if others fail, and the first failure is returned.
    pub async fn reconcile(&self) -> Result<usize, CoreError> {
        let ids: Vec<ChannelId> = self.catalog().ids().collect();
        let transport = &self.inner.transport;
        let results = join_all(
            ids.iter()
                .map(|id| async move { (id, transport.poll(id.name()).await) }),
        )
        .await;

        let mut reported = 0;
        let mut first_error = None;
        for (id, result) in results {
            match result {
                Ok(Some(record)) => {
                    if self.ingest_record(id, &record) {
                        reported += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(channel = %id, error = %e, "poll failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reported),
        }
    }

    // ── Ingestion ────────────────────────────────────────────────

    fn ingest_push(&self, msg: &PushMessage) {
        match convert::push_to_update(self.catalog(), msg) {
            Ok(update) => {
                let outcome = self.inner.store.apply(update);
                trace!(channel = %msg.channel, value = %msg.value, ?outcome, "push applied");
            }
            Err(e) => debug!(error = %e, channel = %msg.channel, "dropping malformed push message"),
        }
    }

    fn ingest_record(&self, channel: &ChannelId, record: &FeedRecord) -> bool {
        match convert::record_to_update(channel, record) {
            Ok(update) => {
                self.inner.store.apply(update);
                true
            }
            Err(e) => {
                debug!(channel = %channel, error = %e, "dropping malformed poll result");
                false
            }
        }
    }

    /// Reconcile after the stream came back; only a complete
    /// reconciliation clears staleness.
    ///
    /// The stream may drop again while the polls are in flight, so the
    /// transition is re-checked against the live flag before committing.
    async fn recover(&self) -> bool {
        match self.reconcile().await {
            Ok(reported) => {
                let inner = &self.inner;
                let restored = inner.connection_state.send_if_modified(|state| {
                    if *state == ConnectionState::Degraded && inner.stream_up.load(Ordering::SeqCst) {
                        inner.store.mark_stale(false);
                        *state = ConnectionState::Connected;
                        true
                    } else {
                        false
                    }
                });
                if restored {
                    info!(reported, "stream restored, store reconciled");
                } else {
                    debug!(reported, "stream dropped during reconciliation, staying degraded");
                }
                restored
            }
            Err(e) => {
                warn!(error = %e, "reconciliation failed, staying degraded");
                false
            }
        }
    }

    // ── Command execution ────────────────────────────────────────

    /// Execute a command against the backend.
    ///
    /// Commands are processed one at a time in submission order; an
    /// actuator command's acknowledgment wait does not block the next one.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if !self.state().accepts_commands() {
            return Err(CoreError::Disconnected);
        }

        let (tx, rx) = oneshot::channel();
        let command_tx = self.inner.command_tx.lock().await.clone();

        command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::Disconnected)?;

        rx.await.map_err(|_| CoreError::Disconnected)?
    }

    /// Drive an actuator and wait for the outcome.
    pub async fn set_actuator(&self, channel: &str, value: &str) -> Result<PendingCommand, CoreError> {
        let cmd = Command::SetActuator {
            channel: channel.to_owned(),
            value: value.to_owned(),
        };
        match self.execute(cmd).await? {
            CommandResult::Actuator(command) => Ok(command),
            other => Err(unexpected(&other)),
        }
    }

    /// Write a threshold to the backend and apply it locally.
    pub async fn set_threshold(
        &self,
        channel: &str,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<Option<Threshold>, CoreError> {
        let cmd = Command::SetThreshold {
            channel: channel.to_owned(),
            lower,
            upper,
        };
        match self.execute(cmd).await? {
            CommandResult::Threshold(threshold) => Ok(threshold),
            other => Err(unexpected(&other)),
        }
    }

    /// Force a full reconciliation through the command queue.
    pub async fn refresh(&self) -> Result<usize, CoreError> {
        match self.execute(Command::RefreshAll).await? {
            CommandResult::Refreshed(count) => Ok(count),
            other => Err(unexpected(&other)),
        }
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: connect, run closure, disconnect.
    ///
    /// Disables the push stream and fallback polling; `connect` then does a
    /// single REST reconciliation.
    pub async fn oneshot<F, Fut, T>(config: SyncConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.stream_enabled = false;
        cfg.polling_interval = Duration::ZERO;

        let controller = Controller::new(cfg)?;
        controller.connect().await?;
        let result = f(controller.clone()).await;
        controller.disconnect().await;
        result
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.connection_state.borrow()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.store.snapshot()
    }

    /// Subscribe to snapshot publications.
    pub fn subscribe(&self) -> SnapshotStream {
        self.inner.store.subscribe()
    }

    /// Terminal command outcomes (acknowledged, failed, timed out).
    pub fn resolutions(&self) -> broadcast::Receiver<CommandResolution> {
        self.inner.store.resolutions()
    }

    pub fn pending_commands(&self) -> Vec<PendingCommand> {
        self.inner.store.pending_commands()
    }

    pub fn thresholds(&self) -> BTreeMap<String, Threshold> {
        self.inner.evaluator.all()
    }

    /// Channels in the current snapshot that are outside their thresholds.
    pub fn alerts(&self) -> Vec<Alert> {
        self.inner.evaluator.alerts(&self.snapshot())
    }

    /// Classify a channel's current value. `None` if it has no value yet.
    pub fn classify(&self, channel: &str) -> Option<Classification> {
        let value = self.snapshot().value(channel)?;
        Some(self.inner.evaluator.classify(channel, &value))
    }

    /// Recent data points for a channel, newest first.
    pub async fn history(&self, channel: &str, limit: u32) -> Result<Vec<FeedRecord>, CoreError> {
        let id = self.resolve(channel)?;
        self.inner.transport.history(id.name(), limit).await
    }

    /// Probe the backend without touching the store.
    pub async fn health(&self) -> Result<String, CoreError> {
        self.inner.transport.health().await
    }

    // ── Internals ────────────────────────────────────────────────

    fn set_state(&self, state: ConnectionState) {
        let previous = self.inner.connection_state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    fn resolve(&self, channel: &str) -> Result<ChannelId, CoreError> {
        self.catalog().resolve(channel).map_err(|e| match e {
            ParseError::UnknownChannel(name) => CoreError::UnknownChannel { name },
            other => CoreError::Parse(other),
        })
    }

    /// Register, predict, and send an actuator command. Runs inside the
    /// command processor so sends leave in submission order.
    async fn start_actuator(&self, channel: &str, raw: &str) -> Result<InFlight, CoreError> {
        let id = self.resolve(channel)?;
        let value = ChannelValue::parse(&id, raw)?;
        let inflight = self.inner.dispatcher.begin(&id, value)?;
        self.inner.dispatcher.send(&inflight).await?;
        Ok(inflight)
    }
}

fn unexpected(result: &CommandResult) -> CoreError {
    CoreError::Internal(format!("unexpected command result: {result:?}"))
}

// ── Background tasks ─────────────────────────────────────────────

/// Consume push stream events until cancelled or the stream gives up.
async fn stream_task(
    controller: Controller,
    mut events: broadcast::Receiver<StreamEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(StreamEvent::Message(msg)) => controller.ingest_push(&msg),
                Ok(StreamEvent::ConnectionLost { reason }) => {
                    warn!(%reason, "push stream lost, values now stale");
                    controller.inner.stream_up.store(false, Ordering::SeqCst);
                    controller.set_state(ConnectionState::Degraded);
                    controller.inner.store.mark_stale(true);
                }
                Ok(StreamEvent::Reconnected) => {
                    controller.inner.stream_up.store(true, Ordering::SeqCst);
                    controller.recover().await;
                }
                Ok(StreamEvent::GaveUp) => {
                    warn!("push stream retries exhausted");
                    // disconnect() joins this task, so it must run elsewhere.
                    let ctrl = controller.clone();
                    tokio::spawn(async move { ctrl.disconnect().await });
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "stream consumer lagged, reconciling");
                    if let Err(e) = controller.reconcile().await {
                        warn!(error = %e, "reconciliation after lag failed");
                    }
                }
                Err(RecvError::Closed) => {
                    debug!("push stream event channel closed");
                    break;
                }
            },
        }
    }
}

/// While degraded, poll every channel on a fixed cadence. Once the stream
/// is back and a poll round succeeds, the store is declared fresh.
async fn fallback_poll_task(controller: Controller, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if controller.state() != ConnectionState::Degraded {
                    continue;
                }
                if controller.inner.stream_up.load(Ordering::SeqCst) {
                    controller.recover().await;
                } else if let Err(e) = controller.reconcile().await {
                    debug!(error = %e, "fallback poll failed");
                }
            }
        }
    }
}

/// Serializes command execution. Actuator acknowledgment waits are
/// spawned so a slow echo never holds up the queue.
async fn command_processor_task(
    controller: Controller,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(CommandEnvelope { command, response_tx }) = envelope else { break };
                match command {
                    Command::SetActuator { channel, value } => {
                        match controller.start_actuator(&channel, &value).await {
                            Ok(inflight) => {
                                let dispatcher = controller.inner.dispatcher.clone();
                                tokio::spawn(async move {
                                    let result = dispatcher
                                        .await_ack(inflight)
                                        .await
                                        .map(CommandResult::Actuator);
                                    let _ = response_tx.send(result);
                                });
                            }
                            Err(e) => {
                                let _ = response_tx.send(Err(e));
                            }
                        }
                    }
                    other => {
                        let result = route_command(&controller, other).await;
                        let _ = response_tx.send(result);
                    }
                }
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────

async fn route_command(controller: &Controller, cmd: Command) -> Result<CommandResult, CoreError> {
    match cmd {
        Command::SetThreshold {
            channel,
            lower,
            upper,
        } => {
            let id = controller.resolve(&channel)?;
            // Validate before anything leaves the process.
            if lower.is_some() || upper.is_some() {
                threshold::validate(id.name(), lower, upper)?;
            }
            controller
                .inner
                .transport
                .write_threshold(id.name(), ThresholdBounds { lower, upper })
                .await?;
            let applied = controller
                .inner
                .evaluator
                .set_threshold(id.name(), lower, upper)?;
            info!(channel = %id, ?lower, ?upper, "threshold updated");
            Ok(CommandResult::Threshold(applied))
        }
        Command::RefreshAll => controller.reconcile().await.map(CommandResult::Refreshed),
        Command::SetActuator { channel, value } => {
            // Normally intercepted by the processor; handled inline here.
            let inflight = controller.start_actuator(&channel, &value).await?;
            controller
                .inner
                .dispatcher
                .await_ack(inflight)
                .await
                .map(CommandResult::Actuator)
        }
    }
}
