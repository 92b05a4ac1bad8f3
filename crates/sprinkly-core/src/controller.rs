// ── Controller abstraction ──
//
// Full lifecycle management for one OpenSprinkler controller. A single
// engine task owns the reconciler and is the only writer to the entity
// host: poll results, push messages and command effects are all funnelled
// through it. Network work (status fetches, command sends) runs in
// spawned tasks whose results come back through a channel and are
// discarded once stopping has begun.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use sprinkly_api::{PushConfig, PushEvent, PushHandle, ReconnectConfig, SprinklerClient, TransportConfig};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::command_for_action;
use crate::bridge::{PushOutcome, decode_push};
use crate::command::{Command, CommandEnvelope, CommandOutcome, SentCommand};
use crate::config::{ControllerConfig, DEFAULT_MQTT_PORT, PushSettings};
use crate::decoder::{self, MqttAnnouncement};
use crate::dispatcher::{self, DispatchDefaults, Dispatcher, RetryPolicy, SendReport};
use crate::error::CoreError;
use crate::health::{Availability, HealthTracker};
use crate::host::EntityHost;
use crate::model::EntityId;
use crate::poller::PollScheduler;
use crate::reconciler::{CycleReport, Reconciler};

const INBOX_CAPACITY: usize = 64;
const DONE_CHANNEL_CAPACITY: usize = 64;
const PUSH_CHANNEL_CAPACITY: usize = 256;

type RefreshReply = oneshot::Sender<Result<CycleReport, CoreError>>;

/// Requests from `Controller` handles to the engine.
enum Inbound {
    Command(CommandEnvelope),
    Refresh(RefreshReply),
    AttachPush {
        events: mpsc::Receiver<PushEvent>,
        prefix: String,
    },
}

/// Results reported back by spawned network tasks.
enum TaskDone {
    Poll(Result<Value, sprinkly_api::Error>),
    Command {
        report: SendReport,
        reply: oneshot::Sender<Result<CommandOutcome, CoreError>>,
    },
}

// ── Controller ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Manages the engine
/// lifecycle, command routing and availability observation.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    host: Arc<dyn EntityHost>,
    inbox_tx: mpsc::Sender<Inbound>,
    pending: Mutex<Option<Pending>>,
    availability: watch::Receiver<Availability>,
    running: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Engine state created up front and moved into the task on `start()`.
struct Pending {
    inbox_rx: mpsc::Receiver<Inbound>,
    health: HealthTracker,
}

impl Controller {
    /// Create a controller writing into `host`. Does NOT start polling --
    /// call [`start()`](Self::start).
    pub fn new(config: ControllerConfig, host: Arc<dyn EntityHost>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let health = HealthTracker::new(config.error_interval, config.max_backoff);
        let availability = health.subscribe();

        Self {
            inner: Arc::new(ControllerInner {
                config,
                host,
                inbox_tx,
                pending: Mutex::new(Some(Pending { inbox_rx, health })),
                availability,
                running: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn host(&self) -> &Arc<dyn EntityHost> {
        &self.inner.host
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Validate configuration and spawn the engine. The first status
    /// poll starts immediately.
    pub async fn start(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;
        config.validate()?;
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Stopped);
        }

        let transport = TransportConfig::with_timeout(config.request_timeout);
        let client = SprinklerClient::new(&config.host, config.password.clone(), &transport)?;

        let Some(pending) = self.inner.pending.lock().await.take() else {
            return Err(CoreError::config("controller already started"));
        };

        let (done_tx, done_rx) = mpsc::channel(DONE_CHANNEL_CAPACITY);
        let engine = Engine {
            config: config.clone(),
            client,
            reconciler: Reconciler::new(Arc::clone(&self.inner.host)),
            health: pending.health,
            scheduler: PollScheduler::starting_now(),
            cancel: self.inner.cancel.clone(),
            done_tx,
            current_waiters: Vec::new(),
            queued_waiters: Vec::new(),
            push: None,
        };

        let handle = tokio::spawn(engine.run(pending.inbox_rx, done_rx));
        *self.inner.task.lock().await = Some(handle);
        self.inner.running.store(true, Ordering::SeqCst);
        info!(host = %config.host, "controller started");
        Ok(())
    }

    /// Stop the engine: cancel pending retries and timers, discard
    /// in-flight results, and wait for the engine task to finish.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.task.lock().await.take() {
            let _ = handle.await;
        }
        debug!("controller stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst) && !self.inner.cancel.is_cancelled()
    }

    // ── Intents ──────────────────────────────────────────────────────

    /// Force a full status poll and wait for its result.
    ///
    /// If a poll is already in flight, a new one is queued behind it.
    pub async fn refresh(&self) -> Result<CycleReport, CoreError> {
        self.ensure_running()?;
        let (tx, rx) = oneshot::channel();
        self.inner
            .inbox_tx
            .send(Inbound::Refresh(tx))
            .await
            .map_err(|_| CoreError::Stopped)?;
        rx.await.map_err(|_| CoreError::Stopped)?
    }

    /// Execute a command and wait for the controller to accept it.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome, CoreError> {
        self.ensure_running()?;
        if command == Command::Refresh {
            return self.refresh().await.map(|_| CommandOutcome::default());
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .inbox_tx
            .send(Inbound::Command(CommandEnvelope {
                command,
                response_tx: tx,
            }))
            .await
            .map_err(|_| CoreError::Stopped)?;
        rx.await.map_err(|_| CoreError::Stopped)?
    }

    /// Execute a host action such as `irrigation_zone.run`.
    pub async fn perform_action(
        &self,
        id: &EntityId,
        action: &str,
        params: &Value,
    ) -> Result<CommandOutcome, CoreError> {
        let command = command_for_action(id, action, params)?;
        self.execute(command).await
    }

    /// Feed push events from a subscription managed outside the engine.
    ///
    /// Replaces any subscription the engine started itself. Topics are
    /// matched under `topic_prefix`; send [`PushEvent::Connected`] once the
    /// source is live so periodic polling can pause.
    pub async fn attach_push(
        &self,
        events: mpsc::Receiver<PushEvent>,
        topic_prefix: &str,
    ) -> Result<(), CoreError> {
        self.ensure_running()?;
        self.inner
            .inbox_tx
            .send(Inbound::AttachPush {
                events,
                prefix: topic_prefix.trim_end_matches('/').to_owned(),
            })
            .await
            .map_err(|_| CoreError::Stopped)
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to availability changes.
    pub fn availability(&self) -> watch::Receiver<Availability> {
        self.inner.availability.clone()
    }

    /// One-shot: start, run closure after a forced refresh, stop.
    pub async fn oneshot<F, Fut, T>(
        config: ControllerConfig,
        host: Arc<dyn EntityHost>,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let controller = Controller::new(config, host);
        controller.start().await?;
        let result = match controller.refresh().await {
            Ok(_) => f(controller.clone()).await,
            Err(e) => Err(e),
        };
        controller.stop().await;
        result
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(CoreError::Stopped)
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

struct Engine {
    config: ControllerConfig,
    client: SprinklerClient,
    reconciler: Reconciler,
    health: HealthTracker,
    scheduler: PollScheduler,
    cancel: CancellationToken,
    done_tx: mpsc::Sender<TaskDone>,
    /// Waiting on the poll currently in flight.
    current_waiters: Vec<RefreshReply>,
    /// Waiting on the next poll.
    queued_waiters: Vec<RefreshReply>,
    push: Option<PushState>,
}

struct PushState {
    /// `None` when events come from an attached external source.
    handle: Option<PushHandle>,
    events: mpsc::Receiver<PushEvent>,
    prefix: String,
    connected: bool,
    controller_online: bool,
}

impl PushState {
    fn healthy(&self) -> bool {
        self.connected && self.controller_online
    }
}

impl Engine {
    async fn run(mut self, mut inbox: mpsc::Receiver<Inbound>, mut done_rx: mpsc::Receiver<TaskDone>) {
        debug!("engine running");
        loop {
            let deadline = self.scheduler.armed_deadline();
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(done) = done_rx.recv() => self.on_task_done(done),
                msg = inbox.recv() => match msg {
                    Some(Inbound::Command(envelope)) => self.on_command(envelope),
                    Some(Inbound::Refresh(reply)) => self.request_refresh(Some(reply)),
                    Some(Inbound::AttachPush { events, prefix }) => {
                        info!(%prefix, "push source attached");
                        self.attach_push(events, prefix, None);
                    }
                    None => break,
                },
                event = next_push(&mut self.push) => self.on_push(event),
                () = sleep_until(deadline) => self.start_poll(),
            }
        }
        self.detach_push();
        debug!("engine exited");
    }

    // ── Polling ──────────────────────────────────────────────────────

    fn request_refresh(&mut self, reply: Option<RefreshReply>) {
        if let Some(reply) = reply {
            self.queued_waiters.push(reply);
        }
        if self.scheduler.request_refresh() {
            self.start_poll();
        } else {
            debug!("poll in flight, refresh queued");
        }
    }

    fn start_poll(&mut self) {
        if self.cancel.is_cancelled() || !self.scheduler.begin() {
            return;
        }
        self.current_waiters.append(&mut self.queued_waiters);

        let client = self.client.clone();
        let cancel = self.cancel.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                result = client.fetch_status() => result,
            };
            let _ = done_tx.send(TaskDone::Poll(result)).await;
        });
    }

    fn on_poll_done(&mut self, result: Result<Value, sprinkly_api::Error>) {
        if self.cancel.is_cancelled() {
            return;
        }
        let now = Instant::now();
        let waiters = std::mem::take(&mut self.current_waiters);

        let (reply, poll_again) = match result {
            Ok(doc) => {
                let report = self.apply_status(&doc);
                let healthy = self.push.as_ref().is_some_and(PushState::healthy);
                let again = self
                    .scheduler
                    .succeeded(now, self.config.poll_interval, healthy);
                (Ok(report), again)
            }
            Err(e) => {
                let error = CoreError::from(e);
                let outcome = self.health.record_failure();
                let again = self.scheduler.failed(now, outcome.retry_in);
                if outcome.became_unavailable {
                    warn!(failures = outcome.failures, error = %error, "controller unavailable");
                    self.set_system_availability(false);
                } else {
                    warn!(
                        failures = outcome.failures,
                        retry_in_secs = outcome.retry_in.as_secs(),
                        error = %error,
                        "status poll failed"
                    );
                }
                (Err(error), again)
            }
        };

        for waiter in waiters {
            let _ = waiter.send(reply.clone());
        }
        if poll_again {
            self.start_poll();
        }
    }

    fn apply_status(&mut self, doc: &Value) -> CycleReport {
        let decoded = decoder::decode(doc);
        for issue in &decoded.issues {
            warn!(id = %issue.id, message = %issue.message, "status entry degraded");
        }

        if self.health.record_success() {
            info!("controller available");
        }

        let report = self.reconciler.apply_all(&decoded.updates);
        if let Some(run) = &decoded.last_run {
            if let Err(e) = self.reconciler.apply_last_run(run) {
                warn!(error = %e, "failed to apply last-run record");
            }
        }
        self.set_system_availability(true);

        if let Some(announced) = &decoded.mqtt {
            self.maybe_start_push(announced);
        }

        debug!(
            entities = report.entities,
            changed = report.changed,
            failed = report.failed,
            "status applied"
        );
        report
    }

    fn set_system_availability(&self, available: bool) {
        if let Err(e) = self.reconciler.set_system_availability(available) {
            warn!(error = %e, "failed to update controller availability");
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn on_command(&mut self, envelope: CommandEnvelope) {
        let CommandEnvelope {
            command,
            response_tx,
        } = envelope;

        match command {
            Command::Refresh => {
                self.request_refresh(None);
                let _ = response_tx.send(Ok(CommandOutcome::default()));
            }
            Command::RestartPush => {
                self.restart_push();
                let _ = response_tx.send(Ok(CommandOutcome::default()));
            }
            Command::SetEnabled { .. } | Command::SetState { .. } => {
                self.dispatch(&command, response_tx);
            }
        }
    }

    fn dispatch(
        &mut self,
        command: &Command,
        reply: oneshot::Sender<Result<CommandOutcome, CoreError>>,
    ) {
        let defaults = DispatchDefaults {
            zone_duration: self.config.default_zone_duration,
            rain_delay_hours: self.config.default_rain_delay_hours,
        };
        let planned = Dispatcher::new(self.reconciler.host().as_ref(), defaults)
            .plan(command, chrono::Utc::now().timestamp());

        let plans = match planned {
            Ok(plans) if plans.is_empty() => {
                debug!(?command, "nothing to send");
                let _ = reply.send(Ok(CommandOutcome::default()));
                return;
            }
            Ok(plans) => plans,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let policy = RetryPolicy {
            retries: self.config.command_retries,
            base: self.config.error_interval,
            cap: self.config.command_retry_cap,
        };
        let client = self.client.clone();
        let cancel = self.cancel.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let report = dispatcher::send_all(&client, plans, policy, &cancel).await;
            let _ = done_tx.send(TaskDone::Command { report, reply }).await;
        });
    }

    fn on_command_done(
        &mut self,
        report: SendReport,
        reply: oneshot::Sender<Result<CommandOutcome, CoreError>>,
    ) {
        if self.cancel.is_cancelled() {
            let _ = reply.send(Err(CoreError::Stopped));
            return;
        }

        let mut outcome = CommandOutcome::default();
        for plan in report.completed {
            match self.reconciler.apply_existing(&plan.target, &plan.effects) {
                Ok(changes) => outcome.changed.extend(changes),
                Err(e) => warn!(id = %plan.target, error = %e, "failed to apply command effects"),
            }
            debug!(id = %plan.target, verb = %plan.verb, "command accepted");
            outcome.sent.push(SentCommand {
                verb: plan.verb,
                target: plan.target,
                params: plan.params,
            });
        }

        let result = match report.error {
            Some(e) => Err(e),
            None => Ok(outcome),
        };
        let _ = reply.send(result);
    }

    fn on_task_done(&mut self, done: TaskDone) {
        match done {
            TaskDone::Poll(result) => self.on_poll_done(result),
            TaskDone::Command { report, reply } => self.on_command_done(report, reply),
        }
    }

    // ── Push channel ─────────────────────────────────────────────────

    fn maybe_start_push(&mut self, announced: &MqttAnnouncement) {
        if self.push.is_some() || !announced.enabled {
            return;
        }
        let Some(settings) = self.config.push_settings() else {
            return;
        };
        let Some(push_config) = push_config(settings, announced) else {
            warn!("controller publishes to MQTT but no broker host is known");
            return;
        };

        info!(
            broker = %push_config.broker_host,
            port = push_config.broker_port,
            filter = %push_config.topic_filter(),
            "starting push channel"
        );
        let prefix = push_config.topic_prefix.trim_end_matches('/').to_owned();
        let (events_tx, events) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
        let handle = PushHandle::spawn(
            push_config,
            ReconnectConfig::default(),
            events_tx,
            self.cancel.child_token(),
        );
        self.attach_push(events, prefix, Some(handle));
    }

    fn attach_push(
        &mut self,
        events: mpsc::Receiver<PushEvent>,
        prefix: String,
        handle: Option<PushHandle>,
    ) {
        self.detach_push();
        self.push = Some(PushState {
            handle,
            events,
            prefix,
            connected: false,
            controller_online: true,
        });
        self.scheduler
            .resume(Instant::now(), self.config.poll_interval);
    }

    fn detach_push(&mut self) {
        if let Some(handle) = self.push.take().and_then(|push| push.handle) {
            handle.shutdown();
        }
    }

    fn restart_push(&mut self) {
        if self.push.is_some() {
            info!("restarting push channel");
        }
        self.detach_push();
        self.scheduler
            .resume(Instant::now(), self.config.poll_interval);
        self.request_refresh(None);
    }

    fn on_push(&mut self, event: Option<PushEvent>) {
        let Some(push) = self.push.as_mut() else {
            return;
        };
        let was_healthy = push.healthy();

        match event {
            None => {
                warn!("push channel closed, falling back to polling");
                self.push = None;
            }
            Some(PushEvent::Connected) => {
                info!("push channel connected");
                push.connected = true;
                // Catch up on anything published while disconnected.
                self.request_refresh(None);
            }
            Some(PushEvent::Disconnected { reason }) => {
                warn!(%reason, "push channel disconnected");
                push.connected = false;
            }
            Some(PushEvent::Message(message)) => {
                debug!(topic = %message.topic, payload = %message.payload, "push message");
                let prefix = push.prefix.clone();
                match decode_push(
                    &prefix,
                    &message.topic,
                    &message.payload,
                    chrono::Utc::now().timestamp(),
                ) {
                    Ok(outcome) => self.apply_push(&outcome),
                    Err(e) => warn!(topic = %message.topic, error = %e, "undecodable push message"),
                }
            }
        }

        let healthy = self.push.as_ref().is_some_and(PushState::healthy);
        if healthy && !was_healthy {
            self.scheduler.suspend();
        } else if !healthy {
            self.scheduler
                .resume(Instant::now(), self.config.poll_interval);
        }
    }

    fn apply_push(&mut self, outcome: &PushOutcome) {
        for update in &outcome.updates {
            if let Err(e) = self.reconciler.apply_existing(&update.id, &update.attributes) {
                warn!(id = %update.id, error = %e, "failed to apply push update");
            }
        }

        if let Some(online) = outcome.availability {
            if let Some(push) = self.push.as_mut() {
                push.controller_online = online;
            }
            if !online {
                warn!("controller reported offline");
                if self.health.force_unavailable() {
                    self.set_system_availability(false);
                }
            }
        }

        if let Some(flow) = outcome.flow {
            info!(count = flow.count, volume = flow.volume, "flow sensor reading");
        }

        if outcome.refresh {
            self.request_refresh(None);
        }
    }
}

/// Broker coordinates: configured values first, then what the controller
/// reports, then the MQTT default port.
fn push_config(settings: &PushSettings, announced: &MqttAnnouncement) -> Option<PushConfig> {
    let host = settings
        .broker_host
        .clone()
        .or_else(|| announced.host.clone())
        .filter(|h| !h.trim().is_empty())?;
    let port = settings
        .broker_port
        .or(announced.port)
        .unwrap_or(DEFAULT_MQTT_PORT);

    let mut config = PushConfig::new(host, port);
    config.username.clone_from(&settings.username);
    config.password.clone_from(&settings.password);
    config.client_id.clone_from(&settings.client_id);
    config.topic_prefix.clone_from(&settings.topic_prefix);
    Some(config)
}

/// Next push event, or pending forever while no subscription exists.
async fn next_push(push: &mut Option<PushState>) -> Option<PushEvent> {
    match push {
        Some(push) => push.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn announced(host: Option<&str>, port: Option<u16>) -> MqttAnnouncement {
        MqttAnnouncement {
            enabled: true,
            host: host.map(str::to_owned),
            port,
        }
    }

    #[test]
    fn push_config_prefers_configured_broker() {
        let settings = PushSettings {
            broker_host: Some("broker.lan".into()),
            broker_port: Some(8883),
            ..PushSettings::default()
        };
        let config = push_config(&settings, &announced(Some("10.0.0.2"), Some(1884))).unwrap();
        assert_eq!(config.broker_host, "broker.lan");
        assert_eq!(config.broker_port, 8883);
    }

    #[test]
    fn push_config_falls_back_to_announcement() {
        let config =
            push_config(&PushSettings::default(), &announced(Some("10.0.0.2"), None)).unwrap();
        assert_eq!(config.broker_host, "10.0.0.2");
        assert_eq!(config.broker_port, DEFAULT_MQTT_PORT);
        assert_eq!(config.topic_filter(), "opensprinkler/#");
    }

    #[test]
    fn push_config_needs_a_host() {
        assert!(push_config(&PushSettings::default(), &announced(None, Some(1883))).is_none());
        assert!(push_config(&PushSettings::default(), &announced(Some(" "), None)).is_none());
    }

    #[tokio::test]
    async fn intents_before_start_are_rejected() {
        let host = Arc::new(crate::store::MemoryHost::new());
        let controller = Controller::new(ControllerConfig::new("10.0.0.5", "pw".to_string().into()), host);
        assert!(!controller.is_running());
        assert!(matches!(controller.refresh().await, Err(CoreError::Stopped)));
    }

    #[tokio::test]
    async fn start_rejects_blank_password() {
        let host = Arc::new(crate::store::MemoryHost::new());
        let controller = Controller::new(ControllerConfig::new("10.0.0.5", String::new().into()), host);
        assert!(matches!(controller.start().await, Err(CoreError::Config { .. })));
    }
}
