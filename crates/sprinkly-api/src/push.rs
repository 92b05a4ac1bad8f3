//! MQTT push channel with auto-reconnect.
//!
//! The controller firmware can publish abbreviated state changes to an MQTT
//! broker under `opensprinkler/...`. This module subscribes to that prefix
//! and forwards every message, plus connection transitions, through a
//! bounded [`tokio::sync::mpsc`] channel. Reconnection uses capped
//! exponential backoff and runs until the cancellation token fires.
//!
//! # Example
//!
//! ```rust,ignore
//! use sprinkly_api::push::{PushConfig, PushHandle, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! let handle = PushHandle::spawn(PushConfig::new("broker.local", 1883), ReconnectConfig::default(), tx, CancellationToken::new());
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//!
//! handle.shutdown();
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Topic prefix the firmware publishes under unless reconfigured.
pub const DEFAULT_TOPIC_PREFIX: &str = "opensprinkler";

const REQUEST_CHANNEL_CAPACITY: usize = 32;

// ── Wire types ───────────────────────────────────────────────────────

/// A raw message received on the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub topic: String,
    pub payload: String,
}

/// Everything the push loop reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Broker accepted the connection and the subscription was requested.
    Connected,
    /// Connection to the broker dropped; the loop is backing off.
    Disconnected { reason: String },
    /// A publish on the subscribed prefix.
    Message(PushMessage),
}

// ── Configuration ────────────────────────────────────────────────────

/// Broker coordinates for the push channel.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub client_id: String,
    pub topic_prefix: String,
    pub keep_alive: Duration,
}

impl PushConfig {
    pub fn new(broker_host: impl Into<String>, broker_port: u16) -> Self {
        Self {
            broker_host: broker_host.into(),
            broker_port,
            username: None,
            password: None,
            client_id: "sprinkly".into(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.into(),
            keep_alive: Duration::from_secs(30),
        }
    }

    /// Wildcard filter covering every topic the firmware publishes.
    pub fn topic_filter(&self) -> String {
        format!("{}/#", self.topic_prefix.trim_end_matches('/'))
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker_host, self.broker_port);
        options.set_keep_alive(self.keep_alive);
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            options.set_credentials(username, password.expose_secret());
        }
        options
    }
}

/// Exponential backoff configuration for broker reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

// ── PushHandle ───────────────────────────────────────────────────────

/// Handle to a running push subscription.
///
/// Dropping the handle does not stop the background task; call
/// [`shutdown`](Self::shutdown) or cancel the parent token.
#[derive(Debug)]
pub struct PushHandle {
    cancel: CancellationToken,
}

impl PushHandle {
    /// Spawn the subscription loop. Returns immediately; the first connection
    /// attempt happens asynchronously and is reported as [`PushEvent::Connected`].
    pub fn spawn(
        config: PushConfig,
        reconnect: ReconnectConfig,
        events: mpsc::Sender<PushEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            push_loop(config, reconnect, events, task_cancel).await;
        });
        Self { cancel }
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ── Background loop ──────────────────────────────────────────────────

/// Main loop: poll the MQTT event loop, forward publishes, back off on error.
async fn push_loop(
    config: PushConfig,
    reconnect: ReconnectConfig,
    events: mpsc::Sender<PushEvent>,
    cancel: CancellationToken,
) {
    let (client, mut event_loop) = AsyncClient::new(config.mqtt_options(), REQUEST_CHANNEL_CAPACITY);
    let filter = config.topic_filter();
    let mut attempt: u32 = 0;

    tracing::info!(
        broker = %config.broker_host,
        port = config.broker_port,
        %filter,
        "starting MQTT push loop"
    );

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            polled = event_loop.poll() => {
                let outcome = match polled {
                    Ok(event) => {
                        let forwarded = handle_event(event, &client, &filter);
                        if forwarded == Some(PushEvent::Connected) {
                            attempt = 0;
                        }
                        forwarded
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "MQTT connection error");
                        Some(PushEvent::Disconnected { reason: e.to_string() })
                    }
                };

                let backing_off = matches!(outcome, Some(PushEvent::Disconnected { .. }));
                if let Some(event) = outcome {
                    if events.send(event).await.is_err() {
                        tracing::debug!("push consumer dropped, stopping MQTT loop");
                        break;
                    }
                }

                if backing_off {
                    let delay = calculate_backoff(attempt, &reconnect);
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    let _ = client.try_disconnect();
    tracing::debug!("MQTT push loop exiting");
}

/// Translate one rumqttc event into a consumer-facing event.
fn handle_event(event: Event, client: &AsyncClient, filter: &str) -> Option<PushEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => {
            // Subscriptions do not survive a clean-session reconnect.
            if let Err(e) = client.try_subscribe(filter, QoS::AtMostOnce) {
                tracing::warn!(error = %e, %filter, "MQTT subscribe request failed");
            }
            tracing::info!(%filter, "MQTT connected");
            Some(PushEvent::Connected)
        }
        Event::Incoming(Packet::Publish(publish)) => {
            match String::from_utf8(publish.payload.to_vec()) {
                Ok(payload) => {
                    tracing::trace!(topic = %publish.topic, %payload, "MQTT publish");
                    Some(PushEvent::Message(PushMessage {
                        topic: publish.topic,
                        payload,
                    }))
                }
                Err(e) => {
                    tracing::debug!(topic = %publish.topic, error = %e, "non UTF-8 MQTT payload");
                    None
                }
            }
        }
        _ => None,
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(16)).unwrap_or(16);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────
