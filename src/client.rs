//! Push stream client: connection lifecycle, reconnect and resubscribe
//!
//! The client is a plain state machine. It never sleeps and never spawns
//! timers; reconnect and resubscribe delays are stored as deadlines that the
//! owner polls through [`StreamClient::poll_timers`]. Everything it wants the
//! owner to know about comes out of [`StreamClient::drain_outputs`].

use crate::{
    connection::{ConnectionHandle, SignalSink, StreamTransport, TransportEvent, TransportSignal},
    data::*,
    error::{ConnectionError, ErrorReporter, MonitorError},
    events::{AttemptId, StreamEvent},
    filter::FilterSelection,
    parser::{EventDecoder, JsonEventDecoder},
    retry::{build_backoff, BackoffStrategy},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

const STREAM_PATH: [&str; 3] = ["api", "sources", "stream"];

/// Something the owner of the client must act on
#[derive(Debug, Clone, PartialEq)]
pub enum ClientOutput {
    StateChanged(ConnectionState),
    /// A new connection attempt is being opened
    Opening { attempt: AttemptId, url: Url },
    /// An attempt was closed; nothing from it will be delivered any more
    Retired { attempt: AttemptId },
    /// Validated event from the live attempt
    Event { attempt: AttemptId, event: StreamEvent },
}

/// Counters for the stream's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub connects: u64,
    pub events: u64,
    pub stale_dropped: u64,
    pub malformed_dropped: u64,
    pub paused_dropped: u64,
    pub transport_errors: u64,
    pub reconnects_scheduled: u64,
}

#[derive(Debug, Clone)]
struct PendingResubscribe {
    due: Instant,
    selection: FilterSelection,
}

/// Maintains at most one live push connection
pub struct StreamClient {
    endpoint: Url,
    transport: Arc<dyn StreamTransport>,
    signals: mpsc::UnboundedSender<TransportSignal>,
    decoder: Box<dyn EventDecoder>,
    backoff: Box<dyn BackoffStrategy>,
    resubscribe_delay: Duration,

    state: ConnectionState,
    last_attempt: AttemptId,
    live: Option<ConnectionHandle>,
    selection: FilterSelection,
    paused: bool,
    closed: bool,
    last_heartbeat: Option<DateTime<Utc>>,
    lost_at: Option<DateTime<Utc>>,

    reconnect_at: Option<Instant>,
    reconnect_attempts: u32,
    pending_resubscribe: Option<PendingResubscribe>,

    stats: StreamStats,
    outputs: Vec<ClientOutput>,
}

impl StreamClient {
    /// Create a client for the backend at `config.base_url`.
    ///
    /// Returns the receiving side of the transport signal channel; the owner
    /// feeds what it receives back into [`StreamClient::handle_transport`].
    pub fn new(
        config: &MonitorConfig,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportSignal>), MonitorError> {
        let endpoint = stream_endpoint(&config.base_url)?;
        let (signals, rx) = mpsc::unbounded_channel();

        let client = Self {
            endpoint,
            transport,
            signals,
            decoder: Box::new(JsonEventDecoder::new()),
            backoff: build_backoff(&config.reconnect),
            resubscribe_delay: config.resubscribe_delay,
            state: ConnectionState::Disconnected,
            last_attempt: 0,
            live: None,
            selection: FilterSelection::default(),
            paused: false,
            closed: false,
            last_heartbeat: None,
            lost_at: None,
            reconnect_at: None,
            reconnect_attempts: 0,
            pending_resubscribe: None,
            stats: StreamStats::default(),
            outputs: Vec::new(),
        };

        Ok((client, rx))
    }

    /// Replace the reconnect backoff strategy
    pub fn with_backoff(mut self, backoff: Box<dyn BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the payload decoder
    pub fn with_decoder(mut self, decoder: Box<dyn EventDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Stream URL for a selection; unrestricted dimensions are omitted
    pub fn build_url(&self, selection: &FilterSelection) -> Url {
        let mut url = self.endpoint.clone();
        let pairs = selection.query_pairs();
        if !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &pairs {
                query.append_pair(key, value);
            }
        }
        url
    }

    /// Open a connection for `selection`, closing any live one first.
    ///
    /// A deliberate connect starts a fresh retry budget.
    pub fn connect(&mut self, selection: &FilterSelection) -> AttemptId {
        self.reconnect_attempts = 0;
        self.open_attempt(selection)
    }

    fn open_attempt(&mut self, selection: &FilterSelection) -> AttemptId {
        self.closed = false;
        self.pending_resubscribe = None;
        self.retire_live();

        self.selection = selection.clone();
        let url = self.build_url(selection);

        self.last_attempt += 1;
        let attempt = self.last_attempt;

        self.set_state(ConnectionState::Connecting);
        tracing::info!("Connecting stream attempt {} to {}", attempt, url);
        self.outputs.push(ClientOutput::Opening {
            attempt,
            url: url.clone(),
        });

        let sink = SignalSink::new(attempt, self.signals.clone());
        self.live = Some(self.transport.open(url, sink));
        attempt
    }

    /// Close the live connection and reopen with `selection` after the
    /// settle delay. A later call supersedes a pending one.
    pub fn resubscribe(&mut self, selection: &FilterSelection, now: Instant) {
        self.reconnect_at = None;
        self.closed = false;
        self.retire_live();
        self.set_state(ConnectionState::Disconnected);

        if self.pending_resubscribe.is_some() {
            tracing::debug!("Superseding pending resubscribe");
        }

        self.selection = selection.clone();
        self.pending_resubscribe = Some(PendingResubscribe {
            due: now + self.resubscribe_delay,
            selection: selection.clone(),
        });
    }

    /// Terminate permanently; no reconnects are scheduled afterwards
    pub fn close(&mut self) {
        self.closed = true;
        self.reconnect_at = None;
        self.pending_resubscribe = None;
        self.retire_live();
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Stream client closed");
    }

    /// Feed one transport signal. Signals from anything but the live
    /// attempt are dropped.
    pub fn handle_transport(&mut self, signal: TransportSignal, now: Instant) {
        if self.current_attempt() != Some(signal.attempt) {
            self.stats.stale_dropped += 1;
            tracing::debug!(
                "Dropping stale signal from attempt {} (live: {:?})",
                signal.attempt,
                self.current_attempt()
            );
            return;
        }

        match signal.event {
            TransportEvent::Opened => {
                self.stats.connects += 1;
                self.reconnect_attempts = 0;
                self.lost_at = None;
                self.set_state(ConnectionState::Connected);
            }
            TransportEvent::Frame(frame) => match self.decoder.decode(&frame) {
                Ok(Some(event)) => self.accept_event(signal.attempt, event),
                Ok(None) => {}
                Err(e) => {
                    self.stats.malformed_dropped += 1;
                    ErrorReporter::report(&MonitorError::Parse(e), "Decoding stream event");
                }
            },
            TransportEvent::Failed(reason) => {
                self.connection_lost(ConnectionError::EstablishmentFailed(reason), now);
            }
            TransportEvent::Closed => {
                self.connection_lost(
                    ConnectionError::ConnectionLost("stream closed by server".to_string()),
                    now,
                );
            }
        }
    }

    /// Fire due timers
    pub fn poll_timers(&mut self, now: Instant) {
        if let Some(pending) = self.pending_resubscribe.take() {
            if now >= pending.due {
                tracing::info!("Resubscribing stream");
                self.connect(&pending.selection);
            } else {
                self.pending_resubscribe = Some(pending);
            }
        }

        if let Some(due) = self.reconnect_at {
            if now >= due {
                self.reconnect_at = None;
                self.fire_reconnect();
            }
        }
    }

    /// Earliest pending deadline, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        let resubscribe = self.pending_resubscribe.as_ref().map(|p| p.due);
        match (self.reconnect_at, resubscribe) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Take everything produced since the last drain, in order
    pub fn drain_outputs(&mut self) -> Vec<ClientOutput> {
        std::mem::take(&mut self.outputs)
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            tracing::info!("Stream {}", if paused { "paused" } else { "resumed" });
        }
        self.paused = paused;
    }

    /// Flip pause, returning the new value
    pub fn toggle_pause(&mut self) -> bool {
        self.set_paused(!self.paused);
        self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Attempt whose events are currently accepted
    pub fn current_attempt(&self) -> Option<AttemptId> {
        self.live.as_ref().map(ConnectionHandle::attempt)
    }

    /// Selection of the live or next connection
    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat
    }

    /// When the connection was last lost; cleared once it reopens
    pub fn lost_at(&self) -> Option<DateTime<Utc>> {
        self.lost_at
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn has_pending_resubscribe(&self) -> bool {
        self.pending_resubscribe.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    fn accept_event(&mut self, attempt: AttemptId, event: StreamEvent) {
        match &event {
            StreamEvent::MarketData(snapshot) if self.paused => {
                self.stats.paused_dropped += 1;
                tracing::debug!("Paused, discarding update for {}", snapshot.market);
                return;
            }
            StreamEvent::Heartbeat => {
                self.last_heartbeat = Some(Utc::now());
            }
            StreamEvent::ServerError { message } => {
                tracing::warn!("Server reported stream error: {}", message);
            }
            _ => {}
        }

        self.stats.events += 1;
        self.outputs.push(ClientOutput::Event { attempt, event });
    }

    fn connection_lost(&mut self, error: ConnectionError, now: Instant) {
        self.stats.transport_errors += 1;
        ErrorReporter::report(&MonitorError::Connection(error), "Stream connection");

        self.retire_live();
        self.lost_at = Some(Utc::now());
        self.set_state(ConnectionState::Erroring);
        self.schedule_reconnect(now);
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if self.closed || self.reconnect_at.is_some() || self.pending_resubscribe.is_some() {
            return;
        }

        self.reconnect_attempts += 1;
        match self.backoff.delay_for(self.reconnect_attempts) {
            Some(delay) => {
                self.reconnect_at = Some(now + delay);
                self.stats.reconnects_scheduled += 1;
                tracing::info!(
                    "Reconnect attempt {} scheduled in {:?}",
                    self.reconnect_attempts,
                    delay
                );
            }
            None => {
                tracing::error!(
                    "Giving up on stream after {} reconnect attempts",
                    self.reconnect_attempts - 1
                );
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    fn fire_reconnect(&mut self) {
        if self.closed {
            return;
        }
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            tracing::debug!("Reconnect timer fired while {}, skipping", self.state);
            return;
        }

        self.set_state(ConnectionState::Disconnected);
        let selection = self.selection.clone();
        self.open_attempt(&selection);
    }

    fn retire_live(&mut self) {
        if let Some(handle) = self.live.take() {
            let attempt = handle.attempt();
            handle.close();
            self.outputs.push(ClientOutput::Retired { attempt });
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        tracing::info!("Stream state {} -> {}", self.state, state);
        self.state = state;
        self.outputs.push(ClientOutput::StateChanged(state));
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &self.state)
            .field("attempt", &self.current_attempt())
            .field("paused", &self.paused)
            .field("closed", &self.closed)
            .finish()
    }
}

fn stream_endpoint(base_url: &str) -> Result<Url, MonitorError> {
    let invalid = |reason: String| {
        MonitorError::Connection(ConnectionError::InvalidEndpoint(format!("{}: {}", base_url, reason)))
    };

    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base URL".to_string()))?
        .pop_if_empty()
        .extend(STREAM_PATH);
    Ok(url)
}

/// Builder for monitor configuration
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MonitorConfig::default(),
        }
    }

    /// Start from defaults overridden by `MARKET_MONITOR_*` variables
    pub fn from_env() -> Result<Self, MonitorError> {
        let mut builder = Self::new();

        if let Ok(url) = std::env::var("MARKET_MONITOR_BASE_URL") {
            builder = builder.base_url(&url);
        }
        if let Some(ms) = env_millis("MARKET_MONITOR_RECONNECT_DELAY_MS")? {
            builder = builder.reconnect_delay(ms);
        }
        if let Some(ms) = env_millis("MARKET_MONITOR_RESUBSCRIBE_DELAY_MS")? {
            builder = builder.resubscribe_delay(ms);
        }
        if let Ok(raw) = std::env::var("MARKET_MONITOR_SERIES_CAPACITY") {
            let capacity = raw.trim().parse::<usize>().map_err(|e| {
                MonitorError::Configuration(format!("MARKET_MONITOR_SERIES_CAPACITY: {}", e))
            })?;
            builder = builder.series_capacity(capacity);
        }
        if let Ok(raw) = std::env::var("MARKET_MONITOR_BACKOFF") {
            let policy = match raw.trim().to_ascii_lowercase().as_str() {
                "fixed" => BackoffPolicy::Fixed,
                "exponential" => BackoffPolicy::Exponential,
                other => {
                    return Err(MonitorError::Configuration(format!(
                        "MARKET_MONITOR_BACKOFF must be 'fixed' or 'exponential', got '{}'",
                        other
                    )))
                }
            };
            builder = builder.backoff_policy(policy);
        }

        Ok(builder)
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn reconnect_config(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect.delay = delay;
        if self.config.reconnect.max_delay < delay {
            self.config.reconnect.max_delay = delay;
        }
        self
    }

    pub fn backoff_policy(mut self, policy: BackoffPolicy) -> Self {
        self.config.reconnect.policy = policy;
        self
    }

    pub fn resubscribe_delay(mut self, delay: Duration) -> Self {
        self.config.resubscribe_delay = delay;
        self
    }

    pub fn series_capacity(mut self, capacity: usize) -> Self {
        self.config.series_capacity = capacity;
        self
    }

    pub fn stream_log_capacity(mut self, capacity: usize) -> Self {
        self.config.stream_log_capacity = capacity;
        self
    }

    pub fn notification_ttl(mut self, ttl: Duration) -> Self {
        self.config.notification_ttl = ttl;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn clock_interval(mut self, interval: Duration) -> Self {
        self.config.clock_interval = interval;
        self
    }

    pub fn build(self) -> MonitorConfig {
        self.config
    }
}

impl Default for MonitorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>, MonitorError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| MonitorError::Configuration(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
