//! Market monitor: wires filters, stream client, store and render bridge
//!
//! All mutation happens on one control flow. [`MarketMonitor::run`] owns
//! that flow and multiplexes user commands, transport signals, timer
//! deadlines and the clock tick; embedders that want to drive it by hand can
//! call [`MarketMonitor::handle_command`], [`MarketMonitor::process_pending`]
//! and [`MarketMonitor::poll_timers`] instead.

use crate::{
    client::{ClientOutput, StreamClient, StreamStats},
    connection::{SseTransport, StreamTransport, TransportSignal},
    data::*,
    error::{ConnectionError, ErrorReporter, MonitorError},
    events::{AttemptId, EventDispatcher, EventKind, HandlerId, StreamEvent},
    filter::{FilterDimension, FilterState},
    notify::{NotificationKind, Notifier, StreamItem, StreamLog},
    render::RenderBridge,
    rest_client::{HealthStatus, MarketApi, MonitorRestClient, StreamServerStats},
    state::{MarketStateStore, SeriesView},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

/// User actions accepted by the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ToggleFilter {
        dimension: FilterDimension,
        identifier: String,
    },
    TogglePause,
    ClearStream,
    Refresh,
    TestConnection,
    DismissNotification(NotificationKind),
    SelectChartMarket(String),
    Shutdown,
}

/// Cloneable sender of [`Command`]s into a running monitor
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl MonitorHandle {
    pub fn send(&self, command: Command) -> Result<(), MonitorError> {
        self.tx
            .send(command)
            .map_err(|e| MonitorError::Channel(format!("monitor stopped, dropped {:?}", e.0)))
    }

    pub fn toggle_filter(&self, dimension: FilterDimension, identifier: &str) -> Result<(), MonitorError> {
        self.send(Command::ToggleFilter {
            dimension,
            identifier: identifier.to_string(),
        })
    }

    pub fn toggle_pause(&self) -> Result<(), MonitorError> {
        self.send(Command::TogglePause)
    }

    pub fn refresh(&self) -> Result<(), MonitorError> {
        self.send(Command::Refresh)
    }

    pub fn shutdown(&self) -> Result<(), MonitorError> {
        self.send(Command::Shutdown)
    }
}

/// Outcome of a connection test
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionReport {
    pub health: HealthStatus,
    pub server: StreamServerStats,
    pub stream_connected: bool,
}

/// State the event handlers operate on
pub struct MonitorCore {
    store: MarketStateStore,
    render: Box<dyn RenderBridge>,
    notifier: Notifier,
    stream_log: StreamLog,
    last_update: Option<DateTime<Utc>>,
    chart_market: Option<String>,
}

impl MonitorCore {
    fn new(config: &MonitorConfig, render: Box<dyn RenderBridge>) -> Self {
        Self {
            store: MarketStateStore::with_capacity(config.series_capacity),
            render,
            notifier: Notifier::new(config.notification_ttl),
            stream_log: StreamLog::new(config.stream_log_capacity),
            last_update: None,
            chart_market: None,
        }
    }

    pub fn store(&self) -> &MarketStateStore {
        &self.store
    }

    /// Apply an update to the store and render what changed
    pub fn apply_update(&mut self, snapshot: MarketSnapshot) {
        let market = snapshot.market.clone();
        let series_changed = self.store.apply(snapshot);

        if let Some(latest) = self.store.latest(&market) {
            self.render.on_snapshot_updated(&market, latest);
        }
        if series_changed {
            self.render.on_series_updated(&market, self.store.series(&market));
        }
        if self.chart_market.is_none() {
            self.chart_market = Some(market);
        }
    }

    /// Live update: store, stream log and last-update time
    pub fn record_market_data(&mut self, snapshot: &MarketSnapshot) {
        let now = Utc::now();
        let item = StreamItem::from_snapshot(snapshot, now);

        self.apply_update(snapshot.clone());
        self.render.on_stream_item(&item);
        self.stream_log.push(item);
        self.mark_last_update(now);
    }

    pub fn mark_last_update(&mut self, time: DateTime<Utc>) {
        self.last_update = Some(time);
        self.render.on_last_update(time);
    }

    /// Show a notification, replacing any of the same kind
    pub fn notify(&mut self, kind: NotificationKind, message: &str) {
        self.notifier.show(kind, message, Instant::now());
        self.render.on_notification(kind, Some(message));
    }

    fn expire_notifications(&mut self, now: Instant) {
        for kind in self.notifier.expire(now) {
            self.render.on_notification(kind, None);
        }
    }

    fn tick_clock(&mut self) {
        self.render.on_clock(Utc::now());
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn chart_market(&self) -> Option<&str> {
        self.chart_market.as_deref()
    }

    pub fn stream_log(&self) -> &StreamLog {
        &self.stream_log
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

/// Orchestrator owning every component of the monitor
pub struct MarketMonitor {
    config: MonitorConfig,
    api: Arc<dyn MarketApi>,
    client: StreamClient,
    filters: FilterState,
    dispatcher: EventDispatcher<MonitorCore>,
    core: MonitorCore,
    signals: mpsc::UnboundedReceiver<TransportSignal>,
    commands: mpsc::UnboundedReceiver<Command>,
    command_tx: mpsc::UnboundedSender<Command>,
    sources: Vec<SourceDescriptor>,
    source_statuses: Vec<SourceStatus>,
}

impl MarketMonitor {
    /// Assemble a monitor from its collaborators
    pub fn new(
        config: MonitorConfig,
        api: Arc<dyn MarketApi>,
        transport: Arc<dyn StreamTransport>,
        render: Box<dyn RenderBridge>,
    ) -> Result<Self, MonitorError> {
        config.validate().map_err(MonitorError::Configuration)?;

        let (client, signals) = StreamClient::new(&config, transport)?;
        let (command_tx, commands) = mpsc::unbounded_channel();
        let core = MonitorCore::new(&config, render);

        Ok(Self {
            config,
            api,
            client,
            filters: FilterState::new(),
            dispatcher: EventDispatcher::new(),
            core,
            signals,
            commands,
            command_tx,
            sources: Vec::new(),
            source_statuses: Vec::new(),
        })
    }

    /// Monitor talking HTTP to `config.base_url`
    pub fn http(config: MonitorConfig, render: Box<dyn RenderBridge>) -> Result<Self, MonitorError> {
        config.validate().map_err(MonitorError::Configuration)?;

        let api = MonitorRestClient::new(&config.base_url, config.connect_timeout)?;
        let transport = SseTransport::new(config.connect_timeout)
            .map_err(|e| ConnectionError::EstablishmentFailed(e.to_string()))?;

        Self::new(config, Arc::new(api), Arc::new(transport), render)
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            tx: self.command_tx.clone(),
        }
    }

    /// Bootstrap over REST, then open the stream
    pub async fn start(&mut self) {
        tracing::info!("Starting market monitor against {}", self.config.base_url);
        // Failures are already reported; the stream still opens
        let _ = self.load_initial_data().await;
        self.connect_stream();
        self.core.tick_clock();
    }

    /// Start, then process commands, signals and timers until shutdown
    pub async fn run(&mut self) -> Result<(), MonitorError> {
        self.start().await;

        let mut clock = tokio::time::interval(self.config.clock_interval);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
                signal = self.signals.recv() => match signal {
                    Some(signal) => self.handle_signal(signal),
                    None => {
                        let error = MonitorError::Channel("transport signal channel closed".to_string());
                        ErrorReporter::report(&error, "Monitor loop");
                        self.shutdown();
                        return Err(error);
                    }
                },
                _ = sleep_until_deadline(deadline) => self.poll_timers(),
                _ = clock.tick() => self.core.tick_clock(),
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Execute one command; returns `false` once the monitor should stop
    pub async fn handle_command(&mut self, command: Command) -> bool {
        tracing::debug!("Command: {:?}", command);

        match command {
            Command::ToggleFilter {
                dimension,
                identifier,
            } => self.toggle_filter(dimension, &identifier),
            Command::TogglePause => {
                self.toggle_pause();
            }
            Command::ClearStream => self.clear_stream(),
            Command::Refresh => {
                let _ = self.refresh().await;
            }
            Command::TestConnection => {
                let _ = self.test_connection().await;
            }
            Command::DismissNotification(kind) => self.dismiss_notification(kind),
            Command::SelectChartMarket(market) => self.select_chart_market(&market),
            Command::Shutdown => {
                self.shutdown();
                return false;
            }
        }

        true
    }

    /// Fetch sources, then per-market snapshots and statuses.
    ///
    /// Returns the number of markets loaded. Only a failure to list sources
    /// is an error; per-market failures are logged and skipped.
    pub async fn load_initial_data(&mut self) -> Result<usize, MonitorError> {
        let result = self.reload().await;
        match &result {
            Ok(_) => self.core.notify(NotificationKind::Success, "Data loaded"),
            Err(e) => self
                .core
                .notify(NotificationKind::Error, &format!("Failed to load data: {}", e)),
        }
        result
    }

    /// Load snapshot and status of every supported market, fail-soft per item
    pub async fn load_market_data(&mut self) -> usize {
        let api = Arc::clone(&self.api);
        let pairs: Vec<(String, String)> = self
            .sources
            .iter()
            .flat_map(|source| {
                source
                    .supported_markets
                    .iter()
                    .map(move |market| (source.source_id.clone(), market.clone()))
            })
            .collect();

        let mut loaded = 0;
        for (source_id, market) in pairs {
            match api.latest_realtime(&source_id, &market).await {
                Ok(snapshot) => {
                    self.core.apply_update(snapshot);
                    loaded += 1;
                }
                Err(e) => tracing::warn!("Failed to load {}/{}: {}", source_id, market, e),
            }

            match api.market_status(&source_id, &market).await {
                Ok(status) => self.core.render.on_market_status(&source_id, &market, &status),
                Err(e) => tracing::warn!("Failed to load status of {}/{}: {}", source_id, market, e),
            }
        }

        tracing::info!("Loaded {} market snapshots", loaded);
        loaded
    }

    /// Re-run the bootstrap and report the outcome
    pub async fn refresh(&mut self) -> Result<usize, MonitorError> {
        let result = self.reload().await;
        match &result {
            Ok(_) => self.core.notify(NotificationKind::Success, "Data refreshed"),
            Err(e) => self
                .core
                .notify(NotificationKind::Error, &format!("Refresh failed: {}", e)),
        }
        result
    }

    /// Check API health and stream statistics
    pub async fn test_connection(&mut self) -> Result<ConnectionReport, MonitorError> {
        match self.check_backend().await {
            Ok(report) => {
                let message = format!(
                    "Connection test passed. API status: {}, stream: {}",
                    report.health.status,
                    if report.stream_connected { "connected" } else { "disconnected" }
                );
                self.core.notify(NotificationKind::Success, &message);
                Ok(report)
            }
            Err(e) => {
                let error = MonitorError::from(e);
                ErrorReporter::report(&error, "Connection test");
                self.core
                    .notify(NotificationKind::Error, &format!("Connection test failed: {}", error));
                Err(error)
            }
        }
    }

    /// Toggle a filter and resubscribe the stream after the settle delay
    pub fn toggle_filter(&mut self, dimension: FilterDimension, identifier: &str) {
        self.filters.toggle(dimension, identifier);
        self.client.resubscribe(self.filters.selection(), Instant::now());
        self.flush_client();
    }

    /// Flip pause; returns whether the stream is now paused
    pub fn toggle_pause(&mut self) -> bool {
        self.client.toggle_pause()
    }

    pub fn clear_stream(&mut self) {
        self.core.stream_log.clear();
        self.core.render.on_stream_cleared();
    }

    pub fn dismiss_notification(&mut self, kind: NotificationKind) {
        if self.core.notifier.dismiss(kind) {
            self.core.render.on_notification(kind, None);
        }
    }

    /// Show `market` on the chart
    pub fn select_chart_market(&mut self, market: &str) {
        self.core.chart_market = Some(market.to_string());
        self.core
            .render
            .on_series_updated(market, self.core.store.series(market));
    }

    /// Feed every transport signal received so far; returns how many
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(signal) = self.signals.try_recv() {
            self.handle_signal(signal);
            processed += 1;
        }
        processed
    }

    /// Fire due reconnect/resubscribe timers and expire notifications
    pub fn poll_timers(&mut self) {
        let now = Instant::now();
        self.client.poll_timers(now);
        self.flush_client();
        self.core.expire_notifications(now);
    }

    /// Earliest timer the monitor is waiting on
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.client.next_deadline(), self.core.notifier.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Close the stream permanently
    pub fn shutdown(&mut self) {
        if !self.client.is_closed() {
            tracing::info!("Shutting down market monitor");
            self.client.close();
            self.flush_client();
        }
    }

    /// Register a handler that sees events of every connection attempt
    pub fn register_handler<F>(&mut self, kind: EventKind, handler: F) -> HandlerId
    where
        F: FnMut(&mut MonitorCore, &StreamEvent) + Send + 'static,
    {
        self.dispatcher.register(kind, handler)
    }

    pub fn unregister_handler(&mut self, id: HandlerId) -> bool {
        self.dispatcher.unregister(id)
    }

    pub fn latest(&self, market: &str) -> Option<&MarketSnapshot> {
        self.core.store.latest(market)
    }

    pub fn series(&self, market: &str) -> SeriesView<'_> {
        self.core.store.series(market)
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn source_statuses(&self) -> &[SourceStatus] {
        &self.source_statuses
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn is_paused(&self) -> bool {
        self.client.is_paused()
    }

    pub fn stats(&self) -> &StreamStats {
        self.client.stats()
    }

    pub fn client(&self) -> &StreamClient {
        &self.client
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn core(&self) -> &MonitorCore {
        &self.core
    }

    pub fn dispatcher(&self) -> &EventDispatcher<MonitorCore> {
        &self.dispatcher
    }

    fn connect_stream(&mut self) {
        self.client.connect(self.filters.selection());
        self.flush_client();
    }

    async fn reload(&mut self) -> Result<usize, MonitorError> {
        self.core.render.on_loading(true);
        let result = self.bootstrap().await;
        self.core.render.on_loading(false);

        if let Err(e) = &result {
            ErrorReporter::report(e, "Loading initial data");
        }
        result
    }

    async fn bootstrap(&mut self) -> Result<usize, MonitorError> {
        let sources = self.api.sources().await?;
        tracing::info!("Loaded {} data sources", sources.len());

        self.source_statuses = sources.iter().map(SourceStatus::from).collect();
        self.sources = sources;
        self.core.render.on_sources_loaded(&self.source_statuses);

        Ok(self.load_market_data().await)
    }

    async fn check_backend(&self) -> Result<ConnectionReport, crate::error::BootstrapError> {
        let health = self.api.health().await?;
        let server = self.api.stream_stats().await?;
        Ok(ConnectionReport {
            health,
            server,
            stream_connected: self.client.is_connected(),
        })
    }

    fn handle_signal(&mut self, signal: TransportSignal) {
        self.client.handle_transport(signal, Instant::now());
        self.flush_client();
    }

    fn flush_client(&mut self) {
        for output in self.client.drain_outputs() {
            match output {
                ClientOutput::StateChanged(state) => {
                    if state == ConnectionState::Connected {
                        self.core.mark_last_update(Utc::now());
                    }
                    self.core.render.on_connection_state_changed(state);
                }
                ClientOutput::Opening { attempt, .. } => self.register_attempt_handlers(attempt),
                ClientOutput::Retired { attempt } => {
                    self.dispatcher.unregister_attempt(attempt);
                }
                ClientOutput::Event { attempt, event } => {
                    self.dispatcher.dispatch(&mut self.core, attempt, &event);
                }
            }
        }
    }

    fn register_attempt_handlers(&mut self, attempt: AttemptId) {
        self.dispatcher
            .register_for_attempt(attempt, EventKind::Connected, |core, _| {
                tracing::debug!("Stream subscription acknowledged");
                core.mark_last_update(Utc::now());
                core.notify(NotificationKind::Success, "Real-time stream connected");
            });

        self.dispatcher
            .register_for_attempt(attempt, EventKind::MarketData, |core, event| {
                if let StreamEvent::MarketData(snapshot) = event {
                    core.record_market_data(snapshot);
                }
            });

        self.dispatcher
            .register_for_attempt(attempt, EventKind::Heartbeat, |core, _| {
                core.mark_last_update(Utc::now());
            });

        self.dispatcher
            .register_for_attempt(attempt, EventKind::Error, |core, event| {
                if let StreamEvent::ServerError { message } = event {
                    core.notify(NotificationKind::Error, &format!("Stream error: {}", message));
                }
            });
    }
}

impl std::fmt::Debug for MarketMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketMonitor")
            .field("base_url", &self.config.base_url)
            .field("client", &self.client)
            .field("sources", &self.sources.len())
            .finish()
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
