//! Render boundary
//!
//! The core never touches a UI directly. It calls a [`RenderBridge`] from its
//! single control flow, so implementations see calls strictly one at a time.
//! Every call describes the full current value of what it updates, so
//! repeating a call is harmless.

use crate::{
    data::{ConnectionState, MarketSnapshot, MarketStatus, SeriesPoint, SourceStatus},
    format::{format_change, format_price, format_volume, Trend},
    notify::{NotificationKind, StreamItem},
    state::SeriesView,
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Receives store and connection changes for display
pub trait RenderBridge: Send {
    fn on_snapshot_updated(&mut self, market: &str, snapshot: &MarketSnapshot);

    fn on_series_updated(&mut self, market: &str, series: SeriesView<'_>);

    fn on_connection_state_changed(&mut self, state: ConnectionState);

    fn on_sources_loaded(&mut self, sources: &[SourceStatus]);

    fn on_market_status(&mut self, _source_id: &str, _market: &str, _status: &MarketStatus) {}

    fn on_stream_item(&mut self, _item: &StreamItem) {}

    fn on_stream_cleared(&mut self) {}

    /// `None` hides the notification of that kind
    fn on_notification(&mut self, _kind: NotificationKind, _message: Option<&str>) {}

    fn on_last_update(&mut self, _time: DateTime<Utc>) {}

    fn on_clock(&mut self, _now: DateTime<Utc>) {}

    fn on_loading(&mut self, _loading: bool) {}
}

/// Owned record of one bridge call
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Snapshot { market: String, snapshot: MarketSnapshot },
    Series { market: String, points: Vec<SeriesPoint> },
    ConnectionState(ConnectionState),
    Sources(Vec<SourceStatus>),
    MarketStatus { source_id: String, market: String, status: MarketStatus },
    StreamItem(StreamItem),
    StreamCleared,
    Notification { kind: NotificationKind, message: Option<String> },
    LastUpdate(DateTime<Utc>),
    Clock(DateTime<Utc>),
    Loading(bool),
}

/// Bridge that records every call; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderBridge {
    commands: Arc<Mutex<Vec<RenderCommand>>>,
}

impl RecordingRenderBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, command: RenderCommand) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command);
        }
    }

    pub fn commands(&self) -> Vec<RenderCommand> {
        self.commands
            .lock()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }

    pub fn take(&self) -> Vec<RenderCommand> {
        self.commands
            .lock()
            .map(|mut commands| std::mem::take(&mut *commands))
            .unwrap_or_default()
    }
}

impl RenderBridge for RecordingRenderBridge {
    fn on_snapshot_updated(&mut self, market: &str, snapshot: &MarketSnapshot) {
        self.record(RenderCommand::Snapshot {
            market: market.to_string(),
            snapshot: snapshot.clone(),
        });
    }

    fn on_series_updated(&mut self, market: &str, series: SeriesView<'_>) {
        self.record(RenderCommand::Series {
            market: market.to_string(),
            points: series.to_vec(),
        });
    }

    fn on_connection_state_changed(&mut self, state: ConnectionState) {
        self.record(RenderCommand::ConnectionState(state));
    }

    fn on_sources_loaded(&mut self, sources: &[SourceStatus]) {
        self.record(RenderCommand::Sources(sources.to_vec()));
    }

    fn on_market_status(&mut self, source_id: &str, market: &str, status: &MarketStatus) {
        self.record(RenderCommand::MarketStatus {
            source_id: source_id.to_string(),
            market: market.to_string(),
            status: status.clone(),
        });
    }

    fn on_stream_item(&mut self, item: &StreamItem) {
        self.record(RenderCommand::StreamItem(item.clone()));
    }

    fn on_stream_cleared(&mut self) {
        self.record(RenderCommand::StreamCleared);
    }

    fn on_notification(&mut self, kind: NotificationKind, message: Option<&str>) {
        self.record(RenderCommand::Notification {
            kind,
            message: message.map(str::to_string),
        });
    }

    fn on_last_update(&mut self, time: DateTime<Utc>) {
        self.record(RenderCommand::LastUpdate(time));
    }

    fn on_clock(&mut self, now: DateTime<Utc>) {
        self.record(RenderCommand::Clock(now));
    }

    fn on_loading(&mut self, loading: bool) {
        self.record(RenderCommand::Loading(loading));
    }
}

/// Headless bridge that renders into the log
#[derive(Debug, Clone, Default)]
pub struct TracingRenderBridge;

impl RenderBridge for TracingRenderBridge {
    fn on_snapshot_updated(&mut self, market: &str, snapshot: &MarketSnapshot) {
        let trend = Trend::of(snapshot.change.unwrap_or_default());
        tracing::info!(
            "{} {} vol {} {} [{}]",
            market,
            format_price(Some(snapshot.price)),
            format_volume(snapshot.volume),
            format_change(snapshot.change, snapshot.change_percent),
            trend.css_class()
        );
    }

    fn on_series_updated(&mut self, market: &str, series: SeriesView<'_>) {
        tracing::debug!("{} series now {} points", market, series.len());
    }

    fn on_connection_state_changed(&mut self, state: ConnectionState) {
        tracing::info!("Connection: {}", state);
    }

    fn on_sources_loaded(&mut self, sources: &[SourceStatus]) {
        for source in sources {
            tracing::info!(
                "Source {} ({}) markets: {}",
                source.source_name,
                source.source_id,
                source.markets.join(", ")
            );
        }
    }

    fn on_market_status(&mut self, source_id: &str, market: &str, status: &MarketStatus) {
        tracing::info!(
            "{}/{} {} ({})",
            source_id,
            market,
            status.status_text,
            if status.is_open { "open" } else { "closed" }
        );
    }

    fn on_notification(&mut self, kind: NotificationKind, message: Option<&str>) {
        match (kind, message) {
            (NotificationKind::Success, Some(message)) => tracing::info!("{}", message),
            (NotificationKind::Error, Some(message)) => tracing::warn!("{}", message),
            _ => {}
        }
    }
}
