//! # Market Monitor
//!
//! Client core for a live market data dashboard. It bootstraps market
//! snapshots over REST, then follows a server-sent event stream, keeping the
//! latest snapshot and a short rolling price series per market and pushing
//! every change through a [`render::RenderBridge`].
//!
//! ## Quick Start
//! ```rust,ignore
//! use market_monitor::prelude::*;
//!
//! let config = MonitorConfigBuilder::from_env()?.build();
//! let mut monitor = MarketMonitor::http(config, Box::new(TracingRenderBridge))?;
//! let handle = monitor.handle();
//! handle.toggle_filter(FilterDimension::Market, "HSI")?;
//! monitor.run().await?;
//! ```

pub mod client;
pub mod connection;
pub mod data;
pub mod error;
pub mod events;
pub mod filter;
pub mod format;
pub mod monitor;
pub mod notify;
pub mod parser;
pub mod render;
pub mod rest_client;
pub mod retry;
pub mod state;

pub use client::{ClientOutput, MonitorConfigBuilder, StreamClient, StreamStats};
pub use connection::{
    ConnectionHandle, SignalSink, SseDecoder, SseFrame, SseTransport, StreamTransport,
    TransportEvent, TransportSignal,
};
pub use data::*;
pub use error::*;
pub use events::{AttemptId, EventDispatcher, EventKind, HandlerId, StreamEvent};
pub use filter::{FilterDimension, FilterSelection, FilterState, Selection};
pub use monitor::{Command, ConnectionReport, MarketMonitor, MonitorCore, MonitorHandle};
pub use notify::{Notification, NotificationKind, Notifier, StreamItem, StreamLog};
pub use parser::{EventDecoder, JsonEventDecoder, MarketDataPayload};
pub use render::{RecordingRenderBridge, RenderBridge, RenderCommand, TracingRenderBridge};
pub use rest_client::{HealthStatus, MarketApi, MonitorRestClient, StreamServerStats};
pub use retry::{build_backoff, BackoffStrategy, ExponentialBackoff, FixedBackoff};
pub use state::{MarketSeries, MarketStateStore, SeriesView};

/// Prelude - the types most embedders need
///
/// Import with: `use market_monitor::prelude::*;`
pub mod prelude {
    pub use crate::client::MonitorConfigBuilder;
    pub use crate::data::{ConnectionState, DataType, MarketSnapshot, MonitorConfig, ReconnectConfig};
    pub use crate::error::MonitorError;
    pub use crate::filter::FilterDimension;
    pub use crate::monitor::{Command, MarketMonitor, MonitorHandle};
    pub use crate::notify::NotificationKind;
    pub use crate::render::{RenderBridge, TracingRenderBridge};
    pub use crate::state::SeriesView;
}

use tracing_subscriber::EnvFilter;

/// Initialize logging; honours `RUST_LOG`, defaults to `info`
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
