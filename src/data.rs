//! Data models for market snapshots, sources and configuration

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Reserved filter identifier meaning "no restriction on this dimension"
pub const ALL: &str = "all";

/// Default number of points kept per market series
pub const DEFAULT_SERIES_CAPACITY: usize = 50;

/// Default number of entries kept in the live data-stream log
pub const DEFAULT_STREAM_LOG_CAPACITY: usize = 50;

/// Kind of reading carried by a market update
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    Realtime,
    Kline1m,
    Kline5m,
    Kline15m,
    Kline30m,
    Kline1h,
    Kline4h,
    Kline1d,
    Kline1w,
    Kline3mo,
    Kline6mo,
    Kline1y,
    /// Anything the upstream sends that this client does not know about
    Other(String),
}

impl DataType {
    pub fn as_str(&self) -> &str {
        match self {
            DataType::Realtime => "realtime",
            DataType::Kline1m => "kline1m",
            DataType::Kline5m => "kline5m",
            DataType::Kline15m => "kline15m",
            DataType::Kline30m => "kline30m",
            DataType::Kline1h => "kline1h",
            DataType::Kline4h => "kline4h",
            DataType::Kline1d => "kline1d",
            DataType::Kline1w => "kline1w",
            DataType::Kline3mo => "kline3m",
            DataType::Kline6mo => "kline6m",
            DataType::Kline1y => "kline1y",
            DataType::Other(name) => name,
        }
    }

    /// Realtime ticks and 1-minute candles feed the chart series
    pub fn is_chart_eligible(&self) -> bool {
        matches!(self, DataType::Realtime | DataType::Kline1m)
    }
}

impl From<&str> for DataType {
    fn from(value: &str) -> Self {
        match value {
            "realtime" => DataType::Realtime,
            "kline1m" => DataType::Kline1m,
            "kline5m" => DataType::Kline5m,
            "kline15m" => DataType::Kline15m,
            "kline30m" => DataType::Kline30m,
            "kline1h" => DataType::Kline1h,
            "kline4h" => DataType::Kline4h,
            "kline1d" => DataType::Kline1d,
            "kline1w" => DataType::Kline1w,
            "kline3m" => DataType::Kline3mo,
            "kline6m" => DataType::Kline6mo,
            "kline1y" => DataType::Kline1y,
            other => DataType::Other(other.to_string()),
        }
    }
}

impl From<String> for DataType {
    fn from(value: String) -> Self {
        DataType::from(value.as_str())
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known state of one market, as reported by one source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub source_id: Option<String>,
    pub market: String,
    pub data_type: DataType,
    pub timestamp: Option<DateTime<Utc>>,
    pub price: Decimal,
    pub volume: Option<Decimal>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub change: Option<Decimal>,
    pub change_percent: Option<Decimal>,
}

impl MarketSnapshot {
    /// Minimal snapshot; the remaining fields start empty
    pub fn new(market: &str, data_type: DataType, price: Decimal) -> Self {
        Self {
            source_id: None,
            market: market.to_string(),
            data_type,
            timestamp: None,
            price,
            volume: None,
            open: None,
            high: None,
            low: None,
            close: None,
            change: None,
            change_percent: None,
        }
    }

    pub fn with_source(mut self, source_id: &str) -> Self {
        self.source_id = Some(source_id.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = Some(volume);
        self
    }
}

impl fmt::Display for MarketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Snapshot[{}:{}]: price={} vol={} from {}",
            self.market,
            self.data_type,
            self.price,
            self.volume.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
            self.source_id.as_deref().unwrap_or("?"),
        )
    }
}

/// One point of a market's rolling chart series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub time: DateTime<Utc>,
    pub price: Decimal,
    pub volume: Decimal,
}

/// Upstream data source as listed by `GET /api/sources`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDescriptor {
    pub source_id: String,
    pub source_name: String,
    #[serde(default)]
    pub supported_markets: Vec<String>,
}

/// Trading-session status of one market
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketStatus {
    pub is_open: bool,
    pub status_text: String,
    #[serde(default)]
    pub market_time: Option<String>,
}

/// Source row shown in the sources panel
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatus {
    pub source_id: String,
    pub source_name: String,
    pub active: bool,
    pub markets: Vec<String>,
}

impl From<&SourceDescriptor> for SourceStatus {
    fn from(source: &SourceDescriptor) -> Self {
        Self {
            source_id: source.source_id.clone(),
            source_name: source.source_name.clone(),
            active: true,
            markets: source.supported_markets.clone(),
        }
    }
}

/// Push connection state, driven only by the stream client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Erroring,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
            ConnectionState::Erroring => write!(f, "ERRORING"),
        }
    }
}

/// Parse the timestamp formats the backend emits.
///
/// Naive timestamps carry no offset and are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CONFIGURATION
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Backend root, e.g. `http://127.0.0.1:8000`
    pub base_url: String,
    pub reconnect: ReconnectConfig,
    /// Settle time between closing the old stream and opening the new one
    pub resubscribe_delay: Duration,
    pub series_capacity: usize,
    pub stream_log_capacity: usize,
    /// How long a notification stays up before it auto-dismisses
    pub notification_ttl: Duration,
    pub connect_timeout: Duration,
    pub clock_interval: Duration,
}

impl MonitorConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must be an http(s) URL".to_string());
        }

        if self.series_capacity == 0 {
            return Err("Series capacity must be greater than 0".to_string());
        }

        if self.stream_log_capacity == 0 {
            return Err("Stream log capacity must be greater than 0".to_string());
        }

        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than 0".to_string());
        }

        if self.clock_interval.is_zero() {
            return Err("Clock interval must be greater than 0".to_string());
        }

        self.reconnect.validate()?;

        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            reconnect: ReconnectConfig::default(),
            resubscribe_delay: Duration::from_secs(1),
            series_capacity: DEFAULT_SERIES_CAPACITY,
            stream_log_capacity: DEFAULT_STREAM_LOG_CAPACITY,
            notification_ttl: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            clock_interval: Duration::from_secs(1),
        }
    }
}

/// Which backoff strategy the stream client uses between reconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    Fixed,
    Exponential,
}

/// Reconnection configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub policy: BackoffPolicy,
    /// Fixed delay, or the first delay for exponential backoff
    pub delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl ReconnectConfig {
    /// Validate reconnection configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.delay.is_zero() {
            return Err("Reconnect delay must be greater than 0".to_string());
        }

        if self.max_delay < self.delay {
            return Err("Max delay must be greater than or equal to reconnect delay".to_string());
        }

        if self.policy == BackoffPolicy::Exponential && self.multiplier <= 1.0 {
            return Err("Backoff multiplier must be greater than 1.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err("Jitter factor must be within 0.0..=1.0".to_string());
        }

        if self.max_attempts == Some(0) {
            return Err("Max attempts must be greater than 0 when set".to_string());
        }

        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            policy: BackoffPolicy::Fixed,
            delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: None,
        }
    }
}
