//! Boundary normalisation of push payloads
//!
//! Frames arrive as an SSE event name plus a JSON body. The decoder turns
//! them into [`StreamEvent`]s, validating each kind's shape, and renames the
//! wire fields (`symbol`, `type`, `open_price`, ...) to the snapshot model.

use crate::{
    connection::SseFrame,
    data::{parse_timestamp, DataType, MarketSnapshot},
    error::ParseError,
    events::{EventKind, StreamEvent},
};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Turns SSE frames into typed events
pub trait EventDecoder: Send + Sync {
    /// `Ok(None)` for frames this client does not consume
    fn decode(&self, frame: &SseFrame) -> Result<Option<StreamEvent>, ParseError>;
}

/// `market_data` body as sent by the backend
#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataPayload {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, rename = "type")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<Decimal>,
    #[serde(default)]
    pub open_price: Option<Decimal>,
    #[serde(default)]
    pub high_price: Option<Decimal>,
    #[serde(default)]
    pub low_price: Option<Decimal>,
    #[serde(default)]
    pub close_price: Option<Decimal>,
    #[serde(default)]
    pub change: Option<Decimal>,
    #[serde(default)]
    pub change_percent: Option<Decimal>,
}

impl MarketDataPayload {
    /// Validate required fields and build the internal snapshot
    pub fn into_snapshot(self) -> Result<MarketSnapshot, ParseError> {
        let market = self
            .symbol
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ParseError::MissingField("symbol".to_string()))?;
        let data_type = self
            .data_type
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ParseError::MissingField("type".to_string()))?;
        let price = self
            .price
            .ok_or_else(|| ParseError::MissingField("price".to_string()))?;

        let timestamp = match self.timestamp.as_deref() {
            Some(raw) => {
                let parsed = parse_timestamp(raw);
                if parsed.is_none() {
                    tracing::debug!("Unparseable timestamp '{}' for {}, using arrival time", raw, market);
                }
                parsed
            }
            None => None,
        };

        Ok(MarketSnapshot {
            source_id: self.source.filter(|s| !s.is_empty()),
            market,
            data_type: DataType::from(data_type),
            timestamp,
            price,
            volume: self.volume,
            open: self.open_price,
            high: self.high_price,
            low: self.low_price,
            close: self.close_price,
            change: self.change,
            change_percent: self.change_percent,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
}

/// JSON decoder for the backend's four event kinds
#[derive(Debug, Default, Clone)]
pub struct JsonEventDecoder;

impl JsonEventDecoder {
    pub fn new() -> Self {
        Self
    }

    fn parse_json<'a, T: Deserialize<'a>>(&self, kind: EventKind, data: &'a str) -> Result<T, ParseError> {
        serde_json::from_str(data)
            .map_err(|e| ParseError::InvalidJson(format!("{} payload: {}", kind, e)))
    }

    /// Acknowledgement bodies carry nothing we need; only reject garbage
    fn check_ack(&self, kind: EventKind, data: &str) -> Result<(), ParseError> {
        if data.trim().is_empty() {
            return Ok(());
        }
        match serde_json::from_str::<serde_json::Value>(data) {
            Ok(serde_json::Value::Object(_)) => Ok(()),
            Ok(other) => Err(ParseError::MalformedMessage(format!(
                "{} payload must be an object, got {}",
                kind, other
            ))),
            Err(e) => Err(ParseError::InvalidJson(format!("{} payload: {}", kind, e))),
        }
    }
}

impl EventDecoder for JsonEventDecoder {
    fn decode(&self, frame: &SseFrame) -> Result<Option<StreamEvent>, ParseError> {
        let Some(kind) = EventKind::from_wire(&frame.event) else {
            tracing::trace!("Ignoring '{}' frame", frame.event);
            return Ok(None);
        };

        let event = match kind {
            EventKind::Connected => {
                self.check_ack(kind, &frame.data)?;
                StreamEvent::Connected
            }
            EventKind::Heartbeat => {
                self.check_ack(kind, &frame.data)?;
                StreamEvent::Heartbeat
            }
            EventKind::MarketData => {
                let payload: MarketDataPayload = self.parse_json(kind, &frame.data)?;
                StreamEvent::MarketData(payload.into_snapshot()?)
            }
            EventKind::Error => {
                let payload: ErrorPayload = self.parse_json(kind, &frame.data)?;
                StreamEvent::ServerError {
                    message: payload
                        .message
                        .unwrap_or_else(|| "unknown server error".to_string()),
                }
            }
        };

        Ok(Some(event))
    }
}
