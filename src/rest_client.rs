//! REST client for the monitor backend
//!
//! Covers the endpoints used at bootstrap, on manual refresh and by the
//! connection test:
//! - source listing
//! - latest realtime price per source/market
//! - market trading status
//! - service health and push stream statistics

use crate::data::{parse_timestamp, DataType, MarketSnapshot, MarketStatus, SourceDescriptor};
use crate::error::BootstrapError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// `GET /health`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub uptime: Option<String>,
    #[serde(default)]
    pub sources_count: Option<u64>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

/// `GET /api/sources/stream/stats`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StreamServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    #[serde(default)]
    pub total_data_sent: u64,
    #[serde(default)]
    pub connections_detail: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PriceData {
    price: Decimal,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    volume: Option<Decimal>,
    #[serde(default)]
    open_price: Option<Decimal>,
    #[serde(default)]
    high_price: Option<Decimal>,
    #[serde(default)]
    low_price: Option<Decimal>,
    #[serde(default)]
    close_price: Option<Decimal>,
    #[serde(default)]
    change: Option<Decimal>,
    #[serde(default)]
    change_percent: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct LatestPriceResponse {
    #[serde(default)]
    source_id: Option<String>,
    market: String,
    #[serde(default)]
    data_type: Option<String>,
    data: PriceData,
}

impl LatestPriceResponse {
    fn into_snapshot(self, source_id: &str) -> MarketSnapshot {
        let data = self.data;
        MarketSnapshot {
            source_id: Some(self.source_id.unwrap_or_else(|| source_id.to_string())),
            market: self.market,
            data_type: self
                .data_type
                .map(DataType::from)
                .unwrap_or(DataType::Realtime),
            timestamp: data.time.as_deref().and_then(parse_timestamp),
            price: data.price,
            volume: data.volume,
            open: data.open_price,
            high: data.high_price,
            low: data.low_price,
            close: data.close_price,
            change: data.change,
            change_percent: data.change_percent,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MarketStatusResponse {
    status: MarketStatus,
}

/// Backend REST surface used by the monitor
#[async_trait]
pub trait MarketApi: Send + Sync {
    async fn sources(&self) -> Result<Vec<SourceDescriptor>, BootstrapError>;

    async fn latest_realtime(&self, source_id: &str, market: &str) -> Result<MarketSnapshot, BootstrapError>;

    async fn market_status(&self, source_id: &str, market: &str) -> Result<MarketStatus, BootstrapError>;

    async fn health(&self) -> Result<HealthStatus, BootstrapError>;

    async fn stream_stats(&self) -> Result<StreamServerStats, BootstrapError>;
}

/// reqwest-backed [`MarketApi`]
#[derive(Debug, Clone)]
pub struct MonitorRestClient {
    base_url: Url,
    http_client: reqwest::Client,
}

impl MonitorRestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BootstrapError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BootstrapError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BootstrapError::InvalidEndpoint(base_url.to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BootstrapError::Request {
                endpoint: base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, escaping each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BootstrapError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BootstrapError::InvalidEndpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, BootstrapError> {
        let url = self.endpoint(segments)?;
        let endpoint = url.path().to_string();
        tracing::debug!("GET {}", url);

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| BootstrapError::Request {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| BootstrapError::Request {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&body).map_err(|e| BootstrapError::Decode {
            endpoint,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MarketApi for MonitorRestClient {
    async fn sources(&self) -> Result<Vec<SourceDescriptor>, BootstrapError> {
        self.get_json(&["api", "sources"]).await
    }

    async fn latest_realtime(&self, source_id: &str, market: &str) -> Result<MarketSnapshot, BootstrapError> {
        let response: LatestPriceResponse = self
            .get_json(&["api", "sources", source_id, "latest", market, "realtime"])
            .await?;
        Ok(response.into_snapshot(source_id))
    }

    async fn market_status(&self, source_id: &str, market: &str) -> Result<MarketStatus, BootstrapError> {
        let response: MarketStatusResponse = self
            .get_json(&["api", "sources", source_id, "market-status", market])
            .await?;
        Ok(response.status)
    }

    async fn health(&self) -> Result<HealthStatus, BootstrapError> {
        self.get_json(&["health"]).await
    }

    async fn stream_stats(&self) -> Result<StreamServerStats, BootstrapError> {
        self.get_json(&["api", "sources", "stream", "stats"]).await
    }
}
