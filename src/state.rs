//! Per-market state: latest snapshot and a bounded rolling series
//!
//! [`MarketStateStore::apply`] is the only mutator. Snapshots are keyed by
//! market identifier alone, so two sources reporting the same market
//! overwrite each other in arrival order.

use crate::data::{MarketSnapshot, SeriesPoint, DEFAULT_SERIES_CAPACITY};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// Capacity-bounded FIFO of chart points for one market
#[derive(Debug, Clone)]
pub struct MarketSeries {
    points: VecDeque<SeriesPoint>,
    capacity: usize,
}

impl MarketSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest once full
    pub fn push(&mut self, point: SeriesPoint) {
        if self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn view(&self) -> SeriesView<'_> {
        SeriesView { points: Some(&self.points) }
    }
}

/// Read-only view of a market's series, oldest point first
#[derive(Debug, Clone, Copy)]
pub struct SeriesView<'a> {
    points: Option<&'a VecDeque<SeriesPoint>>,
}

impl<'a> SeriesView<'a> {
    pub fn empty() -> Self {
        Self { points: None }
    }

    pub fn len(&self) -> usize {
        self.points.map(VecDeque::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a SeriesPoint> + 'a {
        self.points.into_iter().flat_map(|points| points.iter())
    }

    pub fn first(&self) -> Option<&'a SeriesPoint> {
        self.points.and_then(|points| points.front())
    }

    pub fn last(&self) -> Option<&'a SeriesPoint> {
        self.points.and_then(|points| points.back())
    }

    pub fn to_vec(&self) -> Vec<SeriesPoint> {
        self.iter().cloned().collect()
    }
}

/// Canonical in-memory market state
#[derive(Debug)]
pub struct MarketStateStore {
    latest: HashMap<String, MarketSnapshot>,
    series: HashMap<String, MarketSeries>,
    capacity: usize,
}

impl MarketStateStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SERIES_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            latest: HashMap::new(),
            series: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Apply an update.
    ///
    /// The snapshot replaces whatever was stored for its market, regardless of
    /// embedded timestamps. Chart-eligible updates also append a series point.
    /// Returns `true` when the series changed.
    pub fn apply(&mut self, update: MarketSnapshot) -> bool {
        let chart_point = update.data_type.is_chart_eligible().then(|| SeriesPoint {
            time: update.timestamp.unwrap_or_else(Utc::now),
            price: update.price,
            volume: update.volume.unwrap_or(Decimal::ZERO),
        });

        let market = update.market.clone();
        if let Some(previous) = self.latest.get(&market) {
            if previous.source_id != update.source_id {
                tracing::debug!(
                    "Market {} overwritten across sources ({:?} -> {:?})",
                    market,
                    previous.source_id,
                    update.source_id
                );
            }
        }
        self.latest.insert(market.clone(), update);

        match chart_point {
            Some(point) => {
                let capacity = self.capacity;
                self.series
                    .entry(market)
                    .or_insert_with(|| MarketSeries::new(capacity))
                    .push(point);
                true
            }
            None => false,
        }
    }

    pub fn latest(&self, market: &str) -> Option<&MarketSnapshot> {
        self.latest.get(market)
    }

    /// Series for a market; empty when the market has not been charted yet
    pub fn series(&self, market: &str) -> SeriesView<'_> {
        self.series
            .get(market)
            .map(MarketSeries::view)
            .unwrap_or_else(SeriesView::empty)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MarketStateStore {
    fn default() -> Self {
        Self::new()
    }
}
