//! User notifications and the live data-stream log

use crate::data::{DataType, MarketSnapshot};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Toast kind; each kind has a single slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub expires_at: Instant,
}

/// Auto-dismissing toasts, one per kind. A new one replaces the old.
#[derive(Debug, Clone)]
pub struct Notifier {
    ttl: Duration,
    success: Option<Notification>,
    error: Option<Notification>,
}

impl Notifier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            success: None,
            error: None,
        }
    }

    fn slot(&mut self, kind: NotificationKind) -> &mut Option<Notification> {
        match kind {
            NotificationKind::Success => &mut self.success,
            NotificationKind::Error => &mut self.error,
        }
    }

    pub fn show(&mut self, kind: NotificationKind, message: &str, now: Instant) {
        let expires_at = now + self.ttl;
        *self.slot(kind) = Some(Notification {
            kind,
            message: message.to_string(),
            expires_at,
        });
    }

    /// Returns `true` when something was showing
    pub fn dismiss(&mut self, kind: NotificationKind) -> bool {
        self.slot(kind).take().is_some()
    }

    /// Drop expired notifications, returning the kinds that went away
    pub fn expire(&mut self, now: Instant) -> Vec<NotificationKind> {
        let mut expired = Vec::new();
        for kind in [NotificationKind::Success, NotificationKind::Error] {
            let slot = self.slot(kind);
            if slot.as_ref().map_or(false, |n| n.expires_at <= now) {
                *slot = None;
                expired.push(kind);
            }
        }
        expired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [&self.success, &self.error]
            .into_iter()
            .flatten()
            .map(|n| n.expires_at)
            .min()
    }

    pub fn active(&self, kind: NotificationKind) -> Option<&Notification> {
        match kind {
            NotificationKind::Success => self.success.as_ref(),
            NotificationKind::Error => self.error.as_ref(),
        }
    }
}

/// One row of the data-stream panel
#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub market: String,
    pub source_id: Option<String>,
    pub data_type: DataType,
    pub price: Decimal,
    pub time: DateTime<Utc>,
}

impl StreamItem {
    /// Row time is the payload's own timestamp, else `received_at`
    pub fn from_snapshot(snapshot: &MarketSnapshot, received_at: DateTime<Utc>) -> Self {
        Self {
            market: snapshot.market.clone(),
            source_id: snapshot.source_id.clone(),
            data_type: snapshot.data_type.clone(),
            price: snapshot.price,
            time: snapshot.timestamp.unwrap_or(received_at),
        }
    }
}

/// Newest-first bounded log of received updates
#[derive(Debug, Clone)]
pub struct StreamLog {
    items: VecDeque<StreamItem>,
    capacity: usize,
}

impl StreamLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, item: StreamItem) {
        self.items.push_front(item);
        while self.items.len() > self.capacity {
            self.items.pop_back();
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items, newest first
    pub fn iter(&self) -> impl Iterator<Item = &StreamItem> {
        self.items.iter()
    }
}
