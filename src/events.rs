//! Typed stream events and the handler dispatcher

use crate::data::MarketSnapshot;
use std::fmt;

/// Monotonic identity of one connection attempt
pub type AttemptId = u64;

/// Handler id returned by registration
pub type HandlerId = u64;

/// Push event after boundary validation
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Server acknowledged the subscription
    Connected,
    MarketData(MarketSnapshot),
    Heartbeat,
    /// Error reported by the server inside the stream
    ServerError { message: String },
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Connected => EventKind::Connected,
            StreamEvent::MarketData(_) => EventKind::MarketData,
            StreamEvent::Heartbeat => EventKind::Heartbeat,
            StreamEvent::ServerError { .. } => EventKind::Error,
        }
    }
}

/// Event kinds a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    MarketData,
    Heartbeat,
    Error,
}

impl EventKind {
    pub const EVERY: [EventKind; 4] = [
        EventKind::Connected,
        EventKind::MarketData,
        EventKind::Heartbeat,
        EventKind::Error,
    ];

    /// Map an SSE event name to a kind
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "connected" => Some(EventKind::Connected),
            "market_data" => Some(EventKind::MarketData),
            "heartbeat" => Some(EventKind::Heartbeat),
            "error" => Some(EventKind::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::MarketData => "market_data",
            EventKind::Heartbeat => "heartbeat",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Handler<C> = Box<dyn FnMut(&mut C, &StreamEvent) + Send>;

struct HandlerEntry<C> {
    id: HandlerId,
    kind: EventKind,
    /// `None` for handlers that outlive connection attempts
    scope: Option<AttemptId>,
    handler: Handler<C>,
}

/// Synchronous dispatcher over a context `C`.
///
/// Handlers run in registration order on the caller's control flow. Handlers
/// registered for an attempt only see that attempt's events and are removed
/// together by [`EventDispatcher::unregister_attempt`].
pub struct EventDispatcher<C> {
    entries: Vec<HandlerEntry<C>>,
    next_id: HandlerId,
}

impl<C> EventDispatcher<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    fn next_handler_id(&mut self) -> HandlerId {
        self.next_id += 1;
        self.next_id
    }

    fn insert(&mut self, kind: EventKind, scope: Option<AttemptId>, handler: Handler<C>) -> HandlerId {
        let id = self.next_handler_id();
        self.entries.push(HandlerEntry {
            id,
            kind,
            scope,
            handler,
        });
        id
    }

    /// Register a handler for every attempt
    pub fn register<F>(&mut self, kind: EventKind, handler: F) -> HandlerId
    where
        F: FnMut(&mut C, &StreamEvent) + Send + 'static,
    {
        let id = self.insert(kind, None, Box::new(handler));
        tracing::debug!("Registered handler {} for {}", id, kind);
        id
    }

    /// Register a handler that only sees events of `attempt`
    pub fn register_for_attempt<F>(&mut self, attempt: AttemptId, kind: EventKind, handler: F) -> HandlerId
    where
        F: FnMut(&mut C, &StreamEvent) + Send + 'static,
    {
        let id = self.insert(kind, Some(attempt), Box::new(handler));
        tracing::debug!("Registered handler {} for {} (attempt {})", id, kind, attempt);
        id
    }

    /// Unregister a handler by id
    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        let removed = self.entries.len() < before;
        if removed {
            tracing::debug!("Unregistered handler {}", id);
        }
        removed
    }

    /// Drop every handler scoped to `attempt`, returning how many went
    pub fn unregister_attempt(&mut self, attempt: AttemptId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.scope != Some(attempt));
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!("Unregistered {} handlers of attempt {}", removed, attempt);
        }
        removed
    }

    /// Handlers registered for a kind, across all scopes
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.entries.iter().filter(|entry| entry.kind == kind).count()
    }

    /// Handlers scoped to one attempt
    pub fn attempt_handler_count(&self, attempt: AttemptId) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.scope == Some(attempt))
            .count()
    }

    /// Deliver an event of `attempt` to matching handlers.
    ///
    /// A panicking handler is logged and skipped; the rest still run.
    /// Returns the number of handlers that completed.
    pub fn dispatch(&mut self, ctx: &mut C, attempt: AttemptId, event: &StreamEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;

        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.kind != kind {
                continue;
            }
            if matches!(entry.scope, Some(scope) if scope != attempt) {
                continue;
            }

            let handler = &mut entry.handler;
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(ctx, event);
            }));

            match outcome {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!(
                    "Handler {} (index {}) panicked while processing {} event",
                    entry.id,
                    index,
                    kind
                ),
            }
        }

        tracing::trace!("Dispatched {} event to {} handlers", kind, delivered);
        delivered
    }
}

impl<C> Default for EventDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for EventDispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.entries.len())
            .finish()
    }
}
