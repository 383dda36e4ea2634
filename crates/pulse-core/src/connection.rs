//! Subscriber connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::SendError;
use crate::hub::CloseReason;
use crate::types::{Event, Topic, kinds};

/// Topic-specific subscription filters (opaque JSON object).
pub type Filters = serde_json::Map<String, Value>;

/// Filter key that restricts `sla-monitoring` to breach events.
pub const BREACHES_ONLY: &str = "breachesOnly";

/// A live subscriber.
///
/// The outbound queue has a single consumer (the transport adapter), so every
/// producer targeting this connection is serialized through it.
pub struct Connection {
    /// Unique connection id.
    pub id: String,
    /// Entity this connection follows, if any.
    pub correlation_id: Option<String>,
    /// Subscribed topic.
    pub topic: Topic,
    /// Topic-specific filters.
    pub filters: Filters,
    /// When the subscriber attached.
    pub connected_at: DateTime<Utc>,
    alive: AtomicBool,
    closing: AtomicBool,
    last_ack: Mutex<Instant>,
    sink: Mutex<Option<mpsc::Sender<Arc<Event>>>>,
    cancel: CancellationToken,
    delivered: AtomicU64,
    close_reason: Mutex<Option<CloseReason>>,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue.
    pub fn new(
        id: impl Into<String>,
        topic: Topic,
        correlation_id: Option<String>,
        filters: Filters,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<Event>>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let conn = Self {
            id: id.into(),
            correlation_id,
            topic,
            filters,
            connected_at: Utc::now(),
            alive: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            last_ack: Mutex::new(Instant::now()),
            sink: Mutex::new(Some(tx)),
            cancel: CancellationToken::new(),
            delivered: AtomicU64::new(0),
            close_reason: Mutex::new(None),
        };
        (conn, rx)
    }

    /// Whether the connection is still open.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Push an event into the outbound queue, waiting at most `timeout` for room.
    ///
    /// A successful push refreshes the last-ack time.
    pub async fn send(&self, event: Arc<Event>, timeout: Duration) -> Result<(), SendError> {
        let Some(tx) = self.sink.lock().clone() else {
            return Err(SendError::Closed);
        };
        match tx.send_timeout(event, timeout).await {
            Ok(()) => {
                *self.last_ack.lock() = Instant::now();
                let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(SendError::Timeout),
            Err(SendTimeoutError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Queue an event without waiting. Fails when the queue is full or closed.
    pub(crate) fn enqueue(&self, event: Arc<Event>) -> Result<(), SendError> {
        let Some(tx) = self.sink.lock().clone() else {
            return Err(SendError::Closed);
        };
        match tx.try_send(event) {
            Ok(()) => {
                let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(SendError::Timeout),
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Instant of the last successful send (or creation).
    pub fn last_ack(&self) -> Instant {
        *self.last_ack.lock()
    }

    /// Time since the last successful send.
    pub fn ack_elapsed(&self) -> Duration {
        self.last_ack.lock().elapsed()
    }

    /// Events successfully queued for this subscriber.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Token cancelled when the connection closes.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether this subscription's filters let `event` through.
    ///
    /// Evaluated before sending so filtered events are never queued.
    pub fn accepts(&self, event: &Event) -> bool {
        if self.flag(BREACHES_ONLY) {
            return !matches!(event.kind.as_str(), kinds::SLA_WARNING | kinds::SLA_UPDATE);
        }
        true
    }

    /// Read a boolean filter. Accepts JSON booleans and the strings `"true"`/`"1"`.
    pub fn flag(&self, key: &str) -> bool {
        match self.filters.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "1"),
            _ => false,
        }
    }

    /// Read a string filter.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.filters.get(key).and_then(Value::as_str)
    }

    /// Read a list-of-strings filter. A comma-separated string is also accepted.
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = match self.filters.get(key)? {
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => return None,
        };
        (!items.is_empty()).then_some(items)
    }

    /// Why the connection was closed, once it has been.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    pub(crate) fn set_close_reason(&self, reason: CloseReason) {
        *self.close_reason.lock() = Some(reason);
    }

    /// Claim the right to run cleanup. Returns `true` exactly once.
    pub(crate) fn begin_close(&self) -> bool {
        !self.closing.swap(true, Ordering::AcqRel)
    }

    /// Mark dead, drop the sink so the consumer drains and ends, stop the handler.
    pub(crate) fn shut(&self) {
        self.alive.store(false, Ordering::Release);
        drop(self.sink.lock().take());
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("correlation_id", &self.correlation_id)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}
