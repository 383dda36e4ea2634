//! The hub: registry, history and event sequencing behind one shared handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::{Connection, Filters};
use crate::errors::{HubError, Result, SendError};
use crate::history::{DEFAULT_HISTORY_CAPACITY, EventHistory};
use crate::registry::ConnectionRegistry;
use crate::telemetry;
use crate::types::{Event, Topic};

/// Tunables for the hub, its handlers and the liveness supervisor.
#[derive(Clone, Debug, PartialEq)]
pub struct HubConfig {
    /// Events retained per kind.
    pub history_capacity: usize,
    /// Outbound queue capacity per connection.
    pub queue_capacity: usize,
    /// How long a send may wait for queue room before the connection is evicted.
    pub send_timeout: Duration,
    /// Liveness sweep period.
    pub liveness_period: Duration,
    /// A connection idle for longer than this is evicted.
    pub stale_threshold: Duration,
    /// Idle heartbeat period for `ticket-updates`.
    pub ticket_heartbeat: Duration,
    /// Heartbeat period for `general`.
    pub general_heartbeat: Duration,
    /// Default emission period for `dashboard-stats`.
    pub dashboard_interval: Duration,
    /// Default delay between `sync-progress` / `test-progress` steps.
    pub progress_step: Duration,
    /// Default polling period for `sla-monitoring`.
    pub sla_interval: Duration,
    /// Business percentage at or above which an SLA record is a warning.
    pub sla_warning_percent: f64,
    /// History events replayed on subscribe unless the caller asks otherwise.
    pub default_max_history: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            queue_capacity: 256,
            send_timeout: Duration::from_millis(2000),
            liveness_period: Duration::from_secs(15),
            stale_threshold: Duration::from_secs(30),
            ticket_heartbeat: Duration::from_secs(5),
            general_heartbeat: Duration::from_secs(30),
            dashboard_interval: Duration::from_secs(30),
            progress_step: Duration::from_secs(1),
            sla_interval: Duration::from_secs(8),
            sla_warning_percent: 75.0,
            default_max_history: 10,
        }
    }
}

/// What a new connection subscribes to.
#[derive(Clone, Debug, Default)]
pub struct ConnectionSpec {
    /// Caller-supplied id; generated when absent.
    pub id: Option<String>,
    /// Subscribed topic.
    pub topic: Topic,
    /// Entity to follow.
    pub correlation_id: Option<String>,
    /// Topic-specific filters.
    pub filters: Filters,
}

impl ConnectionSpec {
    /// Spec for `topic` with no id, correlation or filters.
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            ..Self::default()
        }
    }
}

/// Why a connection was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The subscriber went away or the caller closed it.
    Client,
    /// A send failed or timed out.
    SendFailure,
    /// No acknowledgement within the stale threshold.
    Stale,
    /// A finite topic finished its run.
    Completed,
    /// The process is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Client => "client",
            CloseReason::SendFailure => "send_failure",
            CloseReason::Stale => "stale",
            CloseReason::Completed => "completed",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// Shared state of the event distribution core.
///
/// Built once at startup and handed out as `Arc<Hub>`.
pub struct Hub {
    registry: ConnectionRegistry,
    history: EventHistory,
    seq: AtomicU64,
    /// Serializes "record + pick targets" against "prime + register".
    publish_gate: Mutex<()>,
    config: HubConfig,
}

impl Hub {
    /// Create a hub.
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            history: EventHistory::new(config.history_capacity),
            seq: AtomicU64::new(0),
            publish_gate: Mutex::new(()),
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Event history.
    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    /// Create and register a connection with an empty queue.
    pub fn open(&self, spec: ConnectionSpec) -> Result<(Arc<Connection>, mpsc::Receiver<Arc<Event>>)> {
        self.open_primed(spec, |_, _| Vec::new())
    }

    /// Create a connection, queue the events `prime` returns, then register it.
    ///
    /// `prime` runs under the lock [`Hub::publish`] holds while it records an
    /// event and picks its targets. A broadcast is therefore either in the
    /// history `prime` sees or delivered live after the primed events, never
    /// both. Events beyond the queue capacity are dropped.
    pub fn open_primed<F>(
        &self,
        spec: ConnectionSpec,
        prime: F,
    ) -> Result<(Arc<Connection>, mpsc::Receiver<Arc<Event>>)>
    where
        F: FnOnce(&Hub, &Connection) -> Vec<Arc<Event>>,
    {
        let id = spec
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("conn_{}", Uuid::now_v7()));
        let (conn, rx) = Connection::new(
            id,
            spec.topic,
            spec.correlation_id,
            spec.filters,
            self.config.queue_capacity,
        );
        let conn = Arc::new(conn);
        {
            let _gate = self.publish_gate.lock();
            if self.registry.contains(&conn.id) {
                return Err(HubError::DuplicateConnectionId(conn.id.clone()));
            }
            for event in prime(self, conn.as_ref()) {
                if conn.enqueue(event).is_err() {
                    warn!(conn_id = %conn.id, "initial events exceed queue capacity, truncated");
                    break;
                }
                counter!(telemetry::DELIVERIES_TOTAL).increment(1);
            }
            self.registry.register(conn.clone())?;
        }

        counter!(telemetry::CONNECTIONS_TOTAL, "topic" => spec.topic.as_str()).increment(1);
        gauge!(telemetry::CONNECTIONS_ACTIVE).increment(1.0);
        info!(
            conn_id = %conn.id,
            topic = %conn.topic,
            correlation_id = conn.correlation_id.as_deref().unwrap_or(""),
            "connection opened"
        );
        Ok((conn, rx))
    }

    /// Stamp and record `event`, then pick its targets with `select`.
    ///
    /// Both steps happen under the same lock as [`Hub::open_primed`], so a
    /// connection is never handed an event twice (once replayed, once live).
    pub fn publish<F>(&self, event: Event, select: F) -> (Arc<Event>, Vec<Arc<Connection>>)
    where
        F: FnOnce(&ConnectionRegistry, &Event) -> Vec<Arc<Connection>>,
    {
        let _gate = self.publish_gate.lock();
        let event = Arc::new(self.stamp(event));
        self.history.record(event.clone());
        let targets = select(&self.registry, event.as_ref());
        (event, targets)
    }

    /// Next value of the process-wide event sequence.
    pub fn next_sequence(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Assign a sequence id to `event` unless it already has one.
    pub fn stamp(&self, mut event: Event) -> Event {
        if event.id.is_none() {
            event.id = Some(self.next_sequence().to_string());
        }
        event
    }

    /// Push one event to one connection. A failed send closes the connection.
    pub async fn deliver(&self, conn: &Arc<Connection>, event: Arc<Event>) -> std::result::Result<(), SendError> {
        let result = self.try_deliver(conn, event).await;
        if let Err(err) = &result {
            warn!(conn_id = %conn.id, error = %err, "send failed, closing connection");
            let _ = self.close(conn, CloseReason::SendFailure);
        }
        result
    }

    /// Push one event to one connection without closing it on failure.
    pub(crate) async fn try_deliver(
        &self,
        conn: &Connection,
        event: Arc<Event>,
    ) -> std::result::Result<(), SendError> {
        if !conn.is_alive() {
            return Err(SendError::Closed);
        }
        match conn.send(event, self.config.send_timeout).await {
            Ok(()) => {
                counter!(telemetry::DELIVERIES_TOTAL).increment(1);
                Ok(())
            }
            Err(err) => {
                let label = match err {
                    SendError::Closed => "closed",
                    SendError::Timeout => "timeout",
                };
                counter!(telemetry::SEND_FAILURES_TOTAL, "error" => label).increment(1);
                Err(err)
            }
        }
    }

    /// Stamp and deliver a handler-local event. Not recorded in history.
    pub async fn emit(&self, conn: &Arc<Connection>, event: Event) -> std::result::Result<(), SendError> {
        let event = Arc::new(self.stamp(event));
        self.deliver(conn, event).await
    }

    /// Close a connection. Only the first call for a given connection does anything.
    ///
    /// Deregisters, marks it dead, drops its sink and cancels its handler.
    pub fn close(&self, conn: &Arc<Connection>, reason: CloseReason) -> bool {
        if !conn.begin_close() {
            return false;
        }
        conn.set_close_reason(reason);
        let _ = self.registry.deregister_instance(conn);
        conn.shut();

        counter!(telemetry::EVICTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        gauge!(telemetry::CONNECTIONS_ACTIVE).decrement(1.0);
        debug!(
            conn_id = %conn.id,
            reason = reason.as_str(),
            delivered = conn.delivered_count(),
            "connection closed"
        );
        true
    }

    /// Close a connection by id.
    pub fn close_by_id(&self, id: &str, reason: CloseReason) -> Result<bool> {
        let conn = self.registry.get(id)?;
        Ok(self.close(&conn, reason))
    }

    /// Close every registered connection. Returns how many were closed here.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        self.registry
            .list()
            .iter()
            .filter(|conn| self.close(conn, reason))
            .count()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
