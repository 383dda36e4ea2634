//! External change bridge: turns entity change notifications into
//! `ticket-updated` events.
//!
//! The source calls the subscription handler synchronously with the raw
//! record. The handler only forwards it into an unbounded channel; a single
//! pump task parses, maps and dispatches, so records are processed in arrival
//! order and the source is never blocked on subscriber I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::broadcast::BroadcastEngine;
use crate::errors::BridgeError;
use crate::telemetry;
use crate::types::{Event, TicketUpdate, kinds};

/// Topic the bridge subscribes to on the change source.
pub const ENTITY_CHANGED: &str = "entity.changed";

/// Callback receiving raw change records.
pub type ChangeHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// A publish/subscribe source of entity change records.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Register `handler` for records published on `topic`.
    async fn subscribe(&self, topic: &str, handler: ChangeHandler) -> Result<(), BridgeError>;

    /// Publish a raw record on `topic`. Returns how many handlers saw it.
    async fn publish(&self, topic: &str, record: Value) -> Result<usize, BridgeError>;
}

/// Process-local change source.
#[derive(Default)]
pub struct InMemoryChangeBus {
    handlers: RwLock<HashMap<String, Vec<ChangeHandler>>>,
}

impl InMemoryChangeBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers registered for `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.handlers.read().get(topic).map_or(0, Vec::len)
    }
}

#[async_trait]
impl ChangeSource for InMemoryChangeBus {
    async fn subscribe(&self, topic: &str, handler: ChangeHandler) -> Result<(), BridgeError> {
        self.handlers
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn publish(&self, topic: &str, record: Value) -> Result<usize, BridgeError> {
        let handlers: Vec<ChangeHandler> = self.handlers.read().get(topic).cloned().unwrap_or_default();
        for handler in &handlers {
            handler(record.clone());
        }
        Ok(handlers.len())
    }
}

/// A parsed change record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    /// Entity system id; the correlation id of the resulting event.
    pub entity_id: String,
    /// Human-readable number.
    #[serde(default)]
    pub number: String,
    /// Entity table / type.
    #[serde(rename = "type", default)]
    pub entity_type: String,
    /// What happened.
    pub action: String,
    /// State after the change.
    #[serde(default)]
    pub state: String,
    /// When it happened; receipt time when absent.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Explicit diff, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_fields: Option<Vec<String>>,
}

impl EntityChange {
    /// Parse and validate a raw record.
    pub fn parse(record: Value) -> Result<Self, BridgeError> {
        let change: Self = serde_json::from_value(record)
            .map_err(|e| BridgeError::MalformedChangeEvent(e.to_string()))?;
        if change.entity_id.trim().is_empty() {
            return Err(BridgeError::MalformedChangeEvent("empty entityId".into()));
        }
        if change.action.trim().is_empty() {
            return Err(BridgeError::MalformedChangeEvent("empty action".into()));
        }
        Ok(change)
    }
}

/// Fields implied by an action when the record carries no explicit diff.
pub fn changed_fields_for(action: &str) -> Vec<String> {
    let fields: &[&str] = match action {
        "created" => &["created"],
        "updated" => &["updated"],
        "assigned" => &["assignedTo"],
        "resolved" => &["state", "resolvedAt", "closeCode"],
        "closed" => &["state", "closedAt"],
        "reopened" => &["state", "reopenedAt"],
        "deleted" => &["deleted"],
        _ => &[],
    };
    fields.iter().map(|f| (*f).to_string()).collect()
}

/// Map a change to the `ticket-updated` event sent to its followers.
pub fn map_change(change: &EntityChange) -> Event {
    let changed_fields = change
        .changed_fields
        .clone()
        .unwrap_or_else(|| changed_fields_for(&change.action));
    let update = TicketUpdate {
        sys_id: change.entity_id.clone(),
        number: change.number.clone(),
        ticket_type: change.entity_type.clone(),
        action: change.action.clone(),
        state: change.state.clone(),
        changed_fields,
        timestamp: change.timestamp,
    };
    Event::with_payload(kinds::TICKET_UPDATED, &update).correlated(change.entity_id.clone())
}

/// Whether the bridge is receiving upstream changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    /// Subscribed to the change source.
    Connected,
    /// Subscription failed; only in-process broadcasts are delivered.
    Degraded,
}

#[derive(Debug, Default)]
struct BridgeCounters {
    forwarded: AtomicU64,
    malformed: AtomicU64,
}

/// Handle on a running bridge.
#[derive(Clone, Debug)]
pub struct ExternalChangeBridge {
    status: BridgeStatus,
    counters: Arc<BridgeCounters>,
}

impl ExternalChangeBridge {
    /// Subscribe to [`ENTITY_CHANGED`] on `source` and start the pump.
    ///
    /// Never fails: a subscription error is logged and the returned bridge
    /// reports [`BridgeStatus::Degraded`].
    pub async fn start(
        source: Arc<dyn ChangeSource>,
        engine: BroadcastEngine,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let counters = Arc::new(BridgeCounters::default());
        let (tx, rx) = mpsc::unbounded_channel::<Value>();
        let handler: ChangeHandler = Arc::new(move |record| {
            let _ = tx.send(record);
        });

        match source.subscribe(ENTITY_CHANGED, handler).await {
            Ok(()) => {
                info!(topic = ENTITY_CHANGED, "change bridge subscribed");
                let task = tokio::spawn(pump(rx, engine, counters.clone(), cancel));
                let bridge = Self {
                    status: BridgeStatus::Connected,
                    counters,
                };
                (bridge, task)
            }
            Err(err) => {
                error!(error = %err, "change bridge subscription failed, running degraded");
                let bridge = Self {
                    status: BridgeStatus::Degraded,
                    counters,
                };
                (bridge, tokio::spawn(async {}))
            }
        }
    }

    /// Subscription status.
    pub fn status(&self) -> BridgeStatus {
        self.status
    }

    /// Records turned into events so far.
    pub fn forwarded(&self) -> u64 {
        self.counters.forwarded.load(Ordering::Relaxed)
    }

    /// Records dropped as malformed so far.
    pub fn malformed(&self) -> u64 {
        self.counters.malformed.load(Ordering::Relaxed)
    }
}

#[instrument(skip_all, name = "change_bridge")]
async fn pump(
    mut rx: mpsc::UnboundedReceiver<Value>,
    engine: BroadcastEngine,
    counters: Arc<BridgeCounters>,
    cancel: CancellationToken,
) {
    loop {
        let record = tokio::select! {
            record = rx.recv() => match record {
                Some(record) => record,
                None => {
                    info!("change source closed, bridge exiting");
                    return;
                }
            },
            () = cancel.cancelled() => {
                info!("change bridge stopped");
                return;
            }
        };

        match EntityChange::parse(record) {
            Ok(change) => {
                let event = map_change(&change);
                let delivered = engine.dispatch_to_correlation(&change.entity_id, event).await;
                let _ = counters.forwarded.fetch_add(1, Ordering::Relaxed);
                counter!(telemetry::BRIDGE_CHANGES_TOTAL).increment(1);
                debug!(
                    entity_id = %change.entity_id,
                    action = %change.action,
                    delivered,
                    "change bridged"
                );
            }
            Err(err) => {
                let _ = counters.malformed.fetch_add(1, Ordering::Relaxed);
                counter!(telemetry::BRIDGE_MALFORMED_TOTAL).increment(1);
                warn!(error = %err, "dropping change record");
            }
        }
    }
}
