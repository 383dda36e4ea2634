//! # pulse-core
//!
//! Real-time event distribution for ITSM change notifications.
//!
//! - Connection registry and bounded per-kind event history
//! - Broadcast engine: targeted, per-topic and global fan-out
//! - Per-connection topic handlers (heartbeats, dashboard stats, SLA alerts,
//!   sync and test progress)
//! - Liveness supervisor evicting stale subscribers
//! - External change bridge mapping entity changes to `ticket-updated` events
//!
//! Everything hangs off a [`Hub`] built once at startup and shared as `Arc<Hub>`.

#![deny(unsafe_code)]

pub mod bridge;
pub mod broadcast;
pub mod connection;
pub mod errors;
pub mod handlers;
pub mod history;
pub mod hub;
pub mod liveness;
pub mod registry;
pub mod sources;
pub mod telemetry;
pub mod types;

pub use bridge::{BridgeStatus, ChangeSource, EntityChange, ExternalChangeBridge, InMemoryChangeBus};
pub use broadcast::BroadcastEngine;
pub use connection::{Connection, Filters};
pub use errors::{BridgeError, HubError, Result, SendError, SourceError};
pub use handlers::{HandlerState, SubscribeOptions, TopicContext, attach};
pub use history::EventHistory;
pub use hub::{CloseReason, ConnectionSpec, Hub, HubConfig};
pub use liveness::{LivenessSupervisor, SweepReport};
pub use registry::{ConnectionRegistry, RegistryStats};
pub use sources::{SharedStats, SlaBatch, SlaFeed, SlaSource, StatsSource};
pub use types::{Event, Topic, kinds};
