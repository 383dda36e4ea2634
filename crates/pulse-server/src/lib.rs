//! # pulse-server
//!
//! Axum HTTP front end for the pulse event hub.
//!
//! Subscribers attach over `text/event-stream` responses: the per-ticket push
//! stream at `/api/tickets/{id}/stream` and the generic topic streams at
//! `/api/events/{topic}`, which are backed by the pull [`transport::pull::Subscription`].
//! Producers reach the hub through the small JSON API under `/api`.

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use config::{ServerConfig, hub_config};
pub use error::ApiError;
pub use server::{AppState, PulseServer};
pub use shutdown::ShutdownCoordinator;
pub use transport::pull::{Subscription, subscribe};
