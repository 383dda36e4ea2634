//! Plain data definitions: topics, the event envelope and domain payloads.

pub mod event;
pub mod payloads;
pub mod topic;

pub use event::{Event, kinds};
pub use payloads::{ConnectedInfo, DashboardStats, ProgressUpdate, SlaUpdate, TicketUpdate};
pub use topic::Topic;
