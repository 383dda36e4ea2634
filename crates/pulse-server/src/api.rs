//! JSON producer API: broadcasts, change records, SLA feed, dashboard stats
//! and registry introspection.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use pulse_core::bridge::ENTITY_CHANGED;
use pulse_core::types::{DashboardStats, SlaUpdate};
use pulse_core::{CloseReason, EntityChange, Event, RegistryStats, Topic, kinds};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::server::AppState;

/// Body of `POST /api/broadcast`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
    /// Deliver only to connections following this entity.
    pub correlation_id: Option<String>,
    /// Deliver only to subscribers of this topic.
    pub topic: Option<Topic>,
}

/// How many connections an event reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivered {
    /// Connections the event was queued to.
    pub delivered: usize,
}

/// SLA records, one or many.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SlaBatch {
    /// A JSON array of records.
    Many(Vec<SlaUpdate>),
    /// A single record.
    One(SlaUpdate),
}

impl SlaBatch {
    fn into_vec(self) -> Vec<SlaUpdate> {
        match self {
            Self::Many(records) => records,
            Self::One(record) => vec![record],
        }
    }
}

/// `POST /api/broadcast`
///
/// Targets a correlation id when given, else a topic, else everyone.
pub async fn broadcast(
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> Result<Json<Delivered>, ApiError> {
    if req.kind.trim().is_empty() {
        return Err(ApiError::BadRequest("event type must not be empty".into()));
    }
    let event = Event::new(req.kind, req.data);
    let delivered = match (req.correlation_id, req.topic) {
        (Some(correlation_id), _) => {
            let event = event.correlated(correlation_id.clone());
            state.engine.dispatch_to_correlation(&correlation_id, event).await
        }
        (None, Some(topic)) => state.engine.dispatch_to_topic(topic, event).await,
        (None, None) => state.engine.broadcast_all(event).await,
    };
    Ok(Json(Delivered { delivered }))
}

/// `POST /api/changes`
///
/// Publishes a raw change record to the change source; the bridge turns it
/// into a `ticket-updated` event. Records the bridge would drop are rejected
/// here up front.
pub async fn publish_change(
    State(state): State<AppState>,
    Json(record): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let change = EntityChange::parse(record.clone())?;
    let subscribers = state.changes.publish(ENTITY_CHANGED, record).await?;
    debug!(entity_id = %change.entity_id, subscribers, "change published");
    Ok((StatusCode::ACCEPTED, Json(json!({ "subscribers": subscribers }))))
}

/// `POST /api/sla`
pub async fn enqueue_sla(
    State(state): State<AppState>,
    Json(batch): Json<SlaBatch>,
) -> (StatusCode, Json<Value>) {
    let records = batch.into_vec();
    let queued = records.len();
    state.sla.push(records);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "queued": queued, "retained": state.sla.len() })),
    )
}

/// `PUT /api/stats`
///
/// Replaces the dashboard snapshot and pushes it to current subscribers.
pub async fn replace_stats(
    State(state): State<AppState>,
    Json(stats): Json<DashboardStats>,
) -> Json<Delivered> {
    state.stats.set(stats);
    let event = Event::with_payload(kinds::DASHBOARD_STATS, &state.stats.get());
    let delivered = state
        .engine
        .dispatch_to_topic(Topic::DashboardStats, event)
        .await;
    Json(Delivered { delivered })
}

/// `GET /api/stats`
pub async fn current_stats(State(state): State<AppState>) -> Json<DashboardStats> {
    Json(state.stats.get())
}

/// `GET /api/connections`
pub async fn connections(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.ctx.hub.registry().stats())
}

/// `DELETE /api/connections/{id}`
pub async fn close_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let _ = state.ctx.hub.close_by_id(&id, CloseReason::Client)?;
    info!(conn_id = %id, "connection closed via api");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/history/{kind}`
pub async fn history(State(state): State<AppState>, Path(kind): Path<String>) -> Json<Vec<Arc<Event>>> {
    Json(state.ctx.hub.history().snapshot(&kind))
}
