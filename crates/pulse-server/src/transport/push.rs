//! Push transport: the per-ticket event stream.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use pulse_core::Topic;
use tracing::info;

use super::pull::subscribe;
use super::{StreamQuery, event_stream};
use crate::error::ApiError;
use crate::server::AppState;

/// `GET /api/tickets/{correlation_id}/stream`
///
/// Opens a `ticket-updates` connection correlated to the ticket in the path.
/// The first frame is `connected`, followed by replayed `ticket-updated`
/// history for that ticket, then live updates and idle heartbeats. Closing
/// the HTTP response closes the connection.
pub async fn ticket_stream(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let (subscriber_id, mut options) = query.into_options();
    options.correlation_id = Some(correlation_id);
    let subscription = subscribe(&state.ctx, subscriber_id, Topic::TicketUpdates, options)?;
    info!(
        conn_id = %subscription.id(),
        correlation_id = ?subscription.connection().correlation_id,
        "ticket stream opened"
    );
    Ok(event_stream(subscription))
}
