//! `sla-monitoring`: poll SLA measurements and classify them.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use super::TopicContext;
use crate::connection::Connection;
use crate::errors::SendError;
use crate::types::{Event, SlaUpdate, kinds};

/// Event kind for an SLA record.
///
/// Breached wins; otherwise a business percentage at or above
/// `warning_percent` is a warning; anything else is a plain update.
pub fn classify(record: &SlaUpdate, warning_percent: f64) -> &'static str {
    if record.has_breached {
        kinds::SLA_BREACH
    } else if record.business_percentage >= warning_percent {
        kinds::SLA_WARNING
    } else {
        kinds::SLA_UPDATE
    }
}

/// Poll from `cursor` every `period`. The cursor is this subscriber's own, so
/// other subscribers polling the same source see the same records.
pub(super) async fn run(
    ctx: &TopicContext,
    conn: &Arc<Connection>,
    period: Duration,
    mut cursor: u64,
) -> Result<(), SendError> {
    let warning_percent = ctx.hub.config().sla_warning_percent;
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        let _ = ticker.tick().await;
        let batch = match ctx.sla.poll(cursor).await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "sla poll failed, skipping tick");
                continue;
            }
        };
        cursor = batch.next;
        let mut sent = 0usize;
        for record in batch.records {
            if conn
                .correlation_id
                .as_deref()
                .is_some_and(|cid| cid != record.ticket_id)
            {
                continue;
            }
            let kind = classify(&record, warning_percent);
            let event = Event::with_payload(kind, &record).correlated(record.ticket_id.clone());
            if conn.accepts(&event) {
                ctx.hub.emit(conn, event).await?;
                sent += 1;
            }
        }
        debug!(sent, cursor, "sla tick");
    }
}
