//! Finite topics: `sync-progress` and `test-progress`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::connection::Connection;
use crate::errors::SendError;
use crate::hub::Hub;
use crate::types::{Event, ProgressUpdate, kinds};

/// Stages walked by `sync-progress` unless `filters.stages` overrides them.
pub const DEFAULT_SYNC_STAGES: [&str; 9] = [
    "Connecting to ServiceNow",
    "Fetching incidents",
    "Fetching change requests",
    "Fetching problems",
    "Fetching service requests",
    "Fetching users",
    "Fetching groups",
    "Updating cache",
    "Finalizing",
];

/// Resources walked by `test-progress` unless `filters.resources` overrides them.
pub const DEFAULT_RESOURCES: [&str; 6] = [
    "incidents",
    "changes",
    "problems",
    "requests",
    "users",
    "groups",
];

struct Run {
    operation: String,
    items: Vec<String>,
    step_kind: &'static str,
    done_kind: &'static str,
    describe: fn(&str) -> String,
}

pub(super) async fn sync(hub: &Hub, conn: &Arc<Connection>, step: Duration) -> Result<(), SendError> {
    let run = Run {
        operation: conn.text("operation").unwrap_or("full-sync").to_string(),
        items: items(conn, "stages", &DEFAULT_SYNC_STAGES),
        step_kind: kinds::SYNC_PROGRESS,
        done_kind: kinds::SYNC_COMPLETE,
        describe: |stage| format!("{stage} done"),
    };
    walk(hub, conn, step, run).await
}

pub(super) async fn test(hub: &Hub, conn: &Arc<Connection>, step: Duration) -> Result<(), SendError> {
    let run = Run {
        operation: conn.text("operation").unwrap_or("connectivity-test").to_string(),
        items: items(conn, "resources", &DEFAULT_RESOURCES),
        step_kind: kinds::TEST_PROGRESS,
        done_kind: kinds::TEST_COMPLETE,
        describe: |resource| format!("{resource} reachable"),
    };
    walk(hub, conn, step, run).await
}

fn items(conn: &Connection, key: &str, defaults: &[&str]) -> Vec<String> {
    conn.list(key)
        .unwrap_or_else(|| defaults.iter().map(|s| (*s).to_string()).collect())
}

async fn walk(hub: &Hub, conn: &Arc<Connection>, step: Duration, run: Run) -> Result<(), SendError> {
    let total = run.items.len();
    for (index, item) in run.items.iter().enumerate() {
        time::sleep(step).await;
        let current = index + 1;
        let update = ProgressUpdate {
            operation: run.operation.clone(),
            stage: item.clone(),
            progress: ProgressUpdate::percent(current, total),
            current,
            total,
            message: (run.describe)(item),
            timestamp: Utc::now(),
        };
        hub.emit(conn, correlate(conn, Event::with_payload(run.step_kind, &update)))
            .await?;
    }

    let done = ProgressUpdate {
        operation: run.operation.clone(),
        stage: "complete".to_string(),
        progress: 100,
        current: total,
        total,
        message: format!("{} finished", run.operation),
        timestamp: Utc::now(),
    };
    hub.emit(conn, correlate(conn, Event::with_payload(run.done_kind, &done)))
        .await
}

fn correlate(conn: &Connection, mut event: Event) -> Event {
    event.correlation_id.clone_from(&conn.correlation_id);
    event
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{collect, context};
    use super::super::{SubscribeOptions, attach};
    use super::*;
    use crate::hub::HubConfig;
    use crate::types::Topic;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn sync_walks_nine_stages_then_completes_and_ends() {
        let ctx = context(HubConfig::default());
        let (conn, mut rx) = attach(&ctx, None, Topic::SyncProgress, SubscribeOptions::default()).unwrap();

        let events = collect(&mut rx, usize::MAX).await;
        assert_eq!(events.len(), 11);
        assert_eq!(events[0].kind, kinds::CONNECTED);
        assert!(events[1..10].iter().all(|e| e.kind == kinds::SYNC_PROGRESS));
        assert_eq!(events[10].kind, kinds::SYNC_COMPLETE);

        let first: ProgressUpdate = events[1].payload().unwrap();
        assert_eq!((first.current, first.total, first.progress), (1, 9, 11));
        assert_eq!(first.stage, "Connecting to ServiceNow");
        let last: ProgressUpdate = events[9].payload().unwrap();
        assert_eq!((last.current, last.progress), (9, 100));

        assert!(!conn.is_alive());
        assert!(ctx.hub.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sync_stages_and_operation_from_filters() {
        let ctx = context(HubConfig::default());
        let options = SubscribeOptions {
            filters: json!({"stages": ["a", "b"], "operation": "delta-sync"})
                .as_object()
                .cloned()
                .unwrap(),
            ..SubscribeOptions::default()
        };
        let (_conn, mut rx) = attach(&ctx, None, Topic::SyncProgress, options).unwrap();
        let events = collect(&mut rx, usize::MAX).await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].data["stage"], "a");
        assert_eq!(events[1].data["progress"], 50);
        assert_eq!(events[3].data["operation"], "delta-sync");
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_walks_default_resources() {
        let ctx = context(HubConfig::default());
        let start = time::Instant::now();
        let (_conn, mut rx) = attach(&ctx, None, Topic::TestProgress, SubscribeOptions::default()).unwrap();
        let events = collect(&mut rx, usize::MAX).await;

        let stages: Vec<_> = events[1..7]
            .iter()
            .map(|e| e.data["stage"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(stages, DEFAULT_RESOURCES);
        assert_eq!(events.last().unwrap().kind, kinds::TEST_COMPLETE);
        assert_eq!(events.len(), 8);
        assert_eq!(start.elapsed().as_secs(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_override_falls_back_to_defaults() {
        let ctx = context(HubConfig::default());
        let options = SubscribeOptions {
            filters: json!({"resources": []}).as_object().cloned().unwrap(),
            ..SubscribeOptions::default()
        };
        let (_conn, mut rx) = attach(&ctx, None, Topic::TestProgress, options).unwrap();
        let events = collect(&mut rx, usize::MAX).await;
        assert_eq!(events.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_events_carry_correlation() {
        let ctx = context(HubConfig::default());
        let options = SubscribeOptions {
            correlation_id: Some("run-42".into()),
            filters: json!({"stages": "one"}).as_object().cloned().unwrap(),
            ..SubscribeOptions::default()
        };
        let (_conn, mut rx) = attach(&ctx, None, Topic::SyncProgress, options).unwrap();
        let events = collect(&mut rx, usize::MAX).await;
        assert!(events.iter().all(|e| e.correlation_id.as_deref() == Some("run-42")));
    }
}
