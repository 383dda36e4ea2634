//! End-to-end tests against a real listener on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use pulse_core::{Event, Hub, HubConfig, kinds};
use pulse_server::{PulseServer, ServerConfig};
use serde_json::{Value, json};

const STEP: Duration = Duration::from_secs(5);

async fn boot(hub_config: HubConfig) -> (PulseServer, SocketAddr) {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    };
    let mut server = PulseServer::new(config, Arc::new(Hub::new(hub_config)));
    let _ = server.start_bridge().await;
    let (addr, _handle) = server.listen().await.unwrap();
    (server, addr)
}

/// Splits a streamed body into `data:` frames.
struct Frames {
    body: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buf: String,
}

impl Frames {
    fn new(resp: reqwest::Response) -> Self {
        Self {
            body: resp.bytes_stream().boxed(),
            buf: String::new(),
        }
    }

    async fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let frame: String = self.buf.drain(..end + 2).collect();
                let json = frame.trim_end().strip_prefix("data: ").unwrap();
                return Some(serde_json::from_str(json).unwrap());
            }
            let chunk = tokio::time::timeout(STEP, self.body.next()).await.unwrap()?;
            self.buf.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap());
        }
    }

    async fn next_of(&mut self, kind: &str) -> Event {
        loop {
            let event = self.next().await.unwrap();
            if event.kind == kind {
                return event;
            }
        }
    }
}

async fn open(addr: SocketAddr, path: &str) -> Frames {
    let resp = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    assert_eq!(resp.headers()["cache-control"], "no-cache");
    Frames::new(resp)
}

async fn post(addr: SocketAddr, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get_json(addr: SocketAddr, path: &str) -> Value {
    reqwest::get(format!("http://{addr}{path}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_bridge_and_connections() {
    let (_server, addr) = boot(HubConfig::default()).await;
    let body = get_json(addr, "/health").await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
    assert_eq!(body["bridge"], "connected");
}

#[tokio::test]
async fn ticket_stream_receives_targeted_broadcast_once() {
    let (server, addr) = boot(HubConfig::default()).await;
    let mut frames = open(addr, "/api/tickets/T-1/stream").await;
    let connected = frames.next().await.unwrap();
    assert_eq!(connected.kind, kinds::CONNECTED);
    assert_eq!(connected.correlation_id.as_deref(), Some("T-1"));

    let (status, body) = post(
        addr,
        "/api/broadcast",
        json!({"type": kinds::TICKET_UPDATED, "data": {"sysId": "T-1"}, "correlationId": "T-1"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["delivered"], 1);

    let update = frames.next_of(kinds::TICKET_UPDATED).await;
    assert_eq!(update.data["sysId"], "T-1");
    assert!(update.id.is_some());

    let history = get_json(addr, "/api/history/ticket-updated").await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(server.hub().history().len(kinds::TICKET_UPDATED), 1);
}

#[tokio::test]
async fn other_tickets_do_not_leak() {
    let (_server, addr) = boot(HubConfig::default()).await;
    let mut frames = open(addr, "/api/tickets/T-1/stream").await;
    let _ = frames.next().await;

    let (_, body) = post(
        addr,
        "/api/broadcast",
        json!({"type": kinds::TICKET_UPDATED, "correlationId": "T-2"}),
    )
    .await;
    assert_eq!(body["delivered"], 0);
}

#[tokio::test]
async fn change_record_flows_through_bridge() {
    let (_server, addr) = boot(HubConfig::default()).await;
    let mut frames = open(addr, "/api/tickets/abc123/stream").await;
    let _ = frames.next().await;

    let (status, body) = post(
        addr,
        "/api/changes",
        json!({
            "entityId": "abc123",
            "number": "INC0010001",
            "type": "incident",
            "action": "update",
            "state": "In Progress",
            "timestamp": "2026-03-01T12:00:00Z"
        }),
    )
    .await;
    assert_eq!(status, 202);
    assert_eq!(body["subscribers"], 1);

    let update = frames.next_of(kinds::TICKET_UPDATED).await;
    assert_eq!(update.data["sysId"], "abc123");
    assert_eq!(update.data["number"], "INC0010001");
    assert_eq!(update.data["ticketType"], "incident");
    assert!(update.data["changedFields"].is_array());
}

#[tokio::test]
async fn sync_progress_stream_ends_after_completion() {
    let (_server, addr) = boot(HubConfig {
        progress_step: Duration::from_millis(10),
        ..HubConfig::default()
    })
    .await;
    let mut frames = open(addr, "/api/events/sync-progress").await;

    let mut seen = Vec::new();
    while let Some(event) = frames.next().await {
        seen.push(event.kind);
    }
    assert_eq!(seen.len(), 11);
    assert_eq!(seen[0], kinds::CONNECTED);
    assert_eq!(
        seen.iter().filter(|k| *k == kinds::SYNC_PROGRESS).count(),
        9
    );
    assert_eq!(seen[10], kinds::SYNC_COMPLETE);
}

#[tokio::test]
async fn sla_breaches_only_stream() {
    let (_server, addr) = boot(HubConfig {
        sla_interval: Duration::from_millis(50),
        ..HubConfig::default()
    })
    .await;
    let mut frames = open(addr, "/api/events/sla-monitoring?breachesOnly=true").await;
    let _ = frames.next().await;

    let record = |id: &str, pct: f64, breached: bool| {
        json!({
            "ticketId": id, "ticketNumber": format!("INC-{id}"), "slaId": format!("sla-{id}"),
            "slaName": "Resolution", "businessPercentage": pct, "hasBreached": breached,
            "timestamp": "2026-03-01T12:00:00Z"
        })
    };
    let (status, _) = post(
        addr,
        "/api/sla",
        json!([record("1", 40.0, false), record("2", 90.0, false), record("3", 130.0, true)]),
    )
    .await;
    assert_eq!(status, 202);

    let event = frames.next_of(kinds::SLA_BREACH).await;
    assert_eq!(event.data["ticketId"], "3");
}

#[tokio::test]
async fn duplicate_subscriber_and_unknown_topic_are_rejected() {
    let (_server, addr) = boot(HubConfig::default()).await;
    let mut frames = open(addr, "/api/events/general?subscriberId=one").await;
    let _ = frames.next().await;

    let resp = reqwest::get(format!("http://{addr}/api/events/general?subscriberId=one"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "DUPLICATE_CONNECTION");

    let resp = reqwest::get(format!("http://{addr}/api/events/nope")).await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn client_disconnect_deregisters() {
    let (server, addr) = boot(HubConfig::default()).await;
    let mut frames = open(addr, "/api/events/general?subscriberId=gone").await;
    let _ = frames.next().await;
    assert!(server.hub().registry().contains("gone"));

    drop(frames);
    // a dead socket is noticed on the next write; broadcast until it is
    let deadline = tokio::time::Instant::now() + STEP;
    while server.hub().registry().contains("gone") {
        assert!(tokio::time::Instant::now() < deadline, "connection never deregistered");
        let _ = server
            .engine()
            .broadcast_all(Event::new("probe", Value::Null))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    };
    let server = PulseServer::new(config, Arc::new(Hub::new(HubConfig::default())));
    let (addr, handle) = server.listen().await.unwrap();
    let mut frames = open(addr, "/api/events/general").await;
    let _ = frames.next().await;

    server.shutdown().shutdown();
    assert!(frames.next().await.is_none());
    tokio::time::timeout(STEP, handle).await.unwrap().unwrap();
    assert!(server.hub().registry().is_empty());
}
