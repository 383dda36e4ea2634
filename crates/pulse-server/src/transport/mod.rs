//! Transport adapters between the hub and HTTP clients.
//!
//! Both stream endpoints answer with `text/event-stream`, one `data:` frame
//! per event. [`push`] serves the per-ticket stream; [`pull`] exposes any topic
//! as a [`futures::Stream`] and serves it over the same framing.

pub mod pull;
pub mod push;

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use pulse_core::connection::BREACHES_ONLY;
use pulse_core::{Event, Filters, SubscribeOptions};
use serde::Deserialize;
use serde_json::Value;

/// Query string accepted by the stream endpoints.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// Caller-chosen connection id.
    pub subscriber_id: Option<String>,
    /// History events to replay after `connected`.
    pub max_history: Option<usize>,
    /// Entity to follow.
    pub correlation_id: Option<String>,
    /// Emission period override, in seconds.
    pub interval: Option<u64>,
    /// `sla-monitoring`: drop warnings and updates.
    pub breaches_only: Option<bool>,
    /// Progress topics: operation label.
    pub operation: Option<String>,
    /// `sync-progress`: comma-separated stage names.
    pub stages: Option<String>,
    /// `test-progress`: comma-separated resource names.
    pub resources: Option<String>,
}

impl StreamQuery {
    /// Split into the subscriber id and the handler options.
    pub fn into_options(self) -> (Option<String>, SubscribeOptions) {
        let mut filters = Filters::new();
        if let Some(breaches_only) = self.breaches_only {
            let _ = filters.insert(BREACHES_ONLY.to_string(), Value::Bool(breaches_only));
        }
        for (key, value) in [
            ("operation", self.operation),
            ("stages", self.stages),
            ("resources", self.resources),
        ] {
            if let Some(value) = value {
                let _ = filters.insert(key.to_string(), Value::String(value));
            }
        }
        let options = SubscribeOptions {
            filters,
            max_history: self.max_history,
            correlation_id: self.correlation_id,
            interval_secs: self.interval,
        };
        (self.subscriber_id, options)
    }
}

/// Encode one event as a `data: <json>\n\n` frame.
pub fn frame(event: &Event) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(event)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// Wrap a stream of events in a `text/event-stream` response.
///
/// The response body owns `events`; when the client goes away hyper drops
/// the body and, with it, the stream.
pub fn event_stream<S>(events: S) -> Response
where
    S: Stream<Item = Event> + Send + 'static,
{
    let body = Body::from_stream(events.map(|event| frame(&event)));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_is_data_line_and_blank_line() {
        let event = Event::new("heartbeat", json!({"connectionId": "c1"}));
        let bytes = frame(&event).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("}\n\n"));
        let parsed: Event = serde_json::from_str(&text[6..text.len() - 2]).unwrap();
        assert_eq!(parsed.kind, "heartbeat");
    }

    #[test]
    fn query_becomes_filters() {
        let query = StreamQuery {
            subscriber_id: Some("s1".into()),
            breaches_only: Some(true),
            stages: Some("a,b".into()),
            interval: Some(2),
            ..StreamQuery::default()
        };
        let (id, options) = query.into_options();
        assert_eq!(id.as_deref(), Some("s1"));
        assert_eq!(options.filters[BREACHES_ONLY], json!(true));
        assert_eq!(options.filters["stages"], json!("a,b"));
        assert!(!options.filters.contains_key("operation"));
        assert_eq!(options.interval_secs, Some(2));
    }

    #[test]
    fn empty_query_has_no_filters() {
        let (id, options) = StreamQuery::default().into_options();
        assert!(id.is_none());
        assert!(options.filters.is_empty());
        assert!(options.max_history.is_none());
    }

    #[tokio::test]
    async fn response_headers() {
        let resp = event_stream(futures::stream::empty::<Event>());
        let headers = resp.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
