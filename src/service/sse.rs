//! Server-sent event framing and the JSON tree the realtime database streams
//! patch into.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser. Feed it raw chunks as they
/// arrive; complete events come out once their terminating blank line has
/// been seen.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    event: String,
    data: Vec<String>,
}

impl SseParser {
    /// Bytes are buffered until a full line is in, so a UTF-8 sequence split
    /// across chunks is decoded whole.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    out.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => self.event = value.to_string(),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        out
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.event.is_empty() && self.data.is_empty() {
            return None;
        }
        let event = if self.event.is_empty() {
            "message".to_string()
        } else {
            std::mem::take(&mut self.event)
        };
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

/// What an event did to the local tree.
#[derive(Debug, PartialEq)]
pub enum EventEffect {
    Changed,
    Ignored,
    /// The server closed the query for good (`cancel`, `auth_revoked`).
    Cancelled(String),
}

#[derive(Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

/// Apply one streamed event to `tree`.
pub fn apply_event(tree: &mut Value, event: &SseEvent) -> Result<EventEffect> {
    match event.event.as_str() {
        "put" => {
            let body: PathData = serde_json::from_str(&event.data)
                .context("malformed put event")?;
            set_at(tree, &body.path, body.data);
            Ok(EventEffect::Changed)
        }
        "patch" => {
            let body: PathData = serde_json::from_str(&event.data)
                .context("malformed patch event")?;
            let Value::Object(children) = body.data else {
                anyhow::bail!("patch event data is not an object");
            };
            for (child, value) in children {
                let path = format!("{}/{}", body.path.trim_end_matches('/'), child);
                set_at(tree, &path, value);
            }
            Ok(EventEffect::Changed)
        }
        "keep-alive" => Ok(EventEffect::Ignored),
        "cancel" | "auth_revoked" => Ok(EventEffect::Cancelled(format!(
            "{}: {}",
            event.event, event.data
        ))),
        other => {
            tracing::trace!(event = other, "unhandled stream event");
            Ok(EventEffect::Ignored)
        }
    }
}

/// Write `value` at slash-separated `path`; `null` deletes.
fn set_at(tree: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        *tree = value;
        return;
    };

    let mut node = tree;
    for segment in parents {
        let map = as_object(node);
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = as_object(node);
    if value.is_null() {
        map.remove(*last);
    } else {
        map.insert(last.to_string(), value);
    }
}

fn as_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, data: Value) -> SseEvent {
        SseEvent { event: name.to_string(), data: data.to_string() }
    }

    #[test]
    fn test_parser_handles_split_chunks_and_crlf() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"event: put\r\ndata: {\"path\":").is_empty());
        let events = parser.feed(b"\"/\",\"data\":null}\r\n\r\nevent: keep-alive\ndata: null\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "put");
        assert_eq!(events[0].data, "{\"path\":\"/\",\"data\":null}");
        assert_eq!(events[1].event, "keep-alive");
    }

    #[test]
    fn test_parser_keeps_multibyte_char_split_across_chunks() {
        let raw = "event: put\ndata: {\"path\":\"/-a/title\",\"data\":\"Café\"}\n\n".as_bytes();
        let split = raw.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut parser = SseParser::default();
        assert!(parser.feed(&raw[..split]).is_empty());
        let events = parser.feed(&raw[split..]);
        assert_eq!(events.len(), 1);

        let mut tree = Value::Null;
        apply_event(&mut tree, &events[0]).unwrap();
        assert_eq!(tree["-a"]["title"], "Café");
    }

    #[test]
    fn test_parser_joins_multiline_data_and_skips_comments() {
        let mut parser = SseParser::default();
        let events = parser.feed(b": hello\ndata: a\ndata: b\n\n");
        assert_eq!(events, vec![SseEvent { event: "message".into(), data: "a\nb".into() }]);
    }

    #[test]
    fn test_put_root_then_child_then_delete() {
        let mut tree = Value::Null;
        apply_event(&mut tree, &event("put", json!({"path": "/", "data": {"-a": {"path": "p1"}}}))).unwrap();
        apply_event(&mut tree, &event("put", json!({"path": "/-b", "data": {"path": "p2"}}))).unwrap();
        assert_eq!(tree, json!({"-a": {"path": "p1"}, "-b": {"path": "p2"}}));

        apply_event(&mut tree, &event("put", json!({"path": "/-a", "data": null}))).unwrap();
        assert_eq!(tree, json!({"-b": {"path": "p2"}}));
    }

    #[test]
    fn test_patch_merges_children() {
        let mut tree = json!({"-a": {"title": "old", "path": "p1"}});
        apply_event(&mut tree, &event("patch", json!({"path": "/-a", "data": {"title": "new"}}))).unwrap();
        assert_eq!(tree, json!({"-a": {"title": "new", "path": "p1"}}));
    }

    #[test]
    fn test_put_into_empty_tree_creates_parents() {
        let mut tree = Value::Null;
        apply_event(&mut tree, &event("put", json!({"path": "/-a/title", "data": "x"}))).unwrap();
        assert_eq!(tree, json!({"-a": {"title": "x"}}));
    }

    #[test]
    fn test_control_events() {
        let mut tree = Value::Null;
        assert_eq!(
            apply_event(&mut tree, &event("keep-alive", Value::Null)).unwrap(),
            EventEffect::Ignored
        );
        assert!(matches!(
            apply_event(&mut tree, &SseEvent { event: "auth_revoked".into(), data: "credential is no longer valid".into() }).unwrap(),
            EventEffect::Cancelled(_)
        ));
        assert!(apply_event(&mut tree, &SseEvent { event: "put".into(), data: "nope".into() }).is_err());
    }
}
