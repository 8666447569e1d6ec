//! Event stream parser
//!
//! Classifies one inbound frame into at most one [`DomainEvent`].
//!
//! # Error Handling
//!
//! The parser never fails:
//!
//! - **Non-JSON frames**: recorded as a log line with the raw text, no event.
//! - **Unknown discriminators**: no event; the payload is still logged.
//! - **Missing or mistyped fields**: the payload classifies as `None` rather
//!   than producing an event with partially trusted data.
//!
//! # Recognized shapes
//!
//! The discriminator is `event`, falling back to `type`. Structured events
//! (`path_created`, `node_added`, ...) carry their fields at the top level in
//! snake_case or camelCase. The backend's own frames (`status`, `result`,
//! `error`) map to run lifecycle events, and `log` frames whose text carries a
//! `[Reasoning Path <id>]` marker announce, split or complete paths.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::events::{DomainEvent, Event};
use crate::types::{NodeData, NodeType, Severity};

/// Marker prefix the agent uses for path-scoped log lines
const PATH_MARKER: &str = "[Reasoning Path ";

/// Prefix of the backend's run-started status message
const STARTING_PREFIX: &str = "Starting inference for ";

/// Epoch values above this are milliseconds rather than seconds
const MILLIS_THRESHOLD: f64 = 1e11;

// ============================================
// Field names
// ============================================

// Each list is checked in order; the first non-null entry wins.
const EVENT: &[&str] = &["event"];
const KIND: &[&str] = &["type"];
const STATUS: &[&str] = &["status"];
const MESSAGE: &[&str] = &["message"];
const RAW_CONTENT: &[&str] = &["raw_content", "rawContent"];
const LEVEL: &[&str] = &["level"];
const TIMESTAMP: &[&str] = &["timestamp"];
const PATH_ID: &[&str] = &["path_id", "pathId"];
const PARENT_ID: &[&str] = &["parent_id", "parentId"];
const NEW_PATH_ID: &[&str] = &["new_path_id", "newPathId"];
const NODE_ID: &[&str] = &["node_id", "nodeId"];
const NODE_TYPE: &[&str] = &["node_type", "nodeType"];
const PRIMARY: &[&str] = &["primary"];
const AGENT: &[&str] = &["agent"];
const ACTION: &[&str] = &["action"];
const DATA: &[&str] = &["data"];
const REPO: &[&str] = &["repo", "repo_name", "repoName"];
const REASON: &[&str] = &["reason"];

/// Fields merged into a node when an update has no `data` object
const PATCH_FIELDS: [&str; 3] = ["query", "response", "parse"];

// ============================================
// Raw payload
// ============================================

/// Loosely typed view over an inbound JSON object.
///
/// Fields are looked up by name on demand, so a wrong type in one field, or a
/// key sent in both spellings, never prevents reading the others.
#[derive(Debug, Clone, Copy)]
struct RawPayload<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> RawPayload<'a> {
    fn new(raw: &'a Value) -> Option<Self> {
        raw.as_object().map(|fields| Self { fields })
    }

    /// First non-null value among `names`
    fn get(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .find_map(|name| self.fields.get(*name).filter(|v| !v.is_null()))
    }

    fn text(&self, names: &[&str]) -> Option<&'a str> {
        text(self.get(names))
    }

    fn ident(&self, names: &[&str]) -> Option<String> {
        ident(self.get(names))
    }

    fn discriminator(&self) -> Option<&'a str> {
        self.text(EVENT).or_else(|| self.text(KIND))
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        timestamp(self.get(TIMESTAMP))
    }
}

/// Events produced by one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEvents {
    /// Always present: the frame as a log entry
    pub log: Event,
    /// Present when the frame matched a known shape
    pub domain: Option<DomainEvent>,
}

impl FrameEvents {
    /// Events in dispatch order
    pub fn into_events(self) -> Vec<Event> {
        let mut events = vec![self.log];
        events.extend(self.domain.map(Event::Domain));
        events
    }
}

/// Turn one text frame into its log entry and optional domain event.
///
/// `received_at` is used wherever the payload carries no timestamp.
pub fn read_frame(frame: &str, received_at: DateTime<Utc>) -> FrameEvents {
    match serde_json::from_str::<Value>(frame) {
        Ok(value) if value.is_object() => FrameEvents {
            log: log_event(&value, received_at),
            domain: parse(&value, received_at),
        },
        _ => {
            tracing::debug!(len = frame.len(), "Non-JSON frame recorded as log");
            FrameEvents {
                log: Event::LogReceived {
                    content: Arc::from(frame),
                    timestamp: received_at,
                    severity: Severity::Info,
                },
                domain: None,
            }
        }
    }
}

/// Build the [`Event::LogReceived`] for a JSON payload.
pub fn log_event(raw: &Value, received_at: DateTime<Utc>) -> Event {
    let Some(payload) = RawPayload::new(raw) else {
        return Event::LogReceived {
            content: Arc::from(raw.to_string()),
            timestamp: received_at,
            severity: Severity::Info,
        };
    };

    let content: Arc<str> = match payload.text(MESSAGE) {
        Some(message) => Arc::from(message),
        None => Arc::from(raw.to_string()),
    };

    let is_error_level = payload
        .text(LEVEL)
        .map(|level| level.eq_ignore_ascii_case("error") || level.eq_ignore_ascii_case("critical"))
        .unwrap_or(false);
    let severity = if is_error_level || payload.discriminator() == Some("error") {
        Severity::Error
    } else {
        Severity::Info
    };

    Event::LogReceived {
        content,
        timestamp: payload.timestamp().unwrap_or(received_at),
        severity,
    }
}

/// Classify a JSON payload.
///
/// Returns `None` for anything that does not match a known shape.
pub fn parse(raw: &Value, received_at: DateTime<Utc>) -> Option<DomainEvent> {
    let payload = RawPayload::new(raw)?;

    let event = match payload.discriminator()? {
        "run_started" => Some(DomainEvent::RunStarted {
            repo: payload.text(REPO).map(str::to_string),
        }),
        "status" => parse_status(payload),
        "path_created" => Some(DomainEvent::PathCreated {
            path_id: payload.ident(PATH_ID)?,
            parent_id: payload.ident(PARENT_ID),
            primary: flag(payload.get(PRIMARY)),
        }),
        "path_split" => Some(DomainEvent::PathSplit {
            parent_id: payload.ident(PARENT_ID)?,
            new_path_id: payload
                .ident(NEW_PATH_ID)
                .or_else(|| payload.ident(PATH_ID))?,
        }),
        "node_added" => Some(DomainEvent::NodeAdded {
            path_id: payload.ident(PATH_ID)?,
            node_id: payload.ident(NODE_ID)?,
            node_type: payload
                .text(NODE_TYPE)
                .map(NodeType::from)
                .unwrap_or(NodeType::Step),
            agent: payload.text(AGENT).map(str::to_string),
            action: payload.text(ACTION).map(str::to_string),
            data: object(payload.get(DATA)).unwrap_or_default(),
            timestamp: payload.timestamp().unwrap_or(received_at),
        }),
        "node_updated" => {
            let data_patch = data_patch(payload);
            if data_patch.is_empty() {
                None
            } else {
                Some(DomainEvent::NodeUpdated {
                    node_id: payload.ident(NODE_ID)?,
                    data_patch,
                })
            }
        }
        "path_completed" => Some(DomainEvent::PathCompleted {
            path_id: payload.ident(PATH_ID)?,
        }),
        "run_finished" | "result" => Some(DomainEvent::RunFinished),
        "run_failed" => Some(DomainEvent::RunFailed {
            reason: payload
                .text(REASON)
                .or_else(|| payload.text(MESSAGE))
                .unwrap_or("unknown failure")
                .to_string(),
        }),
        "error" => Some(DomainEvent::RunFailed {
            reason: payload
                .text(MESSAGE)
                .or_else(|| payload.text(REASON))
                .unwrap_or("unknown failure")
                .to_string(),
        }),
        "log" => payload
            .text(RAW_CONTENT)
            .or_else(|| payload.text(MESSAGE))
            .and_then(parse_path_marker),
        _ => None,
    };

    if event.is_none() {
        tracing::debug!(
            discriminator = payload.discriminator().unwrap_or(""),
            "Payload did not classify"
        );
    }

    event
}

/// Backend status frame: only `started` is meaningful to the graph
fn parse_status(payload: RawPayload<'_>) -> Option<DomainEvent> {
    if payload.text(STATUS)? != "started" {
        return None;
    }

    let repo = payload.text(REPO).map(str::to_string).or_else(|| {
        payload
            .text(MESSAGE)
            .and_then(|m| m.strip_prefix(STARTING_PREFIX))
            .map(|rest| rest.trim_end_matches('.').trim().to_string())
            .filter(|repo| !repo.is_empty())
    });

    Some(DomainEvent::RunStarted { repo })
}

/// Classify a `[Reasoning Path <id>] ...` log line
fn parse_path_marker(line: &str) -> Option<DomainEvent> {
    let start = line.find(PATH_MARKER)? + PATH_MARKER.len();
    let rest = &line[start..];
    let close = rest.find(']')?;
    let path_id = rest[..close].trim();
    if path_id.is_empty() {
        return None;
    }
    let path_id = path_id.to_string();
    let tail = rest[close + 1..].trim();
    // ASCII lowercasing keeps byte offsets valid for `tail`
    let lowered = tail.to_ascii_lowercase();

    if let Some(index) = lowered.find("split from path ") {
        let parent = tail[index + "split from path ".len()..]
            .split_whitespace()
            .next()
            .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '-'))
            .filter(|token| !token.is_empty())?;
        return Some(DomainEvent::PathSplit {
            parent_id: parent.to_string(),
            new_path_id: path_id,
        });
    }

    if lowered.starts_with("completed") || lowered.starts_with("finished") {
        return Some(DomainEvent::PathCompleted { path_id });
    }

    Some(DomainEvent::PathCreated {
        path_id,
        parent_id: None,
        primary: false,
    })
}

/// Patch from `data`, or from top-level query/response/parse fields
fn data_patch(payload: RawPayload<'_>) -> NodeData {
    if let Some(data) = object(payload.get(DATA)) {
        return data;
    }

    let mut patch = NodeData::new();
    for key in PATCH_FIELDS {
        if let Some(value) = payload.get(&[key]) {
            patch.insert(key.to_string(), value.clone());
        }
    }
    patch
}

// ============================================
// Field helpers
// ============================================

/// Non-empty string field
fn text(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Identifier field: non-empty string or integer
fn ident(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn flag(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

fn object(value: Option<&Value>) -> Option<NodeData> {
    value.and_then(Value::as_object).cloned()
}

/// RFC 3339 string, or epoch seconds/milliseconds
fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_f64().filter(|v| v.is_finite() && *v >= 0.0)?;
            if raw > MILLIS_THRESHOLD {
                DateTime::from_timestamp_millis(raw as i64)
            } else {
                DateTime::from_timestamp_micros((raw * 1_000_000.0) as i64)
            }
        }
        _ => None,
    }
}
