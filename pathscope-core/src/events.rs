//! Events folded into the graph, and commands sent back to the agent.
//!
//! [`DomainEvent`] is the closed set of shapes the parser can recognize on the
//! wire. [`Event`] is what the reducer accepts: every domain event plus the
//! locally generated [`Event::LogReceived`] and [`Event::RunRequested`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{NodeData, NodeId, NodeType, PathId, Severity};

/// A classified payload from the event stream
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    RunStarted {
        repo: Option<String>,
    },
    PathCreated {
        path_id: PathId,
        parent_id: Option<PathId>,
        /// Take focus even when other paths already exist
        primary: bool,
    },
    PathSplit {
        parent_id: PathId,
        new_path_id: PathId,
    },
    NodeAdded {
        path_id: PathId,
        node_id: NodeId,
        node_type: NodeType,
        agent: Option<String>,
        action: Option<String>,
        /// Initial payload, usually empty
        data: NodeData,
        timestamp: DateTime<Utc>,
    },
    NodeUpdated {
        node_id: NodeId,
        data_patch: NodeData,
    },
    PathCompleted {
        path_id: PathId,
    },
    RunFinished,
    RunFailed {
        reason: String,
    },
}

impl DomainEvent {
    /// Short name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::RunStarted { .. } => "run_started",
            DomainEvent::PathCreated { .. } => "path_created",
            DomainEvent::PathSplit { .. } => "path_split",
            DomainEvent::NodeAdded { .. } => "node_added",
            DomainEvent::NodeUpdated { .. } => "node_updated",
            DomainEvent::PathCompleted { .. } => "path_completed",
            DomainEvent::RunFinished => "run_finished",
            DomainEvent::RunFailed { .. } => "run_failed",
        }
    }
}

/// Input to the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Raw payload recorded in the log buffer, classified or not
    LogReceived {
        content: Arc<str>,
        timestamp: DateTime<Utc>,
        severity: Severity,
    },
    /// User asked for a fresh run
    RunRequested {
        repo: String,
    },
    Domain(DomainEvent),
}

impl Event {
    /// Informational log line
    pub fn info(content: impl Into<Arc<str>>, timestamp: DateTime<Utc>) -> Self {
        Event::LogReceived {
            content: content.into(),
            timestamp,
            severity: Severity::Info,
        }
    }

    /// Timestamp carried by the event itself, if any
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Event::LogReceived { timestamp, .. } => Some(*timestamp),
            Event::Domain(DomainEvent::NodeAdded { timestamp, .. }) => Some(*timestamp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::LogReceived { .. } => "log_received",
            Event::RunRequested { .. } => "run_requested",
            Event::Domain(domain) => domain.name(),
        }
    }
}

impl From<DomainEvent> for Event {
    fn from(event: DomainEvent) -> Self {
        Event::Domain(event)
    }
}

/// Command sent to the agent backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Intent {
    StartInference { repo_name: String },
}

impl Intent {
    /// Wire representation of the command
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_inference_frame() {
        let intent = Intent::StartInference {
            repo_name: "golang/go".to_string(),
        };
        let frame: serde_json::Value = serde_json::from_str(&intent.to_frame().unwrap()).unwrap();
        assert_eq!(
            frame,
            serde_json::json!({"action": "start_inference", "repo_name": "golang/go"})
        );
    }

    #[test]
    fn test_event_timestamp() {
        let now = Utc::now();
        assert_eq!(Event::info("hello", now).timestamp(), Some(now));
        assert_eq!(
            Event::RunRequested {
                repo: "a/b".to_string()
            }
            .timestamp(),
            None
        );
        assert_eq!(Event::from(DomainEvent::RunFinished).timestamp(), None);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Event::from(DomainEvent::RunFinished).name(), "run_finished");
        assert_eq!(
            Event::from(DomainEvent::PathSplit {
                parent_id: "1".to_string(),
                new_path_id: "2".to_string()
            })
            .name(),
            "path_split"
        );
    }
}
