//! Graph state reducer
//!
//! [`reduce`] folds one [`Event`] into a [`GraphSnapshot`] and returns the next
//! snapshot. It is total and pure: every event yields a defined snapshot, the
//! input snapshot is never modified, and nothing here performs I/O.
//!
//! ## Transition outcomes
//!
//! - **Applied**: the graph changed as requested.
//! - **Duplicate**: idempotent no-op for re-delivered creation events.
//! - **Flagged**: applied, plus an informational diagnostic log line.
//! - **Rejected**: an id referenced a path or node that does not exist. The
//!   graph is left untouched and one ERROR log line is appended.
//!
//! ## Focus
//!
//! `active_path_id` follows the most recent `NodeAdded`, even when that moves
//! focus to a different path. The first path created (or one marked primary)
//! also takes focus.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::events::{DomainEvent, Event};
use crate::types::{
    GraphSnapshot, LogEntry, Node, NodeData, NodeStatus, NodeType, PathStatus, ReasoningPath,
    RunStatus, Severity, TERMINAL_DATA_KEY,
};

/// Why a transition was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnknownParentPath { path_id: String, parent_id: String },
    UnknownPath { event: &'static str, path_id: String },
    UnknownNode { node_id: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::UnknownParentPath { path_id, parent_id } => write!(
                f,
                "rejected path {}: parent path {} does not exist",
                path_id, parent_id
            ),
            Rejection::UnknownPath { event, path_id } => {
                write!(f, "rejected {}: path {} does not exist", event, path_id)
            }
            Rejection::UnknownNode { node_id } => {
                write!(f, "rejected node_updated: node {} does not exist", node_id)
            }
        }
    }
}

/// What happened when an event was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Duplicate,
    Flagged(String),
    Rejected(Rejection),
}

/// Result of [`apply`]
#[derive(Debug, Clone)]
pub struct Transition {
    pub snapshot: GraphSnapshot,
    pub outcome: Outcome,
}

/// Compute the snapshot that follows `snapshot` after `event`.
pub fn reduce(snapshot: &GraphSnapshot, event: &Event) -> GraphSnapshot {
    apply(snapshot, event).snapshot
}

/// Like [`reduce`], also reporting how the event was handled.
pub fn apply(snapshot: &GraphSnapshot, event: &Event) -> Transition {
    let at = event_time(snapshot, event);
    let mut next = snapshot.clone();

    let outcome = match event {
        Event::LogReceived {
            content,
            timestamp,
            severity,
        } => {
            push_log(&mut next, *timestamp, Arc::clone(content), *severity);
            Outcome::Applied
        }
        Event::RunRequested { repo } => request_run(&mut next, repo),
        Event::Domain(domain) => apply_domain(&mut next, domain, at),
    };

    match outcome {
        Outcome::Rejected(rejection) => {
            // Start over from the untouched input so nothing but the
            // diagnostic can leak into the result.
            let mut rejected = snapshot.clone();
            push_log(
                &mut rejected,
                at,
                Arc::from(rejection.to_string()),
                Severity::Error,
            );
            Transition {
                snapshot: rejected,
                outcome: Outcome::Rejected(rejection),
            }
        }
        Outcome::Flagged(note) => {
            push_log(&mut next, at, Arc::from(note.as_str()), Severity::Info);
            Transition {
                snapshot: next,
                outcome: Outcome::Flagged(note),
            }
        }
        outcome => Transition {
            snapshot: next,
            outcome,
        },
    }
}

/// Time attributed to diagnostics and new paths.
///
/// Falls back to the newest log entry (the frame's own log line is dispatched
/// just before its domain event), then to the Unix epoch.
fn event_time(snapshot: &GraphSnapshot, event: &Event) -> DateTime<Utc> {
    event
        .timestamp()
        .or_else(|| snapshot.latest_log().map(|entry| entry.timestamp))
        .unwrap_or_default()
}

fn push_log(snapshot: &mut GraphSnapshot, timestamp: DateTime<Utc>, content: Arc<str>, severity: Severity) {
    let logs = Arc::make_mut(&mut snapshot.logs);
    let id = logs.len() as u64 + 1;
    logs.push(LogEntry {
        id,
        timestamp,
        content,
        severity,
    });
}

fn request_run(snapshot: &mut GraphSnapshot, repo: &str) -> Outcome {
    if snapshot.run_status == RunStatus::Running {
        return Outcome::Duplicate;
    }

    snapshot.run_status = RunStatus::Running;
    snapshot.paths = Arc::new(Vec::new());
    snapshot.nodes = Arc::new(Vec::new());
    snapshot.active_path_id = None;
    snapshot.repo = Some(repo.to_string());
    Outcome::Applied
}

fn apply_domain(snapshot: &mut GraphSnapshot, event: &DomainEvent, at: DateTime<Utc>) -> Outcome {
    match event {
        DomainEvent::RunStarted { repo } => {
            snapshot.run_status = RunStatus::Running;
            if let Some(repo) = repo {
                snapshot.repo = Some(repo.clone());
            }
            Outcome::Applied
        }
        DomainEvent::PathCreated {
            path_id,
            parent_id,
            primary,
        } => create_path(snapshot, path_id, parent_id.as_deref(), *primary, at),
        DomainEvent::PathSplit {
            parent_id,
            new_path_id,
        } => create_path(snapshot, new_path_id, Some(parent_id), false, at),
        DomainEvent::NodeAdded {
            path_id,
            node_id,
            node_type,
            agent,
            action,
            data,
            timestamp,
        } => add_node(
            snapshot,
            NewNode {
                path_id,
                node_id,
                node_type,
                agent,
                action,
                data,
                timestamp: *timestamp,
            },
        ),
        DomainEvent::NodeUpdated {
            node_id,
            data_patch,
        } => update_node(snapshot, node_id, data_patch),
        DomainEvent::PathCompleted { path_id } => complete_path(snapshot, path_id),
        DomainEvent::RunFinished => {
            snapshot.run_status = RunStatus::Done;
            Outcome::Applied
        }
        DomainEvent::RunFailed { reason } => {
            snapshot.run_status = RunStatus::Error;
            push_log(
                snapshot,
                at,
                Arc::from(format!("run failed: {}", reason)),
                Severity::Error,
            );
            Outcome::Applied
        }
    }
}

fn create_path(
    snapshot: &mut GraphSnapshot,
    path_id: &str,
    parent_id: Option<&str>,
    primary: bool,
    at: DateTime<Utc>,
) -> Outcome {
    if snapshot.path(path_id).is_some() {
        return Outcome::Duplicate;
    }

    if let Some(parent_id) = parent_id {
        if snapshot.path(parent_id).is_none() {
            return Outcome::Rejected(Rejection::UnknownParentPath {
                path_id: path_id.to_string(),
                parent_id: parent_id.to_string(),
            });
        }
    }

    let is_first = snapshot.paths.is_empty();
    Arc::make_mut(&mut snapshot.paths).push(ReasoningPath {
        id: path_id.to_string(),
        parent_id: parent_id.map(str::to_string),
        status: PathStatus::Active,
        created_at: at,
    });

    if is_first || primary {
        snapshot.active_path_id = Some(path_id.to_string());
    }

    Outcome::Applied
}

struct NewNode<'a> {
    path_id: &'a str,
    node_id: &'a str,
    node_type: &'a NodeType,
    agent: &'a Option<String>,
    action: &'a Option<String>,
    data: &'a NodeData,
    timestamp: DateTime<Utc>,
}

fn add_node(snapshot: &mut GraphSnapshot, new: NewNode<'_>) -> Outcome {
    let Some(path) = snapshot.path(new.path_id) else {
        return Outcome::Rejected(Rejection::UnknownPath {
            event: "node_added",
            path_id: new.path_id.to_string(),
        });
    };
    let path_completed = path.status == PathStatus::Completed;

    if snapshot.node(new.node_id).is_some() {
        return Outcome::Duplicate;
    }

    Arc::make_mut(&mut snapshot.nodes).push(Node {
        id: new.node_id.to_string(),
        path_id: new.path_id.to_string(),
        node_type: new.node_type.clone(),
        agent: new.agent.clone(),
        action: new.action.clone(),
        data: new.data.clone(),
        status: NodeStatus::Pending,
        timestamp: new.timestamp,
    });
    snapshot.active_path_id = Some(new.path_id.to_string());

    if path_completed {
        Outcome::Flagged(format!(
            "node {} added to completed path {}",
            new.node_id, new.path_id
        ))
    } else {
        Outcome::Applied
    }
}

fn update_node(snapshot: &mut GraphSnapshot, node_id: &str, patch: &NodeData) -> Outcome {
    let Some(index) = snapshot.nodes.iter().position(|n| n.id == node_id) else {
        return Outcome::Rejected(Rejection::UnknownNode {
            node_id: node_id.to_string(),
        });
    };

    let node = &mut Arc::make_mut(&mut snapshot.nodes)[index];
    for (key, value) in patch {
        node.data.insert(key.clone(), value.clone());
    }
    if patch.contains_key(TERMINAL_DATA_KEY) {
        node.status = NodeStatus::Completed;
    }

    Outcome::Applied
}

fn complete_path(snapshot: &mut GraphSnapshot, path_id: &str) -> Outcome {
    let Some(index) = snapshot.paths.iter().position(|p| p.id == path_id) else {
        return Outcome::Rejected(Rejection::UnknownPath {
            event: "path_completed",
            path_id: path_id.to_string(),
        });
    };

    if snapshot.paths[index].status == PathStatus::Completed {
        return Outcome::Duplicate;
    }

    Arc::make_mut(&mut snapshot.paths)[index].status = PathStatus::Completed;
    Outcome::Applied
}
