//! Core domain types for pathscope
//!
//! These types describe the execution graph reconstructed from a reasoning
//! agent's event stream.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Path** | One branch of concurrent agent reasoning, a sequence of Nodes |
//! | **Split** | Creation of a new Path whose parent is an existing Path |
//! | **Node** | One discrete agent action within a Path (query, response, status change) |
//! | **Snapshot** | The complete, immutable state of all paths/nodes/logs at one point in time |
//!
//! Paths form a forest through `parent_id`. A parent must already exist when a
//! child is created, so the forest can never contain a cycle or a forward
//! reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Identifier of a [`ReasoningPath`], unique within a session
pub type PathId = String;

/// Identifier of a [`Node`], unique within a session
pub type NodeId = String;

/// Key→value payload carried by a node (query text, parsed response, ...)
pub type NodeData = Map<String, Value>;

/// Key whose presence in a node update marks the node as completed
pub const TERMINAL_DATA_KEY: &str = "response";

// ============================================
// Log Entries
// ============================================

/// Severity of a [`LogEntry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of the session log buffer.
///
/// Created for every inbound payload (classified or not) and for every
/// diagnostic the reducer emits. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Session-scoped sequence number, starting at 1
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub content: Arc<str>,
    pub severity: Severity,
}

// ============================================
// Paths
// ============================================

/// Lifecycle of a path. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Active,
    Completed,
}

impl PathStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathStatus::Active => "active",
            PathStatus::Completed => "completed",
        }
    }
}

/// One branch of concurrent reasoning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPath {
    pub id: PathId,
    /// Path this one split from; always created before this path
    pub parent_id: Option<PathId>,
    pub status: PathStatus,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Nodes
// ============================================

/// Kind of agent action a node represents.
///
/// Tags outside the well-known set are preserved verbatim in [`NodeType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Start,
    SplitStart,
    Step,
    End,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Start => "START",
            NodeType::SplitStart => "SPLIT_START",
            NodeType::Step => "STEP",
            NodeType::End => "END",
            NodeType::Other(tag) => tag,
        }
    }
}

impl From<&str> for NodeType {
    fn from(tag: &str) -> Self {
        let normalized = tag.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "START" => NodeType::Start,
            "SPLIT_START" => NodeType::SplitStart,
            "STEP" => NodeType::Step,
            "END" => NodeType::End,
            _ => NodeType::Other(normalized),
        }
    }
}

impl From<String> for NodeType {
    fn from(tag: String) -> Self {
        NodeType::from(tag.as_str())
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        node_type.as_str().to_string()
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Completed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Completed => "completed",
        }
    }
}

/// One agent action within a path.
///
/// `data` (and `status`, when the update carries [`TERMINAL_DATA_KEY`]) is the
/// only state that changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub path_id: PathId,
    pub node_type: NodeType,
    pub agent: Option<String>,
    pub action: Option<String>,
    pub data: NodeData,
    pub status: NodeStatus,
    pub timestamp: DateTime<Utc>,
}

// ============================================
// Run Status
// ============================================

/// Lifecycle of the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Done,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "IDLE",
            RunStatus::Running => "RUNNING",
            RunStatus::Done => "DONE",
            RunStatus::Error => "ERROR",
        }
    }

    /// Whether a run has reached an end state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Error)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Snapshot
// ============================================

/// Complete, immutable graph state at one point in processing time.
///
/// Collections are shared behind [`Arc`]; cloning a snapshot is cheap and the
/// reducer copies a collection only when it has to change it. Snapshots can
/// only be produced by [`reduce`](crate::reducer::reduce), so every observable
/// snapshot satisfies [`GraphSnapshot::check_invariants`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphSnapshot {
    /// Paths in creation order
    pub(crate) paths: Arc<Vec<ReasoningPath>>,
    /// Nodes in arrival order
    pub(crate) nodes: Arc<Vec<Node>>,
    pub(crate) logs: Arc<Vec<LogEntry>>,
    pub(crate) active_path_id: Option<PathId>,
    pub(crate) run_status: RunStatus,
    /// Repository of the current run (informational)
    pub(crate) repo: Option<String>,
}

impl GraphSnapshot {
    /// Empty snapshot for a fresh session
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> &[ReasoningPath] {
        &self.paths
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn active_path_id(&self) -> Option<&str> {
        self.active_path_id.as_deref()
    }

    pub fn run_status(&self) -> RunStatus {
        self.run_status
    }

    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    /// Look up a path by id
    pub fn path(&self, id: &str) -> Option<&ReasoningPath> {
        self.paths.iter().find(|p| p.id == id)
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes owned by a path, in arrival order
    pub fn nodes_for_path<'a>(&'a self, path_id: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |n| n.path_id == path_id)
    }

    /// Paths that split directly from `path_id`
    pub fn children_of<'a>(
        &'a self,
        path_id: &'a str,
    ) -> impl Iterator<Item = &'a ReasoningPath> + 'a {
        self.paths
            .iter()
            .filter(move |p| p.parent_id.as_deref() == Some(path_id))
    }

    /// Paths without a parent
    pub fn root_paths(&self) -> impl Iterator<Item = &ReasoningPath> {
        self.paths.iter().filter(|p| p.parent_id.is_none())
    }

    /// Log entries with [`Severity::Error`]
    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter().filter(|l| l.severity == Severity::Error)
    }

    /// Most recent log entry
    pub fn latest_log(&self) -> Option<&LogEntry> {
        self.logs.last()
    }

    /// Returns a description of every violated structural invariant.
    ///
    /// Checked:
    /// - path and node ids are unique
    /// - every node references an existing path
    /// - every parent was created before its child
    /// - the active path exists
    /// - log ids are 1..=n in order
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for (index, path) in self.paths.iter().enumerate() {
            if self.paths[..index].iter().any(|p| p.id == path.id) {
                violations.push(format!("duplicate path id {}", path.id));
            }
            if let Some(parent) = &path.parent_id {
                if !self.paths[..index].iter().any(|p| &p.id == parent) {
                    violations.push(format!(
                        "path {} references parent {} that was not created before it",
                        path.id, parent
                    ));
                }
            }
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if self.nodes[..index].iter().any(|n| n.id == node.id) {
                violations.push(format!("duplicate node id {}", node.id));
            }
            if self.path(&node.path_id).is_none() {
                violations.push(format!(
                    "node {} references missing path {}",
                    node.id, node.path_id
                ));
            }
        }

        if let Some(active) = &self.active_path_id {
            if self.path(active).is_none() {
                violations.push(format!("active path {} does not exist", active));
            }
        }

        for (index, entry) in self.logs.iter().enumerate() {
            if entry.id != index as u64 + 1 {
                violations.push(format!(
                    "log entry at position {} has id {}",
                    index + 1,
                    entry.id
                ));
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_normalizes_tags() {
        assert_eq!(NodeType::from("start"), NodeType::Start);
        assert_eq!(NodeType::from(" split_start "), NodeType::SplitStart);
        assert_eq!(NodeType::from("STEP"), NodeType::Step);
        assert_eq!(
            NodeType::from("aggregate"),
            NodeType::Other("AGGREGATE".to_string())
        );
        assert_eq!(NodeType::Other("AGGREGATE".to_string()).as_str(), "AGGREGATE");
    }

    #[test]
    fn test_node_type_serializes_as_tag() {
        let json = serde_json::to_string(&NodeType::SplitStart).unwrap();
        assert_eq!(json, "\"SPLIT_START\"");
        let parsed: NodeType = serde_json::from_str("\"end\"").unwrap();
        assert_eq!(parsed, NodeType::End);
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(!RunStatus::Idle.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Done.is_terminal());
        assert!(RunStatus::Error.is_terminal());
        assert_eq!(RunStatus::default(), RunStatus::Idle);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = GraphSnapshot::new();
        assert!(snapshot.paths().is_empty());
        assert!(snapshot.nodes().is_empty());
        assert!(snapshot.logs().is_empty());
        assert_eq!(snapshot.active_path_id(), None);
        assert_eq!(snapshot.run_status(), RunStatus::Idle);
        assert!(snapshot.check_invariants().is_empty());
    }

    #[test]
    fn test_check_invariants_reports_dangling_references() {
        let now = Utc::now();
        let snapshot = GraphSnapshot {
            paths: Arc::new(vec![ReasoningPath {
                id: "2".to_string(),
                parent_id: Some("1".to_string()),
                status: PathStatus::Active,
                created_at: now,
            }]),
            nodes: Arc::new(vec![Node {
                id: "x".to_string(),
                path_id: "99".to_string(),
                node_type: NodeType::Step,
                agent: None,
                action: None,
                data: NodeData::new(),
                status: NodeStatus::Pending,
                timestamp: now,
            }]),
            active_path_id: Some("7".to_string()),
            ..Default::default()
        };

        let violations = snapshot.check_invariants();
        assert_eq!(violations.len(), 3);
        assert!(violations[0].contains("parent 1"));
        assert!(violations[1].contains("missing path 99"));
        assert!(violations[2].contains("active path 7"));
    }
}
