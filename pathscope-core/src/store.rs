//! Snapshot store
//!
//! Holds the single current [`GraphSnapshot`] for a session and publishes
//! every new snapshot to observers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  StoreInput  ┌───────────────┐  Arc<GraphSnapshot>  ┌───────────┐
//! │ DeliveryAdapter  │ ───(FIFO)──► │ SnapshotStore │ ──────(watch)──────► │ observers │
//! │ CLI / StoreHandle│              │   + reducer   │                      │           │
//! └──────────────────┘              └───────────────┘                      └───────────┘
//! ```
//!
//! Dispatch takes `&mut self`, so exactly one event is reduced at a time, and
//! the resulting snapshot is published before the next input is accepted.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{Error, Result};
use crate::events::Event;
use crate::parser;
use crate::reducer::{self, Outcome};
use crate::types::GraphSnapshot;

/// Item queued for the store
#[derive(Debug)]
pub enum StoreInput {
    /// Raw text frame from the delivery channel
    Frame {
        text: String,
        received_at: DateTime<Utc>,
    },
    /// Already-built event (local notices, user intents)
    Event(Event),
    /// Event whose outcome the sender waits for
    Request {
        event: Event,
        reply: oneshot::Sender<Outcome>,
    },
}

/// Owner of the current snapshot
pub struct SnapshotStore {
    current: Arc<GraphSnapshot>,
    publisher: watch::Sender<Arc<GraphSnapshot>>,
}

impl SnapshotStore {
    /// Create a store holding an empty snapshot
    pub fn new() -> Self {
        let current = Arc::new(GraphSnapshot::new());
        let (publisher, _) = watch::channel(Arc::clone(&current));
        Self { current, publisher }
    }

    /// Create the bounded FIFO feeding [`SnapshotStore::run`]
    pub fn queue(capacity: usize) -> (StoreHandle, StoreInbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (StoreHandle { tx }, StoreInbox { rx })
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.current)
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<GraphSnapshot>> {
        self.publisher.subscribe()
    }

    /// Reduce one event and publish the result.
    pub fn dispatch(&mut self, event: Event) -> Outcome {
        let transition = reducer::apply(&self.current, &event);

        match &transition.outcome {
            Outcome::Applied => {}
            Outcome::Duplicate => {
                tracing::debug!(event = event.name(), "Duplicate event ignored");
            }
            Outcome::Flagged(note) => {
                tracing::info!(event = event.name(), note = %note, "Event applied with diagnostic");
            }
            Outcome::Rejected(rejection) => {
                tracing::warn!(event = event.name(), reason = %rejection, "Event rejected");
            }
        }

        self.current = Arc::new(transition.snapshot);
        self.publisher.send_replace(Arc::clone(&self.current));
        transition.outcome
    }

    /// Record a text frame and apply its classified event, if any.
    ///
    /// Returns the number of events dispatched (1 or 2).
    pub fn ingest(&mut self, frame: &str, received_at: DateTime<Utc>) -> usize {
        let events = parser::read_frame(frame, received_at).into_events();
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    /// Drain the queue in FIFO order until every [`StoreHandle`] is dropped.
    ///
    /// Returns the store so the final snapshot stays accessible.
    pub async fn run(mut self, mut inbox: StoreInbox) -> Self {
        tracing::debug!("Snapshot store running");

        while let Some(input) = inbox.rx.recv().await {
            match input {
                StoreInput::Frame { text, received_at } => {
                    self.ingest(&text, received_at);
                }
                StoreInput::Event(event) => {
                    self.dispatch(event);
                }
                StoreInput::Request { event, reply } => {
                    let outcome = self.dispatch(event);
                    // The requester may have given up waiting
                    let _ = reply.send(outcome);
                }
            }
        }

        tracing::debug!(
            logs = self.current.logs().len(),
            nodes = self.current.nodes().len(),
            "Snapshot store stopped"
        );
        self
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable sender into the store's queue
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreInput>,
}

impl StoreHandle {
    /// Queue a raw frame from the delivery channel
    pub async fn frame(&self, text: String, received_at: DateTime<Utc>) -> Result<()> {
        self.send(StoreInput::Frame { text, received_at }).await
    }

    /// Queue an event
    pub async fn dispatch(&self, event: Event) -> Result<()> {
        self.send(StoreInput::Event(event)).await
    }

    /// Queue an event and wait until it has been applied.
    ///
    /// Everything queued earlier is applied first, so the outcome reflects
    /// the graph exactly as the event found it.
    pub async fn request(&self, event: Event) -> Result<Outcome> {
        let (reply, outcome) = oneshot::channel();
        self.send(StoreInput::Request { event, reply }).await?;
        outcome.await.map_err(|_| Error::StoreClosed)
    }

    async fn send(&self, input: StoreInput) -> Result<()> {
        self.tx.send(input).await.map_err(|_| Error::StoreClosed)
    }
}

/// Receiving side of the store's queue
#[derive(Debug)]
pub struct StoreInbox {
    rx: mpsc::Receiver<StoreInput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DomainEvent;
    use crate::types::{RunStatus, Severity};

    #[test]
    fn test_dispatch_publishes_snapshot() {
        let mut store = SnapshotStore::new();
        let rx = store.subscribe();
        let before = store.snapshot();

        store.dispatch(Event::RunRequested {
            repo: "golang/go".to_string(),
        });

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().run_status(), RunStatus::Running);
        // Earlier snapshots are untouched
        assert_eq!(before.run_status(), RunStatus::Idle);
        assert_eq!(store.snapshot().run_status(), RunStatus::Running);
    }

    #[test]
    fn test_ingest_logs_every_frame() {
        let mut store = SnapshotStore::new();
        let now = Utc::now();

        assert_eq!(store.ingest(r#"{"event":"path_created","path_id":"1"}"#, now), 2);
        assert_eq!(store.ingest(r#"{"hello":"world"}"#, now), 1);
        assert_eq!(store.ingest("not json at all", now), 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.logs().len(), 3);
        assert_eq!(snapshot.paths().len(), 1);
        assert_eq!(&*snapshot.logs()[2].content, "not json at all");
    }

    #[test]
    fn test_rejection_surfaces_error_log() {
        let mut store = SnapshotStore::new();
        let outcome = store.dispatch(
            DomainEvent::PathCompleted {
                path_id: "nope".to_string(),
            }
            .into(),
        );
        assert!(matches!(outcome, Outcome::Rejected(_)));
        assert_eq!(store.snapshot().logs()[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_run_processes_queue_in_order() {
        let store = SnapshotStore::new();
        let (handle, inbox) = SnapshotStore::queue(8);
        let task = tokio::spawn(store.run(inbox));

        let now = Utc::now();
        handle
            .frame(r#"{"event":"path_created","path_id":"1"}"#.to_string(), now)
            .await
            .unwrap();
        handle
            .frame(
                r#"{"event":"node_added","path_id":"1","node_id":"a","node_type":"START"}"#
                    .to_string(),
                now,
            )
            .await
            .unwrap();
        handle.dispatch(Event::info("local notice", now)).await.unwrap();
        drop(handle);

        let store = task.await.unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.nodes().len(), 1);
        assert_eq!(snapshot.active_path_id(), Some("1"));
        assert_eq!(snapshot.logs().len(), 3);
        assert_eq!(&*snapshot.logs()[2].content, "local notice");
    }

    #[tokio::test]
    async fn test_handle_reports_closed_store() {
        let (handle, inbox) = SnapshotStore::queue(1);
        drop(inbox);
        let err = handle.dispatch(Event::info("x", Utc::now())).await.unwrap_err();
        assert!(matches!(err, Error::StoreClosed));
    }

    #[tokio::test]
    async fn test_request_reports_outcome_after_earlier_input() {
        let store = SnapshotStore::new();
        let (handle, inbox) = SnapshotStore::queue(8);
        let task = tokio::spawn(store.run(inbox));

        let now = Utc::now();
        handle
            .frame(
                r#"{"type":"status","status":"started","repo":"other/repo"}"#.to_string(),
                now,
            )
            .await
            .unwrap();
        let outcome = handle
            .request(Event::RunRequested {
                repo: "golang/go".to_string(),
            })
            .await
            .unwrap();
        // The queued status frame already put the run in progress
        assert_eq!(outcome, Outcome::Duplicate);
        drop(handle);

        let store = task.await.unwrap();
        assert_eq!(store.snapshot().repo(), Some("other/repo"));
    }

    #[tokio::test]
    async fn test_request_on_closed_store() {
        let (handle, inbox) = SnapshotStore::queue(1);
        drop(inbox);
        let err = handle
            .request(Event::info("x", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreClosed));
    }
}
