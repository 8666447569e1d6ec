//! # pathscope-core
//!
//! Core library for pathscope - a live view of a multi-path reasoning agent.
//!
//! This library provides:
//! - Domain types for reasoning paths, nodes, and the session log
//! - A parser that turns raw agent frames into typed events
//! - A pure reducer folding events into immutable graph snapshots
//! - A snapshot store and a reconnecting delivery adapter
//! - Configuration, preferences, and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows in one direction:
//! - **Delivery:** [`DeliveryAdapter`] receives text frames and queues them
//! - **Interpretation:** [`parser`] records every frame as a log entry and
//!   classifies recognized ones as [`DomainEvent`]s
//! - **State:** [`SnapshotStore`] applies [`reduce`] one event at a time and
//!   publishes each new [`GraphSnapshot`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use pathscope_core::{Config, DeliveryAdapter, SnapshotStore};
//!
//! # async fn demo() -> pathscope_core::Result<()> {
//! let config = Config::load()?;
//!
//! let store = SnapshotStore::new();
//! let mut snapshots = store.subscribe();
//! let (store_handle, inbox) = SnapshotStore::queue(config.connection.queue_capacity);
//! tokio::spawn(store.run(inbox));
//!
//! let (adapter, handle) = DeliveryAdapter::new(&config.connection, store_handle);
//! tokio::spawn(adapter.run(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }));
//!
//! handle.wait_connected().await?;
//! handle.start_run("golang/go").await?;
//!
//! while snapshots.changed().await.is_ok() {
//!     let snapshot = snapshots.borrow_and_update().clone();
//!     println!("{} paths, {} nodes", snapshot.paths().len(), snapshot.nodes().len());
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use connection::{AdapterHandle, ConnectionState, DeliveryAdapter};
pub use error::{Error, Result};
pub use events::{DomainEvent, Event, Intent};
pub use preferences::Preferences;
pub use reducer::{apply, reduce, Outcome};
pub use store::{SnapshotStore, StoreHandle};
pub use types::*;

// Public modules
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod logging;
pub mod parser;
pub mod preferences;
pub mod reducer;
pub mod store;
pub mod types;
