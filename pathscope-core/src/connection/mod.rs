//! Delivery adapter for the agent's event stream
//!
//! Keeps one logical connection to the agent backend, forwards every received
//! frame to the [`SnapshotStore`](crate::store::SnapshotStore) queue in arrival
//! order, and reconnects after a fixed delay whenever the connection drops.
//!
//! ## Connection states
//!
//! ```text
//!              Open                 Opened
//! Disconnected ─────► Connecting ─────────► Connected
//!      ▲  ▲               │                     │
//!      │  └────Closed─────┘                     │
//!      │                                        │
//!      └───────────────── Closed ───────────────┘
//!      Disconnected ── BackoffElapsed ──► Connecting
//! ```
//!
//! Transport and time are injected through the [`Transport`] and [`Clock`]
//! traits so reconnect behavior can be driven deterministically in tests.

mod adapter;
mod state;
mod transport;

pub use adapter::{AdapterHandle, DeliveryAdapter};
pub use state::{ConnectionState, Trigger};
pub use transport::{Clock, Link, SystemClock, Transport, WsTransport};
