//! Connect/receive/reconnect loop and the handle used to issue commands

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use super::state::{ConnectionState, Trigger};
use super::transport::{Clock, Link, SystemClock, Transport, WsTransport};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::events::{Event, Intent};
use crate::reducer::Outcome;
use crate::store::StoreHandle;

/// Outbound commands waiting for the link
const COMMAND_QUEUE: usize = 16;

/// Why a connection ended
enum Disconnect {
    /// Transport-level loss; retried after the backoff
    Lost(String),
    /// Nobody is consuming events any more
    StoreClosed,
}

/// Owns the connection to the event source.
///
/// Construct with [`DeliveryAdapter::new`], keep the returned
/// [`AdapterHandle`] for issuing commands, and drive the loop with
/// [`DeliveryAdapter::run`].
pub struct DeliveryAdapter {
    url: String,
    reconnect_interval: Duration,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    store: StoreHandle,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::Receiver<String>,
}

impl DeliveryAdapter {
    /// Adapter over the WebSocket transport and the system clock
    pub fn new(config: &ConnectionConfig, store: StoreHandle) -> (Self, AdapterHandle) {
        Self::with_parts(
            config,
            store,
            Arc::new(WsTransport),
            Arc::new(SystemClock),
        )
    }

    /// Adapter with an explicit transport and clock
    pub fn with_parts(
        config: &ConnectionConfig,
        store: StoreHandle,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> (Self, AdapterHandle) {
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE);

        let handle = AdapterHandle {
            state: state_rx,
            commands: command_tx,
            store: store.clone(),
        };

        let adapter = Self {
            url: config.url.clone(),
            reconnect_interval: config.reconnect_interval(),
            transport,
            clock,
            store,
            state,
            commands,
        };

        (adapter, handle)
    }

    /// Connect, forward frames, and reconnect forever.
    ///
    /// Returns `Ok(())` once `shutdown` resolves, or
    /// [`Error::StoreClosed`] if the store stops accepting input.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.transition(Trigger::Open);

        let result = loop {
            let disconnect = tokio::select! {
                _ = &mut shutdown => break Ok(()),
                disconnect = self.session() => disconnect,
            };

            self.transition(Trigger::Closed);
            if self.drop_pending_commands().await.is_err() {
                break Err(Error::StoreClosed);
            }

            let reason = match disconnect {
                Disconnect::Lost(reason) => reason,
                Disconnect::StoreClosed => break Err(Error::StoreClosed),
            };

            tracing::warn!(
                url = %self.url,
                reason = %reason,
                retry_ms = self.reconnect_interval.as_millis() as u64,
                "Connection lost, waiting to reconnect"
            );
            let notice = format!(
                "connection lost: {}; retrying in {} ms",
                reason,
                self.reconnect_interval.as_millis()
            );
            if self.notice(notice).await.is_err() {
                break Err(Error::StoreClosed);
            }

            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                _ = self.clock.sleep(self.reconnect_interval) => {}
            }
            self.transition(Trigger::BackoffElapsed);
        };

        self.state.send_replace(ConnectionState::Disconnected);
        tracing::info!(url = %self.url, "Delivery adapter stopped");
        result
    }

    /// One connect attempt and, if it succeeds, the receive loop.
    async fn session(&mut self) -> Disconnect {
        let mut link = match self.transport.connect(&self.url).await {
            Ok(link) => link,
            Err(e) => return Disconnect::Lost(e.to_string()),
        };

        self.transition(Trigger::Opened);
        tracing::info!(url = %self.url, "Connected to event source");
        if self.notice(format!("connected to {}", self.url)).await.is_err() {
            return Disconnect::StoreClosed;
        }

        self.pump(link.as_mut()).await
    }

    async fn pump(&mut self, link: &mut dyn Link) -> Disconnect {
        loop {
            tokio::select! {
                frame = link.recv() => match frame {
                    Some(Ok(text)) => {
                        let received_at = self.clock.now();
                        if self.store.frame(text, received_at).await.is_err() {
                            return Disconnect::StoreClosed;
                        }
                    }
                    Some(Err(e)) => return Disconnect::Lost(e.to_string()),
                    None => return Disconnect::Lost("closed by peer".to_string()),
                },
                Some(command) = self.commands.recv() => {
                    if let Err(e) = link.send(command).await {
                        return Disconnect::Lost(e.to_string());
                    }
                }
            }
        }
    }

    /// Commands accepted just before the link dropped are not replayed on
    /// the next connection.
    async fn drop_pending_commands(&mut self) -> Result<()> {
        while let Ok(command) = self.commands.try_recv() {
            tracing::warn!(command = %command, "Dropping command queued before disconnect");
            self.notice(format!("command not delivered (connection lost): {}", command))
                .await?;
        }
        Ok(())
    }

    /// Informational log line in the session log
    async fn notice(&self, content: String) -> Result<()> {
        self.store
            .dispatch(Event::info(content, self.clock.now()))
            .await
    }

    fn transition(&self, trigger: Trigger) {
        let current = *self.state.borrow();
        match current.on(trigger) {
            Some(next) => {
                tracing::info!(from = %current, to = %next, ?trigger, "Connection state changed");
                self.state.send_replace(next);
            }
            None => {
                tracing::warn!(state = %current, ?trigger, "Ignored invalid connection trigger");
            }
        }
    }
}

/// Cloneable handle for issuing commands and observing the connection
#[derive(Debug, Clone)]
pub struct AdapterHandle {
    state: watch::Receiver<ConnectionState>,
    commands: mpsc::Sender<String>,
    store: StoreHandle,
}

impl AdapterHandle {
    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver that observes connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the adapter reports [`ConnectionState::Connected`].
    ///
    /// Fails with [`Error::Transport`] if the adapter has stopped.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| s.is_connected())
            .await
            .map(|_| ())
            .map_err(|_| Error::Transport("delivery adapter stopped".to_string()))
    }

    /// Send a command to the agent.
    ///
    /// Fails immediately with [`Error::NotConnected`] unless a connection is
    /// open; nothing is queued in that case.
    pub fn send(&self, intent: &Intent) -> Result<()> {
        if !self.is_connected() {
            tracing::warn!(?intent, "Command rejected: not connected");
            return Err(Error::NotConnected);
        }

        let frame = intent.to_frame()?;
        self.commands.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::Transport("command queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => Error::NotConnected,
        })
    }

    /// Reset the session graph for a new run and ask the agent to start it.
    ///
    /// Fails with [`Error::RunInProgress`], sending nothing, while the graph
    /// still belongs to a running run.
    pub async fn start_run(&self, repo: &str) -> Result<()> {
        if !self.is_connected() {
            tracing::warn!(repo = %repo, "Start run rejected: not connected");
            return Err(Error::NotConnected);
        }

        let outcome = self
            .store
            .request(Event::RunRequested {
                repo: repo.to_string(),
            })
            .await?;
        if outcome == Outcome::Duplicate {
            tracing::warn!(repo = %repo, "Start run rejected: a run is already in progress");
            return Err(Error::RunInProgress);
        }

        self.send(&Intent::StartInference {
            repo_name: repo.to_string(),
        })
    }
}
