//! pathscope - live view of a multi-path reasoning agent
//!
//! This tool provides commands for:
//! - Checking configuration and the remembered repository
//! - Watching the agent's reasoning graph as it streams in
//! - Starting an inference run and following it to completion
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/pathscope/config.toml (~/.config/pathscope/config.toml)
//! - State: $XDG_STATE_HOME/pathscope/ (preferences and logs)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pathscope_core::config::ConnectionConfig;
use pathscope_core::preferences::resolve_repo;
use pathscope_core::{
    AdapterHandle, Config, ConnectionState, DeliveryAdapter, GraphSnapshot, Preferences,
    RunStatus, SnapshotStore,
};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Longest log line shown in a summary
const SUMMARY_LOG_CHARS: usize = 72;

#[derive(Parser)]
#[command(name = "pathscope")]
#[command(about = "Follow a multi-path reasoning agent as it works")]
#[command(version)]
struct Args {
    /// Write debug logs to the state directory
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration and the remembered repository
    Status,

    /// Print a summary line for every graph update until Ctrl-C
    Watch {
        /// Event source URL (default: from config)
        #[arg(long)]
        url: Option<String>,
    },

    /// Start an inference run and follow it until it finishes
    Run {
        /// Repository to analyze (default: last used, then config)
        #[arg(short, long)]
        repo: Option<String>,

        /// Event source URL (default: from config)
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let mut config = Config::load().context("failed to load configuration")?;

    // Keep the guard alive for the whole command
    let _log_guard = if args.verbose {
        Some(
            pathscope_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Watch { url } => {
            override_url(&mut config, url)?;
            cmd_watch(&config).await
        }
        Command::Run { repo, url } => {
            override_url(&mut config, url)?;
            cmd_run(&config, repo.as_deref()).await
        }
    }
}

fn override_url(config: &mut Config, url: Option<String>) -> Result<()> {
    if let Some(url) = url {
        config.connection.url = url;
        config
            .connection
            .validate()
            .context("invalid --url")?;
    }
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("pathscope Configuration");
    println!("=======================");
    println!();

    let config_path = Config::config_path();
    println!(
        "Config file:        {}{}",
        config_path.display(),
        if config_path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!("Event source:       {}", config.connection.url);
    println!(
        "Reconnect interval: {} ms",
        config.connection.reconnect_interval_ms
    );
    println!("Queue capacity:     {}", config.connection.queue_capacity);
    println!();

    println!("Default repository: {}", config.run.default_repo);
    match Preferences::load() {
        Ok(prefs) => println!(
            "Last repository:    {}",
            prefs.last_repo.as_deref().unwrap_or("<none>")
        ),
        Err(e) => println!("Last repository:    <unreadable: {}>", e),
    }
    println!();

    println!(
        "Log file:           {}",
        pathscope_core::logging::log_file_path().display()
    );

    Ok(())
}

async fn cmd_watch(config: &Config) -> Result<()> {
    let mut session = Session::start(&config.connection);
    println!("Watching {} (Ctrl-C to stop)", config.connection.url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = session.snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = Arc::clone(&session.snapshots.borrow_and_update());
                println!("{}", format_summary(&snapshot, session.handle.state()));
            }
        }
    }

    session.stop().await?;
    Ok(())
}

async fn cmd_run(config: &Config, repo: Option<&str>) -> Result<()> {
    let mut prefs = Preferences::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Ignoring unreadable preferences");
        Preferences::default()
    });
    let repo = resolve_repo(repo, &prefs, &config.run);

    let mut session = Session::start(&config.connection);
    println!("Connecting to {}...", config.connection.url);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            session.stop().await?;
            bail!("interrupted before the connection was established");
        }
        connected = session.handle.wait_connected() => {
            connected.context("delivery adapter stopped")?;
        }
    }

    if let Err(e) = session.handle.start_run(&repo).await {
        session.stop().await?;
        return Err(e).with_context(|| format!("failed to start run for {}", repo));
    }
    println!("Started inference for {}", repo);

    prefs.remember_repo(&repo);
    if let Err(e) = prefs.save() {
        tracing::warn!(error = %e, "Failed to save preferences");
        eprintln!("Warning: could not remember repository: {}", e);
    }

    // The store applied the request before start_run returned, so every
    // later snapshot belongs to this run
    session.snapshots.borrow_and_update();

    let final_snapshot = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                session.stop().await?;
                bail!("interrupted while the run was in progress");
            }
            changed = session.snapshots.changed() => {
                if changed.is_err() {
                    break None;
                }
                let snapshot = Arc::clone(&session.snapshots.borrow_and_update());
                println!("{}", format_summary(&snapshot, session.handle.state()));

                if snapshot.run_status().is_terminal() {
                    break Some(snapshot);
                }
            }
        }
    };

    session.stop().await?;

    let Some(snapshot) = final_snapshot else {
        bail!("snapshot store stopped before the run finished");
    };

    println!();
    print!("{}", render_tree(&snapshot));

    if snapshot.run_status() == RunStatus::Error {
        let reason = snapshot
            .errors()
            .last()
            .map(|entry| entry.content.to_string())
            .unwrap_or_else(|| "unknown failure".to_string());
        bail!("run for {} failed: {}", repo, reason);
    }

    Ok(())
}

/// Store and adapter tasks for one command
struct Session {
    snapshots: watch::Receiver<Arc<GraphSnapshot>>,
    handle: AdapterHandle,
    adapter: JoinHandle<pathscope_core::Result<()>>,
    store: JoinHandle<SnapshotStore>,
    shutdown: oneshot::Sender<()>,
}

impl Session {
    fn start(config: &ConnectionConfig) -> Self {
        let store = SnapshotStore::new();
        let snapshots = store.subscribe();
        let (store_handle, inbox) = SnapshotStore::queue(config.queue_capacity);
        let store = tokio::spawn(store.run(inbox));

        let (adapter, handle) = DeliveryAdapter::new(config, store_handle);
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let adapter = tokio::spawn(adapter.run(async {
            let _ = shutdown_rx.await;
        }));

        Self {
            snapshots,
            handle,
            adapter,
            store,
            shutdown,
        }
    }

    async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.adapter
            .await
            .context("delivery adapter panicked")?
            .context("delivery adapter failed")?;

        drop(self.handle);
        self.store.await.context("snapshot store panicked")?;
        Ok(())
    }
}

// ============================================
// Rendering
// ============================================

/// One-line view of a snapshot
fn format_summary(snapshot: &GraphSnapshot, connection: ConnectionState) -> String {
    let mut line = format!(
        "[{}] {} paths={} nodes={} active={}",
        connection,
        snapshot.run_status(),
        snapshot.paths().len(),
        snapshot.nodes().len(),
        snapshot.active_path_id().unwrap_or("-"),
    );

    if let Some(repo) = snapshot.repo() {
        line.push_str(&format!(" repo={}", repo));
    }
    if let Some(entry) = snapshot.latest_log() {
        line.push_str(&format!(
            " | {} {}",
            entry.severity,
            truncate(&entry.content, SUMMARY_LOG_CHARS)
        ));
    }

    line
}

/// Path hierarchy with each path's nodes, children indented under parents
fn render_tree(snapshot: &GraphSnapshot) -> String {
    let mut out = format!(
        "Run {} ({})\n",
        snapshot.repo().unwrap_or("<unknown repo>"),
        snapshot.run_status()
    );
    for root in snapshot.root_paths() {
        render_path(snapshot, &root.id, 1, &mut out);
    }
    out
}

fn render_path(snapshot: &GraphSnapshot, path_id: &str, depth: usize, out: &mut String) {
    let Some(path) = snapshot.path(path_id) else {
        return;
    };
    let indent = "  ".repeat(depth);
    let focus = if snapshot.active_path_id() == Some(path_id) {
        " *"
    } else {
        ""
    };
    out.push_str(&format!(
        "{}path {} [{}]{}\n",
        indent,
        path.id,
        path.status.as_str(),
        focus
    ));

    for node in snapshot.nodes_for_path(path_id) {
        let label = match (&node.agent, &node.action) {
            (Some(agent), Some(action)) => format!(" {}/{}", agent, action),
            (Some(agent), None) => format!(" {}", agent),
            (None, Some(action)) => format!(" {}", action),
            (None, None) => String::new(),
        };
        out.push_str(&format!(
            "{}  - {} {}{} ({})\n",
            indent,
            node.node_type,
            node.id,
            label,
            node.status.as_str()
        ));
    }

    for child in snapshot.children_of(path_id) {
        render_path(snapshot, &child.id, depth + 1, out);
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use pathscope_core::{reduce, DomainEvent, Event, NodeType};

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn sample() -> GraphSnapshot {
        let events: Vec<Event> = vec![
            Event::RunRequested {
                repo: "golang/go".to_string(),
            },
            DomainEvent::PathCreated {
                path_id: "1".to_string(),
                parent_id: None,
                primary: true,
            }
            .into(),
            DomainEvent::NodeAdded {
                path_id: "1".to_string(),
                node_id: "a".to_string(),
                node_type: NodeType::Start,
                agent: Some("planner".to_string()),
                action: Some("plan".to_string()),
                data: Default::default(),
                timestamp: ts(1),
            }
            .into(),
            DomainEvent::PathSplit {
                parent_id: "1".to_string(),
                new_path_id: "2".to_string(),
            }
            .into(),
            DomainEvent::NodeAdded {
                path_id: "2".to_string(),
                node_id: "b".to_string(),
                node_type: NodeType::SplitStart,
                agent: None,
                action: None,
                data: Default::default(),
                timestamp: ts(2),
            }
            .into(),
            Event::info("analysis of commit history is under way", ts(3)),
        ];

        events
            .iter()
            .fold(GraphSnapshot::new(), |snapshot, event| reduce(&snapshot, event))
    }

    #[test]
    fn test_format_summary() {
        let line = format_summary(&sample(), ConnectionState::Connected);
        assert_eq!(
            line,
            "[connected] RUNNING paths=2 nodes=2 active=2 repo=golang/go \
             | INFO analysis of commit history is under way"
        );

        let empty = format_summary(&GraphSnapshot::new(), ConnectionState::Disconnected);
        assert_eq!(empty, "[disconnected] IDLE paths=0 nodes=0 active=-");
    }

    #[test]
    fn test_render_tree_nests_split_paths() {
        let tree = render_tree(&sample());
        let lines: Vec<&str> = tree.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Run golang/go (RUNNING)",
                "  path 1 [active]",
                "    - START a planner/plan (pending)",
                "    path 2 [active] *",
                "      - SPLIT_START b (pending)",
            ]
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        // Multi-byte characters are never split
        assert_eq!(truncate("ééééééééé", 5), "éé...");
    }
}
