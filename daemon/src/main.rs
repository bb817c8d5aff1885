//! hotkeyd: background daemon binding global hotkeys to tasks
//!
//! Reads a JSON task file and binds each entry to a global hotkey:
//! - hotkeytasks: launch a command line
//! - hotkeyhidetasks: show or hide a process's window
//! - hotkeykilltasks: kill a process by image name
//!
//! Runs until SIGTERM/SIGINT (Ctrl-C on Windows), then releases every
//! registration before exiting.

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hotkeyd::config::{Config, TaskFile};
use hotkeyd::events::ListenerEvent;
use hotkeyd::hotkey::{Chord, HotkeyHandler};
use hotkeyd::lifecycle::ShutdownSignal;
use hotkeyd::platform;
use hotkeyd::tasks::callback_for;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "hotkeyd starting");

    // Load configuration
    let config = Config::load()?;
    info!(?config.tasks_path, guard = %config.guard_name, "configuration loaded");

    let tasks = TaskFile::load(&config.tasks_path)?;
    let bindings = tasks.bindings()?;
    if bindings.is_empty() {
        warn!("task file defines no hotkeys");
    }

    let platform = platform::native().context("no native hotkey backend on this host")?;
    let handler = HotkeyHandler::new(platform)
        .with_guard_name(config.guard_name.clone())
        .with_grace_period(config.grace_period)
        .with_debug(config.debug);

    for binding in &bindings {
        let index = handler.insert(
            binding.modifiers,
            binding.key,
            callback_for(binding.kind),
            binding.param.clone(),
        );
        info!(
            index,
            chord = %Chord::new(binding.modifiers, binding.key),
            kind = ?binding.kind,
            param = %binding.param,
            "hotkey bound"
        );
    }

    let mut events = handler.subscribe();

    // Start blocks until every hotkey is registered
    let mut handler = tokio::task::spawn_blocking(move || {
        let mut handler = handler;
        handler.start(None).map(|()| handler)
    })
    .await?
    .map_err(|e| {
        error!(status = %e.status(), error = %e, "failed to start hotkey listener");
        e
    })?;

    let shutdown = ShutdownSignal::new();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Log listener activity until it stops on its own
        _ = async {
            loop {
                match events.recv().await {
                    Ok(ListenerEvent::Stopped) => {
                        warn!("hotkey listener stopped unexpectedly");
                        break;
                    }
                    Ok(event) => info!(%event, "listener event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "listener event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("listener event stream ended");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to listen for shutdown signals"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    let outcome = tokio::task::spawn_blocking(move || handler.stop()).await??;
    info!(?outcome, "hotkeyd stopped");

    Ok(())
}
