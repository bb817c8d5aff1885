//! Signal handling for graceful shutdown

use tracing::debug;

/// Waits for the process to be asked to exit
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self
    }

    /// Wait for SIGTERM or SIGINT
    #[cfg(unix)]
    pub async fn wait(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = sigint.recv() => {
                debug!("received SIGINT");
            }
        }
        Ok(())
    }

    /// Wait for Ctrl-C or the console being closed
    #[cfg(windows)]
    pub async fn wait(&self) -> std::io::Result<()> {
        use tokio::signal::windows::{ctrl_c, ctrl_close};

        let mut ctrl_c = ctrl_c()?;
        let mut close = ctrl_close()?;

        tokio::select! {
            _ = ctrl_c.recv() => {
                debug!("received Ctrl-C");
            }
            _ = close.recv() => {
                debug!("console closed");
            }
        }
        Ok(())
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
