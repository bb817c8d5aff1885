//! Actions bound to hotkeys by the task file
//!
//! - Launch: run a command line through the platform shell
//! - ToggleWindow: show or hide the first window of a running process
//! - Kill: terminate processes by image name

use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::hotkey::Callback;

#[cfg(windows)]
mod window;

/// What a hotkey does with its parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Parameter is a command line
    Launch,
    /// Parameter is a process image name
    ToggleWindow,
    /// Parameter is a process image name
    Kill,
}

/// Callback performing `kind` with the hotkey's parameter
pub fn callback_for(kind: TaskKind) -> Callback {
    Arc::new(move |param: &str| {
        let result = match kind {
            TaskKind::Launch => launch(param),
            TaskKind::ToggleWindow => toggle_window(param),
            TaskKind::Kill => kill(param),
        };
        if let Err(e) = result {
            warn!(?kind, param, error = %e, "hotkey task failed");
        }
    })
}

/// Command running `line` through the platform shell
pub fn shell_command(line: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", line]);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", line]);
        cmd
    }
}

/// Command terminating every process named `image`
pub fn kill_command(image: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("taskkill");
        cmd.args(["/F", "/IM", image]);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("pkill");
        cmd.args(["-x", image]);
        cmd
    }
}

fn launch(line: &str) -> Result<()> {
    if line.trim().is_empty() {
        bail!("empty command line");
    }
    let mut child = shell_command(line)
        .stdin(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to launch {:?}", line))?;
    info!(command = line, pid = child.id(), "task launched");

    // Reap the child without blocking the listener
    thread::Builder::new()
        .name("task-reaper".to_string())
        .spawn(move || {
            let _ = child.wait();
        })
        .context("failed to spawn reaper thread")?;
    Ok(())
}

fn kill(image: &str) -> Result<()> {
    let status = kill_command(image)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("failed to run kill command for {}", image))?;
    if !status.success() {
        bail!("kill command for {} exited with {}", image, status);
    }
    info!(image, "task killed");
    Ok(())
}

#[cfg(windows)]
fn toggle_window(image: &str) -> Result<()> {
    let output = Command::new("tasklist")
        .args(["/FO", "CSV", "/NH"])
        .output()
        .context("failed to run tasklist")?;
    let listing = String::from_utf8_lossy(&output.stdout);
    let Some(pid) = find_pid_in_tasklist(&listing, image) else {
        bail!("no running process named {}", image);
    };
    match window::toggle_first_window(pid) {
        Some(visible) => {
            info!(image, pid, visible, "window toggled");
            Ok(())
        }
        None => bail!("process {} ({}) has no top-level window", image, pid),
    }
}

#[cfg(not(windows))]
fn toggle_window(image: &str) -> Result<()> {
    tracing::debug!(image, "window toggling requested");
    bail!("toggling windows is not supported on this platform")
}

/// Find the pid of `image` in `tasklist /FO CSV /NH` output
pub fn find_pid_in_tasklist(listing: &str, image: &str) -> Option<u32> {
    listing.lines().find_map(|line| {
        let mut fields = line.trim().split("\",\"").map(|f| f.trim_matches('"'));
        let name = fields.next()?;
        let pid = fields.next()?;
        if name.eq_ignore_ascii_case(image) {
            pid.parse().ok()
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = concat!(
        "\"System Idle Process\",\"0\",\"Services\",\"0\",\"8 K\"\r\n",
        "\"explorer.exe\",\"4312\",\"Console\",\"1\",\"152,340 K\"\r\n",
        "\"TOTALCMD64.EXE\",\"9120\",\"Console\",\"1\",\"40,112 K\"\r\n",
    );

    #[test]
    fn test_find_pid_in_tasklist() {
        assert_eq!(find_pid_in_tasklist(LISTING, "explorer.exe"), Some(4312));
        assert_eq!(find_pid_in_tasklist(LISTING, "totalcmd64.exe"), Some(9120));
        assert_eq!(find_pid_in_tasklist(LISTING, "explorer"), None);
        assert_eq!(find_pid_in_tasklist("", "explorer.exe"), None);
    }

    #[test]
    fn test_kill_command_targets_image_name() {
        let cmd = kill_command("game.exe");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args.last().map(String::as_str), Some("game.exe"));
        #[cfg(windows)]
        assert_eq!(cmd.get_program(), "taskkill");
        #[cfg(not(windows))]
        assert_eq!(cmd.get_program(), "pkill");
    }

    #[test]
    fn test_launch_rejects_empty_command() {
        assert!(launch("  ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_callback_runs_command() {
        let marker = std::env::temp_dir().join(format!("hotkeyd-launch-{}", std::process::id()));
        let _ = std::fs::remove_file(&marker);

        let callback = callback_for(TaskKind::Launch);
        callback(&format!("touch {}", marker.display()));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !marker.exists() && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(marker.exists());
        std::fs::remove_file(&marker).unwrap();
    }

    #[cfg(not(windows))]
    #[test]
    fn test_toggle_unsupported_is_reported() {
        assert!(toggle_window("anything").is_err());
        // The callback swallows the failure
        callback_for(TaskKind::ToggleWindow)("anything");
    }
}
