//! Configuration loading and management

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::hotkey::{key_code_for_char, Modifiers, DEFAULT_GRACE_PERIOD};
use crate::lifecycle::DEFAULT_GUARD_NAME;
use crate::tasks::TaskKind;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the JSON task file
    pub tasks_path: PathBuf,

    /// Name of the cross-process guard
    pub guard_name: String,

    /// How long stop waits for the listener
    pub grace_period: Duration,

    /// Show the listener surface
    pub debug: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let tasks_path = lookup("HOTKEYD_TASKS")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("hotkeys.json"));

        let guard_name = lookup("HOTKEYD_GUARD").unwrap_or_else(|| DEFAULT_GUARD_NAME.to_string());

        let grace_period = match lookup("HOTKEYD_GRACE_MS") {
            Some(ms) => Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("invalid HOTKEYD_GRACE_MS: {:?}", ms))?,
            ),
            None => DEFAULT_GRACE_PERIOD,
        };

        let debug = lookup("HOTKEYD_DEBUG")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            tasks_path,
            guard_name,
            grace_period,
            debug,
        })
    }
}

/// Hotkey bindings read from the task file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFile {
    /// Key -> command line to launch
    #[serde(default)]
    pub hotkeytasks: BTreeMap<String, String>,

    /// Key -> image name whose window is shown or hidden
    #[serde(default)]
    pub hotkeyhidetasks: BTreeMap<String, String>,

    /// Key -> image name to kill
    #[serde(default)]
    pub hotkeykilltasks: BTreeMap<String, String>,

    /// Modifier names shared by every binding, ctrl+alt when absent
    #[serde(default)]
    pub modifiers: Option<Vec<String>>,
}

/// One binding produced from the task file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub modifiers: Modifiers,
    pub key: u16,
    pub kind: TaskKind,
    pub param: String,
}

impl TaskFile {
    /// Read and parse a task file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read task file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid task file {}", path.display()))
    }

    /// Parse task file JSON
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Modifier set applied to every binding
    pub fn modifier_set(&self) -> Result<Modifiers> {
        let Some(names) = &self.modifiers else {
            return Ok(Modifiers::CONTROL | Modifiers::ALT);
        };
        names.iter().try_fold(Modifiers::empty(), |acc, name| {
            match Modifiers::parse(name) {
                Some(m) => Ok(acc | m),
                None => bail!("unknown modifier {:?}", name),
            }
        })
    }

    /// Flatten the three task maps into bindings, launch tasks first.
    ///
    /// The first character of each key picks the virtual key. Empty keys
    /// are skipped silently, unmappable ones with a warning.
    pub fn bindings(&self) -> Result<Vec<Binding>> {
        let modifiers = self.modifier_set()?;
        let groups = [
            (TaskKind::Launch, &self.hotkeytasks),
            (TaskKind::ToggleWindow, &self.hotkeyhidetasks),
            (TaskKind::Kill, &self.hotkeykilltasks),
        ];

        let mut bindings = Vec::new();
        for (kind, tasks) in groups {
            for (name, param) in tasks {
                let Some(first) = name.chars().next() else {
                    continue;
                };
                let Some(key) = key_code_for_char(first) else {
                    warn!(key = %name, ?kind, "no virtual key for task key, skipping");
                    continue;
                };
                bindings.push(Binding {
                    modifiers,
                    key,
                    kind,
                    param: param.clone(),
                });
            }
        }
        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.tasks_path, PathBuf::from("hotkeys.json"));
        assert_eq!(config.guard_name, DEFAULT_GUARD_NAME);
        assert_eq!(config.grace_period, Duration::from_secs(3));
        assert!(!config.debug);
    }

    #[test]
    fn test_config_from_environment() {
        let config = Config::from_lookup(|key| match key {
            "HOTKEYD_TASKS" => Some("/etc/hotkeyd/tasks.json".into()),
            "HOTKEYD_GUARD" => Some("custom-guard".into()),
            "HOTKEYD_GRACE_MS" => Some("250".into()),
            "HOTKEYD_DEBUG" => Some("true".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.tasks_path, PathBuf::from("/etc/hotkeyd/tasks.json"));
        assert_eq!(config.guard_name, "custom-guard");
        assert_eq!(config.grace_period, Duration::from_millis(250));
        assert!(config.debug);
    }

    #[test]
    fn test_config_rejects_bad_grace() {
        let result = Config::from_lookup(|key| (key == "HOTKEYD_GRACE_MS").then(|| "soon".into()));
        assert!(result.is_err());
    }

    #[test]
    fn test_task_file_bindings() {
        let file = TaskFile::parse(
            r#"{
                "hotkeytasks": { "t": "notepad.exe", "": "ignored", "?": "skipped" },
                "hotkeyhidetasks": { "h": "TOTALCMD64.EXE" },
                "hotkeykilltasks": { "9": "calc.exe" }
            }"#,
        )
        .unwrap();

        let bindings = file.bindings().unwrap();
        let ctrl_alt = Modifiers::CONTROL | Modifiers::ALT;
        assert_eq!(
            bindings,
            vec![
                Binding {
                    modifiers: ctrl_alt,
                    key: 0x54,
                    kind: TaskKind::Launch,
                    param: "notepad.exe".into()
                },
                Binding {
                    modifiers: ctrl_alt,
                    key: 0x48,
                    kind: TaskKind::ToggleWindow,
                    param: "TOTALCMD64.EXE".into()
                },
                Binding {
                    modifiers: ctrl_alt,
                    key: 0x39,
                    kind: TaskKind::Kill,
                    param: "calc.exe".into()
                },
            ]
        );
    }

    #[test]
    fn test_task_file_modifiers() {
        let file = TaskFile::parse(r#"{ "modifiers": ["win", "shift"] }"#).unwrap();
        assert_eq!(file.modifier_set().unwrap(), Modifiers::WIN | Modifiers::SHIFT);
        assert!(file.bindings().unwrap().is_empty());

        let file = TaskFile::parse(r#"{ "modifiers": ["hyper"] }"#).unwrap();
        assert!(file.bindings().is_err());
    }

    #[test]
    fn test_task_file_load() {
        let path = std::env::temp_dir().join(format!("hotkeyd-tasks-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "hotkeykilltasks": { "k": "game.exe" } }"#).unwrap();
        let file = TaskFile::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(file.hotkeykilltasks.get("k").map(String::as_str), Some("game.exe"));

        assert!(TaskFile::load(&path).is_err());
    }
}
