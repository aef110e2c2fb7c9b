//! Configuration file watcher for hot reload.
//!
//! # Design Decisions
//! - The parent directory is watched, so editors that save by rename still
//!   trigger a reload
//! - Command-line overrides are re-applied to every reloaded file
//! - A reload identical to the last one sent is dropped

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::GateConfig;
use crate::config::validation::validate_config;

/// Adjustment applied to each configuration read from disk.
pub type ConfigTransform = Box<dyn Fn(&mut GateConfig) + Send + Sync>;

/// Watches one configuration file and sends each valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    transform: Option<ConfigTransform>,
    last: Mutex<Option<GateConfig>>,
    update_tx: mpsc::UnboundedSender<GateConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GateConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                transform: None,
                last: Mutex::new(None),
                update_tx,
            },
            update_rx,
        )
    }

    /// Apply `transform` to every reloaded configuration before it is sent.
    pub fn with_transform(mut self, transform: impl Fn(&mut GateConfig) + Send + Sync + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Record the configuration currently in force, so an unchanged file is
    /// not sent again.
    pub fn with_current(self, current: GateConfig) -> Self {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(current);
        }
        self
    }

    /// Read the file and return it if it is valid and differs from the last
    /// configuration sent.
    fn reload(&self) -> Result<Option<GateConfig>, ConfigError> {
        let mut config = load_config(&self.path)?;
        if let Some(transform) = &self.transform {
            transform(&mut config);
            validate_config(&config).map_err(ConfigError::Validation)?;
        }

        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_ref() == Some(&config) {
            return Ok(None);
        }
        *last = Some(config.clone());
        Ok(Some(config))
    }

    fn concerns_file(&self, event: &Event) -> bool {
        let name = self.path.file_name();
        event.paths.iter().any(|p| p.file_name() == name)
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) || !self.concerns_file(&event) {
                        return;
                    }
                    match self.reload() {
                        Ok(Some(config)) => {
                            tracing::info!(path = %self.path.display(), "Config file changed, reloading");
                            let _ = self.update_tx.send(config);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, body: &str) {
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn reload_skips_unchanged_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        write(&path, "[throttle]\nvisits_maximum = 5\nkeep_alive_secs = 10\n");

        let (watcher, _rx) = ConfigWatcher::new(&path);
        let first = watcher.reload().unwrap().expect("first load is sent");
        assert_eq!(first.throttle.visits_maximum, 5);
        assert!(watcher.reload().unwrap().is_none());

        write(&path, "[throttle]\nvisits_maximum = 5\nkeep_alive_secs = 0\n");
        assert!(matches!(watcher.reload(), Err(ConfigError::Validation(_))));

        write(&path, "[throttle]\nvisits_maximum = 7\nkeep_alive_secs = 10\n");
        assert_eq!(watcher.reload().unwrap().unwrap().throttle.visits_maximum, 7);
    }

    #[test]
    fn transform_is_applied_to_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        write(&path, "[server]\nmax_request_bytes = 100\n");

        let (watcher, _rx) = ConfigWatcher::new(&path);
        let watcher = watcher.with_transform(|config| config.server.max_request_bytes = 42);
        assert_eq!(watcher.reload().unwrap().unwrap().server.max_request_bytes, 42);
    }

    #[test]
    fn current_config_suppresses_identical_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        write(&path, "");

        let (watcher, _rx) = ConfigWatcher::new(&path);
        let watcher = watcher.with_current(GateConfig::default());
        assert!(watcher.reload().unwrap().is_none());
    }
}
