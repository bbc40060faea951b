//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// Watches the configuration file and emits every valid new version.
///
/// Invalid edits are logged and dropped; the running configuration stays.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. Keep the returned watcher alive for as long as
    /// updates are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(path = ?path, "Config file changed, reloading");
                    match load_config(&path) {
                        Ok(new_config) => {
                            if tx.send(new_config).is_err() {
                                tracing::debug!("Config receiver dropped, ignoring update");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Rejected config reload, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
