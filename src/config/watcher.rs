//! Configuration file watcher for hot reload.
//!
//! Watches the file's parent directory so editors that save by renaming a
//! temp file over the original keep triggering reloads. Only events naming
//! the config file are considered, and a config identical to the last one
//! published is not sent again.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Publishes validated configuration whenever the file changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let last = Mutex::new(load_config(&path).ok());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_relevant(&event, &path) => {
                    match load_config(&path) {
                        Ok(config) => {
                            let mut last = last.lock();
                            if last.as_ref() == Some(&config) {
                                return;
                            }
                            tracing::info!(path = ?path, "Config file changed, publishing update");
                            *last = Some(config.clone());
                            let _ = tx.send(config);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = watch_dir(&self.path);
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, dir = ?dir, "Config watcher started");
        Ok(watcher)
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// A content change to the config file itself.
fn is_relevant(event: &Event, path: &Path) -> bool {
    let kind_matches = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
    let Some(file_name) = path.file_name() else {
        return false;
    };
    kind_matches && event.paths.iter().any(|p| p.file_name() == Some(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_only_config_file_changes_are_relevant() {
        let config = Path::new("/etc/gateway/gateway.toml");

        assert!(is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/etc/gateway/gateway.toml"),
            config
        ));
        assert!(is_relevant(
            &event(EventKind::Create(CreateKind::File), "/etc/gateway/gateway.toml"),
            config
        ));
        assert!(!is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/etc/gateway/other.toml"),
            config
        ));
        assert!(!is_relevant(
            &event(EventKind::Access(AccessKind::Any), "/etc/gateway/gateway.toml"),
            config
        ));
    }

    #[test]
    fn test_watch_dir_for_bare_file_name() {
        assert_eq!(watch_dir(Path::new("gateway.toml")), PathBuf::from("."));
        assert_eq!(
            watch_dir(Path::new("config/gateway.toml")),
            PathBuf::from("config")
        );
    }
}
