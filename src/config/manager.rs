//! Hot-reloadable configuration manager.
//!
//! The manager owns the published snapshot (an `Arc<Config>` behind a
//! read-write lock), serialises edits, persists them atomically
//! (temp-file-then-rename in the target's directory) and broadcasts every
//! accepted snapshot to subscribers. A filesystem watcher picks up
//! external edits with a short debounce and re-arms itself after atomic
//! renames swap the watched inode.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::model::Config;

/// Quiet period after a filesystem event before the file is re-read,
/// coalescing editor save patterns (truncate+write, temp+rename).
const WATCH_DEBOUNCE: Duration = Duration::from_millis(100);

/// Errors surfaced by configuration loading and editing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config watch error: {0}")]
    Watch(#[from] notify::Error),
}

#[derive(Debug)]
struct WatchState {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Thread-safe, hot-reloadable view of [`Config`].
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
    /// Serialises `update` callers; the snapshot lock is only ever held
    /// for the pointer swap.
    update_lock: Mutex<()>,
    change_tx: broadcast::Sender<Arc<Config>>,
    watch_state: Mutex<Option<WatchState>>,
}

impl ConfigManager {
    /// Load the file at `path` and publish the initial snapshot.
    pub fn load(path: impl Into<PathBuf>) -> Result<Arc<Self>, ConfigError> {
        let path = path.into();
        let config = load_file(&path)?;
        info!(path = %path.display(), endpoints = config.endpoints.len(), "config loaded");

        let (change_tx, _) = broadcast::channel(16);
        Ok(Arc::new(Self {
            path,
            current: RwLock::new(Arc::new(config)),
            update_lock: Mutex::new(()),
            change_tx,
            watch_state: Mutex::new(None),
        }))
    }

    /// The current immutable snapshot. Never blocks on I/O.
    pub fn snapshot(&self) -> Arc<Config> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to accepted snapshot changes (local updates and external
    /// file edits alike). Receivers that lag are free to fall back to
    /// [`ConfigManager::snapshot`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Config>> {
        self.change_tx.subscribe()
    }

    /// Apply `mutator` to a clone of the current snapshot. On success the
    /// new snapshot is persisted atomically, published and broadcast; on
    /// error nothing changes. Concurrent updates are serialised.
    pub fn update<F>(&self, mutator: F) -> Result<Arc<Config>, ConfigError>
    where
        F: FnOnce(&mut Config) -> Result<(), ConfigError>,
    {
        let _guard = self
            .update_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut draft = Config::clone(&self.snapshot());
        mutator(&mut draft)?;
        draft.apply_defaults();
        draft.validate().map_err(ConfigError::Invalid)?;
        draft.warn_unresolved();

        self.persist(&draft)?;

        let snapshot = Arc::new(draft);
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Re-read the file and publish the result. Idempotent: reloading an
    /// unchanged file publishes nothing.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let config = load_file(&self.path)?;
        self.publish(Arc::new(config));
        Ok(())
    }

    /// Start watching the config path for external modifications.
    pub fn watch(self: &Arc<Self>) -> Result<(), ConfigError> {
        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| {
                let _ = event_tx.send(res);
            },
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            // The watcher must live exactly as long as this task.
            let mut watcher = watcher;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    maybe = event_rx.recv() => {
                        let Some(res) = maybe else { break };
                        match res {
                            Ok(event) if is_reload_trigger(&event) => {
                                tokio::time::sleep(WATCH_DEBOUNCE).await;
                                while event_rx.try_recv().is_ok() {}

                                manager.reload_from_watch();

                                // Editors and atomic saves replace the inode;
                                // re-arm on the original path.
                                let _ = watcher.unwatch(&manager.path);
                                if let Err(e) =
                                    watcher.watch(&manager.path, RecursiveMode::NonRecursive)
                                {
                                    warn!("failed to re-arm config watch: {e}");
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("config watcher error: {e}"),
                        }
                    }
                }
            }
            debug!("config watch task stopped");
        });

        *self
            .watch_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(WatchState {
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Stop the watcher and its dispatch task.
    pub async fn close(&self) {
        let state = self
            .watch_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(state) = state {
            let _ = state.shutdown.send(true);
            let _ = state.task.await;
        }
    }

    fn reload_from_watch(&self) {
        match load_file(&self.path) {
            Ok(config) => {
                info!("config file changed on disk, reloading");
                self.publish(Arc::new(config));
            }
            Err(e) => {
                // Keep serving the last committed snapshot.
                warn!("failed to reload config, retaining previous snapshot: {e}");
            }
        }
    }

    /// Swap the published snapshot and notify subscribers. Publishing a
    /// snapshot equal to the current one is a no-op so that the watcher
    /// echo of our own atomic save does not double-notify.
    fn publish(&self, snapshot: Arc<Config>) {
        {
            let mut current = self
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if **current == *snapshot {
                return;
            }
            *current = snapshot.clone();
        }
        let _ = self.change_tx.send(snapshot);
    }

    /// Write the config to a sibling temp file, then rename onto the
    /// target so readers never observe a torn file.
    fn persist(&self, config: &Config) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(config)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(yaml.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| ConfigError::Io(e.error))?;
        Ok(())
    }
}

fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    let mut config: Config = serde_yaml::from_str(&raw)?;
    config.apply_defaults();
    config.validate().map_err(ConfigError::Invalid)?;
    config.warn_unresolved();
    Ok(config)
}

fn is_reload_trigger(event: &notify::Event) -> bool {
    use notify::EventKind;
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any
    )
}
