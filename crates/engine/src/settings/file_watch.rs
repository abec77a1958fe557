use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::bus::{ContextId, StorageBus, StorageChange};
use super::storage::{JsonFileStorage, SettingsStorage};
use super::SETTINGS_KEY;
use crate::errors::{Error, Result};

/// Announces settings written to a [`JsonFileStorage`] file by other processes.
///
/// Each change to the stored settings value is published once on the bus,
/// under the watcher's own [`ContextId`]. Values this process already put on
/// the bus are not announced a second time. Dropping the watcher stops it.
///
/// Must be created inside a Tokio runtime.
pub struct SettingsFileWatcher {
    _watcher: RecommendedWatcher,
    relay: JoinHandle<()>,
}

impl SettingsFileWatcher {
    pub fn spawn(storage: Arc<JsonFileStorage>, bus: StorageBus) -> Result<Self> {
        let path = storage.path().to_path_buf();
        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| Error::storage(format!("{} is not a file path", path.display())))?;

        // The file is replaced by rename, so the directory is what gets watched.
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        fs::create_dir_all(&directory)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            match event {
                Ok(event) if touches(&event, &file_name) => {
                    let _ = sender.send(());
                }
                Ok(_) => {}
                Err(e) => warn!("Settings file watch error: {}", e),
            }
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        // Baseline taken before any event can arrive.
        let announced = bus.subscribe();
        let last = storage.get(SETTINGS_KEY).ok().flatten();

        info!("Watching {} for settings changes", path.display());
        let relay = tokio::spawn(relay(storage, bus, announced, last, receiver));

        Ok(Self {
            _watcher: watcher,
            relay,
        })
    }
}

impl Drop for SettingsFileWatcher {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

fn touches(event: &Event, file_name: &OsStr) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name))
}

async fn relay(
    storage: Arc<JsonFileStorage>,
    bus: StorageBus,
    mut announced: broadcast::Receiver<StorageChange>,
    mut last: Option<String>,
    mut file_events: mpsc::UnboundedReceiver<()>,
) {
    let origin = ContextId::new();

    loop {
        tokio::select! {
            biased;

            change = announced.recv() => match change {
                Ok(change) if change.key == SETTINGS_KEY && change.origin != origin => {
                    last = change.new_value;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            event = file_events.recv() => {
                if event.is_none() {
                    break;
                }
                let current = match storage.get(SETTINGS_KEY) {
                    Ok(value) => value,
                    Err(e) => {
                        // Usually a write caught halfway; the next event rereads.
                        debug!("Settings file not readable yet: {}", e);
                        continue;
                    }
                };
                if current == last {
                    continue;
                }
                debug!("Settings file changed outside this process");
                last = current.clone();
                bus.publish(StorageChange {
                    key: SETTINGS_KEY.to_string(),
                    new_value: current,
                    origin,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{SettingsSync, SyncSettings};
    use std::time::Duration;
    use tempfile::tempdir;

    async fn wait_for(sync: &SettingsSync, expected: SyncSettings) {
        let mut updates = sync.watch();
        tokio::time::timeout(Duration::from_secs(5), async {
            while sync.current() != expected {
                if updates.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .expect("settings never arrived");
        assert_eq!(sync.current(), expected);
    }

    #[tokio::test]
    async fn test_write_from_another_handle_reaches_watching_context() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let storage = Arc::new(JsonFileStorage::new(&path));
        let bus = StorageBus::default();
        let display = SettingsSync::new(storage.clone(), bus.clone());
        let _watcher = SettingsFileWatcher::spawn(storage, bus).unwrap();

        // A separate handle and bus, as another process would have.
        let admin = SettingsSync::new(Arc::new(JsonFileStorage::new(&path)), StorageBus::default());

        admin.save(SyncSettings::new(20, false)).unwrap();
        wait_for(&display, SyncSettings::new(20, false)).await;

        admin.reset().unwrap();
        wait_for(&display, SyncSettings::default()).await;
    }

    #[tokio::test]
    async fn test_own_saves_are_not_announced_again() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let storage = Arc::new(JsonFileStorage::new(&path));
        let bus = StorageBus::default();
        let display = SettingsSync::new(storage.clone(), bus.clone());
        let _watcher = SettingsFileWatcher::spawn(storage, bus.clone()).unwrap();
        let mut heard = bus.subscribe();

        display.save(SyncSettings::new(10, true)).unwrap();

        let own = heard.recv().await.unwrap();
        assert_eq!(own.origin, display.context());
        let echo = tokio::time::timeout(Duration::from_millis(500), heard.recv()).await;
        assert!(echo.is_err(), "unexpected echo: {:?}", echo);
    }

    #[tokio::test]
    async fn test_missing_directory_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kiosk").join("settings.json");

        let storage = Arc::new(JsonFileStorage::new(&path));
        let watcher = SettingsFileWatcher::spawn(storage, StorageBus::default());
        assert!(watcher.is_ok());
        assert!(dir.path().join("kiosk").is_dir());
    }
}
