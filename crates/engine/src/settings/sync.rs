use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::bus::{ContextId, StorageBus, StorageChange};
use super::model::SyncSettings;
use super::storage::SettingsStorage;
use super::{SETTINGS_KEY, SETTINGS_KEY_PREFIX};
use crate::errors::Result;

/// Handle to a change listener. Dropping it stops the listener.
#[derive(Debug)]
pub struct ChangeSubscription {
    handle: JoinHandle<()>,
}

impl ChangeSubscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Reader and propagation relay for [`SyncSettings`] in one display context.
///
/// The effective settings start from durable storage and follow every change
/// made by other contexts on the same [`StorageBus`]. Changes saved through
/// this instance apply locally right away; the bus never echoes them back.
///
/// Must be created inside a Tokio runtime: the relay runs as a task.
pub struct SettingsSync {
    storage: Arc<dyn SettingsStorage>,
    bus: StorageBus,
    context: ContextId,
    effective: Arc<watch::Sender<SyncSettings>>,
    _relay: ChangeSubscription,
}

impl SettingsSync {
    pub fn new(storage: Arc<dyn SettingsStorage>, bus: StorageBus) -> Self {
        let context = ContextId::new();
        let initial = load_from(storage.as_ref());
        let (sender, _receiver) = watch::channel(initial);
        let effective = Arc::new(sender);

        let relay_target = Arc::clone(&effective);
        let relay = listen(&bus, Arc::clone(&storage), context, move |settings| {
            apply(&relay_target, settings);
        });

        info!(
            "Sync settings attached for context {} (every {} min, enabled: {})",
            context, initial.poll_interval_minutes, initial.enabled
        );

        Self {
            storage,
            bus,
            context,
            effective,
            _relay: relay,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Read settings from durable storage. Never fails: defaults stand in for
    /// anything missing or unreadable.
    pub fn load(&self) -> SyncSettings {
        load_from(self.storage.as_ref())
    }

    /// Settings currently in effect for this context.
    pub fn current(&self) -> SyncSettings {
        *self.effective.borrow()
    }

    /// Receiver that observes every change of the effective settings.
    pub fn watch(&self) -> watch::Receiver<SyncSettings> {
        self.effective.subscribe()
    }

    /// Persist settings, apply them here and announce them to other contexts.
    pub fn save(&self, settings: SyncSettings) -> Result<()> {
        let settings = SyncSettings::new(settings.poll_interval_minutes, settings.enabled);
        let raw = settings.to_json()?;
        self.storage.set(SETTINGS_KEY, &raw)?;

        apply(&self.effective, settings);
        self.bus.publish(StorageChange {
            key: SETTINGS_KEY.to_string(),
            new_value: Some(raw),
            origin: self.context,
        });
        Ok(())
    }

    /// Forget the stored settings and fall back to defaults everywhere.
    pub fn reset(&self) -> Result<()> {
        self.storage.remove(SETTINGS_KEY)?;

        apply(&self.effective, SyncSettings::default());
        self.bus.publish(StorageChange {
            key: SETTINGS_KEY.to_string(),
            new_value: None,
            origin: self.context,
        });
        info!("Sync settings reset to defaults by context {}", self.context);
        Ok(())
    }

    /// Call `callback` whenever another context changes the settings.
    ///
    /// Changes saved through this instance are not reported here.
    pub fn on_external_change<F>(&self, callback: F) -> ChangeSubscription
    where
        F: Fn(SyncSettings) + Send + Sync + 'static,
    {
        listen(&self.bus, Arc::clone(&self.storage), self.context, callback)
    }
}

fn apply(target: &watch::Sender<SyncSettings>, settings: SyncSettings) {
    target.send_if_modified(|current| {
        if *current == settings {
            return false;
        }
        debug!("Effective sync settings changed: {:?} -> {:?}", current, settings);
        *current = settings;
        true
    });
}

fn load_from(storage: &dyn SettingsStorage) -> SyncSettings {
    match storage.get(SETTINGS_KEY) {
        Ok(Some(raw)) => SyncSettings::from_json(&raw),
        Ok(None) => SyncSettings::default(),
        Err(e) => {
            warn!("Failed to read sync settings, using defaults: {}", e);
            SyncSettings::default()
        }
    }
}

fn listen<F>(
    bus: &StorageBus,
    storage: Arc<dyn SettingsStorage>,
    context: ContextId,
    callback: F,
) -> ChangeSubscription
where
    F: Fn(SyncSettings) + Send + Sync + 'static,
{
    let mut receiver = bus.subscribe();
    let handle = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(change) => {
                    if change.origin == context || !change.key.starts_with(SETTINGS_KEY_PREFIX) {
                        continue;
                    }
                    let settings = match (change.key.as_str(), change.new_value.as_deref()) {
                        (SETTINGS_KEY, Some(raw)) => SyncSettings::from_json(raw),
                        (SETTINGS_KEY, None) => SyncSettings::default(),
                        _ => load_from(storage.as_ref()),
                    };
                    callback(settings);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "Settings listener missed {} change(s), re-reading storage",
                        skipped
                    );
                    callback(load_from(storage.as_ref()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    ChangeSubscription { handle }
}
