use tokio::sync::broadcast;
use uuid::Uuid;

/// Identity of one display context (a window or view sharing the device storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification that a storage key was written by some context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    pub origin: ContextId,
}

/// Same-device broadcast channel for storage mutations.
#[derive(Clone, Debug)]
pub struct StorageBus {
    sender: broadcast::Sender<StorageChange>,
}

impl StorageBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.sender.subscribe()
    }

    pub fn publish(&self, change: StorageChange) {
        // No listeners is fine: a lone context has nobody to notify.
        let _ = self.sender.send(change);
    }
}

impl Default for StorageBus {
    fn default() -> Self {
        Self::new(16)
    }
}
