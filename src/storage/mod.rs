//! Durable key-value areas shared between credential contexts.
//!
//! Every write is broadcast as a [`StorageEvent`] so that other contexts attached
//! to the same area can update their caches without re-reading.

mod file;
mod memory;

use jiff::Timestamp;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::Error;

pub use file::FileStorage;
pub use memory::MemoryStorage;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

const EVENT_CAPACITY: usize = 64;

/// Identifies the context that produced a change.
pub type ContextId = Uuid;

#[derive(Clone, Debug)]
pub struct StorageEvent {
    /// `None` when the whole area was cleared.
    pub key: Option<String>,
    pub new_value: Option<String>,
    pub origin: ContextId,
    pub at: Timestamp,
}

pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    fn set(&self, origin: ContextId, key: &str, value: &str) -> Result<(), Error>;

    /// Removes every entry in the area, not just the credential keys.
    fn clear(&self, origin: ContextId) -> Result<(), Error>;

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

pub(crate) struct ChangeNotifier {
    tx: broadcast::Sender<StorageEvent>,
}

impl ChangeNotifier {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub(crate) fn notify(&self, origin: ContextId, key: Option<&str>, new_value: Option<&str>) {
        // No receivers just means no other context is listening.
        let _ = self.tx.send(StorageEvent {
            key: key.map(str::to_string),
            new_value: new_value.map(str::to_string),
            origin,
            at: Timestamp::now(),
        });
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }
}

fn poisoned(area: &str) -> Error {
    Error::Storage(format!("{area} storage lock poisoned"))
}
