use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::errors::Error;

use super::{ChangeNotifier, ContextId, KeyValueStorage, StorageEvent, poisoned};

/// Process-local storage area; contents are lost when the process exits.
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    notifier: ChangeNotifier,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            notifier: ChangeNotifier::new(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let entries = self.entries.lock().map_err(|_| poisoned("memory"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, origin: ContextId, key: &str, value: &str) -> Result<(), Error> {
        {
            let mut entries = self.entries.lock().map_err(|_| poisoned("memory"))?;
            entries.insert(key.to_string(), value.to_string());
        }
        self.notifier.notify(origin, Some(key), Some(value));
        Ok(())
    }

    fn clear(&self, origin: ContextId) -> Result<(), Error> {
        {
            let mut entries = self.entries.lock().map_err(|_| poisoned("memory"))?;
            entries.clear();
        }
        self.notifier.notify(origin, None, None);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.notifier.subscribe()
    }
}
