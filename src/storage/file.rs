use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::errors::Error;

use super::{ChangeNotifier, ContextId, KeyValueStorage, StorageEvent, poisoned};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StorageDocument {
    #[serde(default)]
    updated_at: Option<Timestamp>,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// JSON-file backed storage area that survives process restarts.
///
/// Change notifications reach only the contexts that share this instance.
pub struct FileStorage {
    path: PathBuf,
    document: Mutex<StorageDocument>,
    notifier: ChangeNotifier,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let document = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                StorageDocument::default()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            StorageDocument::default()
        };
        debug!(path = %path.display(), entries = document.entries.len(), "storage.open");
        Ok(Self {
            path,
            document: Mutex::new(document),
            notifier: ChangeNotifier::new(),
        })
    }

    /// Applies `change` to a copy of the document and swaps it in only once
    /// the copy is on disk.
    fn commit(&self, change: impl FnOnce(&mut StorageDocument)) -> Result<(), Error> {
        let mut document = self.document.lock().map_err(|_| poisoned("file"))?;
        let mut staged = document.clone();
        change(&mut staged);
        staged.updated_at = Some(Timestamp::now());
        self.persist(&staged)?;
        *document = staged;
        Ok(())
    }

    fn persist(&self, document: &StorageDocument) -> Result<(), Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(document)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let document = self.document.lock().map_err(|_| poisoned("file"))?;
        Ok(document.entries.get(key).cloned())
    }

    fn set(&self, origin: ContextId, key: &str, value: &str) -> Result<(), Error> {
        self.commit(|document| {
            document.entries.insert(key.to_string(), value.to_string());
        })?;
        self.notifier.notify(origin, Some(key), Some(value));
        Ok(())
    }

    fn clear(&self, origin: ContextId) -> Result<(), Error> {
        self.commit(|document| document.entries.clear())?;
        self.notifier.notify(origin, None, None);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.notifier.subscribe()
    }
}
