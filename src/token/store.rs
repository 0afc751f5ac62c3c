use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::Error;
use crate::storage::{
    ACCESS_TOKEN_KEY, ContextId, KeyValueStorage, REFRESH_TOKEN_KEY, StorageEvent,
};

use super::CredentialPair;

/// In-memory view of the credential pair, kept in step with a shared storage area.
///
/// Each store is one context. Writes made through other contexts on the same
/// storage reach this cache through the storage change feed.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

struct Inner {
    context: ContextId,
    storage: Arc<dyn KeyValueStorage>,
    cache: RwLock<CredentialPair>,
    listener: Mutex<Option<AbortHandle>>,
}

impl CredentialStore {
    /// Hydrates from `storage` and starts following its change feed.
    ///
    /// Fails with `Error::Config` outside a tokio runtime.
    pub fn init(storage: Arc<dyn KeyValueStorage>) -> Result<Self, Error> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Config("credential store must be created inside a tokio runtime".to_string())
        })?;
        // Subscribe before reading so no write can slip between the two.
        let mut events = storage.subscribe();
        let inner = Arc::new(Inner {
            context: Uuid::new_v4(),
            storage,
            cache: RwLock::new(CredentialPair::default()),
            listener: Mutex::new(None),
        });
        inner.hydrate()?;

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let task = runtime.spawn(async move {
            loop {
                let received = events.recv().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match received {
                    Ok(event) => inner.apply(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(context = %inner.context, skipped, "credentials.lagged; rehydrating");
                        if let Err(err) = inner.hydrate() {
                            warn!(context = %inner.context, error = %err, "credentials.rehydrate_failed");
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        *inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task.abort_handle());

        debug!(context = %inner.context, "credentials.init");
        Ok(Self { inner })
    }

    pub fn context_id(&self) -> ContextId {
        self.inner.context
    }

    /// Last known access token, empty when signed out.
    pub fn access_token(&self) -> String {
        self.inner.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> String {
        self.inner.read().refresh_token.clone()
    }

    pub fn credentials(&self) -> CredentialPair {
        self.inner.read().clone()
    }

    /// Persists both tokens, then publishes them to this context's cache.
    ///
    /// If the refresh token cannot be written, the previous access token is
    /// put back so storage never holds half of a new pair.
    pub fn update_token(&self, pair: &CredentialPair) -> Result<(), Error> {
        let inner = &self.inner;
        let mut cache = inner.write();
        let previous = inner.storage.get(ACCESS_TOKEN_KEY)?;
        inner
            .storage
            .set(inner.context, ACCESS_TOKEN_KEY, &pair.access_token)?;
        if let Err(err) = inner
            .storage
            .set(inner.context, REFRESH_TOKEN_KEY, &pair.refresh_token)
        {
            let restore = previous.unwrap_or_default();
            if let Err(restore_err) = inner.storage.set(inner.context, ACCESS_TOKEN_KEY, &restore) {
                warn!(context = %inner.context, error = %restore_err, "credentials.restore_failed");
            }
            return Err(err);
        }
        *cache = pair.clone();
        debug!(context = %inner.context, "credentials.updated");
        Ok(())
    }

    /// Wipes the storage area and the cache.
    pub fn clear(&self) -> Result<(), Error> {
        let mut cache = self.inner.write();
        self.inner.storage.clear(self.inner.context)?;
        *cache = CredentialPair::default();
        debug!(context = %self.inner.context, "credentials.cleared");
        Ok(())
    }
}

impl Inner {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, CredentialPair> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CredentialPair> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the cache with what storage holds now. The cache write lock is
    /// held across the read; local writes hold it across their storage calls.
    fn hydrate(&self) -> Result<(), Error> {
        let mut cache = self.write();
        *cache = CredentialPair {
            access_token: self.storage.get(ACCESS_TOKEN_KEY)?.unwrap_or_default(),
            refresh_token: self.storage.get(REFRESH_TOKEN_KEY)?.unwrap_or_default(),
        };
        Ok(())
    }

    /// Event payloads can be stale by the time they are handled; storage is
    /// re-read instead.
    fn apply(&self, event: &StorageEvent) {
        if event.origin == self.context {
            return;
        }
        if !matches!(
            event.key.as_deref(),
            None | Some(ACCESS_TOKEN_KEY) | Some(REFRESH_TOKEN_KEY)
        ) {
            return;
        }
        match self.hydrate() {
            Ok(()) => {
                debug!(context = %self.context, origin = %event.origin, key = ?event.key, "credentials.synced")
            }
            Err(err) => {
                warn!(context = %self.context, error = %err, "credentials.sync_failed")
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::storage::MemoryStorage;

    use super::*;

    async fn eventually<F: Fn() -> bool>(check: F) -> bool {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !check() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn hydrates_from_existing_storage() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(Uuid::new_v4(), ACCESS_TOKEN_KEY, "from-disk")
            .unwrap();
        let store = CredentialStore::init(storage).unwrap();
        assert_eq!(store.access_token(), "from-disk");
        assert_eq!(store.refresh_token(), "");
    }

    #[tokio::test]
    async fn write_in_one_context_reaches_another() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let tab_a = CredentialStore::init(storage.clone()).unwrap();
        let tab_b = CredentialStore::init(storage).unwrap();

        tab_a
            .update_token(&CredentialPair::new("access-a", "refresh-a"))
            .unwrap();

        assert!(eventually(|| tab_b.access_token() == "access-a").await);
        assert!(eventually(|| tab_b.refresh_token() == "refresh-a").await);
    }

    #[tokio::test]
    async fn clear_in_one_context_signs_out_the_other() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let tab_a = CredentialStore::init(storage.clone()).unwrap();
        let tab_b = CredentialStore::init(storage).unwrap();
        tab_a
            .update_token(&CredentialPair::new("access", "refresh"))
            .unwrap();
        assert!(eventually(|| tab_b.access_token() == "access").await);

        tab_a.clear().unwrap();
        assert_eq!(tab_a.access_token(), "");
        assert!(eventually(|| tab_b.credentials().is_empty()).await);
    }

    #[tokio::test]
    async fn unrelated_keys_leave_cache_untouched() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let store = CredentialStore::init(storage.clone()).unwrap();
        store
            .update_token(&CredentialPair::new("keep", "keep-r"))
            .unwrap();
        storage.set(Uuid::new_v4(), "theme", "dark").unwrap();
        tokio::task::yield_now().await;
        assert_eq!(store.access_token(), "keep");
    }

    #[tokio::test]
    async fn back_to_back_writes_converge_on_the_last_one() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let tab_a = CredentialStore::init(storage.clone()).unwrap();
        let tab_b = CredentialStore::init(storage.clone()).unwrap();

        // Neither listener runs until both writes are done.
        tab_a.update_token(&CredentialPair::new("a1", "ra")).unwrap();
        tab_b.update_token(&CredentialPair::new("b1", "rb")).unwrap();
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }

        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("b1"));
        assert_eq!(tab_a.credentials(), CredentialPair::new("b1", "rb"));
        assert_eq!(tab_b.credentials(), CredentialPair::new("b1", "rb"));
    }

    #[tokio::test]
    async fn clear_followed_by_write_keeps_the_write() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let tab_a = CredentialStore::init(storage.clone()).unwrap();
        let tab_b = CredentialStore::init(storage).unwrap();

        tab_a.clear().unwrap();
        tab_b.update_token(&CredentialPair::new("b1", "rb")).unwrap();
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }

        assert_eq!(tab_a.access_token(), "b1");
        assert_eq!(tab_b.access_token(), "b1");
    }

    /// Memory storage whose refresh-token writes fail once armed.
    #[derive(Default)]
    struct RefreshWriteFails {
        inner: MemoryStorage,
        armed: std::sync::atomic::AtomicBool,
    }

    impl KeyValueStorage for RefreshWriteFails {
        fn get(&self, key: &str) -> Result<Option<String>, Error> {
            self.inner.get(key)
        }

        fn set(&self, origin: ContextId, key: &str, value: &str) -> Result<(), Error> {
            if key == REFRESH_TOKEN_KEY && self.armed.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::Storage("disk full".into()));
            }
            self.inner.set(origin, key, value)
        }

        fn clear(&self, origin: ContextId) -> Result<(), Error> {
            self.inner.clear(origin)
        }

        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StorageEvent> {
            self.inner.subscribe()
        }
    }

    #[tokio::test]
    async fn failed_second_write_restores_previous_access_token() {
        let storage = Arc::new(RefreshWriteFails::default());
        let store = CredentialStore::init(storage.clone()).unwrap();
        store.update_token(&CredentialPair::new("old", "old-r")).unwrap();

        storage.armed.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = store
            .update_token(&CredentialPair::new("new", "new-r"))
            .unwrap_err();

        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("old"));
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("old-r"));
        assert_eq!(store.credentials(), CredentialPair::new("old", "old-r"));
    }
}
