//! In-process store for tests and local runs.
//!
//! Mirrors the remote store's semantics, including TTL reaping lag: expired
//! entries are only dropped lazily when touched, which is exactly the
//! situation the read-side expiry checks have to cope with.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::Clock;

use super::{KvError, KvStore};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<i64>,
}

pub struct MemoryKvStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live (unexpired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now_unix();
        self.lock()
            .values()
            .filter(|entry| entry.expires_at.is_none_or(|at| at > now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = self.clock.now_unix();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at.is_some_and(|at| at <= now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl_seconds: Option<i64>,
    ) -> Result<(), KvError> {
        let expires_at = ttl_seconds.map(|ttl| self.clock.now_unix() + ttl);
        self.lock()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use anyhow::Result;

    fn store_with_clock(start: i64) -> (MemoryKvStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        (MemoryKvStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() -> Result<()> {
        let (store, _clock) = store_with_clock(1_000);
        store.put("k", "v".to_string(), None).await?;
        assert_eq!(store.get("k").await?.as_deref(), Some("v"));
        store.delete("k").await?;
        assert_eq!(store.get("k").await?, None);
        // Deleting again is a no-op success.
        store.delete("k").await?;
        Ok(())
    }

    #[tokio::test]
    async fn ttl_expires_entries() -> Result<()> {
        let (store, clock) = store_with_clock(1_000);
        store.put("k", "v".to_string(), Some(60)).await?;
        assert_eq!(store.get("k").await?.as_deref(), Some("v"));
        clock.advance(59);
        assert_eq!(store.get("k").await?.as_deref(), Some("v"));
        clock.advance(1);
        assert_eq!(store.get("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn overwrite_replaces_value_and_ttl() -> Result<()> {
        let (store, clock) = store_with_clock(1_000);
        store.put("k", "old".to_string(), Some(10)).await?;
        store.put("k", "new".to_string(), Some(100)).await?;
        clock.advance(50);
        assert_eq!(store.get("k").await?.as_deref(), Some("new"));
        Ok(())
    }

    #[tokio::test]
    async fn len_skips_expired_entries() -> Result<()> {
        let (store, clock) = store_with_clock(0);
        store.put("a", "1".to_string(), Some(10)).await?;
        store.put("b", "2".to_string(), None).await?;
        assert_eq!(store.len(), 2);
        clock.advance(11);
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
        Ok(())
    }
}
