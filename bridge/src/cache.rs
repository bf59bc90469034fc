//! Savepoint overlay over a `Storage`
//!
//! Writes land in an ordered overlay and reach the backing store only when
//! the overlay is committed. Dropping the overlay discards them. Overlays nest:
//! a `CacheStorage` is itself a `Storage`.

use std::collections::BTreeMap;
use std::ops::Bound;

use cosmwasm_std::{Order, Record, Storage};

/// Uncommitted writes; `None` marks a deletion
type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

pub struct CacheStorage<'a> {
    base: &'a dyn Storage,
    overlay: Overlay,
}

impl<'a> CacheStorage<'a> {
    pub fn new(base: &'a dyn Storage) -> Self {
        CacheStorage {
            base,
            overlay: BTreeMap::new(),
        }
    }

    /// Release the backing store, keeping the pending writes
    pub fn into_writes(self) -> PendingWrites {
        PendingWrites(self.overlay)
    }
}

impl<'a> Storage for CacheStorage<'a> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.overlay.get(key) {
            Some(pending) => pending.clone(),
            None => self.base.get(key),
        }
    }

    fn range<'b>(
        &'b self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> Box<dyn Iterator<Item = Record> + 'b> {
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Box::new(std::iter::empty());
            }
        }

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.range(start, end, Order::Ascending).collect();

        let lower = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));
        for (key, pending) in self.overlay.range((lower, upper)) {
            match pending {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        match order {
            Order::Ascending => Box::new(merged.into_iter()),
            Order::Descending => Box::new(merged.into_iter().rev()),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.overlay.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn remove(&mut self, key: &[u8]) {
        self.overlay.insert(key.to_vec(), None);
    }
}

/// Writes detached from their overlay, ready to apply
pub struct PendingWrites(Overlay);

impl PendingWrites {
    pub fn commit(self, storage: &mut dyn Storage) {
        for (key, pending) in self.0 {
            match pending {
                Some(value) => storage.set(&key, &value),
                None => storage.remove(&key),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Run `action` against an overlay of `storage`, committing only on `Ok`
pub fn with_cache<T, E>(
    storage: &mut dyn Storage,
    action: impl FnOnce(&mut dyn Storage) -> Result<T, E>,
) -> Result<T, E> {
    let mut cache = CacheStorage::new(&*storage);
    let result = action(&mut cache);
    let writes = cache.into_writes();
    if result.is_ok() {
        writes.commit(storage);
    }
    result
}
