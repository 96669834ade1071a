//! One address family's flow table: a hash index paired with its store.

use flowtrack_common::{FlowKey, Result, SlotId};

use crate::index::HashIndex;
use crate::store::FlowStore;

/// Fixed-capacity map from keys of one family to records of type `T`.
pub struct FlowTable<K: FlowKey, T> {
    index: HashIndex<K>,
    store: FlowStore<T>,
}

impl<K: FlowKey, T: Copy + Default> FlowTable<K, T> {
    pub fn new(capacity: u32) -> Result<Self> {
        Ok(Self {
            index: HashIndex::new(capacity)?,
            store: FlowStore::new(capacity)?,
        })
    }

    /// Insert or overwrite the record of `key`. Returns the slot and whether
    /// the key was new.
    pub fn insert(&mut self, key: K, record: T) -> Result<(SlotId, bool)> {
        let (slot, new) = self.index.insert(key)?;
        self.store.write(slot, record);
        Ok((slot, new))
    }

    #[inline]
    pub fn get(&self, key: &K) -> Option<&T> {
        self.index.lookup(key).map(|slot| self.store.read(slot))
    }

    #[inline]
    pub fn get_mut(&mut self, key: &K) -> Option<&mut T> {
        let slot = self.index.lookup(key)?;
        Some(self.store.read_mut(slot))
    }

    /// Slot and record of `key`.
    #[inline]
    pub fn entry_mut(&mut self, key: &K) -> Option<(SlotId, &mut T)> {
        let slot = self.index.lookup(key)?;
        Some((slot, self.store.read_mut(slot)))
    }

    pub fn slot_of(&self, key: &K) -> Option<SlotId> {
        self.index.lookup(key)
    }

    pub fn remove(&mut self, key: &K) -> Result<SlotId> {
        self.index.remove(key)
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.index.is_full()
    }

    pub fn capacity(&self) -> u32 {
        self.index.capacity()
    }

    pub fn max_probe_len(&self) -> usize {
        self.index.max_probe_len()
    }

    /// Live keys with their records.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.index
            .iter()
            .map(move |(key, slot)| (key, self.store.read(slot)))
    }
}
