//! Fixed-capacity hash index from flow keys to dense slot ids.
//!
//! Open addressing with linear probing over a power-of-two bucket array at
//! least twice the capacity, so the load factor never exceeds one half and
//! every probe sequence ends at a vacant bucket. Removal shifts the following
//! run of entries back instead of leaving tombstones. All storage is reserved
//! up front; no operation allocates afterwards.

use flowtrack_common::{Error, FlowKey, Result, SlotId};
use log::debug;

/// Largest capacity a single index accepts.
pub const MAX_CAPACITY: u32 = 1 << 30;

/// Marks a vacant bucket.
const VACANT: u32 = u32::MAX;

#[derive(Clone, Copy)]
struct Bucket<K> {
    hash: u32,
    slot: u32,
    key: K,
}

impl<K: FlowKey> Bucket<K> {
    fn vacant() -> Self {
        Self {
            hash: 0,
            slot: VACANT,
            key: K::default(),
        }
    }

    #[inline]
    fn is_vacant(&self) -> bool {
        self.slot == VACANT
    }
}

/// Maps each live key of one address family to a slot in `[0, capacity)`.
pub struct HashIndex<K: FlowKey> {
    buckets: Box<[Bucket<K>]>,
    mask: usize,
    /// Unused slots, most recently freed on top.
    free: Vec<u32>,
    len: u32,
    capacity: u32,
}

impl<K: FlowKey> HashIndex<K> {
    /// Create an index holding at most `capacity` keys.
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(Error::InvalidCapacity(u64::from(capacity)));
        }

        let bucket_count = (capacity as usize * 2).next_power_of_two();

        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(bucket_count)
            .map_err(|_| Error::Allocation(capacity))?;
        buckets.resize(bucket_count, Bucket::vacant());

        let mut free = Vec::new();
        free.try_reserve_exact(capacity as usize)
            .map_err(|_| Error::Allocation(capacity))?;
        free.extend((0..capacity).rev());

        debug!(
            "created {} index: capacity={}, buckets={}",
            K::FAMILY,
            capacity,
            bucket_count
        );

        Ok(Self {
            buckets: buckets.into_boxed_slice(),
            mask: bucket_count - 1,
            free,
            len: 0,
            capacity,
        })
    }

    #[inline]
    fn home(&self, hash: u32) -> usize {
        hash as usize & self.mask
    }

    /// Bucket position holding `key`, if present.
    #[inline]
    fn find(&self, key: &K, hash: u32) -> Option<usize> {
        let mut pos = self.home(hash);
        loop {
            let bucket = &self.buckets[pos];
            if bucket.is_vacant() {
                return None;
            }
            if bucket.hash == hash && bucket.key == *key {
                return Some(pos);
            }
            pos = (pos + 1) & self.mask;
        }
    }

    /// Insert `key`, returning its slot and whether it was newly added.
    ///
    /// A key already present keeps its slot. A new key takes the most
    /// recently freed slot, or fails with [`Error::CapacityExceeded`] when
    /// all slots are in use; the index is unchanged in that case.
    pub fn insert(&mut self, key: K) -> Result<(SlotId, bool)> {
        let hash = key.flow_hash();
        let mut pos = self.home(hash);
        loop {
            let bucket = &self.buckets[pos];
            if bucket.is_vacant() {
                break;
            }
            if bucket.hash == hash && bucket.key == key {
                return Ok((SlotId(bucket.slot), false));
            }
            pos = (pos + 1) & self.mask;
        }

        let slot = self.free.pop().ok_or(Error::CapacityExceeded {
            family: K::FAMILY,
            capacity: self.capacity,
        })?;

        self.buckets[pos] = Bucket { hash, slot, key };
        self.len += 1;
        Ok((SlotId(slot), true))
    }

    /// Slot of `key`.
    #[inline]
    pub fn lookup(&self, key: &K) -> Option<SlotId> {
        self.find(key, key.flow_hash())
            .map(|pos| SlotId(self.buckets[pos].slot))
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        self.lookup(key).is_some()
    }

    /// Remove `key` and free its slot.
    pub fn remove(&mut self, key: &K) -> Result<SlotId> {
        let hash = key.flow_hash();
        let mut hole = self.find(key, hash).ok_or(Error::NotFound)?;
        let slot = self.buckets[hole].slot;

        // Backward shift: pull every later entry of the run whose home lies
        // at or before the hole into it.
        let mut next = (hole + 1) & self.mask;
        loop {
            let bucket = self.buckets[next];
            if bucket.is_vacant() {
                break;
            }
            let home = self.home(bucket.hash);
            let from_home = next.wrapping_sub(home) & self.mask;
            let from_hole = next.wrapping_sub(hole) & self.mask;
            if from_home >= from_hole {
                self.buckets[hole] = bucket;
                hole = next;
            }
            next = (next + 1) & self.mask;
        }
        self.buckets[hole] = Bucket::vacant();

        self.free.push(slot);
        self.len -= 1;
        Ok(SlotId(slot))
    }

    /// Remove every key and return all slots to the free list.
    pub fn clear(&mut self) {
        self.buckets.fill(Bucket::vacant());
        self.free.clear();
        self.free.extend((0..self.capacity).rev());
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Live keys with their slots, in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = (K, SlotId)> + '_ {
        self.buckets
            .iter()
            .filter(|b| !b.is_vacant())
            .map(|b| (b.key, SlotId(b.slot)))
    }

    /// Longest probe sequence among live keys, counting the home bucket.
    pub fn max_probe_len(&self) -> usize {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_vacant())
            .map(|(pos, b)| (pos.wrapping_sub(self.home(b.hash)) & self.mask) + 1)
            .max()
            .unwrap_or(0)
    }
}
