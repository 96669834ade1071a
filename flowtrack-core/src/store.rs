//! Per-slot record storage.

use flowtrack_common::{Error, Result, SlotId};

/// Flat array of records addressed by the slots a
/// [`HashIndex`](crate::index::HashIndex) hands out.
///
/// A slot that was freed and not yet reused still holds its last record.
pub struct FlowStore<T> {
    records: Box<[T]>,
}

impl<T: Copy + Default> FlowStore<T> {
    /// Create a store of `capacity` default records.
    pub fn new(capacity: u32) -> Result<Self> {
        let mut records = Vec::new();
        records
            .try_reserve_exact(capacity as usize)
            .map_err(|_| Error::Allocation(capacity))?;
        records.resize(capacity as usize, T::default());
        Ok(Self {
            records: records.into_boxed_slice(),
        })
    }

    #[inline]
    fn check(&self, slot: SlotId) -> usize {
        let idx = slot.index();
        assert!(
            idx < self.records.len(),
            "{} out of range for store of {} records",
            slot,
            self.records.len()
        );
        idx
    }

    #[inline]
    pub fn read(&self, slot: SlotId) -> &T {
        &self.records[self.check(slot)]
    }

    #[inline]
    pub fn read_mut(&mut self, slot: SlotId) -> &mut T {
        let idx = self.check(slot);
        &mut self.records[idx]
    }

    #[inline]
    pub fn write(&mut self, slot: SlotId, record: T) {
        let idx = self.check(slot);
        self.records[idx] = record;
    }

    pub fn capacity(&self) -> u32 {
        self.records.len() as u32
    }
}
