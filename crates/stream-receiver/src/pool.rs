use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::buffer::DecoderBuffer;
use crate::clock::ClockSample;
use crate::error::ReceiverError;

/// Index of a slot in a [`BufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(usize);

impl SlotIndex {
    pub fn new(index: usize) -> Self {
        SlotIndex(index)
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// Decode the "negative means no free buffer" convention.
    pub fn from_sentinel(raw: i32) -> Option<Self> {
        usize::try_from(raw).ok().map(SlotIndex)
    }

    /// Encode back into the sentinel convention.
    pub fn to_sentinel(slot: Option<SlotIndex>) -> i32 {
        slot.and_then(|s| i32::try_from(s.0).ok()).unwrap_or(-1)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Occupancy of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    /// Handed to the producer. `len` and `sample` are set once the AU is staged.
    Busy {
        len: usize,
        sample: Option<ClockSample>,
    },
}

impl SlotState {
    pub fn is_free(&self) -> bool {
        matches!(self, SlotState::Free)
    }
}

/// Fixed-size occupancy ledger over the decoder's input buffers.
///
/// The decoder side picks which free slot to use; the pool only records
/// Free/Busy transitions so that a busy slot is never handed out twice.
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    buffers: Vec<DecoderBuffer>,
    slots: Mutex<Vec<SlotState>>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, Vec<SlotState>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, index: usize) -> Result<(), ReceiverError> {
        let mut slots = self.lock();
        match slots.get_mut(index) {
            None => Err(ReceiverError::InvalidSlot {
                index,
                reason: "out of range",
            }),
            Some(SlotState::Free) => Err(ReceiverError::InvalidSlot {
                index,
                reason: "already free",
            }),
            Some(state) => {
                *state = SlotState::Free;
                trace!(slot = index, "slot released");
                Ok(())
            }
        }
    }

    fn busy_count(&self) -> usize {
        self.lock().iter().filter(|s| !s.is_free()).count()
    }
}

impl BufferPool {
    pub fn new(buffers: Vec<DecoderBuffer>) -> Self {
        let slots = vec![SlotState::Free; buffers.len()];
        BufferPool {
            inner: Arc::new(PoolInner {
                buffers,
                slots: Mutex::new(slots),
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.buffers.len()
    }

    /// Ask the decoder side for a free slot and mark it busy.
    ///
    /// `query` is called once, outside the ledger lock. An answer that is out
    /// of range or already busy is treated as "none available".
    pub fn acquire_free<F>(&self, query: F) -> Option<SlotIndex>
    where
        F: FnOnce() -> Option<SlotIndex>,
    {
        let slot = query()?;

        let mut slots = self.inner.lock();
        match slots.get_mut(slot.get()) {
            None => {
                warn!(%slot, size = self.inner.buffers.len(), "free buffer index out of range");
                None
            }
            Some(state) if !state.is_free() => {
                warn!(%slot, "free buffer index is still busy");
                None
            }
            Some(state) => {
                *state = SlotState::Busy {
                    len: 0,
                    sample: None,
                };
                trace!(%slot, "slot acquired");
                Some(slot)
            }
        }
    }

    /// Record the staged byte count and clock sample of a busy slot.
    pub fn mark_busy(
        &self,
        slot: SlotIndex,
        len: usize,
        sample: ClockSample,
    ) -> Result<(), ReceiverError> {
        let index = slot.get();
        let mut slots = self.inner.lock();
        match slots.get_mut(index) {
            None => Err(ReceiverError::InvalidSlot {
                index,
                reason: "out of range",
            }),
            Some(SlotState::Free) => Err(ReceiverError::InvalidSlot {
                index,
                reason: "not acquired",
            }),
            Some(state) => {
                *state = SlotState::Busy {
                    len,
                    sample: Some(sample),
                };
                Ok(())
            }
        }
    }

    /// Return a busy slot to the free state.
    pub fn release(&self, slot: SlotIndex) -> Result<(), ReceiverError> {
        self.inner.release(slot.get())
    }

    pub fn state(&self, slot: SlotIndex) -> Option<SlotState> {
        self.inner.lock().get(slot.get()).copied()
    }

    pub fn buffer(&self, slot: SlotIndex) -> Option<&DecoderBuffer> {
        self.inner.buffers.get(slot.get())
    }

    pub fn busy_count(&self) -> usize {
        self.inner.busy_count()
    }

    /// Handle for releasing slots from the decoder's execution context.
    pub fn releaser(&self) -> SlotReleaser {
        SlotReleaser {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("size", &self.size())
            .field("busy", &self.busy_count())
            .finish()
    }
}

/// Cloneable release handle shared with the decoder side.
#[derive(Clone)]
pub struct SlotReleaser {
    inner: Arc<PoolInner>,
}

impl SlotReleaser {
    /// Mark `slot` free. Safe to call from any thread at any time after
    /// acquisition; a double release is rejected without touching the ledger.
    pub fn release(&self, slot: SlotIndex) -> Result<(), ReceiverError> {
        self.inner.release(slot.get())
    }

    pub fn size(&self) -> usize {
        self.inner.buffers.len()
    }

    pub fn busy_count(&self) -> usize {
        self.inner.busy_count()
    }
}

impl fmt::Debug for SlotReleaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotReleaser")
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(size: usize) -> BufferPool {
        BufferPool::new((0..size).map(|_| DecoderBuffer::with_capacity(16)).collect())
    }

    #[test]
    fn test_sentinel_conversion() {
        assert_eq!(SlotIndex::from_sentinel(-1), None);
        assert_eq!(SlotIndex::from_sentinel(3), Some(SlotIndex::new(3)));
        assert_eq!(SlotIndex::to_sentinel(None), -1);
        assert_eq!(SlotIndex::to_sentinel(Some(SlotIndex::new(2))), 2);
    }

    #[test]
    fn test_acquire_marks_busy() {
        let pool = pool(2);
        let slot = pool.acquire_free(|| Some(SlotIndex::new(1))).unwrap();
        assert_eq!(slot, SlotIndex::new(1));
        assert_eq!(
            pool.state(slot),
            Some(SlotState::Busy {
                len: 0,
                sample: None
            })
        );
        assert_eq!(pool.busy_count(), 1);
    }

    #[test]
    fn test_acquire_none_available() {
        let pool = pool(2);
        assert!(pool.acquire_free(|| None).is_none());
        assert_eq!(pool.busy_count(), 0);
    }

    #[test]
    fn test_busy_slot_not_handed_out_twice() {
        let pool = pool(2);
        assert!(pool.acquire_free(|| Some(SlotIndex::new(0))).is_some());
        assert!(pool.acquire_free(|| Some(SlotIndex::new(0))).is_none());

        pool.release(SlotIndex::new(0)).unwrap();
        assert!(pool.acquire_free(|| Some(SlotIndex::new(0))).is_some());
    }

    #[test]
    fn test_out_of_range_answer() {
        let pool = pool(2);
        assert!(pool.acquire_free(|| Some(SlotIndex::new(5))).is_none());
    }

    #[test]
    fn test_mark_busy_records_occupancy() {
        let pool = pool(1);
        let slot = pool.acquire_free(|| Some(SlotIndex::new(0))).unwrap();
        let sample = ClockSample {
            rtp_extended_timestamp: 3000,
            ntp_timestamp: 0,
            local_timestamp: 42,
        };
        pool.mark_busy(slot, 7, sample).unwrap();
        assert_eq!(
            pool.state(slot),
            Some(SlotState::Busy {
                len: 7,
                sample: Some(sample)
            })
        );
    }

    #[test]
    fn test_mark_busy_requires_acquisition() {
        let pool = pool(1);
        let err = pool
            .mark_busy(SlotIndex::new(0), 1, ClockSample::default())
            .unwrap_err();
        assert!(matches!(err, ReceiverError::InvalidSlot { index: 0, .. }));
    }

    #[test]
    fn test_release_errors_leave_ledger_untouched() {
        let pool = pool(2);
        pool.acquire_free(|| Some(SlotIndex::new(1))).unwrap();

        assert_eq!(
            pool.release(SlotIndex::new(0)),
            Err(ReceiverError::InvalidSlot {
                index: 0,
                reason: "already free"
            })
        );
        assert_eq!(
            pool.release(SlotIndex::new(9)),
            Err(ReceiverError::InvalidSlot {
                index: 9,
                reason: "out of range"
            })
        );
        assert_eq!(pool.busy_count(), 1);

        pool.release(SlotIndex::new(1)).unwrap();
        assert!(pool.release(SlotIndex::new(1)).is_err());
        assert_eq!(pool.busy_count(), 0);
    }

    #[test]
    fn test_releaser_shares_ledger() {
        let pool = pool(3);
        let releaser = pool.releaser();
        let slot = pool.acquire_free(|| Some(SlotIndex::new(2))).unwrap();
        assert_eq!(releaser.busy_count(), 1);
        assert_eq!(releaser.size(), 3);

        std::thread::spawn(move || releaser.release(slot))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(pool.state(slot), Some(SlotState::Free));
    }
}
