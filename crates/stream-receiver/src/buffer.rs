use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Bytes, BytesMut};

/// One decoder input buffer, shared between the receiver and the decoder side.
///
/// Cloning yields another handle to the same storage. Capacity is fixed at
/// creation.
#[derive(Clone)]
pub struct DecoderBuffer {
    inner: Arc<Mutex<BytesMut>>,
    capacity: usize,
}

impl DecoderBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        DecoderBuffer {
            inner: Arc::new(Mutex::new(BytesMut::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the contents with `payload`. Returns false, leaving the buffer
    /// untouched, if the payload does not fit.
    pub(crate) fn fill(&self, payload: &[u8]) -> bool {
        if payload.len() > self.capacity {
            return false;
        }
        let mut data = self.lock();
        data.clear();
        data.extend_from_slice(payload);
        true
    }

    /// Run `f` over the staged bytes.
    pub fn with_contents<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.lock())
    }

    /// Copy of the staged bytes.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock())
    }

    pub fn same_storage(&self, other: &DecoderBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BytesMut> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DecoderBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
