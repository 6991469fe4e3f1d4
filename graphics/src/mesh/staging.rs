//! Pool of CPU-visible staging buffers, one part in size each.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::backend::{GpuBackend, GpuBuffer};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferUsage, MemoryLocation};

/// A pooled staging buffer.
///
/// Shared between the copy tasks that fill it and the upload that reads it.
pub type StagingBuffer = Arc<GpuBuffer>;

/// Recycles homogeneous staging buffers.
///
/// The free list has its own lock, held only for the push or pop.
pub struct StagingBufferPool {
    buffer_size: u64,
    free: Mutex<Vec<StagingBuffer>>,
    created: AtomicUsize,
}

impl StagingBufferPool {
    /// Create an empty pool of buffers of `buffer_size` bytes.
    pub fn new(buffer_size: u64) -> Self {
        Self {
            buffer_size,
            free: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Size of every buffer in the pool.
    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    /// Take a free buffer, creating one if the free list is empty.
    pub fn acquire(&self, backend: &dyn GpuBackend) -> Result<StagingBuffer, GraphicsError> {
        if let Some(buffer) = self.free.lock().pop() {
            return Ok(buffer);
        }

        let index = self.created.fetch_add(1, Ordering::Relaxed);
        let descriptor = BufferDescriptor::new(self.buffer_size, BufferUsage::COPY_SRC)
            .with_location(MemoryLocation::CpuToGpu)
            .with_label(format!("staging buffer {index}"));
        match backend.create_buffer(&descriptor) {
            Ok(buffer) => {
                log::trace!("Created staging buffer {}", index);
                Ok(Arc::new(buffer))
            }
            Err(e) => {
                self.created.fetch_sub(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Return a buffer to the free list.
    pub fn release(&self, buffer: StagingBuffer) {
        debug_assert_eq!(buffer.size(), self.buffer_size);
        self.free.lock().push(buffer);
    }

    /// Number of buffers on the free list.
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of buffers ever created by this pool.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for StagingBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingBufferPool")
            .field("buffer_size", &self.buffer_size)
            .field("free", &self.free_count())
            .field("created", &self.created_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn recycles_released_buffers() {
        let backend = DummyBackend::new();
        let pool = StagingBufferPool::new(256);

        let a = pool.acquire(&backend).unwrap();
        let b = pool.acquire(&backend).unwrap();
        assert_eq!(pool.created_count(), 2);
        assert_eq!(a.size(), 256);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.free_count(), 2);

        let _c = pool.acquire(&backend).unwrap();
        assert_eq!(pool.created_count(), 2);
        assert_eq!(pool.free_count(), 1);
    }

    static_assertions::assert_impl_all!(StagingBufferPool: Send, Sync);
}
