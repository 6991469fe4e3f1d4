//! Fixed-size block allocator over the mesh megabuffers.
//!
//! Megabuffers are split into equally sized parts. A mesh receives as many
//! parts as its payload needs, rounded up, from any megabuffer: the parts of
//! one mesh need not be contiguous. Freed parts go back to the free list of
//! their megabuffer and are never compacted.

use crate::backend::{GpuBackend, GpuBuffer};
use crate::error::{ConfigError, GraphicsError};
use crate::settings::MeshOptions;
use crate::types::{BufferDescriptor, BufferUsage, MemoryLocation};

use super::transfer::{BarrierKind, TransferBatch};

/// One part of one megabuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshBufferPart {
    /// Index of the megabuffer.
    pub buffer_index: u32,
    /// Byte offset of the part inside the megabuffer.
    pub offset: u64,
}

/// The parts owned by one mesh.
///
/// Not `Clone`: an allocation is returned to the allocator exactly once, by
/// value, through [`BlockAllocator::free`].
#[derive(Debug, PartialEq, Eq)]
pub struct BlockAllocation {
    parts: Vec<MeshBufferPart>,
    byte_size: u64,
}

impl BlockAllocation {
    /// Parts in payload order: part `i` holds bytes `i * part_size ..`.
    pub fn parts(&self) -> &[MeshBufferPart] {
        &self.parts
    }

    /// Number of parts.
    pub fn part_count(&self) -> u32 {
        self.parts.len() as u32
    }

    /// Size of the payload the allocation was made for.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }
}

struct Megabuffer {
    buffer: GpuBuffer,
    // Popped from the back; initialised in descending order so fresh
    // buffers hand out low offsets first.
    free_parts: Vec<u32>,
}

/// Allocator of [`MeshBufferPart`]s.
pub struct BlockAllocator {
    options: MeshOptions,
    buffers: Vec<Megabuffer>,
}

impl BlockAllocator {
    /// Create an allocator. No megabuffer exists until the first allocation.
    pub fn new(options: MeshOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            options,
            buffers: Vec::new(),
        })
    }

    /// The sizing this allocator was created with.
    pub fn options(&self) -> &MeshOptions {
        &self.options
    }

    /// Number of megabuffers created so far.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// A megabuffer by index.
    pub fn buffer(&self, index: u32) -> Option<&GpuBuffer> {
        self.buffers.get(index as usize).map(|m| &m.buffer)
    }

    /// Free parts across the megabuffers created so far.
    pub fn free_part_count(&self) -> u32 {
        self.buffers.iter().map(|m| m.free_parts.len() as u32).sum()
    }

    /// Parts still obtainable: free parts plus the capacity of megabuffers
    /// that may yet be created under the ceiling.
    pub fn available_parts(&self) -> u32 {
        let uncreated = u64::from(self.options.max_buffers())
            .saturating_sub(self.buffers.len() as u64);
        let total = u64::from(self.free_part_count())
            + uncreated * u64::from(self.options.parts_per_buffer());
        u32::try_from(total).unwrap_or(u32::MAX)
    }

    /// Parts needed to hold `byte_size` bytes.
    pub fn parts_for(&self, byte_size: u64) -> u64 {
        byte_size.div_ceil(self.options.buffer_part_size)
    }

    /// Allocate parts for `byte_size` bytes.
    ///
    /// Fails with [`GraphicsError::MeshMemoryExhausted`] when the ceiling
    /// would be exceeded; the allocator is left untouched in that case.
    pub fn allocate(
        &mut self,
        backend: &dyn GpuBackend,
        byte_size: u64,
    ) -> Result<BlockAllocation, GraphicsError> {
        if byte_size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "cannot allocate an empty mesh".to_string(),
            ));
        }

        let available = self.available_parts();
        let needed = self.parts_for(byte_size);
        if needed > u64::from(available) {
            return Err(GraphicsError::MeshMemoryExhausted {
                requested_parts: u32::try_from(needed).unwrap_or(u32::MAX),
                available_parts: available,
            });
        }
        let needed = needed as u32;

        // Grow first so a failed buffer creation cannot strand popped parts.
        let free = self.free_part_count();
        if needed > free {
            let missing = needed - free;
            let new_buffers = missing.div_ceil(self.options.parts_per_buffer());
            for _ in 0..new_buffers {
                self.create_megabuffer(backend)?;
            }
        }

        let mut parts = Vec::with_capacity(needed as usize);
        for (index, megabuffer) in self.buffers.iter_mut().enumerate() {
            while parts.len() < needed as usize {
                let Some(part) = megabuffer.free_parts.pop() else {
                    break;
                };
                parts.push(MeshBufferPart {
                    buffer_index: index as u32,
                    offset: u64::from(part) * self.options.buffer_part_size,
                });
            }
            if parts.len() == needed as usize {
                break;
            }
        }

        debug_assert_eq!(parts.len(), needed as usize);
        Ok(BlockAllocation { parts, byte_size })
    }

    /// Return every part of `allocation` to its megabuffer's free list.
    pub fn free(&mut self, allocation: BlockAllocation) {
        for part in allocation.parts {
            let index = (part.offset / self.options.buffer_part_size) as u32;
            match self.buffers.get_mut(part.buffer_index as usize) {
                Some(megabuffer) => megabuffer.free_parts.push(index),
                None => log::error!(
                    "Freeing part of unknown megabuffer {}",
                    part.buffer_index
                ),
            }
        }
    }

    /// Record the barrier that lets prior reads of every megabuffer finish
    /// before the upload writes.
    pub fn record_barriers_before_upload<'a>(&'a self, batch: &mut TransferBatch<'a>) {
        for megabuffer in &self.buffers {
            batch.barrier(&megabuffer.buffer, BarrierKind::BeforeUpload);
        }
    }

    /// Record the barrier that makes the upload's writes visible to later reads.
    pub fn record_barriers_after_upload<'a>(&'a self, batch: &mut TransferBatch<'a>) {
        for megabuffer in &self.buffers {
            batch.barrier(&megabuffer.buffer, BarrierKind::AfterUpload);
        }
    }

    fn create_megabuffer(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        let index = self.buffers.len();
        let descriptor = BufferDescriptor::new(
            self.options.new_buffer_size,
            BufferUsage::VERTEX | BufferUsage::COPY_DST,
        )
        .with_location(MemoryLocation::GpuOnly)
        .with_label(format!("mesh megabuffer {index}"));
        let buffer = backend.create_buffer(&descriptor)?;

        let parts = self.options.parts_per_buffer();
        log::info!(
            "Created mesh megabuffer {} ({} bytes, {} parts)",
            index,
            self.options.new_buffer_size,
            parts
        );
        self.buffers.push(Megabuffer {
            buffer,
            free_parts: (0..parts).rev().collect(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for BlockAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAllocator")
            .field("options", &self.options)
            .field("buffers", &self.buffers.len())
            .field("free_parts", &self.free_part_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::backend::{DummyBackend, DummyEvent, ResourceKind};

    fn allocator(parts_per_buffer: u64, max_buffers: u64) -> BlockAllocator {
        BlockAllocator::new(MeshOptions::from_counts(4, parts_per_buffer, max_buffers)).unwrap()
    }

    #[test]
    fn rounds_up_to_whole_parts() {
        let backend = DummyBackend::new();
        let mut alloc = allocator(8, 2);
        let part = alloc.options().buffer_part_size;

        let a = alloc.allocate(&backend, 1).unwrap();
        assert_eq!(a.part_count(), 1);
        let b = alloc.allocate(&backend, part + 1).unwrap();
        assert_eq!(b.part_count(), 2);
        let c = alloc.allocate(&backend, part * 3).unwrap();
        assert_eq!(c.part_count(), 3);
        assert_eq!(alloc.free_part_count(), 2);
    }

    #[test]
    fn parts_are_aligned_and_unique() {
        let backend = DummyBackend::new();
        let mut alloc = allocator(4, 3);
        let part = alloc.options().buffer_part_size;

        let a = alloc.allocate(&backend, part * 3).unwrap();
        let b = alloc.allocate(&backend, part * 5).unwrap();

        let mut all: Vec<_> = a.parts().iter().chain(b.parts()).copied().collect();
        assert!(all.iter().all(|p| p.offset % part == 0));
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 8);
        assert_eq!(alloc.buffer_count(), 2);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(8)]
    #[case(16)]
    fn allocate_then_free_restores_free_count(#[case] parts: u64) {
        let backend = DummyBackend::new();
        let mut alloc = allocator(8, 2);
        // Materialize both megabuffers so the free count is comparable.
        let ceiling = alloc.options().max_total_allocation;
        let part = alloc.options().buffer_part_size;
        let warmup = alloc.allocate(&backend, ceiling).unwrap();
        alloc.free(warmup);
        let before = alloc.free_part_count();

        let allocation = alloc.allocate(&backend, parts * part).unwrap();
        assert_eq!(alloc.free_part_count(), before - parts as u32);
        alloc.free(allocation);
        assert_eq!(alloc.free_part_count(), before);
    }

    #[test]
    fn part_count_beyond_u32_is_rejected_up_front() {
        match BlockAllocator::new(MeshOptions::from_counts(1, 65_536, 65_536)) {
            Err(ConfigError::MeshOptions { field, .. }) => {
                assert_eq!(field, "max_total_allocation")
            }
            other => panic!("expected a mesh options error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn near_u32_part_ceiling_allocates() {
        let backend = DummyBackend::new();
        let mut alloc = BlockAllocator::new(MeshOptions::from_counts(1, 65_536, 65_535)).unwrap();
        assert_eq!(alloc.available_parts(), 65_536 * 65_535);

        let allocation = alloc
            .allocate(&backend, crate::settings::VERTEX_RECORD_SIZE)
            .unwrap();
        assert_eq!(allocation.part_count(), 1);
        assert_eq!(alloc.available_parts(), 65_536 * 65_535 - 1);
    }

    #[test]
    fn exceeding_ceiling_leaves_state_untouched() {
        let backend = DummyBackend::new();
        let mut alloc = allocator(4, 2);
        let part = alloc.options().buffer_part_size;
        let _held = alloc.allocate(&backend, part * 3).unwrap();

        let buffers = alloc.buffer_count();
        let free = alloc.free_part_count();
        let created = backend
            .journal()
            .count(|e| matches!(e, DummyEvent::Created { kind: ResourceKind::Buffer, .. }));

        let err = alloc.allocate(&backend, part * 6).unwrap_err();
        assert_eq!(
            err,
            GraphicsError::MeshMemoryExhausted {
                requested_parts: 6,
                available_parts: 5,
            }
        );
        assert!(err.is_recoverable());
        assert_eq!(alloc.buffer_count(), buffers);
        assert_eq!(alloc.free_part_count(), free);
        assert_eq!(
            backend
                .journal()
                .count(|e| matches!(e, DummyEvent::Created { kind: ResourceKind::Buffer, .. })),
            created
        );

        // The remaining capacity is still usable.
        assert!(alloc.allocate(&backend, part * 5).is_ok());
    }

    #[test]
    fn empty_allocation_is_rejected() {
        let backend = DummyBackend::new();
        let mut alloc = allocator(4, 1);
        assert!(matches!(
            alloc.allocate(&backend, 0),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn freed_parts_are_reused_before_growing() {
        let backend = DummyBackend::new();
        let mut alloc = allocator(4, 4);
        let part = alloc.options().buffer_part_size;

        let a = alloc.allocate(&backend, part * 4).unwrap();
        alloc.free(a);
        let _b = alloc.allocate(&backend, part * 4).unwrap();
        assert_eq!(alloc.buffer_count(), 1);
    }

    #[test]
    fn barriers_cover_every_megabuffer() {
        let backend = DummyBackend::new();
        let mut alloc = allocator(2, 4);
        let part = alloc.options().buffer_part_size;
        let _a = alloc.allocate(&backend, part * 5).unwrap();
        assert_eq!(alloc.buffer_count(), 3);

        let mut batch = TransferBatch::new();
        alloc.record_barriers_before_upload(&mut batch);
        alloc.record_barriers_after_upload(&mut batch);
        assert_eq!(batch.commands().len(), 6);
        assert_eq!(batch.copy_count(), 0);
    }

    static_assertions::assert_impl_all!(BlockAllocator: Send, Sync);
}
