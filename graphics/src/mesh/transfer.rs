//! Copy-queue command batches.

use crate::backend::GpuBuffer;

/// Which side of an upload a megabuffer barrier guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    /// Prior reads must complete before the copies write.
    BeforeUpload,
    /// The copies' writes must be visible to later reads.
    AfterUpload,
}

/// One command recorded into a transfer batch.
#[derive(Debug, Clone, Copy)]
pub enum TransferCommand<'a> {
    /// Whole-buffer memory barrier on a megabuffer.
    Barrier {
        buffer: &'a GpuBuffer,
        kind: BarrierKind,
    },
    /// Buffer-to-buffer copy starting at offset 0 of `src`.
    Copy {
        src: &'a GpuBuffer,
        dst: &'a GpuBuffer,
        dst_offset: u64,
        size: u64,
    },
}

/// Ordered list of transfer commands submitted together on the copy queue.
#[derive(Debug, Default)]
pub struct TransferBatch<'a> {
    commands: Vec<TransferCommand<'a>>,
}

impl<'a> TransferBatch<'a> {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a barrier.
    pub fn barrier(&mut self, buffer: &'a GpuBuffer, kind: BarrierKind) {
        self.commands.push(TransferCommand::Barrier { buffer, kind });
    }

    /// Append a copy.
    pub fn copy(&mut self, src: &'a GpuBuffer, dst: &'a GpuBuffer, dst_offset: u64, size: u64) {
        self.commands.push(TransferCommand::Copy {
            src,
            dst,
            dst_offset,
            size,
        });
    }

    /// Recorded commands, in order.
    pub fn commands(&self) -> &[TransferCommand<'a>] {
        &self.commands
    }

    /// Number of copy commands.
    pub fn copy_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, TransferCommand::Copy { .. }))
            .count()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
