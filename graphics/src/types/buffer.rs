//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 2;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 3;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 4;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Where a buffer's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLocation {
    /// Device-local memory, not CPU accessible.
    #[default]
    GpuOnly,
    /// Persistently mapped memory the CPU writes and the GPU reads.
    CpuToGpu,
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Memory placement.
    pub location: MemoryLocation,
}

impl BufferDescriptor {
    /// Create a new device-local buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            location: MemoryLocation::GpuOnly,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the memory placement.
    pub fn with_location(mut self, location: MemoryLocation) -> Self {
        self.location = location;
        self
    }

    /// Whether the CPU can write the buffer directly.
    pub fn is_mapped(&self) -> bool {
        self.location == MemoryLocation::CpuToGpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_descriptor_is_mapped() {
        let desc = BufferDescriptor::new(256, BufferUsage::COPY_SRC)
            .with_label("staging")
            .with_location(MemoryLocation::CpuToGpu);
        assert!(desc.is_mapped());
        assert_eq!(desc.label.as_deref(), Some("staging"));
        assert!(!BufferDescriptor::new(256, BufferUsage::VERTEX).is_mapped());
    }
}
