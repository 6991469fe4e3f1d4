//! Mesh streaming.
//!
//! Meshes live in a small family of large device-local buffers
//! ("megabuffers") carved into fixed-size parts:
//!
//! - [`BlockAllocator`] - hands out and takes back parts
//! - [`StagingBufferPool`] - recycles one-part CPU-visible upload buffers
//! - [`MeshStreamer`] - copies vertex data into staging buffers on the task
//!   scheduler and batches the staging-to-megabuffer copies once per frame
//!
//! # Example
//!
//! ```ignore
//! let id = engine.add_mesh(MeshData::from(vertices))?;
//! engine.render_frame()?; // the upload is recorded here
//! engine.delete_mesh(id)?;
//! ```

mod allocator;
mod staging;
mod transfer;
mod upload;
mod vertex;

pub use allocator::{BlockAllocation, BlockAllocator, MeshBufferPart};
pub use staging::{StagingBuffer, StagingBufferPool};
pub use transfer::{BarrierKind, TransferBatch, TransferCommand};
pub use upload::MeshStreamer;
pub use vertex::{FullVertex, MeshData};

/// Identifier of a streamed mesh.
///
/// Ids start at 1 and increase monotonically; an id is never handed out
/// twice, even after its mesh is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

impl std::fmt::Display for MeshId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
