//! CPU to staging to megabuffer upload pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use nova_core::compute::{AtomicCounter, Priority, TaskScheduler};
use parking_lot::Mutex;

use crate::backend::{GpuBackend, GpuFence, GpuSemaphore};
use crate::error::GraphicsError;
use crate::settings::MeshOptions;

use super::allocator::{BlockAllocation, BlockAllocator, MeshBufferPart};
use super::staging::{StagingBuffer, StagingBufferPool};
use super::transfer::TransferBatch;
use super::vertex::MeshData;
use super::MeshId;

/// Staging buffers filled for one mesh, waiting for the next upload step.
struct StagingUpload {
    mesh: MeshId,
    staging: Vec<StagingBuffer>,
    parts: Vec<MeshBufferPart>,
}

struct MeshEntry {
    allocation: BlockAllocation,
    data: MeshData,
}

/// Owner of the mesh table and everything needed to stream meshes in.
///
/// The mesh table, the upload queue, the staging free list and the
/// allocator each have their own lock and none is held while waiting on
/// the scheduler or the GPU.
pub struct MeshStreamer {
    backend: Arc<dyn GpuBackend>,
    allocator: Mutex<BlockAllocator>,
    staging: Arc<StagingBufferPool>,
    upload_queue: Mutex<Vec<StagingUpload>>,
    meshes: Mutex<HashMap<MeshId, MeshEntry>>,
    next_id: AtomicU32,
}

impl MeshStreamer {
    /// Create a streamer. Fails if the mesh options are inconsistent.
    pub fn new(backend: Arc<dyn GpuBackend>, options: MeshOptions) -> Result<Self, GraphicsError> {
        let allocator = BlockAllocator::new(options)?;
        Ok(Self {
            backend,
            allocator: Mutex::new(allocator),
            staging: Arc::new(StagingBufferPool::new(options.buffer_part_size)),
            upload_queue: Mutex::new(Vec::new()),
            meshes: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        })
    }

    /// Add a mesh.
    ///
    /// Returns once the vertex data sits in staging buffers. The data reaches
    /// the megabuffers during the next [`upload_pending`](Self::upload_pending).
    pub fn add_mesh(
        &self,
        scheduler: &TaskScheduler,
        data: MeshData,
    ) -> Result<MeshId, GraphicsError> {
        nova_core::profile_function!();

        let allocation = self
            .allocator
            .lock()
            .allocate(self.backend.as_ref(), data.byte_size())?;

        let mut staging = Vec::with_capacity(allocation.parts().len());
        for _ in allocation.parts() {
            match self.staging.acquire(self.backend.as_ref()) {
                Ok(buffer) => staging.push(buffer),
                Err(e) => {
                    self.rollback(staging, allocation);
                    return Err(e);
                }
            }
        }

        let part_size = self.staging.buffer_size() as usize;
        let total = data.as_bytes().len();
        let counter = AtomicCounter::new();
        let failure: Arc<Mutex<Option<GraphicsError>>> = Arc::new(Mutex::new(None));

        for (index, buffer) in staging.iter().enumerate() {
            let start = index * part_size;
            let end = (start + part_size).min(total);
            let backend = Arc::clone(&self.backend);
            let buffer = Arc::clone(buffer);
            let payload = data.clone();
            let failure = Arc::clone(&failure);

            scheduler.spawn_counted(Priority::Critical, &counter, move || {
                // The last slice may be shorter than a part.
                let bytes = &payload.as_bytes()[start..end];
                if let Err(e) = backend.write_buffer(&buffer, 0, bytes) {
                    failure.lock().get_or_insert(e);
                }
            });
        }
        scheduler.wait_for_counter(&counter);

        if let Some(e) = failure.lock().take() {
            self.rollback(staging, allocation);
            return Err(e);
        }

        let id = MeshId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.upload_queue.lock().push(StagingUpload {
            mesh: id,
            staging,
            parts: allocation.parts().to_vec(),
        });

        log::debug!(
            "Added mesh {} ({} vertices, {} parts)",
            id,
            data.vertex_count(),
            allocation.part_count()
        );
        self.meshes.lock().insert(id, MeshEntry { allocation, data });
        Ok(id)
    }

    /// Delete a mesh and return its parts to the allocator.
    ///
    /// A staged upload that has not been submitted yet is dropped with the
    /// mesh. Deleting a mesh whose upload is already in flight is only
    /// sound once the frame that submitted it has completed.
    pub fn delete_mesh(&self, id: MeshId) -> Result<(), GraphicsError> {
        let entry = self
            .meshes
            .lock()
            .remove(&id)
            .ok_or(GraphicsError::UnknownMesh(id))?;

        let dropped: Vec<StagingUpload> = {
            let mut queue = self.upload_queue.lock();
            let (dropped, kept) = std::mem::take(&mut *queue)
                .into_iter()
                .partition(|upload| upload.mesh == id);
            *queue = kept;
            dropped
        };
        for upload in dropped {
            for buffer in upload.staging {
                self.staging.release(buffer);
            }
        }

        self.allocator.lock().free(entry.allocation);
        log::debug!("Deleted mesh {}", id);
        Ok(())
    }

    /// Submit every staged upload as one copy-queue batch.
    ///
    /// Does nothing and returns `false` when the upload queue is empty.
    /// Otherwise waits for `rendering_done` (the last graphics submission)
    /// so the copies cannot race reads of the megabuffers, submits the
    /// batch signalling `signal`, and schedules the return of the staging
    /// buffers once the batch completes.
    pub fn upload_pending(
        &self,
        scheduler: &TaskScheduler,
        rendering_done: Option<&GpuFence>,
        signal: &GpuSemaphore,
    ) -> Result<bool, GraphicsError> {
        nova_core::profile_scope!("mesh_upload");

        if self.upload_queue.lock().is_empty() {
            return Ok(false);
        }
        if let Some(fence) = rendering_done {
            self.backend.wait_fence(fence)?;
        }

        let allocator = self.allocator.lock();
        let part_size = allocator.options().buffer_part_size;
        let uploads = std::mem::take(&mut *self.upload_queue.lock());

        let submitted = {
            let mut batch = TransferBatch::new();
            allocator.record_barriers_before_upload(&mut batch);
            let mut recorded = Ok(());
            for upload in &uploads {
                for (buffer, part) in upload.staging.iter().zip(&upload.parts) {
                    match allocator.buffer(part.buffer_index) {
                        // Whole parts are copied: a part never holds two meshes.
                        Some(dst) => batch.copy(buffer, dst, part.offset, part_size),
                        None => {
                            recorded = Err(GraphicsError::Internal(format!(
                                "mesh {} references missing megabuffer {}",
                                upload.mesh, part.buffer_index
                            )));
                        }
                    }
                }
            }
            allocator.record_barriers_after_upload(&mut batch);
            log::trace!("Submitting mesh upload: {} copies", batch.copy_count());
            recorded.and_then(|()| self.backend.submit_transfer(&batch, signal))
        };
        nova_core::profile_plot!("Mesh: free parts", allocator.free_part_count());
        drop(allocator);

        let staging: Vec<StagingBuffer> = uploads.into_iter().flat_map(|u| u.staging).collect();
        let submission = match submitted {
            Ok(submission) => submission,
            Err(e) => {
                for buffer in staging {
                    self.staging.release(buffer);
                }
                return Err(e);
            }
        };

        let backend = Arc::clone(&self.backend);
        let pool = Arc::clone(&self.staging);
        scheduler.spawn(Priority::Low, move || {
            if let Err(e) = backend.wait_submission(&submission) {
                log::error!("Mesh upload did not complete: {}", e);
            }
            drop(submission);
            for buffer in staging {
                pool.release(buffer);
            }
        });
        Ok(true)
    }

    /// Number of live meshes.
    pub fn mesh_count(&self) -> usize {
        self.meshes.lock().len()
    }

    /// Check if a mesh id is live.
    pub fn contains(&self, id: MeshId) -> bool {
        self.meshes.lock().contains_key(&id)
    }

    /// Vertex data of a live mesh.
    pub fn mesh_data(&self, id: MeshId) -> Option<MeshData> {
        self.meshes.lock().get(&id).map(|entry| entry.data.clone())
    }

    /// Parts of a live mesh, in payload order.
    pub fn mesh_parts(&self, id: MeshId) -> Option<Vec<MeshBufferPart>> {
        self.meshes
            .lock()
            .get(&id)
            .map(|entry| entry.allocation.parts().to_vec())
    }

    /// Number of meshes staged but not yet submitted.
    pub fn pending_uploads(&self) -> usize {
        self.upload_queue.lock().len()
    }

    /// The staging buffer pool.
    pub fn staging_pool(&self) -> &StagingBufferPool {
        &self.staging
    }

    /// Run `f` with the allocator locked.
    pub fn with_allocator<R>(&self, f: impl FnOnce(&BlockAllocator) -> R) -> R {
        f(&self.allocator.lock())
    }

    fn rollback(&self, staging: Vec<StagingBuffer>, allocation: BlockAllocation) {
        for buffer in staging {
            self.staging.release(buffer);
        }
        self.allocator.lock().free(allocation);
    }
}

impl std::fmt::Debug for MeshStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshStreamer")
            .field("backend", &self.backend.name())
            .field("meshes", &self.mesh_count())
            .field("pending_uploads", &self.pending_uploads())
            .finish_non_exhaustive()
    }
}
