//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU but simulates enough of one for the
//! engine's logic to be tested without hardware:
//!
//! - buffers own real host memory, and recorded copies are executed on the
//!   CPU when a transfer batch is submitted
//! - every submission signals its fence immediately
//! - object creation, destruction, barriers, copies and submissions are
//!   appended to a shared [`DummyJournal`]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::graph::RenderPassLayout;
use crate::mesh::{BarrierKind, TransferBatch, TransferCommand};
use crate::pipeline::{GraphicsPipelineDesc, ResourceBinding};
use crate::shader::ShaderStage;
use crate::swapchain::{AcquireOutcome, PresentOutcome, SwapchainImage, SwapchainProvider};
use crate::types::{BufferDescriptor, Extent2d, TextureDescriptor};

use super::{
    FrameSubmission, GpuBackend, GpuBuffer, GpuCommandList, GpuDescriptorSetLayout, GpuFence,
    GpuPipeline, GpuPipelineLayout, GpuRenderPass, GpuSemaphore, GpuShaderModule, GpuSubmission,
    GpuTexture, QueueIndices, WaitStage,
};

/// Kind of object a [`DummyHandle`] stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Fence,
    Semaphore,
    ShaderModule,
    RenderPass,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    CommandList,
    Submission,
}

/// Something the dummy backend did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyEvent {
    /// An object was created.
    Created { kind: ResourceKind, id: u64 },
    /// An object was destroyed.
    Destroyed { kind: ResourceKind, id: u64 },
    /// A megabuffer barrier was executed.
    Barrier { buffer: u64, kind: BarrierKind },
    /// A buffer copy was executed.
    Copy {
        src: u64,
        dst: u64,
        dst_offset: u64,
        size: u64,
    },
    /// A transfer batch was submitted on the copy queue.
    TransferSubmitted { copies: usize, signal: u64 },
    /// A frame was submitted on the graphics queue.
    FrameSubmitted {
        image_index: u32,
        waits: Vec<(u64, WaitStage)>,
        signal: u64,
        fence: u64,
        pass_count: usize,
    },
    /// A swapchain image was acquired.
    Acquired { image_index: u32, signal: u64 },
    /// A swapchain image was presented.
    Presented { image_index: u32, wait: u64 },
    /// A signaled fence was waited on.
    FenceWaited { fence: u64 },
    /// A fence was reset to unsignaled.
    FenceReset { fence: u64 },
    /// The device was waited idle.
    WaitIdle,
}

/// Append-only record of dummy backend activity, shared by every handle.
#[derive(Debug, Default)]
pub struct DummyJournal {
    events: Mutex<Vec<DummyEvent>>,
    next_id: AtomicU64,
}

impl DummyJournal {
    fn record(&self, event: DummyEvent) {
        self.events.lock().push(event);
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Snapshot of every event so far.
    pub fn events(&self) -> Vec<DummyEvent> {
        self.events.lock().clone()
    }

    /// Number of events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&DummyEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Objects of `kind` created and not yet destroyed.
    pub fn live(&self, kind: ResourceKind) -> usize {
        let events = self.events.lock();
        let created = events
            .iter()
            .filter(|e| matches!(e, DummyEvent::Created { kind: k, .. } if *k == kind))
            .count();
        let destroyed = events
            .iter()
            .filter(|e| matches!(e, DummyEvent::Destroyed { kind: k, .. } if *k == kind))
            .count();
        created - destroyed
    }

    /// Forget every event recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Identity of a dummy object. Journals its own destruction.
pub struct DummyHandle {
    id: u64,
    kind: ResourceKind,
    journal: Arc<DummyJournal>,
}

impl DummyHandle {
    fn new(kind: ResourceKind, journal: &Arc<DummyJournal>) -> Self {
        let id = journal.next_id();
        journal.record(DummyEvent::Created { kind, id });
        Self {
            id,
            kind,
            journal: Arc::clone(journal),
        }
    }

    /// Unique id of the object.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Kind of the object.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

impl Drop for DummyHandle {
    fn drop(&mut self) {
        self.journal.record(DummyEvent::Destroyed {
            kind: self.kind,
            id: self.id,
        });
    }
}

fn mismatch(what: &str) -> GraphicsError {
    GraphicsError::Internal(format!("{what} does not belong to the dummy backend"))
}

fn buffer_parts(buffer: &GpuBuffer) -> Result<(u64, &Mutex<Vec<u8>>), GraphicsError> {
    match buffer {
        GpuBuffer::Dummy { handle, data } => Ok((handle.id(), data)),
        #[allow(unreachable_patterns)]
        _ => Err(mismatch("buffer")),
    }
}

fn fence_parts(fence: &GpuFence) -> Result<(u64, &AtomicBool), GraphicsError> {
    match fence {
        GpuFence::Dummy { handle, signaled } => Ok((handle.id(), signaled)),
        #[allow(unreachable_patterns)]
        _ => Err(mismatch("fence")),
    }
}

fn semaphore_id(semaphore: &GpuSemaphore) -> Result<u64, GraphicsError> {
    match semaphore {
        GpuSemaphore::Dummy { handle } => Ok(handle.id()),
        #[allow(unreachable_patterns)]
        _ => Err(mismatch("semaphore")),
    }
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    journal: Arc<DummyJournal>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// The journal shared with every object this backend created.
    pub fn journal(&self) -> &Arc<DummyJournal> {
        &self.journal
    }

    /// Copy of a buffer's contents.
    ///
    /// Returns an empty vector for buffers of another backend.
    pub fn read_buffer(&self, buffer: &GpuBuffer) -> Vec<u8> {
        buffer_parts(buffer)
            .map(|(_, data)| data.lock().clone())
            .unwrap_or_default()
    }

    fn handle(&self, kind: ResourceKind) -> DummyHandle {
        DummyHandle::new(kind, &self.journal)
    }

    fn execute(&self, command: &TransferCommand<'_>) -> Result<(), GraphicsError> {
        match *command {
            TransferCommand::Barrier { buffer, kind } => {
                let (id, _) = buffer_parts(buffer)?;
                self.journal.record(DummyEvent::Barrier { buffer: id, kind });
            }
            TransferCommand::Copy {
                src,
                dst,
                dst_offset,
                size,
            } => {
                let (src_id, src_data) = buffer_parts(src)?;
                let (dst_id, dst_data) = buffer_parts(dst)?;
                let bytes = {
                    let src_data = src_data.lock();
                    let size = size as usize;
                    if size > src_data.len() {
                        return Err(GraphicsError::SubmissionFailed(format!(
                            "copy of {size} bytes overruns source buffer {src_id}"
                        )));
                    }
                    src_data[..size].to_vec()
                };
                let mut dst_data = dst_data.lock();
                let start = dst_offset as usize;
                let end = start + bytes.len();
                if end > dst_data.len() {
                    return Err(GraphicsError::SubmissionFailed(format!(
                        "copy to {start}..{end} overruns destination buffer {dst_id}"
                    )));
                }
                dst_data[start..end].copy_from_slice(&bytes);
                self.journal.record(DummyEvent::Copy {
                    src: src_id,
                    dst: dst_id,
                    dst_offset,
                    size,
                });
            }
        }
        Ok(())
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn queue_indices(&self) -> QueueIndices {
        QueueIndices {
            graphics: 0,
            copy: 1,
            compute: 2,
        }
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::Dummy {
            handle: self.handle(ResourceKind::Buffer),
            data: Mutex::new(vec![0; descriptor.size as usize]),
        })
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let (id, contents) = buffer_parts(buffer)?;
        let mut contents = contents.lock();
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "write to {start}..{end} overruns buffer {id} of {} bytes",
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{} {:?})",
            descriptor.label,
            descriptor.width,
            descriptor.height,
            descriptor.format
        );
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "texture {:?} has a zero extent",
                descriptor.label
            )));
        }
        Ok(GpuTexture::Dummy {
            handle: self.handle(ResourceKind::Texture),
        })
    }

    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError> {
        Ok(GpuFence::Dummy {
            handle: self.handle(ResourceKind::Fence),
            signaled: AtomicBool::new(signaled),
        })
    }

    fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        let (id, signaled) = fence_parts(fence)?;
        // Submissions complete immediately, so an unsignaled fence would
        // never be signaled.
        if signaled.load(Ordering::Acquire) {
            self.journal.record(DummyEvent::FenceWaited { fence: id });
            Ok(())
        } else {
            Err(GraphicsError::Internal(format!(
                "waiting on fence {id} that no submission will signal"
            )))
        }
    }

    fn reset_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        let (id, signaled) = fence_parts(fence)?;
        signaled.store(false, Ordering::Release);
        self.journal.record(DummyEvent::FenceReset { fence: id });
        Ok(())
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> bool {
        fence_parts(fence)
            .map(|(_, signaled)| signaled.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError> {
        Ok(GpuSemaphore::Dummy {
            handle: self.handle(ResourceKind::Semaphore),
        })
    }

    fn create_shader_module(
        &self,
        stage: ShaderStage,
        words: &[u32],
    ) -> Result<GpuShaderModule, GraphicsError> {
        if words.is_empty() {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "empty {stage:?} shader module"
            )));
        }
        Ok(GpuShaderModule::Dummy {
            handle: self.handle(ResourceKind::ShaderModule),
        })
    }

    fn create_render_pass(
        &self,
        layout: &RenderPassLayout,
    ) -> Result<GpuRenderPass, GraphicsError> {
        log::trace!(
            "DummyBackend: creating render pass '{}' ({} attachments)",
            layout.name,
            layout.attachments.len()
        );
        Ok(GpuRenderPass::Dummy {
            handle: self.handle(ResourceKind::RenderPass),
        })
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[ResourceBinding],
    ) -> Result<GpuDescriptorSetLayout, GraphicsError> {
        log::trace!(
            "DummyBackend: creating descriptor set layout ({} bindings)",
            bindings.len()
        );
        Ok(GpuDescriptorSetLayout::Dummy {
            handle: self.handle(ResourceKind::DescriptorSetLayout),
        })
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[GpuDescriptorSetLayout],
    ) -> Result<GpuPipelineLayout, GraphicsError> {
        log::trace!(
            "DummyBackend: creating pipeline layout ({} sets)",
            set_layouts.len()
        );
        Ok(GpuPipelineLayout::Dummy {
            handle: self.handle(ResourceKind::PipelineLayout),
        })
    }

    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDesc<'_>,
    ) -> Result<GpuPipeline, GraphicsError> {
        log::trace!(
            "DummyBackend: creating pipeline '{}' ({} stages)",
            descriptor.name,
            descriptor.stages.len()
        );
        Ok(GpuPipeline::Dummy {
            handle: self.handle(ResourceKind::Pipeline),
        })
    }

    fn create_frame_commands(&self) -> Result<GpuCommandList, GraphicsError> {
        Ok(GpuCommandList::Dummy {
            handle: self.handle(ResourceKind::CommandList),
        })
    }

    fn submit_transfer(
        &self,
        batch: &TransferBatch<'_>,
        signal: &GpuSemaphore,
    ) -> Result<GpuSubmission, GraphicsError> {
        let signal = semaphore_id(signal)?;
        for command in batch.commands() {
            self.execute(command)?;
        }
        self.journal.record(DummyEvent::TransferSubmitted {
            copies: batch.copy_count(),
            signal,
        });
        Ok(GpuSubmission::Dummy {
            handle: self.handle(ResourceKind::Submission),
        })
    }

    fn wait_submission(&self, submission: &GpuSubmission) -> Result<(), GraphicsError> {
        match submission {
            GpuSubmission::Dummy { .. } => Ok(()),
            #[allow(unreachable_patterns)]
            _ => Err(mismatch("submission")),
        }
    }

    fn submit_frame(&self, frame: &FrameSubmission<'_>) -> Result<(), GraphicsError> {
        if !matches!(frame.commands, GpuCommandList::Dummy { .. }) {
            return Err(mismatch("command list"));
        }
        let waits = frame
            .wait
            .iter()
            .map(|(semaphore, stage)| semaphore_id(semaphore).map(|id| (id, *stage)))
            .collect::<Result<Vec<_>, _>>()?;
        let signal = semaphore_id(frame.signal)?;
        let (fence, signaled) = fence_parts(frame.fence)?;

        self.journal.record(DummyEvent::FrameSubmitted {
            image_index: frame.image.index(),
            waits,
            signal,
            fence,
            pass_count: frame.pass_count,
        });
        signaled.store(true, Ordering::Release);
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.journal.record(DummyEvent::WaitIdle);
        Ok(())
    }
}

#[derive(Debug)]
struct SwapchainState {
    extent: Extent2d,
    image_count: u32,
    next_image: u32,
    stale_acquires: u32,
    acquired: Option<u32>,
}

/// Fake swapchain handing out images round-robin.
///
/// Clones share state, so a test can keep a clone to steer a swapchain the
/// engine owns.
#[derive(Debug, Clone)]
pub struct DummySwapchain {
    journal: Arc<DummyJournal>,
    state: Arc<Mutex<SwapchainState>>,
}

impl DummySwapchain {
    /// Create a swapchain recording into `backend`'s journal.
    pub fn new(backend: &DummyBackend, extent: Extent2d, image_count: u32) -> Self {
        Self {
            journal: Arc::clone(backend.journal()),
            state: Arc::new(Mutex::new(SwapchainState {
                extent,
                image_count: image_count.max(1),
                next_image: 0,
                stale_acquires: 0,
                acquired: None,
            })),
        }
    }

    /// Report the next `count` acquires as stale.
    pub fn force_stale(&self, count: u32) {
        self.state.lock().stale_acquires = count;
    }

    /// Change the reported extent.
    pub fn set_extent(&self, extent: Extent2d) {
        self.state.lock().extent = extent;
    }
}

impl SwapchainProvider for DummySwapchain {
    fn extent(&self) -> Extent2d {
        self.state.lock().extent
    }

    fn image_count(&self) -> u32 {
        self.state.lock().image_count
    }

    fn acquire_next_image(
        &mut self,
        signal: &GpuSemaphore,
    ) -> Result<AcquireOutcome, GraphicsError> {
        let signal = semaphore_id(signal)?;
        let mut state = self.state.lock();
        if state.stale_acquires > 0 {
            state.stale_acquires -= 1;
            return Ok(AcquireOutcome::Stale);
        }

        let image_index = state.next_image;
        state.next_image = (image_index + 1) % state.image_count;
        state.acquired = Some(image_index);
        self.journal
            .record(DummyEvent::Acquired { image_index, signal });
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn image(&self, index: u32) -> Result<SwapchainImage, GraphicsError> {
        if index < self.state.lock().image_count {
            Ok(SwapchainImage::Dummy { index })
        } else {
            Err(GraphicsError::InvalidParameter(format!(
                "swapchain image {index} out of range"
            )))
        }
    }

    fn present(
        &mut self,
        image_index: u32,
        wait: &GpuSemaphore,
    ) -> Result<PresentOutcome, GraphicsError> {
        let wait = semaphore_id(wait)?;
        let mut state = self.state.lock();
        if state.acquired.take() != Some(image_index) {
            return Err(GraphicsError::SubmissionFailed(format!(
                "presenting image {image_index} that was not acquired"
            )));
        }
        self.journal
            .record(DummyEvent::Presented { image_index, wait });
        Ok(PresentOutcome::Presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, MemoryLocation};

    #[test]
    fn test_dummy_backend_creation() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }

    #[test]
    fn handles_journal_their_lifetime() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();
        assert_eq!(backend.journal().live(ResourceKind::Fence), 1);
        drop(fence);
        assert_eq!(backend.journal().live(ResourceKind::Fence), 0);
    }

    #[test]
    fn fences_signal_on_frame_submit() {
        let backend = DummyBackend::new();
        let mut swapchain = DummySwapchain::new(&backend, Extent2d::new(4, 4), 2);
        let commands = backend.create_frame_commands().unwrap();
        let acquired = backend.create_semaphore().unwrap();
        let finished = backend.create_semaphore().unwrap();
        let fence = backend.create_fence(false).unwrap();

        assert!(backend.wait_fence(&fence).is_err());
        let AcquireOutcome::Acquired { image_index, .. } =
            swapchain.acquire_next_image(&acquired).unwrap()
        else {
            panic!("expected an image");
        };
        let image = swapchain.image(image_index).unwrap();
        backend
            .submit_frame(&FrameSubmission {
                commands: &commands,
                image: &image,
                wait: &[(&acquired, WaitStage::ColorAttachmentOutput)],
                signal: &finished,
                fence: &fence,
                pass_count: 0,
            })
            .unwrap();
        assert!(backend.is_fence_signaled(&fence));
        assert!(backend.wait_fence(&fence).is_ok());
        assert_eq!(
            swapchain.present(image_index, &finished).unwrap(),
            PresentOutcome::Presented
        );
    }

    #[test]
    fn transfer_executes_copies() {
        let backend = DummyBackend::new();
        let src = backend
            .create_buffer(
                &BufferDescriptor::new(4, BufferUsage::COPY_SRC)
                    .with_location(MemoryLocation::CpuToGpu),
            )
            .unwrap();
        let dst = backend
            .create_buffer(&BufferDescriptor::new(12, BufferUsage::COPY_DST))
            .unwrap();
        let signal = backend.create_semaphore().unwrap();

        backend.write_buffer(&src, 0, &[1, 2, 3, 4]).unwrap();
        let mut batch = TransferBatch::new();
        batch.copy(&src, &dst, 8, 4);
        let submission = backend.submit_transfer(&batch, &signal).unwrap();
        backend.wait_submission(&submission).unwrap();

        assert_eq!(
            backend.read_buffer(&dst),
            vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn write_out_of_bounds_fails() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(2, BufferUsage::COPY_SRC))
            .unwrap();
        assert!(backend.write_buffer(&buffer, 1, &[0, 0]).is_err());
    }

    #[test]
    fn stale_acquires_are_counted_down() {
        let backend = DummyBackend::new();
        let mut swapchain = DummySwapchain::new(&backend, Extent2d::new(4, 4), 3);
        let semaphore = backend.create_semaphore().unwrap();

        swapchain.force_stale(2);
        assert_eq!(
            swapchain.acquire_next_image(&semaphore).unwrap(),
            AcquireOutcome::Stale
        );
        assert_eq!(
            swapchain.acquire_next_image(&semaphore).unwrap(),
            AcquireOutcome::Stale
        );
        assert_eq!(
            swapchain.acquire_next_image(&semaphore).unwrap(),
            AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: false
            }
        );
    }
}
