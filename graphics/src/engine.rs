//! The renderer context object.
//!
//! [`RenderEngine`] owns the backend, the task scheduler, the mesh streamer,
//! the frame loop, the swapchain and the compiled shaderpack. Everything is
//! reached through it; there is no global renderer state, so tests can run
//! several engines side by side.

use std::collections::HashMap;
use std::sync::Arc;

use nova_core::compute::TaskScheduler;

use crate::backend::{FrameSubmission, GpuBackend, WaitStage};
use crate::error::GraphicsError;
use crate::frame::FrameLoop;
use crate::graph::CompiledPasses;
use crate::mesh::{MeshData, MeshId, MeshStreamer};
use crate::pipeline::{CompiledPipeline, CompiledPipelines};
use crate::resources::{DynamicTexture, DynamicTextures};
use crate::settings::RenderSettings;
use crate::shader::ShaderCompiler;
use crate::shaderpack::{MaterialData, ShaderpackData};
use crate::swapchain::{AcquireOutcome, PresentOutcome, SwapchainProvider};

/// Result of one [`RenderEngine::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStatus {
    /// The frame was submitted and presented.
    Presented,
    /// The swapchain no longer matches the surface. Nothing was rendered
    /// if the acquire reported it; a stale present still advances the slot.
    Skipped,
}

/// Objects built from one shaderpack.
///
/// Fields drop in declaration order, which is the teardown order:
/// pipelines, passes, materials, then textures.
struct LoadedShaderpack {
    pipelines: CompiledPipelines,
    passes: CompiledPasses,
    materials: HashMap<String, MaterialData>,
    textures: DynamicTextures,
}

impl Drop for LoadedShaderpack {
    fn drop(&mut self) {
        log::debug!(
            "Tearing down shaderpack ({} pipelines, {} passes, {} textures)",
            self.pipelines.len(),
            self.passes.len(),
            self.textures.len()
        );
    }
}

/// The renderer.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use nova_graphics::backend::{DummyBackend, DummySwapchain};
/// use nova_graphics::shader::NagaShaderCompiler;
/// use nova_graphics::types::Extent2d;
/// use nova_graphics::{FrameStatus, RenderEngine, RenderSettings};
///
/// let backend = Arc::new(DummyBackend::new());
/// let swapchain = DummySwapchain::new(&backend, Extent2d::new(640, 480), 3);
/// let mut engine = RenderEngine::new(
///     backend,
///     Box::new(swapchain),
///     Box::new(NagaShaderCompiler::new()),
///     RenderSettings::default().with_worker_threads(2),
/// )
/// .unwrap();
///
/// assert_eq!(engine.render_frame().unwrap(), FrameStatus::Presented);
/// assert_eq!(engine.current_frame_slot(), 1);
/// ```
pub struct RenderEngine {
    // Field order is drop order; the backend goes last.
    shaderpack: Option<LoadedShaderpack>,
    frames: FrameLoop,
    meshes: MeshStreamer,
    scheduler: TaskScheduler,
    swapchain: Box<dyn SwapchainProvider>,
    compiler: Box<dyn ShaderCompiler>,
    settings: RenderSettings,
    backend: Arc<dyn GpuBackend>,
}

impl RenderEngine {
    /// Create the engine. Invalid settings abort construction.
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        swapchain: Box<dyn SwapchainProvider>,
        compiler: Box<dyn ShaderCompiler>,
        settings: RenderSettings,
    ) -> Result<Self, GraphicsError> {
        settings.validate()?;

        let meshes = MeshStreamer::new(Arc::clone(&backend), settings.mesh)?;
        let frames = FrameLoop::new(backend.as_ref(), settings.max_frames_in_flight)?;
        let scheduler = TaskScheduler::new(settings.worker_threads);

        let extent = swapchain.extent();
        log::info!(
            "Render engine created: backend={}, {} frames in flight, swapchain {}x{} ({} images)",
            backend.name(),
            settings.max_frames_in_flight,
            extent.width,
            extent.height,
            swapchain.image_count()
        );

        Ok(Self {
            shaderpack: None,
            frames,
            meshes,
            scheduler,
            swapchain,
            compiler,
            settings,
            backend,
        })
    }

    /// Add a mesh and return its id.
    ///
    /// The vertex data is copied into staging buffers before this returns
    /// and reaches GPU memory during the next frame.
    /// [`GraphicsError::MeshMemoryExhausted`] leaves the engine unchanged.
    pub fn add_mesh(&self, data: MeshData) -> Result<MeshId, GraphicsError> {
        self.meshes.add_mesh(&self.scheduler, data)
    }

    /// Delete a mesh and return its parts to the allocator.
    ///
    /// The caller must not delete a mesh that a frame still in flight draws.
    pub fn delete_mesh(&self, id: MeshId) -> Result<(), GraphicsError> {
        self.meshes.delete_mesh(id)
    }

    /// Replace the loaded shaderpack.
    ///
    /// Waits for the device to go idle and tears the old shaderpack down
    /// before building the new one. On error no shaderpack is loaded and
    /// frames keep presenting without passes.
    pub fn set_shaderpack(&mut self, data: ShaderpackData) -> Result<(), GraphicsError> {
        nova_core::profile_function!();

        if self.shaderpack.is_some() {
            self.backend.wait_idle()?;
            self.shaderpack = None;
        }

        let extent = self.swapchain.extent();
        let textures = DynamicTextures::create(self.backend.as_ref(), &data.textures, extent)?;

        let mut materials = HashMap::with_capacity(data.materials.len());
        for material in data.materials {
            let name = material.name.clone();
            if materials.insert(name.clone(), material).is_some() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "material '{name}' is declared twice"
                )));
            }
        }

        let passes = CompiledPasses::compile(self.backend.as_ref(), &data.passes, &textures)?;
        let pipelines = CompiledPipelines::compile(
            self.backend.as_ref(),
            self.compiler.as_ref(),
            &data.pipelines,
            &passes,
            extent,
        )?;

        log::info!(
            "Loaded shaderpack: {} textures, {} passes, {} pipelines, {} materials",
            textures.len(),
            passes.len(),
            pipelines.len(),
            materials.len()
        );

        self.shaderpack = Some(LoadedShaderpack {
            pipelines,
            passes,
            materials,
            textures,
        });
        Ok(())
    }

    /// Render and present one frame.
    ///
    /// 1. wait for the slot's previous submission
    /// 2. acquire a swapchain image, or skip the frame if the swapchain is stale
    /// 3. reset the slot's fence
    /// 4. upload staged meshes
    /// 5. submit the frame's commands
    /// 6. present
    /// 7. advance to the next slot
    pub fn render_frame(&mut self) -> Result<FrameStatus, GraphicsError> {
        nova_core::profile_function!();

        self.frames.begin_frame(self.backend.as_ref())?;

        let slot = self.frames.current();
        let image_index = match self.swapchain.acquire_next_image(slot.image_available())? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    log::trace!("Swapchain is suboptimal, rendering anyway");
                }
                image_index
            }
            AcquireOutcome::Stale => {
                log::debug!(
                    "Swapchain is stale, skipping frame {}",
                    self.frames.frame_count()
                );
                self.frames.abandon_frame();
                return Ok(FrameStatus::Skipped);
            }
        };
        self.frames.mark_acquired(image_index);

        let slot = self.frames.current();
        self.backend.reset_fence(slot.submit_fence())?;

        let uploaded = self.meshes.upload_pending(
            &self.scheduler,
            self.frames.rendering_done_fence(),
            slot.upload_finished(),
        )?;

        let image = self.swapchain.image(image_index)?;
        let mut wait = vec![(slot.image_available(), WaitStage::ColorAttachmentOutput)];
        if uploaded {
            wait.push((slot.upload_finished(), WaitStage::VertexInput));
        }
        self.backend.submit_frame(&FrameSubmission {
            commands: slot.commands(),
            image: &image,
            wait: &wait,
            signal: slot.render_finished(),
            fence: slot.submit_fence(),
            pass_count: self.shaderpack.as_ref().map_or(0, |s| s.passes.len()),
        })?;
        self.frames.mark_submitted();

        let outcome = self
            .swapchain
            .present(image_index, self.frames.current().render_finished())?;
        let status = match outcome {
            PresentOutcome::Presented | PresentOutcome::Suboptimal => {
                self.frames.mark_presented();
                FrameStatus::Presented
            }
            PresentOutcome::Stale => {
                log::debug!("Swapchain went stale during present");
                FrameStatus::Skipped
            }
        };
        self.frames.end_frame();

        nova_core::frame_mark!();
        Ok(status)
    }

    /// Index of the frame slot the next `render_frame` uses.
    pub fn current_frame_slot(&self) -> usize {
        self.frames.current_slot()
    }

    /// Frames started so far, skipped ones included.
    pub fn frame_count(&self) -> u64 {
        self.frames.frame_count()
    }

    /// Number of live meshes.
    pub fn mesh_count(&self) -> usize {
        self.meshes.mesh_count()
    }

    /// The mesh streamer.
    pub fn meshes(&self) -> &MeshStreamer {
        &self.meshes
    }

    /// Check if a shaderpack is loaded.
    pub fn has_shaderpack(&self) -> bool {
        self.shaderpack.is_some()
    }

    /// Pass names in execution order; empty without a shaderpack.
    pub fn pass_order(&self) -> &[String] {
        self.shaderpack
            .as_ref()
            .map(|s| s.passes.order())
            .unwrap_or_default()
    }

    /// Look up a compiled pipeline.
    pub fn pipeline(&self, name: &str) -> Option<&CompiledPipeline> {
        self.shaderpack.as_ref()?.pipelines.get(name)
    }

    /// Look up a material.
    pub fn material(&self, name: &str) -> Option<&MaterialData> {
        self.shaderpack.as_ref()?.materials.get(name)
    }

    /// Look up a dynamic texture.
    pub fn dynamic_texture(&self, name: &str) -> Option<&DynamicTexture> {
        self.shaderpack.as_ref()?.textures.get(name)
    }

    /// The backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// The task scheduler.
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// The settings the engine was created with.
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            log::warn!("Failed to wait for device idle on shutdown: {}", e);
        }
        log::info!(
            "Render engine shut down after {} frames",
            self.frames.frame_count()
        );
    }
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("backend", &self.backend.name())
            .field("frames", &self.frames)
            .field("meshes", &self.meshes)
            .field("has_shaderpack", &self.shaderpack.is_some())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(RenderEngine: Send);
