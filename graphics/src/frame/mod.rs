//! Frame slots for multiple frames in flight.
//!
//! [`FrameLoop`] owns one [`FrameSlot`] per frame in flight. A slot bundles
//! the synchronization objects one frame needs, and is reused every
//! `frames_in_flight` frames once the GPU has finished with it.
//!
//! # Synchronization Model
//!
//! | Object | Kind | Signaled by | Waited by |
//! |--------|------|-------------|-----------|
//! | `submit_fence` | Fence | graphics submission | CPU, before reusing the slot |
//! | `image_available` | Semaphore | swapchain acquire | graphics submission (colour output) |
//! | `upload_finished` | Semaphore | mesh upload batch | graphics submission (vertex input) |
//! | `render_finished` | Semaphore | graphics submission | present |
//!
//! # Slot Lifecycle
//!
//! ```text
//! Idle ──acquire──► Acquired ──submit──► Submitted ──present──► Presented ──advance──► Idle
//!   ▲                  │
//!   └───── stale ──────┘   (frame abandoned, slot not advanced)
//! ```
//!
//! # Frame Overlap
//!
//! With 2 frames in flight the CPU records frame N+1 while the GPU renders
//! frame N; it only blocks when it comes back to a slot whose previous frame
//! is still executing:
//!
//! ```text
//! Slot 0: [Frame 0] ──► [Frame 2] ──► [Frame 4] ──►
//! Slot 1: [Frame 1] ──► [Frame 3] ──► [Frame 5] ──►
//! ```

use crate::backend::{GpuBackend, GpuCommandList, GpuFence, GpuSemaphore};
use crate::error::{ConfigError, GraphicsError};
use crate::settings::MAX_FRAMES_IN_FLIGHT_LIMIT;

/// Where a frame slot is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SlotState {
    /// Not in use by the CPU.
    #[default]
    Idle,
    /// A swapchain image was acquired for the slot.
    Acquired { image_index: u32 },
    /// The slot's commands were submitted.
    Submitted { image_index: u32 },
    /// The slot's image was presented.
    Presented { image_index: u32 },
}

/// Synchronization objects and command list of one frame in flight.
pub struct FrameSlot {
    submit_fence: GpuFence,
    image_available: GpuSemaphore,
    upload_finished: GpuSemaphore,
    render_finished: GpuSemaphore,
    commands: GpuCommandList,
    state: SlotState,
}

impl FrameSlot {
    fn new(backend: &dyn GpuBackend) -> Result<Self, GraphicsError> {
        Ok(Self {
            // Signaled so the first wait on a fresh slot returns at once.
            submit_fence: backend.create_fence(true)?,
            image_available: backend.create_semaphore()?,
            upload_finished: backend.create_semaphore()?,
            render_finished: backend.create_semaphore()?,
            commands: backend.create_frame_commands()?,
            state: SlotState::Idle,
        })
    }

    /// Fence signaled when the slot's graphics submission completes.
    pub fn submit_fence(&self) -> &GpuFence {
        &self.submit_fence
    }

    /// Semaphore the swapchain signals when the acquired image is ready.
    pub fn image_available(&self) -> &GpuSemaphore {
        &self.image_available
    }

    /// Semaphore the mesh upload signals.
    pub fn upload_finished(&self) -> &GpuSemaphore {
        &self.upload_finished
    }

    /// Semaphore the graphics submission signals for present.
    pub fn render_finished(&self) -> &GpuSemaphore {
        &self.render_finished
    }

    /// Command list reused by every frame in this slot.
    pub fn commands(&self) -> &GpuCommandList {
        &self.commands
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SlotState {
        self.state
    }
}

impl std::fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSlot")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Manages multiple frames in flight for CPU-GPU parallelism.
///
/// # Thread Safety
///
/// `FrameLoop` is **not thread-safe** for mutation. It is owned by the
/// engine and driven from the thread calling `render_frame`.
#[derive(Debug)]
pub struct FrameLoop {
    slots: Vec<FrameSlot>,
    current_slot: usize,
    last_submitted: Option<usize>,
    frame_count: u64,
}

impl FrameLoop {
    /// Create `frames_in_flight` slots.
    pub fn new(backend: &dyn GpuBackend, frames_in_flight: usize) -> Result<Self, GraphicsError> {
        if !(1..=MAX_FRAMES_IN_FLIGHT_LIMIT).contains(&frames_in_flight) {
            return Err(ConfigError::FramesInFlight(frames_in_flight).into());
        }
        let slots = (0..frames_in_flight)
            .map(|_| FrameSlot::new(backend))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            slots,
            current_slot: 0,
            last_submitted: None,
            frame_count: 0,
        })
    }

    /// Get the number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Get the current frame slot index.
    ///
    /// Returns a value from 0 to `frames_in_flight - 1`.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// The current slot.
    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current_slot]
    }

    /// A slot by index.
    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    /// Get the total number of frames started.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Wait until the GPU has finished the previous frame in the current slot.
    pub fn begin_frame(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        backend.wait_fence(&self.slots[self.current_slot].submit_fence)?;
        self.frame_count += 1;
        log::trace!(
            "Begin frame {} (slot {})",
            self.frame_count,
            self.current_slot
        );
        Ok(())
    }

    /// Fence of the most recent graphics submission, if another slot made it.
    ///
    /// The current slot's own fence was already waited in
    /// [`begin_frame`](Self::begin_frame) and may have been reset since.
    pub fn rendering_done_fence(&self) -> Option<&GpuFence> {
        self.last_submitted
            .filter(|&slot| slot != self.current_slot)
            .map(|slot| &self.slots[slot].submit_fence)
    }

    /// Record that an image was acquired for the current slot.
    pub fn mark_acquired(&mut self, image_index: u32) {
        self.slots[self.current_slot].state = SlotState::Acquired { image_index };
    }

    /// Record that the current slot was submitted.
    pub fn mark_submitted(&mut self) {
        let slot = &mut self.slots[self.current_slot];
        if let SlotState::Acquired { image_index } = slot.state {
            slot.state = SlotState::Submitted { image_index };
        }
        self.last_submitted = Some(self.current_slot);
    }

    /// Record that the current slot's image was presented.
    pub fn mark_presented(&mut self) {
        let slot = &mut self.slots[self.current_slot];
        if let SlotState::Submitted { image_index } = slot.state {
            slot.state = SlotState::Presented { image_index };
        }
    }

    /// Drop the current frame without advancing.
    pub fn abandon_frame(&mut self) {
        self.slots[self.current_slot].state = SlotState::Idle;
        log::trace!("Abandoned frame {}", self.frame_count);
    }

    /// Finish the current frame and advance to the next slot.
    pub fn end_frame(&mut self) {
        log::trace!(
            "End frame {} (slot {})",
            self.frame_count,
            self.current_slot
        );
        self.slots[self.current_slot].state = SlotState::Idle;
        self.current_slot = (self.current_slot + 1) % self.slots.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, ResourceKind};

    #[test]
    fn test_new() {
        let backend = DummyBackend::new();
        let frames = FrameLoop::new(&backend, 2).unwrap();
        assert_eq!(frames.frames_in_flight(), 2);
        assert_eq!(frames.current_slot(), 0);
        assert_eq!(frames.frame_count(), 0);
        assert!(
            frames
                .slots
                .iter()
                .all(|slot| backend.is_fence_signaled(&slot.submit_fence))
        );
        assert_eq!(backend.journal().live(ResourceKind::Semaphore), 6);
        assert_eq!(backend.journal().live(ResourceKind::CommandList), 2);
    }

    #[test]
    fn test_invalid_frame_count() {
        let backend = DummyBackend::new();
        assert!(FrameLoop::new(&backend, 0).is_err());
        assert!(FrameLoop::new(&backend, MAX_FRAMES_IN_FLIGHT_LIMIT + 1).is_err());
    }

    #[test]
    fn test_end_frame_advances_slot() {
        let backend = DummyBackend::new();
        let mut frames = FrameLoop::new(&backend, 3).unwrap();
        for expected in [1, 2, 0] {
            frames.begin_frame(&backend).unwrap();
            frames.end_frame();
            assert_eq!(frames.current_slot(), expected);
        }
        assert_eq!(frames.frame_count(), 3);
    }

    #[test]
    fn test_slot_states() {
        let backend = DummyBackend::new();
        let mut frames = FrameLoop::new(&backend, 2).unwrap();
        frames.begin_frame(&backend).unwrap();
        frames.mark_acquired(1);
        assert_eq!(frames.current().state(), SlotState::Acquired { image_index: 1 });
        frames.mark_submitted();
        assert_eq!(frames.current().state(), SlotState::Submitted { image_index: 1 });
        frames.mark_presented();
        assert_eq!(frames.current().state(), SlotState::Presented { image_index: 1 });
        frames.end_frame();
        assert_eq!(frames.slot(0).unwrap().state(), SlotState::Idle);
    }

    #[test]
    fn test_abandon_keeps_slot() {
        let backend = DummyBackend::new();
        let mut frames = FrameLoop::new(&backend, 2).unwrap();
        frames.begin_frame(&backend).unwrap();
        frames.abandon_frame();
        assert_eq!(frames.current_slot(), 0);
        assert_eq!(frames.current().state(), SlotState::Idle);
    }

    #[test]
    fn test_rendering_done_fence_skips_current_slot() {
        let backend = DummyBackend::new();
        let mut single = FrameLoop::new(&backend, 1).unwrap();
        single.begin_frame(&backend).unwrap();
        single.mark_submitted();
        single.end_frame();
        assert!(single.rendering_done_fence().is_none());

        let mut double = FrameLoop::new(&backend, 2).unwrap();
        assert!(double.rendering_done_fence().is_none());
        double.begin_frame(&backend).unwrap();
        double.mark_submitted();
        double.end_frame();
        assert!(double.rendering_done_fence().is_some());
    }
}
