//! Renderer settings.
//!
//! Settings are consumed, not loaded: the application fills these structs
//! (or keeps the defaults) and [`RenderEngine::new`](crate::RenderEngine::new)
//! validates them once at startup.

use crate::error::ConfigError;
use crate::mesh::FullVertex;

/// Upper bound for [`RenderSettings::max_frames_in_flight`].
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 4;

/// Size of one vertex record in bytes.
pub const VERTEX_RECORD_SIZE: u64 = std::mem::size_of::<FullVertex>() as u64;

/// Sizing of the mesh megabuffers.
///
/// Each megabuffer is `new_buffer_size` bytes split into parts of
/// `buffer_part_size` bytes; at most `max_total_allocation` bytes of
/// megabuffers are ever created. Sizes must nest exactly:
/// the part size is a multiple of [`VERTEX_RECORD_SIZE`], the buffer size a
/// multiple of the part size, and the ceiling a multiple of the buffer size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshOptions {
    /// Size of one allocation part. Defaults to 1024 vertex records.
    pub buffer_part_size: u64,
    /// Size of each megabuffer. Defaults to 64 parts.
    pub new_buffer_size: u64,
    /// Ceiling on the sum of all megabuffers. Defaults to 16 megabuffers.
    pub max_total_allocation: u64,
}

impl Default for MeshOptions {
    fn default() -> Self {
        let buffer_part_size = VERTEX_RECORD_SIZE * 1024;
        let new_buffer_size = buffer_part_size * 64;
        Self {
            buffer_part_size,
            new_buffer_size,
            max_total_allocation: new_buffer_size * 16,
        }
    }
}

impl MeshOptions {
    /// Options sized in vertex records and parts instead of bytes.
    pub fn from_counts(vertices_per_part: u64, parts_per_buffer: u64, max_buffers: u64) -> Self {
        let buffer_part_size = VERTEX_RECORD_SIZE * vertices_per_part;
        let new_buffer_size = buffer_part_size * parts_per_buffer;
        Self {
            buffer_part_size,
            new_buffer_size,
            max_total_allocation: new_buffer_size * max_buffers,
        }
    }

    /// Parts in one megabuffer.
    pub fn parts_per_buffer(&self) -> u32 {
        (self.new_buffer_size / self.buffer_part_size) as u32
    }

    /// Maximum number of megabuffers.
    pub fn max_buffers(&self) -> u32 {
        (self.max_total_allocation / self.new_buffer_size) as u32
    }

    /// Check the exact-multiple relationships, naming the first violated field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("buffer_part_size", self.buffer_part_size),
            ("new_buffer_size", self.new_buffer_size),
            ("max_total_allocation", self.max_total_allocation),
        ] {
            if value == 0 {
                return Err(ConfigError::MeshOptions {
                    field,
                    reason: "must not be zero".to_string(),
                });
            }
        }

        if self.buffer_part_size % VERTEX_RECORD_SIZE != 0 {
            return Err(ConfigError::MeshOptions {
                field: "buffer_part_size",
                reason: format!(
                    "must be a multiple of the vertex record size ({VERTEX_RECORD_SIZE} bytes)"
                ),
            });
        }
        if self.new_buffer_size % self.buffer_part_size != 0 {
            return Err(ConfigError::MeshOptions {
                field: "new_buffer_size",
                reason: "must be a multiple of mesh.buffer_part_size".to_string(),
            });
        }
        if self.max_total_allocation % self.new_buffer_size != 0 {
            return Err(ConfigError::MeshOptions {
                field: "max_total_allocation",
                reason: "must be a multiple of mesh.new_buffer_size".to_string(),
            });
        }
        if u32::try_from(self.new_buffer_size / self.buffer_part_size).is_err() {
            return Err(ConfigError::MeshOptions {
                field: "new_buffer_size",
                reason: "holds more parts than can be addressed".to_string(),
            });
        }
        if u32::try_from(self.max_total_allocation / self.buffer_part_size).is_err() {
            return Err(ConfigError::MeshOptions {
                field: "max_total_allocation",
                reason: "holds more parts than can be addressed".to_string(),
            });
        }
        Ok(())
    }
}

/// Settings for a [`RenderEngine`](crate::RenderEngine).
///
/// # Example
///
/// ```
/// use nova_graphics::{MeshOptions, RenderSettings};
///
/// let settings = RenderSettings::default()
///     .with_max_frames_in_flight(3)
///     .with_mesh(MeshOptions::from_counts(256, 16, 4));
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderSettings {
    /// Megabuffer sizing.
    pub mesh: MeshOptions,
    /// Number of frame slots (default: 2).
    pub max_frames_in_flight: usize,
    /// Scheduler worker threads; 0 uses one per core (default: 0).
    pub worker_threads: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            mesh: MeshOptions::default(),
            max_frames_in_flight: 2,
            worker_threads: 0,
        }
    }
}

impl RenderSettings {
    /// Set the megabuffer sizing.
    pub fn with_mesh(mut self, mesh: MeshOptions) -> Self {
        self.mesh = mesh;
        self
    }

    /// Set the number of frame slots.
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Set the number of scheduler worker threads.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Validate every setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mesh.validate()?;
        if !(1..=MAX_FRAMES_IN_FLIGHT_LIMIT).contains(&self.max_frames_in_flight) {
            return Err(ConfigError::FramesInFlight(self.max_frames_in_flight));
        }
        Ok(())
    }
}
