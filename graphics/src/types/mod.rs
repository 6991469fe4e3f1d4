//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! used throughout the graphics system.

mod buffer;
mod common;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, MemoryLocation};
pub use common::{Extent2d, ScissorRect, Viewport};
pub use texture::{PixelFormat, TextureDescriptor, TextureUsage};
