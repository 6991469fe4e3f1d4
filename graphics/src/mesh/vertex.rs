//! Vertex record stored in the mesh megabuffers.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// The one vertex layout every streamed mesh uses.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct FullVertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
    /// Object-space tangent.
    pub tangent: [f32; 3],
    /// Primary texture coordinate, unorm16.
    pub main_uv: [u16; 2],
    /// Lightmap or detail texture coordinate.
    pub secondary_uv: [f32; 2],
    /// Virtual texture page table id.
    pub virtual_texture_id: u32,
    /// Free-form per-vertex data.
    pub additional_stuff: [f32; 4],
}

const_assert_eq!(std::mem::size_of::<FullVertex>(), 68);

impl FullVertex {
    /// Vertex at a position with every other attribute zeroed.
    pub fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Vertex payload handed to [`RenderEngine::add_mesh`](crate::RenderEngine::add_mesh).
///
/// The payload is shared: the mesh table keeps a reference for as long as the
/// mesh lives, and the copy tasks read from it concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    vertices: Arc<[FullVertex]>,
}

impl MeshData {
    /// Wrap a vertex list.
    pub fn new(vertices: impl Into<Arc<[FullVertex]>>) -> Self {
        Self {
            vertices: vertices.into(),
        }
    }

    /// The vertices.
    pub fn vertices(&self) -> &[FullVertex] {
        &self.vertices
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Raw bytes of the vertex records.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Size of the payload in bytes.
    pub fn byte_size(&self) -> u64 {
        self.as_bytes().len() as u64
    }
}

impl From<Vec<FullVertex>> for MeshData {
    fn from(vertices: Vec<FullVertex>) -> Self {
        Self::new(vertices)
    }
}
