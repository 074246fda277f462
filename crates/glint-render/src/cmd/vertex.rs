use bytemuck::{Pod, Zeroable};

use crate::coords::Rgba8;

/// Untextured vertex as baked into the frame pool.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub x: f32,
    pub y: f32,
    pub color: Rgba8,
}

/// Textured vertex as baked into the frame pool. UVs are already scaled to
/// the backend's sampling space at bake time.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct TextureVertex {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
    pub color: Rgba8,
}

/// Which of the two vertex layouts a draw's span contains.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VertexKind {
    Color,
    Texture,
}

impl VertexKind {
    #[inline]
    pub const fn stride(self) -> usize {
        match self {
            VertexKind::Color => size_of::<ColorVertex>(),
            VertexKind::Texture => size_of::<TextureVertex>(),
        }
    }
}
