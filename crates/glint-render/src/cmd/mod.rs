//! The retained command queue.
//!
//! Draw calls never reach the backend directly. Each call bakes its vertices
//! into the frame pool and appends one command here; the translator walks the
//! queue at flush time, merging compatible neighbors into single native draws
//! and eliding redundant state changes along the way.

mod vertex;

pub use vertex::{ColorVertex, TextureVertex, VertexKind};

use crate::coords::{Color, IRect, Rgba8};
use crate::pool::Span;
use crate::texture::{AddressMode, ScaleMode, TextureId};

/// Native primitive interpretation of a vertex span.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Topology {
    Points,
    /// Independent line segments, two vertices each.
    Lines,
    /// Independent triangles, three vertices each.
    Triangles,
    /// One convex polygon; never merged with neighbors.
    TriangleFan,
    /// Axis-aligned rects from (top-left, bottom-right) vertex pairs. Only
    /// backends reporting `native_sprites` receive these.
    Sprites,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BlendMode {
    None,
    #[default]
    Blend,
    BlendPremultiplied,
    Add,
    AddPremultiplied,
    Mod,
    Mul,
}

/// One baked draw. Everything the translator needs to decide mergeability
/// and to set up native state is captured here at queue time; later renderer
/// state changes cannot retroactively affect it.
#[derive(Debug, Copy, Clone)]
pub struct DrawData {
    pub span: Span,
    pub kind: VertexKind,
    pub topology: Topology,
    /// Vertex count in the span.
    pub count: u32,
    pub texture: Option<TextureId>,
    pub blend: BlendMode,
    /// Sampler intent snapshot for `texture`, applied lazily by the state
    /// cache before the draw is issued.
    pub scale_mode: ScaleMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
}

impl DrawData {
    /// Two draws can collapse into one native draw when they agree on
    /// everything the GPU distinguishes them by.
    #[inline]
    pub fn can_merge(&self, next: &DrawData) -> bool {
        self.topology != Topology::TriangleFan
            && self.topology == next.topology
            && self.kind == next.kind
            && self.texture == next.texture
            && self.blend == next.blend
    }
}

#[derive(Debug, Copy, Clone)]
pub enum RenderCommand {
    /// A command whose effect was cancelled after queuing.
    NoOp,
    SetViewport(IRect),
    /// `None` disables clipping.
    SetClipRect(Option<IRect>),
    /// Updates the cached draw color for later bakes; no native effect.
    SetDrawColor(Color),
    /// Full-surface clear, color pre-packed at queue time.
    Clear(Rgba8),
    Draw(DrawData),
}

pub type CommandQueue = Vec<RenderCommand>;
