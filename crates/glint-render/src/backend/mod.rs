//! Native device abstraction.
//!
//! A backend models one class of hardware behind the shared renderer front
//! end. Ops are recorded into a per-frame [`DisplayList`] and consumed at
//! drain points (`finish`, `present`); clears execute against the bound
//! surface's bytes at drain so surface contents stay observable, while draw
//! ops are recorded for submission-order inspection without rasterizing.

pub mod deferred;
pub mod overcommit;

pub use deferred::{DeferredBackend, DeferredConfig};
pub use overcommit::{OvercommitBackend, OvercommitConfig};

use crate::cmd::{BlendMode, Topology, VertexKind};
use crate::coords::{IRect, Rgba8};
use crate::error::Result;
use crate::texture::{AddressMode, ScaleMode, TextureDesc, TextureId, TextureTable};

/// Shader program slots shared by both backends. The fixed-function backend
/// maps these onto pipeline toggles instead of real programs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProgramKind {
    /// Fullscreen clear path, bypasses scissor state.
    Clear,
    Color,
    Texture,
}

/// Primitive fill rule for backends that render everything as polygons.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PolygonMode {
    Point,
    Line,
    Fill,
}

/// Which surface subsequent ops render into.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DrawBuffer {
    Window,
    Target(TextureId),
}

/// One recorded native operation.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuOp {
    BeginScene,
    SetDrawBuffer(DrawBuffer),
    SetViewport(IRect),
    SetClip(IRect),
    DisableClip,
    BindProgram(ProgramKind),
    SetBlend(BlendMode),
    BindTexture(Option<TextureId>),
    SetSampler {
        scale: ScaleMode,
        address_u: AddressMode,
        address_v: AddressMode,
    },
    SetPolygonMode(PolygonMode),
    /// Routes fragment alpha through the stencil unit. Needed when the bound
    /// target's format keeps alpha in a bit the color path cannot write.
    SetStencilAlphaWrite(bool),
    Clear(Rgba8),
    Draw {
        topology: Topology,
        kind: VertexKind,
        /// Byte offset of the first vertex in the frame pool arena.
        first: usize,
        count: u32,
    },
    EndScene,
    Swap {
        wait_vblank: bool,
    },
}

/// Recorded ops for the frame in flight, with a drain cursor.
///
/// Ops before the cursor have been consumed by the device; everything after
/// it is pending. The list resets lazily once a fully drained frame starts
/// recording again.
#[derive(Debug, Default)]
pub struct DisplayList {
    ops: Vec<GpuOp>,
    cursor: usize,
}

impl DisplayList {
    pub fn push(&mut self, op: GpuOp) {
        if self.cursor == self.ops.len() && matches!(op, GpuOp::BeginScene) && !self.ops.is_empty()
        {
            self.ops.clear();
            self.cursor = 0;
        }
        self.ops.push(op);
    }

    /// Every op recorded since the last reset, drained or not.
    #[inline]
    pub fn ops(&self) -> &[GpuOp] {
        &self.ops
    }

    /// Ops not yet consumed by a drain point.
    #[inline]
    pub fn pending(&self) -> &[GpuOp] {
        &self.ops[self.cursor..]
    }

    /// Marks everything recorded so far as consumed.
    pub fn mark_drained(&mut self) {
        self.cursor = self.ops.len();
    }

    /// Count of recorded draw ops, for batching assertions.
    pub fn draw_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, GpuOp::Draw { .. }))
            .count()
    }
}

/// What a backend can consume natively. The renderer front end lowers
/// geometry differently depending on these.
#[derive(Debug, Copy, Clone)]
pub struct BackendCaps {
    /// Accepts two-vertex axis-aligned rects (`Topology::Sprites`).
    pub native_sprites: bool,
    /// Accepts `Topology::TriangleFan`.
    pub native_triangle_fan: bool,
    pub max_texture_size: u32,
    /// Reading pixels back from a render target is possible.
    pub target_readback: bool,
}

/// The native device seam. One renderer drives exactly one backend; all
/// texture storage decisions (padding, pitch, backing tier) belong to the
/// backend, while logical texture identity lives in the shared table.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn caps(&self) -> BackendCaps;
    /// Pixel size of the window surface.
    fn drawable_size(&self) -> (u32, u32);

    fn create_texture(&mut self, textures: &mut TextureTable, desc: &TextureDesc)
    -> Result<TextureId>;
    fn destroy_texture(&mut self, textures: &mut TextureTable, id: TextureId) -> Result<()>;

    /// UV multiplier mapping texel coordinates into this backend's sampling
    /// space for `id`.
    fn uv_scale(&self, textures: &TextureTable, id: TextureId) -> Result<(f32, f32)>;

    /// Called before the renderer hands out a CPU pointer to `id`'s pixels.
    /// Backends drain in-flight work and migrate backing as needed.
    fn prepare_lock(&mut self, textures: &mut TextureTable, id: TextureId) -> Result<()>;

    /// Called before the renderer rewrites `id`'s pixels. Backends drain
    /// in-flight work and move the texture somewhere host-writable.
    fn prepare_update(&mut self, textures: &mut TextureTable, id: TextureId) -> Result<()>;

    /// Opens a scene on the window (`None`) or a render target.
    fn begin_scene(&mut self, textures: &mut TextureTable, target: Option<TextureId>)
    -> Result<()>;
    fn end_scene(&mut self);

    fn set_viewport(&mut self, viewport: IRect);
    fn set_clip(&mut self, clip: IRect);
    fn disable_clip(&mut self);
    fn bind_program(&mut self, program: ProgramKind);
    fn set_blend(&mut self, blend: BlendMode);
    fn bind_texture(&mut self, texture: Option<TextureId>);
    fn set_sampler(&mut self, scale: ScaleMode, address_u: AddressMode, address_v: AddressMode);
    fn set_polygon_mode(&mut self, mode: PolygonMode);
    fn clear(&mut self, color: Rgba8);
    fn draw(&mut self, topology: Topology, kind: VertexKind, first: usize, count: u32);

    /// Drains all recorded work; on return every prior op's effects are
    /// visible in surface memory.
    fn finish(&mut self, textures: &mut TextureTable) -> Result<()>;
    /// Drains, swaps scanout buffers and retires the frame.
    fn present(&mut self, textures: &mut TextureTable, wait_vblank: bool) -> Result<()>;

    /// Reads a rect of the given surface (`None` for the window) as tightly
    /// packed rows, top-down, in the surface's own format.
    fn read_pixels(
        &mut self,
        textures: &mut TextureTable,
        target: Option<TextureId>,
        rect: IRect,
    ) -> Result<(crate::texture::PixelFormat, Vec<u8>)>;

    fn display_list(&self) -> &DisplayList;
}
