//! Tile-based deferred backend.
//!
//! Models hardware that buffers a whole scene of commands and shades it in
//! tiles at drain time. Everything lives in unified memory: textures are
//! host-backed, the window scans out of a three-deep ring of color buffers,
//! and there is no residency pressure. Geometry is triangles-only; the
//! renderer front end lowers rects and copies before they get here.

use crate::cmd::{BlendMode, Topology, VertexKind};
use crate::coords::{IRect, Rgba8};
use crate::error::{RenderError, Result};
use crate::layout::PlanarLayout;
use crate::texture::{
    AddressMode, Backing, PixelFormat, ScaleMode, TextureAccess, TextureDesc, TextureEntry,
    TextureId, TextureTable,
};

use super::{Backend, BackendCaps, DisplayList, DrawBuffer, GpuOp, PolygonMode, ProgramKind};

/// Scanout ring depth. Two buffers stall the CPU on every vblank miss;
/// three keep it ahead of the display.
const SCANOUT_BUFFERS: usize = 3;

/// Texture rows must start on an 8-pixel boundary for the tile walker.
const WIDTH_ALIGN: u32 = 8;

const MAX_TEXTURE_SIZE: u32 = 4096;

/// Construction parameters for the deferred backend.
///
/// `width`/`height` fix the window surface size for the backend's lifetime.
#[derive(Debug, Clone)]
pub struct DeferredConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 544,
        }
    }
}

pub struct DeferredBackend {
    width: u32,
    height: u32,
    /// Scanout ring; `back` is the buffer being recorded into.
    buffers: [Vec<u8>; SCANOUT_BUFFERS],
    back: usize,
    current: DrawBuffer,
    list: DisplayList,
}

impl DeferredBackend {
    pub fn new(config: &DeferredConfig) -> Self {
        let size = (config.width * config.height * 4) as usize;
        Self {
            width: config.width,
            height: config.height,
            buffers: std::array::from_fn(|_| vec![0; size]),
            back: 0,
            current: DrawBuffer::Window,
            list: DisplayList::default(),
        }
    }

    /// Format handed to the sampler hardware. The two-plane orders are
    /// swapped here because the device samples NV12 data correctly only when
    /// declared as NV21 and vice versa; it should be the other way around.
    fn sample_format(format: PixelFormat) -> PixelFormat {
        match format {
            PixelFormat::Nv12 => PixelFormat::Nv21,
            PixelFormat::Nv21 => PixelFormat::Nv12,
            other => other,
        }
    }

    /// Executes pending ops against surface memory. Draws are left recorded;
    /// clears write the bound surface since later reads depend on them.
    fn drain(&mut self, textures: &mut TextureTable) -> Result<()> {
        let mut bound = self.current;
        // Replay from the list; ops were validated when recorded.
        let pending: Vec<GpuOp> = self.list.pending().to_vec();
        for op in pending {
            match op {
                GpuOp::SetDrawBuffer(buffer) => bound = buffer,
                GpuOp::Clear(color) => match bound {
                    DrawBuffer::Window => {
                        PixelFormat::Abgr8888.fill(&mut self.buffers[self.back], color);
                    }
                    DrawBuffer::Target(id) => {
                        let entry = textures.get_mut(id)?;
                        let format = entry.format;
                        if let Some(bytes) = entry.host_bytes_mut() {
                            format.fill(bytes, color);
                        }
                    }
                },
                _ => {}
            }
        }
        self.list.mark_drained();
        Ok(())
    }
}

impl Backend for DeferredBackend {
    fn name(&self) -> &'static str {
        "deferred"
    }

    fn caps(&self) -> BackendCaps {
        BackendCaps {
            native_sprites: false,
            native_triangle_fan: false,
            max_texture_size: MAX_TEXTURE_SIZE,
            target_readback: false,
        }
    }

    fn drawable_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_texture(
        &mut self,
        textures: &mut TextureTable,
        desc: &TextureDesc,
    ) -> Result<TextureId> {
        if desc.width == 0
            || desc.height == 0
            || desc.width > MAX_TEXTURE_SIZE
            || desc.height > MAX_TEXTURE_SIZE
        {
            return Err(RenderError::Backend(format!(
                "texture size {}x{} out of range",
                desc.width, desc.height
            )));
        }
        let format = Self::sample_format(desc.format);
        if format.is_planar() && desc.access == TextureAccess::Target {
            return Err(RenderError::InvalidAccess);
        }

        let padded_width = desc.width.next_multiple_of(WIDTH_ALIGN);
        let pitch = padded_width as usize * desc.format.bytes_per_pixel();
        let storage = if desc.format.is_planar() {
            PlanarLayout::new(desc.format, pitch, desc.height as usize).total_size()
        } else {
            pitch * desc.height as usize
        };

        let id = textures.insert(TextureEntry {
            width: desc.width,
            height: desc.height,
            padded_width,
            padded_height: desc.height,
            pitch,
            format: desc.format,
            access: desc.access,
            scale_mode: ScaleMode::Nearest,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            applied_scale_mode: None,
            applied_address: None,
            locked: false,
            swizzled: false,
            backing: Backing::Host(vec![0; storage]),
        });
        Ok(id)
    }

    fn destroy_texture(&mut self, textures: &mut TextureTable, id: TextureId) -> Result<()> {
        self.drain(textures)?;
        textures.remove(id).ok_or(RenderError::InvalidTexture)?;
        Ok(())
    }

    fn uv_scale(&self, textures: &TextureTable, id: TextureId) -> Result<(f32, f32)> {
        // The sampler sees normalized coordinates over the padded width.
        let entry = textures.get(id)?;
        Ok((
            1.0 / entry.padded_width as f32,
            1.0 / entry.height as f32,
        ))
    }

    fn prepare_lock(&mut self, textures: &mut TextureTable, id: TextureId) -> Result<()> {
        // In-flight scenes may still sample or render into this texture.
        self.drain(textures)?;
        textures.get(id)?;
        Ok(())
    }

    fn prepare_update(&mut self, textures: &mut TextureTable, id: TextureId) -> Result<()> {
        self.drain(textures)?;
        textures.get(id)?;
        Ok(())
    }

    fn begin_scene(
        &mut self,
        textures: &mut TextureTable,
        target: Option<TextureId>,
    ) -> Result<()> {
        let buffer = match target {
            Some(id) => {
                let entry = textures.get(id)?;
                if entry.access != TextureAccess::Target {
                    return Err(RenderError::InvalidAccess);
                }
                DrawBuffer::Target(id)
            }
            None => DrawBuffer::Window,
        };
        self.list.push(GpuOp::BeginScene);
        self.list.push(GpuOp::SetDrawBuffer(buffer));
        self.current = buffer;
        Ok(())
    }

    fn end_scene(&mut self) {
        self.list.push(GpuOp::EndScene);
    }

    fn set_viewport(&mut self, viewport: IRect) {
        self.list.push(GpuOp::SetViewport(viewport));
    }

    fn set_clip(&mut self, clip: IRect) {
        self.list.push(GpuOp::SetClip(clip));
    }

    fn disable_clip(&mut self) {
        self.list.push(GpuOp::DisableClip);
    }

    fn bind_program(&mut self, program: ProgramKind) {
        self.list.push(GpuOp::BindProgram(program));
    }

    fn set_blend(&mut self, blend: BlendMode) {
        self.list.push(GpuOp::SetBlend(blend));
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.list.push(GpuOp::BindTexture(texture));
    }

    fn set_sampler(&mut self, scale: ScaleMode, address_u: AddressMode, address_v: AddressMode) {
        self.list.push(GpuOp::SetSampler {
            scale,
            address_u,
            address_v,
        });
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.list.push(GpuOp::SetPolygonMode(mode));
    }

    fn clear(&mut self, color: Rgba8) {
        self.list.push(GpuOp::Clear(color));
    }

    fn draw(&mut self, topology: Topology, kind: VertexKind, first: usize, count: u32) {
        debug_assert!(matches!(
            topology,
            Topology::Points | Topology::Lines | Topology::Triangles | Topology::TriangleFan
        ));
        self.list.push(GpuOp::Draw {
            topology,
            kind,
            first,
            count,
        });
    }

    fn finish(&mut self, textures: &mut TextureTable) -> Result<()> {
        self.drain(textures)
    }

    fn present(&mut self, textures: &mut TextureTable, wait_vblank: bool) -> Result<()> {
        self.list.push(GpuOp::Swap { wait_vblank });
        self.drain(textures)?;
        self.back = (self.back + 1) % SCANOUT_BUFFERS;
        self.current = DrawBuffer::Window;
        Ok(())
    }

    fn read_pixels(
        &mut self,
        textures: &mut TextureTable,
        target: Option<TextureId>,
        rect: IRect,
    ) -> Result<(PixelFormat, Vec<u8>)> {
        // No resolve path from target surfaces back to the CPU.
        if target.is_some() {
            return Err(RenderError::ReadbackUnsupported("deferred"));
        }
        self.drain(textures)?;
        let rect = rect.clamped_to(IRect::new(0, 0, self.width as i32, self.height as i32));
        if rect.is_empty() {
            return Ok((PixelFormat::Abgr8888, Vec::new()));
        }
        let pitch = self.width as usize * 4;
        let row_bytes = rect.w as usize * 4;
        let mut out = Vec::with_capacity(row_bytes * rect.h as usize);
        let src = &self.buffers[self.back];
        for row in rect.y..rect.y + rect.h {
            let start = row as usize * pitch + rect.x as usize * 4;
            out.extend_from_slice(&src[start..start + row_bytes]);
        }
        Ok((PixelFormat::Abgr8888, out))
    }

    fn display_list(&self) -> &DisplayList {
        &self.list
    }
}
