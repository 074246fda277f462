//! Fixed-function VRAM-overcommit backend.
//!
//! Models hardware with a small dedicated video memory pool and immediate
//! command consumption. Render targets compete for the pool: activating or
//! creating one may spill the least-recently-targeted resident target to a
//! host copy, and spilled targets promote back (re-tiled) on next use. The
//! device consumes axis-aligned sprites and triangle fans natively, so the
//! renderer front end sends rects through unlowered.

use crate::cmd::{BlendMode, Topology, VertexKind};
use crate::coords::{IRect, Rgba8};
use crate::error::{RenderError, Result};
use crate::layout::{tile_eligible, unswizzle};
use crate::residency::{self, ResidencyLru, VramBlock, VramPool};
use crate::texture::{
    AddressMode, Backing, PixelFormat, ScaleMode, TextureAccess, TextureDesc, TextureEntry,
    TextureId, TextureTable,
};

use super::{Backend, BackendCaps, DisplayList, DrawBuffer, GpuOp, PolygonMode, ProgramKind};

const MAX_TEXTURE_SIZE: u32 = 512;

/// Construction parameters for the overcommit backend.
///
/// `vram_capacity` bounds everything the fast tier holds: both scanout
/// buffers plus however many render targets fit; the rest spill.
#[derive(Debug, Clone)]
pub struct OvercommitConfig {
    pub width: u32,
    pub height: u32,
    pub vram_capacity: usize,
}

impl Default for OvercommitConfig {
    fn default() -> Self {
        Self {
            width: 480,
            height: 272,
            vram_capacity: 2 * 1024 * 1024,
        }
    }
}

pub struct OvercommitBackend {
    width: u32,
    height: u32,
    /// Framebuffer row stride in bytes (power-of-two pixel pitch).
    fb_pitch: usize,
    /// Double-buffered scanout, both permanently resident in the pool.
    framebuffers: [VramBlock; 2],
    back: usize,
    pool: VramPool,
    lru: ResidencyLru,
    current: DrawBuffer,
    stencil_alpha: bool,
    list: DisplayList,
}

impl OvercommitBackend {
    pub fn new(config: &OvercommitConfig) -> Result<Self> {
        let pitch_px = config.width.next_power_of_two().max(64);
        let fb_pitch = pitch_px as usize * 4;
        let fb_size = fb_pitch * config.height as usize;
        let mut pool = VramPool::new(config.vram_capacity);
        let framebuffers = [pool.alloc(fb_size)?, pool.alloc(fb_size)?];
        Ok(Self {
            width: config.width,
            height: config.height,
            fb_pitch,
            framebuffers,
            back: 0,
            pool,
            lru: ResidencyLru::new(),
            current: DrawBuffer::Window,
            stencil_alpha: false,
            list: DisplayList::default(),
        })
    }

    fn supported(format: PixelFormat) -> bool {
        matches!(
            format,
            PixelFormat::Bgr565
                | PixelFormat::Abgr1555
                | PixelFormat::Abgr4444
                | PixelFormat::Abgr8888
        )
    }

    /// Sampled textures are tiled unless they are rewritten every frame or
    /// too small for the texture cache to care.
    fn should_tile(desc: &TextureDesc, pitch: usize, padded_height: u32) -> bool {
        desc.access != TextureAccess::Streaming
            && (desc.width >= 16 || desc.height >= 16)
            && tile_eligible(pitch, padded_height as usize)
    }

    fn surface_size(pitch: usize, padded_height: u32) -> usize {
        pitch * padded_height as usize
    }

    /// Immediate-mode consumption of pending ops. Clears write the bound
    /// surface; a uniform fill is layout-independent, so tiled targets need
    /// no untile here.
    fn drain(&mut self, textures: &mut TextureTable) -> Result<()> {
        let mut bound = self.current;
        let pending: Vec<GpuOp> = self.list.pending().to_vec();
        for op in pending {
            match op {
                GpuOp::SetDrawBuffer(buffer) => bound = buffer,
                GpuOp::Clear(color) => match bound {
                    DrawBuffer::Window => {
                        let block = self.framebuffers[self.back];
                        PixelFormat::Abgr8888.fill(self.pool.bytes_mut(block), color);
                    }
                    DrawBuffer::Target(id) => {
                        let entry = textures.get_mut(id)?;
                        let format = entry.format;
                        match &mut entry.backing {
                            Backing::Video(block) => {
                                let block = *block;
                                format.fill(self.pool.bytes_mut(block), color);
                            }
                            Backing::Host(bytes) => format.fill(bytes, color),
                        }
                    }
                },
                _ => {}
            }
        }
        self.list.mark_drained();
        Ok(())
    }

    fn set_stencil_alpha(&mut self, enabled: bool) {
        if self.stencil_alpha != enabled {
            self.stencil_alpha = enabled;
            self.list.push(GpuOp::SetStencilAlphaWrite(enabled));
        }
    }

    #[cfg(test)]
    pub(crate) fn vram_available(&self) -> usize {
        self.pool.available()
    }
}

impl Backend for OvercommitBackend {
    fn name(&self) -> &'static str {
        "overcommit"
    }

    fn caps(&self) -> BackendCaps {
        BackendCaps {
            native_sprites: true,
            native_triangle_fan: true,
            max_texture_size: MAX_TEXTURE_SIZE,
            target_readback: true,
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
        if !Self::supported(desc.format) {
            return Err(RenderError::UnsupportedFormat(desc.format));
        }
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

        let padded_width = desc.width.next_power_of_two();
        let padded_height = desc.height.next_power_of_two();
        let pitch = padded_width as usize * desc.format.bytes_per_pixel();
        let surface = Self::surface_size(pitch, padded_height);

        let mut entry = TextureEntry {
            width: desc.width,
            height: desc.height,
            padded_width,
            padded_height,
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
            backing: Backing::Host(vec![0; surface]),
        };

        if desc.access == TextureAccess::Target {
            // Targets go straight to the fast tier, evicting colder targets
            // if the pool is full.
            self.drain(textures)?;
            let wanted = surface.next_multiple_of(16);
            residency::spill_for_space(&mut self.lru, textures, &mut self.pool, wanted, None)?;
            let block = self.pool.alloc(surface)?;
            self.pool.bytes_mut(block).fill(0);
            entry.backing = Backing::Video(block);
            entry.swizzled = tile_eligible(pitch, padded_height as usize);
            let id = textures.insert(entry);
            self.lru.push_front(id);
            return Ok(id);
        }

        entry.swizzled = Self::should_tile(desc, pitch, padded_height);
        Ok(textures.insert(entry))
    }

    fn destroy_texture(&mut self, textures: &mut TextureTable, id: TextureId) -> Result<()> {
        self.drain(textures)?;
        self.lru.remove(id);
        let entry = textures.remove(id).ok_or(RenderError::InvalidTexture)?;
        if let Backing::Video(block) = entry.backing {
            self.pool.free(block);
        }
        Ok(())
    }

    fn uv_scale(&self, textures: &TextureTable, id: TextureId) -> Result<(f32, f32)> {
        // The texture unit takes raw texel coordinates.
        textures.get(id)?;
        Ok((1.0, 1.0))
    }

    fn prepare_lock(&mut self, textures: &mut TextureTable, id: TextureId) -> Result<()> {
        let entry = textures.get(id)?;
        // Target pixels live tiled in the pool; there is no linear CPU view
        // to hand out without a readback path.
        if entry.access == TextureAccess::Target {
            return Err(RenderError::ReadbackUnsupported("overcommit"));
        }
        self.drain(textures)
    }

    fn prepare_update(&mut self, textures: &mut TextureTable, id: TextureId) -> Result<()> {
        self.drain(textures)?;
        // Fast-tier pixels have no direct CPU view; updates land in a host
        // copy and the texture promotes again on next activation.
        if textures.get(id)?.is_video_resident() {
            residency::spill(textures, &mut self.pool, id)?;
            self.lru.remove(id);
        }
        Ok(())
    }

    fn begin_scene(
        &mut self,
        textures: &mut TextureTable,
        target: Option<TextureId>,
    ) -> Result<()> {
        let buffer = match target {
            Some(id) => {
                let (access, pitch, padded_height, resident) = {
                    let entry = textures.get(id)?;
                    (
                        entry.access,
                        entry.pitch,
                        entry.padded_height,
                        entry.is_video_resident(),
                    )
                };
                if access != TextureAccess::Target {
                    return Err(RenderError::InvalidAccess);
                }
                // Residency moves touch pool memory, so pending work must
                // land first.
                self.drain(textures)?;
                if !resident {
                    let wanted = Self::surface_size(pitch, padded_height).next_multiple_of(16);
                    residency::spill_for_space(
                        &mut self.lru,
                        textures,
                        &mut self.pool,
                        wanted,
                        Some(id),
                    )?;
                    residency::promote(textures, &mut self.pool, id, true)?;
                }
                if self.lru.contains(id) {
                    self.lru.bring_front(id);
                } else {
                    self.lru.push_front(id);
                }
                DrawBuffer::Target(id)
            }
            None => DrawBuffer::Window,
        };

        self.list.push(GpuOp::BeginScene);
        self.list.push(GpuOp::SetDrawBuffer(buffer));
        self.current = buffer;

        let stencil = match buffer {
            DrawBuffer::Target(id) => textures.get(id)?.format == PixelFormat::Abgr1555,
            DrawBuffer::Window => false,
        };
        self.set_stencil_alpha(stencil);
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
        self.back ^= 1;
        self.current = DrawBuffer::Window;
        Ok(())
    }

    fn read_pixels(
        &mut self,
        textures: &mut TextureTable,
        target: Option<TextureId>,
        rect: IRect,
    ) -> Result<(PixelFormat, Vec<u8>)> {
        self.drain(textures)?;
        match target {
            None => {
                let rect =
                    rect.clamped_to(IRect::new(0, 0, self.width as i32, self.height as i32));
                if rect.is_empty() {
                    return Ok((PixelFormat::Abgr8888, Vec::new()));
                }
                let row_bytes = rect.w as usize * 4;
                let mut out = Vec::with_capacity(row_bytes * rect.h as usize);
                let src = self.pool.bytes(self.framebuffers[self.back]);
                for row in rect.y..rect.y + rect.h {
                    let start = row as usize * self.fb_pitch + rect.x as usize * 4;
                    out.extend_from_slice(&src[start..start + row_bytes]);
                }
                Ok((PixelFormat::Abgr8888, out))
            }
            Some(id) => {
                let entry = textures.get(id)?;
                let format = entry.format;
                let pitch = entry.pitch;
                let padded_height = entry.padded_height as usize;
                let surface = pitch * padded_height;
                let bpp = format.bytes_per_pixel();
                let rect = rect.clamped_to(IRect::new(
                    0,
                    0,
                    entry.width as i32,
                    entry.height as i32,
                ));
                if rect.is_empty() {
                    return Ok((format, Vec::new()));
                }

                let linear: Vec<u8> = match &entry.backing {
                    Backing::Video(block) => {
                        let src = &self.pool.bytes(*block)[..surface];
                        if entry.swizzled {
                            let mut tmp = vec![0u8; surface];
                            unswizzle(&mut tmp, src, pitch, padded_height);
                            tmp
                        } else {
                            src.to_vec()
                        }
                    }
                    Backing::Host(bytes) => bytes.clone(),
                };

                let row_bytes = rect.w as usize * bpp;
                let mut out = Vec::with_capacity(row_bytes * rect.h as usize);
                for row in rect.y..rect.y + rect.h {
                    let start = row as usize * pitch + rect.x as usize * bpp;
                    out.extend_from_slice(&linear[start..start + row_bytes]);
                }
                Ok((format, out))
            }
        }
    }

    fn display_list(&self) -> &DisplayList {
        &self.list
    }
}
