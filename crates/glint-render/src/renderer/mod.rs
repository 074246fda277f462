//! The renderer front end.
//!
//! Owns the backend, the texture table, the frame vertex pool and the
//! command queue. Draw calls validate eagerly, bake their vertices (color,
//! UV scaling and lowering decisions all happen here, at queue time) and
//! append commands; nothing touches the device until the queue is flushed
//! by a present, a target switch or a readback.

use anyhow::Context;

use crate::backend::{
    Backend, DeferredBackend, DeferredConfig, OvercommitBackend, OvercommitConfig,
};
use crate::cmd::{
    BlendMode, ColorVertex, CommandQueue, DrawData, RenderCommand, TextureVertex, Topology,
    VertexKind,
};
use crate::coords::{Color, IRect, Rect};
use crate::error::{RenderError, Result};
use crate::layout::{PlanarLayout, copy_plane, swizzle, unswizzle};
use crate::pool::VertexPool;
use crate::state::DrawState;
use crate::texture::{
    AddressMode, PixelFormat, ScaleMode, TextureAccess, TextureDesc, TextureId, TextureTable,
};
use crate::translate;

/// Tuning knobs shared by both backends.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Capacity of each per-frame vertex arena, in bytes.
    pub vertex_pool_size: usize,
    pub vsync: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            vertex_pool_size: 2 * 1024 * 1024,
            vsync: true,
        }
    }
}

/// Index views accepted by [`Renderer::geometry`].
#[derive(Debug, Copy, Clone)]
pub enum Indices<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl Indices<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Indices::U8(s) => s.len(),
            Indices::U16(s) => s.len(),
            Indices::U32(s) => s.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn get(&self, i: usize) -> usize {
        match self {
            Indices::U8(s) => s[i] as usize,
            Indices::U16(s) => s[i] as usize,
            Indices::U32(s) => s[i] as usize,
        }
    }
}

pub struct Renderer {
    backend: Box<dyn Backend>,
    textures: TextureTable,
    pool: VertexPool,
    queue: CommandQueue,
    state: DrawState,
    target: Option<TextureId>,
    draw_color: Color,
    color_scale: f32,
    blend: BlendMode,
    vsync: bool,
}

impl Renderer {
    pub fn with_backend(backend: Box<dyn Backend>, config: &RendererConfig) -> Self {
        log::debug!(
            "renderer up on {} backend, {}x{} drawable",
            backend.name(),
            backend.drawable_size().0,
            backend.drawable_size().1
        );
        Self {
            backend,
            textures: TextureTable::new(),
            pool: VertexPool::new(config.vertex_pool_size),
            queue: CommandQueue::new(),
            state: DrawState::new(),
            target: None,
            draw_color: Color::WHITE,
            color_scale: 1.0,
            blend: BlendMode::default(),
            vsync: config.vsync,
        }
    }

    pub fn new_deferred(backend: &DeferredConfig, config: &RendererConfig) -> Self {
        Self::with_backend(Box::new(DeferredBackend::new(backend)), config)
    }

    pub fn new_overcommit(
        backend: &OvercommitConfig,
        config: &RendererConfig,
    ) -> anyhow::Result<Self> {
        let backend = OvercommitBackend::new(backend)
            .context("allocating scanout buffers from the video memory pool")?;
        Ok(Self::with_backend(Box::new(backend), config))
    }

    #[inline]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[inline]
    pub fn drawable_size(&self) -> (u32, u32) {
        self.backend.drawable_size()
    }

    // ── textures ──────────────────────────────────────────────────────────

    pub fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        self.backend.create_texture(&mut self.textures, desc)
    }

    /// Destroys a texture. Pending work that references it lands first; a
    /// stale id is a no-op.
    pub fn destroy_texture(&mut self, id: TextureId) {
        if self.target == Some(id) {
            if let Err(err) = self.flush() {
                log::debug!("dropping queued work for dying target {id:?}: {err}");
            }
            self.target = None;
        }
        if let Err(err) = self.backend.destroy_texture(&mut self.textures, id) {
            log::debug!("destroy_texture({id:?}): {err}");
        }
    }

    pub fn set_texture_scale_mode(&mut self, id: TextureId, mode: ScaleMode) -> Result<()> {
        self.textures.get_mut(id)?.scale_mode = mode;
        Ok(())
    }

    pub fn set_texture_address_mode(
        &mut self,
        id: TextureId,
        u: AddressMode,
        v: AddressMode,
    ) -> Result<()> {
        let entry = self.textures.get_mut(id)?;
        entry.address_u = u;
        entry.address_v = v;
        Ok(())
    }

    /// Replaces pixels in `rect` (or the whole texture) from packed rows.
    pub fn update_texture(
        &mut self,
        id: TextureId,
        rect: Option<IRect>,
        pixels: &[u8],
        src_pitch: usize,
    ) -> Result<()> {
        self.backend.prepare_update(&mut self.textures, id)?;
        let entry = self.textures.get_mut(id)?;
        if entry.locked {
            return Err(RenderError::AlreadyLocked);
        }
        if entry.format.is_planar() {
            return Self::update_planar_packed(entry, rect, pixels, src_pitch);
        }

        let bpp = entry.format.bytes_per_pixel();
        let bounds = IRect::new(0, 0, entry.width as i32, entry.height as i32);
        let rect = rect.unwrap_or(bounds).clamped_to(bounds);
        if rect.is_empty() {
            return Ok(());
        }
        let row_bytes = rect.w as usize * bpp;
        Self::check_plane_src(pixels, src_pitch, row_bytes, rect.h as usize)?;
        let pitch = entry.pitch;
        let padded_height = entry.padded_height as usize;
        let surface = pitch * padded_height;
        let tiled = entry.swizzled;
        let backing = entry.host_bytes_mut().ok_or(RenderError::InvalidAccess)?;

        if tiled {
            // Tiled storage has no row addressing, so partial updates go
            // through a linear bounce of the whole surface.
            let mut linear = vec![0u8; surface];
            unswizzle(&mut linear, &backing[..surface], pitch, padded_height);
            let base = rect.y as usize * pitch + rect.x as usize * bpp;
            copy_plane(
                &mut linear[base..],
                pitch,
                pixels,
                src_pitch,
                row_bytes,
                rect.h as usize,
            );
            swizzle(&mut backing[..surface], &linear, pitch, padded_height);
        } else {
            let base = rect.y as usize * pitch + rect.x as usize * bpp;
            copy_plane(
                &mut backing[base..],
                pitch,
                pixels,
                src_pitch,
                row_bytes,
                rect.h as usize,
            );
        }
        Ok(())
    }

    /// Per-plane update for the three-plane formats.
    pub fn update_texture_yuv(
        &mut self,
        id: TextureId,
        rect: Option<IRect>,
        y: &[u8],
        y_pitch: usize,
        u: &[u8],
        u_pitch: usize,
        v: &[u8],
        v_pitch: usize,
    ) -> Result<()> {
        self.backend.prepare_update(&mut self.textures, id)?;
        let entry = self.textures.get_mut(id)?;
        if !matches!(entry.format, PixelFormat::Yv12 | PixelFormat::Iyuv) {
            return Err(RenderError::UnsupportedFormat(entry.format));
        }
        if entry.locked {
            return Err(RenderError::AlreadyLocked);
        }

        let layout = PlanarLayout::new(entry.format, entry.pitch, entry.height as usize);
        let bounds = IRect::new(0, 0, entry.width as i32, entry.height as i32);
        let rect = rect.unwrap_or(bounds).clamped_to(bounds);
        if rect.is_empty() {
            return Ok(());
        }
        let (cx, cy) = (rect.x as usize / 2, rect.y as usize / 2);
        let (cw, ch) = (
            (rect.w as usize).div_ceil(2),
            (rect.h as usize).div_ceil(2),
        );
        Self::check_plane_src(y, y_pitch, rect.w as usize, rect.h as usize)?;
        Self::check_plane_src(u, u_pitch, cw, ch)?;
        Self::check_plane_src(v, v_pitch, cw, ch)?;
        let backing = entry.host_bytes_mut().ok_or(RenderError::InvalidAccess)?;

        let y_base = layout.y_offset() + rect.y as usize * layout.luma_pitch + rect.x as usize;
        copy_plane(
            &mut backing[y_base..],
            layout.luma_pitch,
            y,
            y_pitch,
            rect.w as usize,
            rect.h as usize,
        );
        let u_base = layout.u_offset() + cy * layout.chroma_pitch + cx;
        copy_plane(&mut backing[u_base..], layout.chroma_pitch, u, u_pitch, cw, ch);
        let v_base = layout.v_offset() + cy * layout.chroma_pitch + cx;
        copy_plane(&mut backing[v_base..], layout.chroma_pitch, v, v_pitch, cw, ch);
        Ok(())
    }

    /// Per-plane update for the two-plane formats; `uv` is interleaved.
    pub fn update_texture_nv(
        &mut self,
        id: TextureId,
        rect: Option<IRect>,
        y: &[u8],
        y_pitch: usize,
        uv: &[u8],
        uv_pitch: usize,
    ) -> Result<()> {
        self.backend.prepare_update(&mut self.textures, id)?;
        let entry = self.textures.get_mut(id)?;
        if !matches!(entry.format, PixelFormat::Nv12 | PixelFormat::Nv21) {
            return Err(RenderError::UnsupportedFormat(entry.format));
        }
        if entry.locked {
            return Err(RenderError::AlreadyLocked);
        }

        let layout = PlanarLayout::new(entry.format, entry.pitch, entry.height as usize);
        let bounds = IRect::new(0, 0, entry.width as i32, entry.height as i32);
        let rect = rect.unwrap_or(bounds).clamped_to(bounds);
        if rect.is_empty() {
            return Ok(());
        }
        // Interleaved chroma: one byte pair per 2x2 pixel block.
        let pair_bytes = 2 * (rect.w as usize).div_ceil(2);
        Self::check_plane_src(y, y_pitch, rect.w as usize, rect.h as usize)?;
        Self::check_plane_src(uv, uv_pitch, pair_bytes, (rect.h as usize).div_ceil(2))?;
        let backing = entry.host_bytes_mut().ok_or(RenderError::InvalidAccess)?;

        let y_base = layout.y_offset() + rect.y as usize * layout.luma_pitch + rect.x as usize;
        copy_plane(
            &mut backing[y_base..],
            layout.luma_pitch,
            y,
            y_pitch,
            rect.w as usize,
            rect.h as usize,
        );
        let uv_base = layout.uv_offset()
            + (rect.y as usize / 2) * layout.chroma_pitch
            + 2 * (rect.x as usize / 2);
        copy_plane(
            &mut backing[uv_base..],
            layout.chroma_pitch,
            uv,
            uv_pitch,
            pair_bytes,
            (rect.h as usize).div_ceil(2),
        );
        Ok(())
    }

    fn update_planar_packed(
        entry: &mut crate::texture::TextureEntry,
        rect: Option<IRect>,
        pixels: &[u8],
        src_pitch: usize,
    ) -> Result<()> {
        // Packed planar input: Y rows at `src_pitch`, then chroma planes in
        // the format's own order, each at the halved pitch.
        let format = entry.format;
        let layout = PlanarLayout::new(format, entry.pitch, entry.height as usize);
        let bounds = IRect::new(0, 0, entry.width as i32, entry.height as i32);
        let rect = rect.unwrap_or(bounds).clamped_to(bounds);
        if rect.is_empty() {
            return Ok(());
        }
        let src_layout = PlanarLayout::new(format, src_pitch, rect.h as usize);
        let (cx, cy) = (rect.x as usize / 2, rect.y as usize / 2);
        let cw = (rect.w as usize).div_ceil(2);
        let ch = (rect.h as usize).div_ceil(2);

        // Every plane is validated before the first row is copied, so a
        // short buffer never leaves a half-written surface behind.
        Self::check_plane_src(pixels, src_pitch, rect.w as usize, rect.h as usize)?;
        let chroma: Vec<(usize, &[u8], usize)> = match format {
            PixelFormat::Yv12 | PixelFormat::Iyuv => vec![
                (
                    layout.u_offset() + cy * layout.chroma_pitch + cx,
                    Self::chroma_src(pixels, src_layout.u_offset(), src_layout.chroma_pitch, cw, ch)?,
                    cw,
                ),
                (
                    layout.v_offset() + cy * layout.chroma_pitch + cx,
                    Self::chroma_src(pixels, src_layout.v_offset(), src_layout.chroma_pitch, cw, ch)?,
                    cw,
                ),
            ],
            PixelFormat::Nv12 | PixelFormat::Nv21 => vec![(
                layout.uv_offset() + cy * layout.chroma_pitch + 2 * cx,
                Self::chroma_src(pixels, src_layout.uv_offset(), src_layout.chroma_pitch, 2 * cw, ch)?,
                2 * cw,
            )],
            _ => return Err(RenderError::UnsupportedFormat(format)),
        };

        let backing = entry.host_bytes_mut().ok_or(RenderError::InvalidAccess)?;
        let y_base = rect.y as usize * layout.luma_pitch + rect.x as usize;
        copy_plane(
            &mut backing[y_base..],
            layout.luma_pitch,
            pixels,
            src_pitch,
            rect.w as usize,
            rect.h as usize,
        );
        for (base, src, row_bytes) in chroma {
            copy_plane(
                &mut backing[base..],
                layout.chroma_pitch,
                src,
                src_layout.chroma_pitch,
                row_bytes,
                ch,
            );
        }
        Ok(())
    }

    /// Slices one chroma plane out of a packed planar source, verifying it
    /// covers the update region.
    fn chroma_src<'a>(
        pixels: &'a [u8],
        src_off: usize,
        pitch: usize,
        row_bytes: usize,
        rows: usize,
    ) -> Result<&'a [u8]> {
        let src = pixels
            .get(src_off..)
            .ok_or(RenderError::PixelSourceTooSmall {
                needed: src_off,
                got: pixels.len(),
            })?;
        Self::check_plane_src(src, pitch, row_bytes, rows)?;
        Ok(src)
    }

    /// Every row the copy will read must land inside `src`.
    fn check_plane_src(src: &[u8], pitch: usize, row_bytes: usize, rows: usize) -> Result<()> {
        let stride = pitch.max(row_bytes);
        let needed = match rows {
            0 => 0,
            n => (n - 1) * stride + row_bytes,
        };
        if src.len() < needed {
            return Err(RenderError::PixelSourceTooSmall {
                needed,
                got: src.len(),
            });
        }
        Ok(())
    }

    /// Hands out the texture's pixel storage for CPU writes, draining any
    /// work that could still be reading it. Streaming textures lock on
    /// every backend; targets only where their pixels have a CPU view.
    pub fn lock_texture(&mut self, id: TextureId) -> Result<(&mut [u8], usize)> {
        if self.textures.get(id)?.access == TextureAccess::Static {
            return Err(RenderError::InvalidAccess);
        }
        self.backend.prepare_lock(&mut self.textures, id)?;
        let entry = self.textures.get_mut(id)?;
        if entry.locked {
            return Err(RenderError::AlreadyLocked);
        }
        entry.locked = true;
        let pitch = entry.pitch;
        let bytes = entry.host_bytes_mut().ok_or(RenderError::InvalidAccess)?;
        Ok((bytes.as_mut_slice(), pitch))
    }

    pub fn unlock_texture(&mut self, id: TextureId) -> Result<()> {
        let entry = self.textures.get_mut(id)?;
        if !entry.locked {
            return Err(RenderError::NotLocked);
        }
        entry.locked = false;
        Ok(())
    }

    // ── frame state ───────────────────────────────────────────────────────

    /// Redirects subsequent draws to a target texture (`None` restores the
    /// window). Queued work for the previous surface flushes first.
    pub fn set_render_target(&mut self, target: Option<TextureId>) -> Result<()> {
        if target == self.target {
            return Ok(());
        }
        if let Some(id) = target {
            if self.textures.get(id)?.access != TextureAccess::Target {
                return Err(RenderError::InvalidAccess);
            }
        }
        self.flush()?;
        self.target = target;
        Ok(())
    }

    #[inline]
    pub fn render_target(&self) -> Option<TextureId> {
        self.target
    }

    /// Sets the color used by subsequent clears and untextured draws. The
    /// color is baked into vertices at queue time, so earlier queued draws
    /// keep the color they were issued with.
    pub fn set_draw_color(&mut self, color: Color) {
        self.draw_color = color;
        self.queue.push(RenderCommand::SetDrawColor(color));
    }

    /// Scales color channels (not alpha) of everything baked after the call.
    pub fn set_color_scale(&mut self, scale: f32) {
        self.color_scale = scale.max(0.0);
    }

    pub fn set_blend_mode(&mut self, blend: BlendMode) {
        self.blend = blend;
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
    }

    pub fn set_viewport(&mut self, viewport: IRect) {
        self.queue.push(RenderCommand::SetViewport(viewport));
    }

    pub fn set_clip_rect(&mut self, clip: Option<IRect>) {
        self.queue.push(RenderCommand::SetClipRect(clip));
    }

    pub fn clear(&mut self) {
        let packed = self.draw_color.to_rgba8(self.color_scale);
        self.queue.push(RenderCommand::Clear(packed));
    }

    // ── draws ─────────────────────────────────────────────────────────────

    pub fn draw_points(&mut self, points: &[(f32, f32)]) -> Result<()> {
        let color = self.draw_color.to_rgba8(self.color_scale);
        let verts: Vec<ColorVertex> = points
            .iter()
            .map(|&(x, y)| ColorVertex { x, y, color })
            .collect();
        self.queue_color_draw(Topology::Points, &verts)
    }

    /// Draws a connected polyline; n points become n-1 segments baked as
    /// independent vertex pairs so consecutive polylines can merge.
    pub fn draw_lines(&mut self, points: &[(f32, f32)]) -> Result<()> {
        if points.len() < 2 {
            return self.queue_color_draw(Topology::Lines, &[]);
        }
        let color = self.draw_color.to_rgba8(self.color_scale);
        let mut verts = Vec::with_capacity((points.len() - 1) * 2);
        for pair in points.windows(2) {
            verts.push(ColorVertex {
                x: pair[0].0,
                y: pair[0].1,
                color,
            });
            verts.push(ColorVertex {
                x: pair[1].0,
                y: pair[1].1,
                color,
            });
        }
        self.queue_color_draw(Topology::Lines, &verts)
    }

    pub fn fill_rects(&mut self, rects: &[Rect]) -> Result<()> {
        let color = self.draw_color.to_rgba8(self.color_scale);
        let sprites = self.backend.caps().native_sprites;
        let mut verts = Vec::with_capacity(rects.len() * if sprites { 2 } else { 6 });
        for rect in rects {
            let r = rect.normalized();
            if r.is_empty() {
                continue;
            }
            let (x0, y0, x1, y1) = (r.x, r.y, r.x + r.w, r.y + r.h);
            if sprites {
                verts.push(ColorVertex { x: x0, y: y0, color });
                verts.push(ColorVertex { x: x1, y: y1, color });
            } else {
                for (x, y) in [(x0, y0), (x1, y0), (x0, y1), (x1, y0), (x1, y1), (x0, y1)] {
                    verts.push(ColorVertex { x, y, color });
                }
            }
        }
        let topology = if sprites {
            Topology::Sprites
        } else {
            Topology::Triangles
        };
        self.queue_color_draw(topology, &verts)
    }

    /// Blits `src` (texel rect, `None` for the whole texture) to `dst`.
    pub fn copy(&mut self, id: TextureId, src: Option<Rect>, dst: Rect) -> Result<()> {
        let (u0, v0, u1, v1) = self.uv_rect(id, src)?;
        let color = Color::WHITE.to_rgba8(self.color_scale);
        let d = dst.normalized();
        let (x0, y0, x1, y1) = (d.x, d.y, d.x + d.w, d.y + d.h);

        if self.backend.caps().native_sprites {
            let verts = [
                TextureVertex { x: x0, y: y0, u: u0, v: v0, color },
                TextureVertex { x: x1, y: y1, u: u1, v: v1, color },
            ];
            self.queue_texture_draw(Topology::Sprites, id, &verts)
        } else {
            let corners = [
                (x0, y0, u0, v0),
                (x1, y0, u1, v0),
                (x0, y1, u0, v1),
                (x1, y0, u1, v0),
                (x1, y1, u1, v1),
                (x0, y1, u0, v1),
            ];
            let verts = corners.map(|(x, y, u, v)| TextureVertex { x, y, u, v, color });
            self.queue_texture_draw(Topology::Triangles, id, &verts)
        }
    }

    /// `copy` with rotation (degrees, clockwise, about `center` in dst
    /// coordinates, default the dst midpoint) and mirroring.
    pub fn copy_ex(
        &mut self,
        id: TextureId,
        src: Option<Rect>,
        dst: Rect,
        angle: f64,
        center: Option<(f32, f32)>,
        flip_h: bool,
        flip_v: bool,
    ) -> Result<()> {
        let (mut u0, mut v0, mut u1, mut v1) = self.uv_rect(id, src)?;
        if flip_h {
            std::mem::swap(&mut u0, &mut u1);
        }
        if flip_v {
            std::mem::swap(&mut v0, &mut v1);
        }
        let color = Color::WHITE.to_rgba8(self.color_scale);

        let d = dst.normalized();
        let (cx, cy) = center.unwrap_or((d.x + d.w / 2.0, d.y + d.h / 2.0));
        let (sin, cos) = {
            let radians = angle.to_radians();
            (radians.sin() as f32, radians.cos() as f32)
        };
        let rotate = |x: f32, y: f32| {
            let (dx, dy) = (x - cx, y - cy);
            (cx + dx * cos - dy * sin, cy + dx * sin + dy * cos)
        };

        let corners = [
            (d.x, d.y, u0, v0),
            (d.x + d.w, d.y, u1, v0),
            (d.x + d.w, d.y + d.h, u1, v1),
            (d.x, d.y + d.h, u0, v1),
        ];
        let fan: Vec<TextureVertex> = corners
            .iter()
            .map(|&(x, y, u, v)| {
                let (x, y) = rotate(x, y);
                TextureVertex { x, y, u, v, color }
            })
            .collect();

        if self.backend.caps().native_triangle_fan {
            self.queue_texture_draw(Topology::TriangleFan, id, &fan)
        } else {
            let verts = [fan[0], fan[1], fan[3], fan[1], fan[2], fan[3]];
            self.queue_texture_draw(Topology::Triangles, id, &verts)
        }
    }

    /// Arbitrary triangle geometry with per-vertex colors and normalized
    /// UVs. Indexed input is flattened at bake time.
    pub fn geometry(
        &mut self,
        texture: Option<TextureId>,
        positions: &[[f32; 2]],
        colors: &[Color],
        uvs: &[[f32; 2]],
        indices: Option<Indices<'_>>,
    ) -> Result<()> {
        if colors.len() != positions.len()
            || (texture.is_some() && uvs.len() != positions.len())
        {
            return Err(RenderError::Backend(
                "geometry attribute arrays must have matching lengths".into(),
            ));
        }
        let count = indices.as_ref().map_or(positions.len(), Indices::len);
        if count % 3 != 0 {
            return Err(RenderError::Backend(
                "geometry vertex count must be a multiple of three".into(),
            ));
        }
        if let Some(ix) = &indices {
            if (0..count).any(|i| ix.get(i) >= positions.len()) {
                return Err(RenderError::Backend(
                    "geometry index out of range".into(),
                ));
            }
        }

        let vertex_at = |i: usize| -> usize {
            match &indices {
                Some(ix) => ix.get(i),
                None => i,
            }
        };

        match texture {
            Some(id) => {
                let entry = self.textures.get(id)?;
                let (w, h) = (entry.width as f32, entry.height as f32);
                let (sx, sy) = self.backend.uv_scale(&self.textures, id)?;
                let verts: Vec<TextureVertex> = (0..count)
                    .map(|i| {
                        let n = vertex_at(i);
                        TextureVertex {
                            x: positions[n][0],
                            y: positions[n][1],
                            u: uvs[n][0] * w * sx,
                            v: uvs[n][1] * h * sy,
                            color: colors[n].to_rgba8(self.color_scale),
                        }
                    })
                    .collect();
                self.queue_texture_draw(Topology::Triangles, id, &verts)
            }
            None => {
                let verts: Vec<ColorVertex> = (0..count)
                    .map(|i| {
                        let n = vertex_at(i);
                        ColorVertex {
                            x: positions[n][0],
                            y: positions[n][1],
                            color: colors[n].to_rgba8(self.color_scale),
                        }
                    })
                    .collect();
                self.queue_color_draw(Topology::Triangles, &verts)
            }
        }
    }

    // ── submission ────────────────────────────────────────────────────────

    /// Translates and submits the queued frame without presenting.
    pub fn flush(&mut self) -> Result<()> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let commands = std::mem::take(&mut self.queue);
        translate::run_queue(
            self.backend.as_mut(),
            &mut self.state,
            &mut self.textures,
            self.target,
            &commands,
        )
    }

    /// Flushes, swaps and retires the frame's vertex arena.
    pub fn present(&mut self) -> Result<()> {
        self.flush()?;
        self.backend.present(&mut self.textures, self.vsync)?;
        self.pool.end_frame();
        Ok(())
    }

    /// Reads back a rect of the current render surface, top-down packed
    /// rows in the surface's native format. Forces a full drain.
    pub fn read_pixels(&mut self, rect: IRect) -> Result<(PixelFormat, Vec<u8>)> {
        self.flush()?;
        self.backend.read_pixels(&mut self.textures, self.target, rect)
    }

    fn queue_color_draw(&mut self, topology: Topology, verts: &[ColorVertex]) -> Result<()> {
        let bytes = bytemuck::cast_slice(verts);
        let span = self.pool.allocate(bytes.len())?;
        self.pool.write(span, bytes);
        self.queue.push(RenderCommand::Draw(DrawData {
            span,
            kind: VertexKind::Color,
            topology,
            count: verts.len() as u32,
            texture: None,
            blend: self.blend,
            scale_mode: ScaleMode::Nearest,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
        }));
        Ok(())
    }

    fn queue_texture_draw(
        &mut self,
        topology: Topology,
        id: TextureId,
        verts: &[TextureVertex],
    ) -> Result<()> {
        let (scale_mode, address_u, address_v) = {
            let entry = self.textures.get(id)?;
            (entry.scale_mode, entry.address_u, entry.address_v)
        };
        let bytes = bytemuck::cast_slice(verts);
        let span = self.pool.allocate(bytes.len())?;
        self.pool.write(span, bytes);
        self.queue.push(RenderCommand::Draw(DrawData {
            span,
            kind: VertexKind::Texture,
            topology,
            count: verts.len() as u32,
            texture: Some(id),
            blend: self.blend,
            scale_mode,
            address_u,
            address_v,
        }));
        Ok(())
    }

    /// Texel-space source rect mapped into the backend's sampling space.
    fn uv_rect(&mut self, id: TextureId, src: Option<Rect>) -> Result<(f32, f32, f32, f32)> {
        let entry = self.textures.get(id)?;
        let full = Rect::new(0.0, 0.0, entry.width as f32, entry.height as f32);
        let src = src.unwrap_or(full).normalized();
        let (sx, sy) = self.backend.uv_scale(&self.textures, id)?;
        Ok((
            src.x * sx,
            src.y * sy,
            (src.x + src.w) * sx,
            (src.y + src.h) * sy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DrawBuffer, GpuOp};
    use crate::coords::Rgba8;

    fn deferred() -> Renderer {
        Renderer::new_deferred(
            &DeferredConfig {
                width: 320,
                height: 240,
            },
            &RendererConfig::default(),
        )
    }

    fn overcommit() -> Renderer {
        // Room for the two 64x64 scanout buffers plus two 64x64 16-bit
        // targets; a third target forces eviction.
        Renderer::new_overcommit(
            &OvercommitConfig {
                width: 64,
                height: 64,
                vram_capacity: 2 * 16384 + 2 * 8192,
            },
            &RendererConfig::default(),
        )
        .unwrap()
    }

    fn target_desc() -> TextureDesc {
        TextureDesc {
            width: 64,
            height: 64,
            format: PixelFormat::Bgr565,
            access: TextureAccess::Target,
        }
    }

    fn draw_ops(r: &Renderer) -> Vec<(Topology, usize, u32)> {
        r.backend
            .display_list()
            .ops()
            .iter()
            .filter_map(|op| match *op {
                GpuOp::Draw {
                    topology,
                    first,
                    count,
                    ..
                } => Some((topology, first, count)),
                _ => None,
            })
            .collect()
    }

    // ── lowering ──────────────────────────────────────────────────────────

    #[test]
    fn rects_lower_to_triangles_without_sprite_support() {
        let mut r = deferred();
        r.fill_rects(&[Rect::new(0.0, 0.0, 10.0, 10.0)]).unwrap();
        r.flush().unwrap();
        assert_eq!(draw_ops(&r), vec![(Topology::Triangles, 0, 6)]);
    }

    #[test]
    fn rects_stay_sprites_with_native_support() {
        let mut r = overcommit();
        r.fill_rects(&[Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(5.0, 5.0, 2.0, 2.0)])
            .unwrap();
        r.flush().unwrap();
        assert_eq!(draw_ops(&r), vec![(Topology::Sprites, 0, 4)]);
    }

    #[test]
    fn polylines_bake_segment_pairs_that_merge() {
        let mut r = deferred();
        r.draw_lines(&[(0.0, 0.0), (1.0, 0.0)]).unwrap();
        r.draw_lines(&[(0.0, 1.0), (1.0, 1.0), (2.0, 1.0)]).unwrap();
        r.flush().unwrap();
        // 2 points -> 2 vertices, 3 points -> 4 vertices, merged into one.
        assert_eq!(draw_ops(&r), vec![(Topology::Lines, 0, 6)]);
    }

    #[test]
    fn copy_ex_uses_a_fan_only_where_native() {
        let mut d = deferred();
        let tex = d
            .create_texture(&TextureDesc {
                width: 16,
                height: 16,
                format: PixelFormat::Abgr8888,
                access: TextureAccess::Static,
            })
            .unwrap();
        d.copy_ex(tex, None, Rect::new(0.0, 0.0, 16.0, 16.0), 90.0, None, false, false)
            .unwrap();
        d.flush().unwrap();
        assert_eq!(draw_ops(&d)[0].0, Topology::Triangles);
        assert_eq!(draw_ops(&d)[0].2, 6);

        let mut o = overcommit();
        let tex = o
            .create_texture(&TextureDesc {
                width: 16,
                height: 16,
                format: PixelFormat::Bgr565,
                access: TextureAccess::Static,
            })
            .unwrap();
        o.copy_ex(tex, None, Rect::new(0.0, 0.0, 16.0, 16.0), 90.0, None, false, false)
            .unwrap();
        o.flush().unwrap();
        assert_eq!(draw_ops(&o)[0].0, Topology::TriangleFan);
        assert_eq!(draw_ops(&o)[0].2, 4);
    }

    #[test]
    fn copy_uv_is_normalized_over_padded_width_on_deferred() {
        let mut r = deferred();
        let tex = r
            .create_texture(&TextureDesc {
                width: 12,
                height: 10,
                format: PixelFormat::Abgr8888,
                access: TextureAccess::Static,
            })
            .unwrap();
        // padded width 16: full-texture U runs to 12/16.
        r.copy(tex, None, Rect::new(0.0, 0.0, 12.0, 10.0)).unwrap();
        let RenderCommand::Draw(draw) = r.queue[0] else {
            panic!("expected a draw");
        };
        let verts: &[TextureVertex] = bytemuck::cast_slice(r.pool.bytes(draw.span));
        assert_eq!(verts[0].u, 0.0);
        assert!((verts[4].u - 12.0 / 16.0).abs() < 1e-6);
        assert!((verts[4].v - 1.0).abs() < 1e-6);
    }

    // ── queue-time baking ─────────────────────────────────────────────────

    #[test]
    fn draw_color_is_baked_at_queue_time() {
        let mut r = deferred();
        r.set_draw_color(Color::new(1.0, 0.0, 0.0, 1.0));
        r.draw_points(&[(0.0, 0.0)]).unwrap();
        r.set_draw_color(Color::new(0.0, 0.0, 1.0, 1.0));
        r.draw_points(&[(1.0, 0.0)]).unwrap();

        let spans: Vec<_> = r
            .queue
            .iter()
            .filter_map(|cmd| match cmd {
                RenderCommand::Draw(d) => Some(d.span),
                _ => None,
            })
            .collect();
        let first: &[ColorVertex] = bytemuck::cast_slice(r.pool.bytes(spans[0]));
        let second: &[ColorVertex] = bytemuck::cast_slice(r.pool.bytes(spans[1]));
        assert_eq!(first[0].color, Rgba8([255, 0, 0, 255]));
        assert_eq!(second[0].color, Rgba8([0, 0, 255, 255]));
    }

    #[test]
    fn color_scale_applies_to_later_bakes_only() {
        let mut r = deferred();
        r.set_draw_color(Color::new(0.5, 0.5, 0.5, 1.0));
        r.draw_points(&[(0.0, 0.0)]).unwrap();
        r.set_color_scale(2.0);
        r.draw_points(&[(1.0, 0.0)]).unwrap();

        let spans: Vec<_> = r
            .queue
            .iter()
            .filter_map(|cmd| match cmd {
                RenderCommand::Draw(d) => Some(d.span),
                _ => None,
            })
            .collect();
        let first: &[ColorVertex] = bytemuck::cast_slice(r.pool.bytes(spans[0]));
        let second: &[ColorVertex] = bytemuck::cast_slice(r.pool.bytes(spans[1]));
        assert_eq!(first[0].color.r(), 128);
        assert_eq!(second[0].color.r(), 255);
        assert_eq!(second[0].color.a(), 255);
    }

    #[test]
    fn pool_exhaustion_fails_the_draw_but_keeps_the_frame() {
        let mut r = Renderer::new_deferred(
            &DeferredConfig {
                width: 64,
                height: 64,
            },
            &RendererConfig {
                vertex_pool_size: 64,
                vsync: false,
            },
        );
        r.draw_points(&[(0.0, 0.0), (1.0, 1.0)]).unwrap();
        let err = r.draw_points(&[(0.0, 0.0); 16]).unwrap_err();
        assert!(matches!(err, RenderError::VertexPoolExhausted { .. }));
        // The failed call queued nothing; the earlier draw still submits.
        r.flush().unwrap();
        assert_eq!(draw_ops(&r), vec![(Topology::Points, 0, 2)]);
    }

    #[test]
    fn vertex_arenas_alternate_across_presents() {
        let mut r = deferred();
        assert_eq!(r.pool.arena_index(), 0);
        r.present().unwrap();
        assert_eq!(r.pool.arena_index(), 1);
        r.present().unwrap();
        assert_eq!(r.pool.arena_index(), 0);
    }

    // ── targets and residency ─────────────────────────────────────────────

    #[test]
    fn target_switch_flushes_prior_work() {
        let mut r = deferred();
        let target = r
            .create_texture(&TextureDesc {
                width: 32,
                height: 32,
                format: PixelFormat::Abgr8888,
                access: TextureAccess::Target,
            })
            .unwrap();
        r.fill_rects(&[Rect::new(0.0, 0.0, 4.0, 4.0)]).unwrap();
        r.set_render_target(Some(target)).unwrap();
        // The window-scene draw was submitted before the switch.
        let ops = r.backend.display_list().ops();
        let buffer_idx = ops
            .iter()
            .position(|op| matches!(op, GpuOp::SetDrawBuffer(DrawBuffer::Window)))
            .unwrap();
        assert!(r.queue.is_empty());
        assert!(ops[buffer_idx..].iter().any(|op| matches!(op, GpuOp::Draw { .. })));
    }

    #[test]
    fn non_target_textures_cannot_be_targets() {
        let mut r = deferred();
        let tex = r
            .create_texture(&TextureDesc {
                width: 8,
                height: 8,
                format: PixelFormat::Abgr8888,
                access: TextureAccess::Streaming,
            })
            .unwrap();
        assert!(matches!(
            r.set_render_target(Some(tex)),
            Err(RenderError::InvalidAccess)
        ));
    }

    #[test]
    fn evicted_target_keeps_its_cleared_pixels() {
        let mut r = overcommit();
        let a = r.create_texture(&target_desc()).unwrap();

        r.set_render_target(Some(a)).unwrap();
        r.set_draw_color(Color::new(1.0, 0.0, 0.0, 1.0));
        r.clear();
        r.set_render_target(None).unwrap();

        // Two more targets oversubscribe the pool and evict `a`.
        let _b = r.create_texture(&target_desc()).unwrap();
        let _c = r.create_texture(&target_desc()).unwrap();
        let entry = r.textures.get(a).unwrap();
        assert!(!entry.is_video_resident());
        let red = PixelFormat::Bgr565.pack(Rgba8([255, 0, 0, 255]));
        let host = entry.host_bytes().unwrap();
        assert!(host.chunks_exact(2).all(|px| px == &red[..2]));

        // Re-activating promotes it back with the pixels intact.
        r.set_render_target(Some(a)).unwrap();
        r.set_blend_mode(BlendMode::None);
        r.draw_points(&[(0.0, 0.0)]).unwrap();
        r.flush().unwrap();
        assert!(r.textures.get(a).unwrap().is_video_resident());
        let (format, pixels) = r.read_pixels(IRect::new(0, 0, 2, 2)).unwrap();
        assert_eq!(format, PixelFormat::Bgr565);
        assert!(pixels.chunks_exact(2).all(|px| px == &red[..2]));
    }

    #[test]
    fn clear_color_survives_into_window_readback() {
        let mut r = deferred();
        r.set_draw_color(Color::new(0.0, 1.0, 0.0, 1.0));
        r.clear();
        let (format, pixels) = r.read_pixels(IRect::new(0, 0, 2, 1)).unwrap();
        assert_eq!(format, PixelFormat::Abgr8888);
        assert_eq!(pixels, vec![0, 255, 0, 255, 0, 255, 0, 255]);
    }

    // ── texture updates and locks ─────────────────────────────────────────

    #[test]
    fn update_respects_destination_pitch() {
        let mut r = deferred();
        let tex = r
            .create_texture(&TextureDesc {
                width: 4,
                height: 2,
                format: PixelFormat::Abgr8888,
                access: TextureAccess::Static,
            })
            .unwrap();
        // Source rows are tightly packed; destination pitch covers the
        // padded width of 8.
        let pixels: Vec<u8> = (0..32).collect();
        r.update_texture(tex, None, &pixels, 16).unwrap();
        let entry = r.textures.get(tex).unwrap();
        let host = entry.host_bytes().unwrap();
        assert_eq!(&host[0..16], &pixels[0..16]);
        assert_eq!(&host[32..48], &pixels[16..32]);
    }

    #[test]
    fn tiled_texture_update_round_trips() {
        let mut r = overcommit();
        let tex = r
            .create_texture(&TextureDesc {
                width: 32,
                height: 32,
                format: PixelFormat::Bgr565,
                access: TextureAccess::Static,
            })
            .unwrap();
        assert!(r.textures.get(tex).unwrap().swizzled);

        let pixels: Vec<u8> = (0..32 * 32 * 2).map(|i| (i % 199) as u8).collect();
        r.update_texture(tex, None, &pixels, 64).unwrap();
        // Storage is tiled, so raw bytes differ from the source rows.
        let host = r.textures.get(tex).unwrap().host_bytes().unwrap().to_vec();
        assert_ne!(&host[..], &pixels[..]);

        // A partial second update must not disturb surrounding texels.
        let patch = vec![0xff; 2 * 2];
        r.update_texture(tex, Some(IRect::new(1, 1, 1, 2)), &patch, 2)
            .unwrap();
        let mut linear = vec![0u8; host.len()];
        let entry = r.textures.get(tex).unwrap();
        crate::layout::unswizzle(
            &mut linear,
            entry.host_bytes().unwrap(),
            entry.pitch,
            entry.padded_height as usize,
        );
        assert_eq!(&linear[0..2], &pixels[0..2]);
        assert_eq!(&linear[64 + 2..64 + 4], &[0xff, 0xff]);
        assert_eq!(&linear[64 + 4..64 + 6], &pixels[64 + 4..64 + 6]);
    }

    #[test]
    fn yuv_update_lands_planes_at_layout_offsets() {
        let mut r = deferred();
        let tex = r
            .create_texture(&TextureDesc {
                width: 8,
                height: 8,
                format: PixelFormat::Yv12,
                access: TextureAccess::Streaming,
            })
            .unwrap();
        let y = vec![1u8; 64];
        let u = vec![2u8; 16];
        let v = vec![3u8; 16];
        r.update_texture_yuv(tex, None, &y, 8, &u, 4, &v, 4).unwrap();
        let host = r.textures.get(tex).unwrap().host_bytes().unwrap();
        assert!(host[0..64].iter().all(|&b| b == 1));
        // YV12: V plane precedes U in storage.
        assert!(host[64..80].iter().all(|&b| b == 3));
        assert!(host[80..96].iter().all(|&b| b == 2));
    }

    #[test]
    fn nv_update_interleaves_chroma() {
        let mut r = deferred();
        let tex = r
            .create_texture(&TextureDesc {
                width: 8,
                height: 8,
                format: PixelFormat::Nv12,
                access: TextureAccess::Streaming,
            })
            .unwrap();
        let y = vec![9u8; 64];
        let uv: Vec<u8> = (0..32).collect();
        r.update_texture_nv(tex, None, &y, 8, &uv, 8).unwrap();
        let host = r.textures.get(tex).unwrap().host_bytes().unwrap();
        assert!(host[0..64].iter().all(|&b| b == 9));
        assert_eq!(&host[64..72], &uv[0..8]);
    }

    #[test]
    fn lock_rules_follow_access_and_backend() {
        let mut r = deferred();
        let streaming = r
            .create_texture(&TextureDesc {
                width: 8,
                height: 8,
                format: PixelFormat::Abgr8888,
                access: TextureAccess::Streaming,
            })
            .unwrap();
        let stat = r
            .create_texture(&TextureDesc {
                width: 8,
                height: 8,
                format: PixelFormat::Abgr8888,
                access: TextureAccess::Static,
            })
            .unwrap();

        assert!(matches!(
            r.lock_texture(stat),
            Err(RenderError::InvalidAccess)
        ));

        {
            let (bytes, pitch) = r.lock_texture(streaming).unwrap();
            assert_eq!(pitch, 32);
            bytes[0] = 0x42;
        }
        assert!(matches!(
            r.lock_texture(streaming),
            Err(RenderError::AlreadyLocked)
        ));
        r.unlock_texture(streaming).unwrap();
        assert!(matches!(
            r.unlock_texture(streaming),
            Err(RenderError::NotLocked)
        ));
        assert_eq!(r.textures.get(streaming).unwrap().host_bytes().unwrap()[0], 0x42);
    }

    #[test]
    fn geometry_flattens_indices() {
        let mut r = deferred();
        let positions = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let colors = [Color::WHITE; 4];
        r.geometry(
            None,
            &positions,
            &colors,
            &[],
            Some(Indices::U16(&[0, 1, 2, 0, 2, 3])),
        )
        .unwrap();
        r.flush().unwrap();
        assert_eq!(draw_ops(&r), vec![(Topology::Triangles, 0, 6)]);
    }

    #[test]
    fn geometry_rejects_mismatched_attributes() {
        let mut r = deferred();
        let err = r
            .geometry(None, &[[0.0, 0.0]; 3], &[Color::WHITE; 2], &[], None)
            .unwrap_err();
        assert!(matches!(err, RenderError::Backend(_)));
    }

    #[test]
    fn geometry_rejects_out_of_range_indices() {
        let mut r = deferred();
        let positions = [[0.0, 0.0], [8.0, 0.0], [0.0, 8.0]];
        let colors = [Color::WHITE; 3];
        let err = r
            .geometry(None, &positions, &colors, &[], Some(Indices::U16(&[0, 1, 7])))
            .unwrap_err();
        assert!(matches!(err, RenderError::Backend(_)));

        // The failed call queued nothing; a valid one still goes through.
        r.geometry(None, &positions, &colors, &[], Some(Indices::U16(&[0, 1, 2])))
            .unwrap();
        r.flush().unwrap();
        assert_eq!(draw_ops(&r), vec![(Topology::Triangles, 0, 3)]);
    }

    #[test]
    fn update_rejects_source_shorter_than_rect() {
        let mut r = deferred();
        let tex = r
            .create_texture(&TextureDesc {
                width: 8,
                height: 8,
                format: PixelFormat::Abgr8888,
                access: TextureAccess::Streaming,
            })
            .unwrap();
        // 8 rows at pitch 32 need 256 bytes.
        let err = r.update_texture(tex, None, &[0u8; 16], 32).unwrap_err();
        assert!(matches!(
            err,
            RenderError::PixelSourceTooSmall { needed: 256, got: 16 }
        ));

        // Nothing was written; a full-size buffer still lands.
        r.update_texture(tex, None, &[0xab; 256], 32).unwrap();
        assert_eq!(r.textures.get(tex).unwrap().host_bytes().unwrap()[0], 0xab);
    }

    #[test]
    fn yuv_update_rejects_short_chroma_plane() {
        let mut r = deferred();
        let tex = r
            .create_texture(&TextureDesc {
                width: 8,
                height: 8,
                format: PixelFormat::Yv12,
                access: TextureAccess::Streaming,
            })
            .unwrap();
        let y = [0x10u8; 64];
        let chroma = [0x80u8; 16];
        // The 4x4 U plane at pitch 4 needs 16 bytes; 8 is short.
        let err = r
            .update_texture_yuv(tex, None, &y, 8, &chroma[..8], 4, &chroma, 4)
            .unwrap_err();
        assert!(matches!(err, RenderError::PixelSourceTooSmall { .. }));
        // The luma plane is untouched by the rejected call.
        assert!(
            r.textures.get(tex).unwrap().host_bytes().unwrap()[0..64]
                .iter()
                .all(|&b| b == 0)
        );
        r.update_texture_yuv(tex, None, &y, 8, &chroma, 4, &chroma, 4)
            .unwrap();
    }

    // ── destruction ───────────────────────────────────────────────────────

    #[test]
    fn destroy_tolerates_stale_ids() {
        let mut r = overcommit();
        let id = r.create_texture(&target_desc()).unwrap();
        r.destroy_texture(id);
        r.destroy_texture(id);
        // The fast tier holds exactly two targets; both creations can only
        // stay resident if the destroyed block came back intact.
        let b = r.create_texture(&target_desc()).unwrap();
        let c = r.create_texture(&target_desc()).unwrap();
        assert!(r.textures.get(b).unwrap().is_video_resident());
        assert!(r.textures.get(c).unwrap().is_video_resident());
    }

    #[test]
    fn destroying_the_bound_target_falls_back_to_the_window() {
        let mut r = overcommit();
        let id = r.create_texture(&target_desc()).unwrap();
        r.set_render_target(Some(id)).unwrap();
        r.set_draw_color(Color::new(1.0, 0.0, 0.0, 1.0));
        r.clear();
        r.destroy_texture(id);
        assert_eq!(r.render_target(), None);
        r.clear();
        r.present().unwrap();
    }
}
