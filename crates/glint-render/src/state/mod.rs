//! Cached draw state.
//!
//! The translator funnels every native state change through this cache so
//! redundant ops never reach the device. Viewport and clip values persist
//! across frames with dirty flags; program, blend and texture bindings are
//! forgotten at scene start because the device resets them with the scene.

use crate::backend::{Backend, ProgramKind};
use crate::cmd::{BlendMode, DrawData};
use crate::coords::IRect;
use crate::error::Result;
use crate::texture::{TextureId, TextureTable};

#[derive(Debug)]
pub struct DrawState {
    pub viewport: IRect,
    pub viewport_dirty: bool,
    /// The application has set an explicit viewport this session.
    pub viewport_is_set: bool,

    pub cliprect: IRect,
    pub cliprect_dirty: bool,
    pub cliprect_enabled: bool,
    pub cliprect_enabled_dirty: bool,

    drawable_w: i32,
    drawable_h: i32,

    program: Option<ProgramKind>,
    blend: Option<BlendMode>,
    texture: Option<Option<TextureId>>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawState {
    pub fn new() -> Self {
        Self {
            viewport: IRect::default(),
            viewport_dirty: true,
            viewport_is_set: false,
            cliprect: IRect::default(),
            cliprect_dirty: false,
            cliprect_enabled: false,
            cliprect_enabled_dirty: false,
            drawable_w: 0,
            drawable_h: 0,
            program: None,
            blend: None,
            texture: None,
        }
    }

    /// Called when a scene opens. Bindings are unknown after a scene
    /// transition; viewport and clip re-apply from their cached values.
    pub fn begin_frame(&mut self, drawable_w: u32, drawable_h: u32) {
        let (w, h) = (drawable_w as i32, drawable_h as i32);
        if w != self.drawable_w || h != self.drawable_h {
            self.drawable_w = w;
            self.drawable_h = h;
            if !self.viewport_is_set {
                self.viewport = IRect::new(0, 0, w, h);
            }
        }
        self.viewport_dirty = true;
        self.cliprect_dirty = true;
        self.cliprect_enabled_dirty = true;
        self.program = None;
        self.blend = None;
        self.texture = None;
    }

    pub fn on_set_viewport(&mut self, viewport: IRect) {
        let was_set = self.viewport_is_set;
        if viewport != self.viewport {
            self.viewport = viewport;
            self.viewport_dirty = true;
        }
        self.viewport_is_set = true;

        // With clipping off the scissor still tracks the viewport extent,
        // so it must re-anchor whenever the viewport moves.
        if !self.cliprect_enabled {
            if was_set {
                self.cliprect = IRect::new(0, 0, viewport.w, viewport.h);
                self.cliprect_dirty = true;
            } else {
                self.cliprect_enabled_dirty = true;
            }
        }
    }

    pub fn on_set_clip(&mut self, clip: Option<IRect>) {
        match clip {
            Some(rect) => {
                if !self.cliprect_enabled {
                    self.cliprect_enabled = true;
                    self.cliprect_enabled_dirty = true;
                }
                if rect != self.cliprect {
                    self.cliprect = rect;
                    self.cliprect_dirty = true;
                }
            }
            None => {
                if self.cliprect_enabled {
                    self.cliprect_enabled = false;
                    self.cliprect_enabled_dirty = true;
                    if self.viewport_is_set {
                        self.cliprect = IRect::new(0, 0, self.viewport.w, self.viewport.h);
                        self.cliprect_dirty = true;
                    }
                }
            }
        }
    }

    /// The clear path bypasses scissor state and leaves the program slot in
    /// its own shader, so both must re-apply before the next draw.
    pub fn on_clear(&mut self) {
        self.program = Some(ProgramKind::Clear);
        self.cliprect_dirty = true;
    }

    /// True if a scissor op would be active right now, which the clear path
    /// needs to undo first.
    #[inline]
    pub fn scissor_active(&self) -> bool {
        self.cliprect_enabled || self.viewport_is_set
    }

    /// Flushes whatever state `draw` needs that differs from what the
    /// device last saw.
    pub fn apply(
        &mut self,
        backend: &mut dyn Backend,
        textures: &mut TextureTable,
        draw: &DrawData,
    ) -> Result<()> {
        if self.viewport_dirty {
            backend.set_viewport(self.viewport);
            self.viewport_dirty = false;
        }

        if self.cliprect_enabled_dirty {
            if !self.cliprect_enabled && !self.viewport_is_set {
                backend.disable_clip();
            }
            self.cliprect_enabled_dirty = false;
        }

        if self.scissor_active() && self.cliprect_dirty {
            let bounds = IRect::new(0, 0, self.viewport.w, self.viewport.h);
            // With clipping off the scissor pins to the viewport extent.
            let source = if self.cliprect_enabled {
                self.cliprect
            } else {
                bounds
            };
            let clipped = source.clamped_to(bounds);
            backend.set_clip(IRect::new(
                self.viewport.x + clipped.x,
                self.viewport.y + clipped.y,
                clipped.w,
                clipped.h,
            ));
            self.cliprect_dirty = false;
        }

        if self.blend != Some(draw.blend) {
            backend.set_blend(draw.blend);
            self.blend = Some(draw.blend);
        }

        let program = if draw.texture.is_some() {
            ProgramKind::Texture
        } else {
            ProgramKind::Color
        };
        if self.program != Some(program) {
            backend.bind_program(program);
            self.program = Some(program);
        }

        if let Some(id) = draw.texture {
            let entry = textures.get_mut(id)?;
            let wanted = (draw.address_u, draw.address_v);
            if entry.applied_scale_mode != Some(draw.scale_mode)
                || entry.applied_address != Some(wanted)
            {
                backend.set_sampler(draw.scale_mode, draw.address_u, draw.address_v);
                entry.applied_scale_mode = Some(draw.scale_mode);
                entry.applied_address = Some(wanted);
            }
        }

        if self.texture != Some(draw.texture) {
            backend.bind_texture(draw.texture);
            self.texture = Some(draw.texture);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeferredBackend, DeferredConfig, GpuOp};
    use crate::cmd::{Topology, VertexKind};
    use crate::pool::Span;
    use crate::texture::{AddressMode, ScaleMode};

    fn draw(texture: Option<TextureId>, blend: BlendMode) -> DrawData {
        DrawData {
            span: Span::empty(),
            kind: VertexKind::Color,
            topology: Topology::Triangles,
            count: 3,
            texture,
            blend,
            scale_mode: ScaleMode::Nearest,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
        }
    }

    fn ops_of<F: FnOnce(&mut DrawState, &mut DeferredBackend, &mut TextureTable)>(
        f: F,
    ) -> Vec<GpuOp> {
        let mut backend = DeferredBackend::new(&DeferredConfig { width: 320, height: 240 });
        let mut textures = TextureTable::new();
        let mut state = DrawState::new();
        state.begin_frame(320, 240);
        f(&mut state, &mut backend, &mut textures);
        backend.display_list().ops().to_vec()
    }

    fn count_of(ops: &[GpuOp], pred: impl Fn(&GpuOp) -> bool) -> usize {
        ops.iter().filter(|op| pred(op)).count()
    }

    #[test]
    fn identical_draws_emit_state_once() {
        let ops = ops_of(|state, backend, textures| {
            for _ in 0..3 {
                state
                    .apply(backend, textures, &draw(None, BlendMode::Blend))
                    .unwrap();
            }
        });
        assert_eq!(count_of(&ops, |op| matches!(op, GpuOp::SetViewport(_))), 1);
        assert_eq!(count_of(&ops, |op| matches!(op, GpuOp::SetBlend(_))), 1);
        assert_eq!(count_of(&ops, |op| matches!(op, GpuOp::BindProgram(_))), 1);
    }

    #[test]
    fn blend_change_emits_again_without_program_rebind() {
        let ops = ops_of(|state, backend, textures| {
            state
                .apply(backend, textures, &draw(None, BlendMode::Blend))
                .unwrap();
            state
                .apply(backend, textures, &draw(None, BlendMode::Add))
                .unwrap();
        });
        assert_eq!(count_of(&ops, |op| matches!(op, GpuOp::SetBlend(_))), 2);
        assert_eq!(count_of(&ops, |op| matches!(op, GpuOp::BindProgram(_))), 1);
    }

    #[test]
    fn clip_without_viewport_uses_drawable_bounds() {
        let ops = ops_of(|state, backend, textures| {
            state.on_set_clip(Some(IRect::new(-10, 10, 400, 100)));
            state
                .apply(backend, textures, &draw(None, BlendMode::Blend))
                .unwrap();
        });
        assert!(ops.contains(&GpuOp::SetClip(IRect::new(0, 10, 320, 100))));
    }

    #[test]
    fn clip_is_viewport_relative() {
        let ops = ops_of(|state, backend, textures| {
            state.on_set_viewport(IRect::new(100, 50, 160, 120));
            state.on_set_clip(Some(IRect::new(10, 10, 20, 20)));
            state
                .apply(backend, textures, &draw(None, BlendMode::Blend))
                .unwrap();
        });
        assert!(ops.contains(&GpuOp::SetClip(IRect::new(110, 60, 20, 20))));
    }

    #[test]
    fn moving_the_viewport_reanchors_a_disabled_clip() {
        let ops = ops_of(|state, backend, textures| {
            state.on_set_viewport(IRect::new(0, 0, 100, 100));
            state
                .apply(backend, textures, &draw(None, BlendMode::Blend))
                .unwrap();
            state.on_set_viewport(IRect::new(20, 20, 50, 40));
            state
                .apply(backend, textures, &draw(None, BlendMode::Blend))
                .unwrap();
        });
        // The second viewport must bring a scissor matching its extent.
        assert!(ops.contains(&GpuOp::SetClip(IRect::new(20, 20, 50, 40))));
    }

    #[test]
    fn disabling_clip_with_viewport_keeps_viewport_scissor() {
        let ops = ops_of(|state, backend, textures| {
            state.on_set_viewport(IRect::new(10, 10, 80, 60));
            state.on_set_clip(Some(IRect::new(0, 0, 10, 10)));
            state
                .apply(backend, textures, &draw(None, BlendMode::Blend))
                .unwrap();
            state.on_set_clip(None);
            state
                .apply(backend, textures, &draw(None, BlendMode::Blend))
                .unwrap();
        });
        let clips: Vec<_> = ops
            .iter()
            .filter(|op| matches!(op, GpuOp::SetClip(_)))
            .collect();
        assert_eq!(clips.last(), Some(&&GpuOp::SetClip(IRect::new(10, 10, 80, 60))));
        assert_eq!(count_of(&ops, |op| matches!(op, GpuOp::DisableClip)), 0);
    }

    #[test]
    fn sampler_state_is_cached_per_texture() {
        let mut backend = DeferredBackend::new(&DeferredConfig { width: 64, height: 64 });
        let mut textures = TextureTable::new();
        let mut state = DrawState::new();
        state.begin_frame(64, 64);
        let id = backend
            .create_texture(
                &mut textures,
                &crate::texture::TextureDesc {
                    width: 8,
                    height: 8,
                    format: crate::texture::PixelFormat::Abgr8888,
                    access: crate::texture::TextureAccess::Static,
                },
            )
            .unwrap();

        let mut d = draw(Some(id), BlendMode::Blend);
        state.apply(&mut backend, &mut textures, &d).unwrap();
        state.apply(&mut backend, &mut textures, &d).unwrap();
        d.scale_mode = ScaleMode::Linear;
        state.apply(&mut backend, &mut textures, &d).unwrap();

        let ops = backend.display_list().ops();
        assert_eq!(
            count_of(ops, |op| matches!(op, GpuOp::SetSampler { .. })),
            2
        );
        assert_eq!(
            count_of(ops, |op| matches!(op, GpuOp::BindTexture(_))),
            1
        );
    }
}
