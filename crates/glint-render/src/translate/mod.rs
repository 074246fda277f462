//! Queue translation.
//!
//! One pass over the frame's command queue turns it into native ops: state
//! commands fold into the [`DrawState`] cache, runs of draws that agree on
//! topology, texture and blend collapse into a single native draw over their
//! combined vertex range, and primitive types the device renders through a
//! polygon mode get bracketed by mode switches.

use crate::backend::{Backend, PolygonMode};
use crate::cmd::{DrawData, RenderCommand, Topology};
use crate::error::Result;
use crate::state::DrawState;
use crate::texture::{TextureId, TextureTable};

/// Translates and submits one frame's queue against `target` (`None` for
/// the window). The scene is opened and closed here; draining is left to
/// the caller.
pub fn run_queue(
    backend: &mut dyn Backend,
    state: &mut DrawState,
    textures: &mut TextureTable,
    target: Option<TextureId>,
    commands: &[RenderCommand],
) -> Result<()> {
    backend.begin_scene(textures, target)?;
    let (w, h) = match target {
        Some(id) => {
            let entry = textures.get(id)?;
            (entry.width, entry.height)
        }
        None => backend.drawable_size(),
    };
    state.begin_frame(w, h);

    let mut i = 0;
    while i < commands.len() {
        match commands[i] {
            RenderCommand::NoOp | RenderCommand::SetDrawColor(_) => {}
            RenderCommand::SetViewport(viewport) => state.on_set_viewport(viewport),
            RenderCommand::SetClipRect(clip) => state.on_set_clip(clip),
            RenderCommand::Clear(color) => {
                // The clear path ignores scissor state, so an active scissor
                // comes down first and re-applies before the next draw.
                if state.scissor_active() {
                    backend.disable_clip();
                }
                backend.clear(color);
                state.on_clear();
            }
            RenderCommand::Draw(draw) => {
                let mut merged = draw;
                while let Some(RenderCommand::Draw(next)) = commands.get(i + 1) {
                    if !merged.can_merge(next) {
                        break;
                    }
                    debug_assert!(
                        merged.span.len == 0
                            || next.span.len == 0
                            || merged.span.end() == next.span.offset,
                        "mergeable draws must be pool-adjacent"
                    );
                    merged.count += next.count;
                    merged.span.len += next.span.len;
                    i += 1;
                }
                if merged.count > 0 {
                    submit(backend, state, textures, &merged)?;
                }
            }
        }
        i += 1;
    }

    backend.end_scene();
    Ok(())
}

fn submit(
    backend: &mut dyn Backend,
    state: &mut DrawState,
    textures: &mut TextureTable,
    draw: &DrawData,
) -> Result<()> {
    state.apply(backend, textures, draw)?;

    let bracket = match draw.topology {
        Topology::Points => Some(PolygonMode::Point),
        Topology::Lines => Some(PolygonMode::Line),
        _ => None,
    };
    if let Some(mode) = bracket {
        backend.set_polygon_mode(mode);
    }
    backend.draw(draw.topology, draw.kind, draw.span.offset, draw.count);
    if bracket.is_some() {
        backend.set_polygon_mode(PolygonMode::Fill);
    }
    Ok(())
}
