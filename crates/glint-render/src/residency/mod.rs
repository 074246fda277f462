//! Render-target residency over a fixed video memory budget.
//!
//! Render targets prefer the fast tier (the [`VramPool`]) but the pool can be
//! oversubscribed. A least-recently-targeted list decides which target gives
//! up its fast-tier block when space runs out; its pixels move to a slow-tier
//! host copy and move back, re-tiled, the next time it is activated. Spills
//! are content-preserving and invisible to the application except in timing.

mod vram;

pub use vram::{VramBlock, VramPool};

use crate::error::Result;
use crate::layout::{swizzle, tile_eligible, unswizzle};
use crate::texture::{Backing, TextureId, TextureTable};

/// Recency order for fast-tier render targets, most recent first.
///
/// Only targets currently holding a fast-tier block are tracked; a spilled
/// target leaves the list until it is promoted again.
#[derive(Debug, Default)]
pub struct ResidencyLru {
    order: Vec<TextureId>,
}

impl ResidencyLru {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_front(&mut self, id: TextureId) {
        debug_assert!(!self.order.contains(&id));
        self.order.insert(0, id);
    }

    pub fn bring_front(&mut self, id: TextureId) {
        if let Some(pos) = self.order.iter().position(|&t| t == id) {
            let id = self.order.remove(pos);
            self.order.insert(0, id);
        }
    }

    pub fn remove(&mut self, id: TextureId) {
        self.order.retain(|&t| t != id);
    }

    #[inline]
    pub fn contains(&self, id: TextureId) -> bool {
        self.order.contains(&id)
    }

    #[inline]
    pub fn least_recent(&self) -> Option<TextureId> {
        self.order.last().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Addressable surface size of a texture's single plane.
#[inline]
fn surface_size(pitch: usize, padded_height: u32) -> usize {
    pitch * padded_height as usize
}

/// Moves a texture's pixels out of the fast tier into a fresh host copy,
/// untiling on the way so the slow-tier copy is always linear.
///
/// The host copy is fully built before any state is committed; a texture is
/// never left without exactly one valid backing.
pub fn spill(textures: &mut TextureTable, pool: &mut VramPool, id: TextureId) -> Result<()> {
    let entry = textures.get_mut(id)?;
    let block = match entry.backing {
        Backing::Video(block) => block,
        Backing::Host(_) => return Ok(()),
    };

    let surface = surface_size(entry.pitch, entry.padded_height);
    let mut host = vec![0u8; surface];
    let src = &pool.bytes(block)[..surface];
    if entry.swizzled {
        unswizzle(&mut host, src, entry.pitch, entry.padded_height as usize);
    } else {
        host.copy_from_slice(src);
    }

    entry.backing = Backing::Host(host);
    entry.swizzled = false;
    pool.free(block);
    log::debug!(
        "spilled texture {:?} to host ({} bytes, {} vram free)",
        id,
        surface,
        pool.available()
    );
    Ok(())
}

/// Moves a host-backed texture into the fast tier, tiling it when `tile`
/// is requested and the surface divides into blocks. No-op if the texture
/// is already fast-tier resident.
///
/// Callers make room first (see [`spill_for_space`]); on allocation failure
/// nothing changes.
pub fn promote(textures: &mut TextureTable, pool: &mut VramPool, id: TextureId, tile: bool) -> Result<()> {
    if textures.get(id)?.is_video_resident() {
        return Ok(());
    }

    let (pitch, padded_height) = {
        let entry = textures.get(id)?;
        (entry.pitch, entry.padded_height)
    };
    let surface = surface_size(pitch, padded_height);
    let block = pool.alloc(surface)?;

    let entry = textures.get_mut(id)?;
    let host = match std::mem::replace(&mut entry.backing, Backing::Video(block)) {
        Backing::Host(bytes) => bytes,
        Backing::Video(prev) => {
            entry.backing = Backing::Video(prev);
            pool.free(block);
            return Ok(());
        }
    };

    let do_tile = tile && tile_eligible(pitch, padded_height as usize);
    entry.swizzled = do_tile;

    let dst = &mut pool.bytes_mut(block)[..surface];
    if do_tile {
        swizzle(dst, &host[..surface], pitch, padded_height as usize);
    } else {
        dst.copy_from_slice(&host[..surface]);
    }
    log::debug!("promoted texture {id:?} to vram ({surface} bytes, tiled: {do_tile})");
    Ok(())
}

/// Spills the least-recently-targeted tracked texture other than `keep`.
/// Returns the spilled id, or `None` when nothing can be evicted.
pub fn spill_lru(
    lru: &mut ResidencyLru,
    textures: &mut TextureTable,
    pool: &mut VramPool,
    keep: Option<TextureId>,
) -> Result<Option<TextureId>> {
    let victim = lru
        .order
        .iter()
        .rev()
        .copied()
        .find(|&id| Some(id) != keep);
    let Some(victim) = victim else {
        return Ok(None);
    };
    spill(textures, pool, victim)?;
    lru.remove(victim);
    Ok(Some(victim))
}

/// Evicts targets, coldest first, until a `wanted`-byte allocation could
/// succeed or no evictable target remains. Running out of victims is not an
/// error here; the caller's allocation reports the final failure.
pub fn spill_for_space(
    lru: &mut ResidencyLru,
    textures: &mut TextureTable,
    pool: &mut VramPool,
    wanted: usize,
    keep: Option<TextureId>,
) -> Result<()> {
    while pool.largest_free_block() < wanted {
        if spill_lru(lru, textures, pool, keep)?.is_none() {
            break;
        }
    }
    Ok(())
}
