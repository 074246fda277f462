//! Texture objects and the renderer-owned texture table.
//!
//! Textures are owned by the application through opaque `TextureId` handles;
//! the table maps handles to entries. Backends decide padding/pitch/backing
//! at creation time and migrate backing bytes (residency), but never change a
//! texture's logical identity.

mod format;

pub use format::PixelFormat;

use crate::error::{RenderError, Result};
use crate::residency::VramBlock;

/// How the application intends to use a texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextureAccess {
    /// Uploaded rarely, sampled often. Eligible for tiled layout.
    Static,
    /// Locked and rewritten frequently from the CPU. Always linear.
    Streaming,
    /// Renderable; participates in residency tracking.
    Target,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScaleMode {
    Nearest,
    Linear,
    /// Integer-scale-friendly variant; both backends sample it as Nearest.
    PixelArt,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressMode {
    Clamp,
    Wrap,
}

/// Creation parameters for [`crate::renderer::Renderer::create_texture`].
#[derive(Debug, Copy, Clone)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub access: TextureAccess,
}

/// Where a texture's bytes currently live.
#[derive(Debug)]
pub enum Backing {
    /// Slow tier / shared memory: plain heap bytes.
    Host(Vec<u8>),
    /// Fast tier: a block inside the backend's video memory pool.
    Video(VramBlock),
}

/// One texture's bookkeeping. Field meanings follow the shared contract:
/// `scale_mode`/`address_*` are the application's current intent, the
/// `applied_*` pair is the sampler state last pushed to the native device
/// (so redundant sampler calls can be elided per texture).
#[derive(Debug)]
pub struct TextureEntry {
    pub width: u32,
    pub height: u32,
    pub padded_width: u32,
    pub padded_height: u32,
    /// Bytes per row of the addressable plane (padded width * bpp).
    pub pitch: usize,
    pub format: PixelFormat,
    pub access: TextureAccess,

    pub scale_mode: ScaleMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub applied_scale_mode: Option<ScaleMode>,
    pub applied_address: Option<(AddressMode, AddressMode)>,

    pub locked: bool,
    /// True when the backing bytes are in the backend-native tiled layout.
    pub swizzled: bool,
    pub backing: Backing,
}

impl TextureEntry {
    /// Total backing-store size in bytes.
    pub fn storage_size(&self) -> usize {
        match &self.backing {
            Backing::Host(bytes) => bytes.len(),
            Backing::Video(block) => block.len(),
        }
    }

    #[inline]
    pub fn is_video_resident(&self) -> bool {
        matches!(self.backing, Backing::Video(_))
    }

    pub fn host_bytes(&self) -> Option<&[u8]> {
        match &self.backing {
            Backing::Host(bytes) => Some(bytes),
            Backing::Video(_) => None,
        }
    }

    pub fn host_bytes_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.backing {
            Backing::Host(bytes) => Some(bytes),
            Backing::Video(_) => None,
        }
    }
}

/// Opaque texture handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) u32);

/// Slab of texture entries. Slots are reused after destroy; a handle into a
/// reused slot is the application's bug, same as a dangling native handle.
#[derive(Debug, Default)]
pub struct TextureTable {
    entries: Vec<Option<TextureEntry>>,
}

impl TextureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: TextureEntry) -> TextureId {
        for (i, slot) in self.entries.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(entry);
                return TextureId(i as u32);
            }
        }
        self.entries.push(Some(entry));
        TextureId((self.entries.len() - 1) as u32)
    }

    pub fn get(&self, id: TextureId) -> Result<&TextureEntry> {
        self.entries
            .get(id.0 as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(RenderError::InvalidTexture)
    }

    pub fn get_mut(&mut self, id: TextureId) -> Result<&mut TextureEntry> {
        self.entries
            .get_mut(id.0 as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(RenderError::InvalidTexture)
    }

    pub fn remove(&mut self, id: TextureId) -> Option<TextureEntry> {
        self.entries.get_mut(id.0 as usize).and_then(Option::take)
    }

    /// Iterates live entries (diagnostics / teardown).
    pub fn iter(&self) -> impl Iterator<Item = (TextureId, &TextureEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (TextureId(i as u32), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> TextureEntry {
        TextureEntry {
            width: 4,
            height: 4,
            padded_width: 4,
            padded_height: 4,
            pitch: 16,
            format: PixelFormat::Abgr8888,
            access: TextureAccess::Static,
            scale_mode: ScaleMode::Nearest,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            applied_scale_mode: None,
            applied_address: None,
            locked: false,
            swizzled: false,
            backing: Backing::Host(vec![0; 64]),
        }
    }

    #[test]
    fn insert_reuses_freed_slots() {
        let mut table = TextureTable::new();
        let a = table.insert(entry());
        let b = table.insert(entry());
        table.remove(a);
        let c = table.insert(entry());
        assert_eq!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn stale_handle_is_an_error() {
        let mut table = TextureTable::new();
        let a = table.insert(entry());
        table.remove(a);
        assert!(matches!(table.get(a), Err(RenderError::InvalidTexture)));
    }
}
