//! Texture memory layout codecs.
//!
//! Two concerns live here: the block-tiled layout the overcommit backend
//! prefers for sampled textures, and the plane arithmetic for packed YUV
//! formats. Both are pure byte transforms with no device dependencies.

mod planar;
mod swizzle;

pub use planar::{PlanarLayout, copy_plane};
pub use swizzle::{swizzle, tile_eligible, unswizzle};
