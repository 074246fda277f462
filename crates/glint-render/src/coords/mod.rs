//! Geometry primitives shared across the renderer.
//!
//! Convention:
//! - `Rect` is f32 and used for application-facing geometry (top-left
//!   origin, +Y down).
//! - `IRect` is i32 and used for viewport/scissor/pixel regions.

mod color;
mod rect;

pub use color::{Color, Rgba8};
pub use rect::{IRect, Rect};
