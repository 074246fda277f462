//! Glint render core.
//!
//! A hardware-independent 2D command layer: draw calls bake into a frame
//! queue, a translator collapses the queue into native ops for one of two
//! backend models (tile-based deferred or fixed-function with an
//! oversubscribable video memory pool), and texture residency, layout and
//! state caching stay out of the application's way.

pub mod backend;
pub mod cmd;
pub mod coords;
pub mod error;
pub mod layout;
pub mod logging;
pub mod pool;
pub mod renderer;
pub mod residency;
pub mod state;
pub mod texture;
pub mod translate;

pub use backend::{
    Backend, BackendCaps, DeferredBackend, DeferredConfig, OvercommitBackend, OvercommitConfig,
};
pub use cmd::{BlendMode, Topology};
pub use coords::{Color, IRect, Rect, Rgba8};
pub use error::{RenderError, Result};
pub use renderer::{Indices, Renderer, RendererConfig};
pub use texture::{
    AddressMode, PixelFormat, ScaleMode, TextureAccess, TextureDesc, TextureId,
};
