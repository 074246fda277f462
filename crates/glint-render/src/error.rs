use crate::texture::PixelFormat;

/// Errors surfaced by renderer operations.
///
/// Every failure is synchronous: an operation either completes or returns one
/// of these without corrupting renderer state. There are no internal retries;
/// the application decides whether to free resources and try again.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The per-frame vertex arena ran out of space. The draw call that hit
    /// this contributes no geometry; the frame is otherwise intact.
    #[error("vertex pool exhausted: needed {needed} bytes, {available} available")]
    VertexPoolExhausted { needed: usize, available: usize },

    /// The fast memory tier could not satisfy an allocation even after
    /// spilling every evictable render target.
    #[error(
        "out of video memory: wanted {wanted} bytes, largest free block {largest} ({available} free total)"
    )]
    OutOfVideoMemory {
        wanted: usize,
        largest: usize,
        available: usize,
    },

    #[error("pixel format {0:?} is not supported by this backend")]
    UnsupportedFormat(PixelFormat),

    #[error("texture handle is stale or invalid")]
    InvalidTexture,

    #[error("texture is already locked")]
    AlreadyLocked,

    #[error("texture is not locked")]
    NotLocked,

    /// The texture's access mode does not permit the attempted operation
    /// (e.g. locking a static texture, targeting a non-target texture).
    #[error("operation not permitted for texture access mode")]
    InvalidAccess,

    /// The byte buffer handed to an update call does not cover the
    /// requested region at the stated pitch.
    #[error("pixel source too small: update needs {needed} bytes, {got} provided")]
    PixelSourceTooSmall { needed: usize, got: usize },

    #[error("reading back from a render target is not supported by the {0} backend")]
    ReadbackUnsupported(&'static str),

    /// The native submission layer rejected an operation. State changes
    /// already issued this frame are not rolled back; the frame's queue is
    /// abandoned.
    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;
