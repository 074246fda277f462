//! Per-frame vertex memory.
//!
//! Draw calls bake their vertices into a bump-allocated arena that lives for
//! exactly one frame. Two arenas alternate across frames so the GPU can still
//! be reading frame N-1's vertices while the CPU fills frame N's; nothing is
//! ever freed individually.

use crate::error::{RenderError, Result};

/// Alignment of every allocation, matching the widest vertex field (f32).
const VERTEX_ALIGN: usize = 4;

/// A range of bytes inside the current frame's arena.
///
/// Valid only until the owning frame's pool is reset; commands holding spans
/// must not outlive one queue run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    #[inline]
    pub const fn empty() -> Self {
        Span { offset: 0, len: 0 }
    }

    #[inline]
    pub fn end(self) -> usize {
        self.offset + self.len
    }
}

/// Double-buffered bump allocator for frame vertex data.
pub struct VertexPool {
    arenas: [Vec<u8>; 2],
    current: usize,
    cursor: usize,
    capacity: usize,
}

impl VertexPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            arenas: [vec![0; capacity], vec![0; capacity]],
            current: 0,
            cursor: 0,
            capacity,
        }
    }

    /// Index of the arena currently being filled (0 or 1).
    #[inline]
    pub fn arena_index(&self) -> usize {
        self.current
    }

    /// Reserves `len` bytes in the current arena.
    ///
    /// Exceeding the arena's fixed capacity fails the requesting draw call;
    /// no partial allocation is handed out.
    pub fn allocate(&mut self, len: usize) -> Result<Span> {
        let offset = self.cursor.next_multiple_of(VERTEX_ALIGN);
        if offset + len > self.capacity {
            return Err(RenderError::VertexPoolExhausted {
                needed: len,
                available: self.capacity.saturating_sub(offset),
            });
        }
        self.cursor = offset + len;
        Ok(Span { offset, len })
    }

    /// Copies `bytes` into a previously allocated span.
    pub fn write(&mut self, span: Span, bytes: &[u8]) {
        debug_assert_eq!(span.len, bytes.len());
        self.arenas[self.current][span.offset..span.end()].copy_from_slice(bytes);
    }

    /// Borrows a span's bytes from the current arena.
    pub fn bytes(&self, span: Span) -> &[u8] {
        &self.arenas[self.current][span.offset..span.end()]
    }

    /// Bytes used so far this frame.
    #[inline]
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Flips to the other arena and resets the cursor. Called exactly once
    /// per present; the retired arena's contents stay untouched for the GPU.
    pub fn end_frame(&mut self) {
        self.cursor = 0;
        self.current ^= 1;
    }
}
