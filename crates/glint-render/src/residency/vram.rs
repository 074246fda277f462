use crate::error::{RenderError, Result};

/// Allocation granularity of the pool. Matches the texture-unit address
/// alignment requirement of the fixed-function device.
const VRAM_ALIGN: usize = 16;

/// A reserved range inside a [`VramPool`]. Blocks are plain handles; the
/// pool does the bookkeeping.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VramBlock {
    offset: usize,
    len: usize,
}

impl VramBlock {
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Copy, Clone)]
struct FreeRange {
    offset: usize,
    len: usize,
}

/// First-fit allocator over a fixed, simulated video memory arena.
///
/// The free list is kept sorted by offset and adjacent ranges coalesce on
/// free, so fragmentation only arises from allocation order, same as the
/// real device heap this models.
pub struct VramPool {
    memory: Vec<u8>,
    free: Vec<FreeRange>,
}

impl VramPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.next_multiple_of(VRAM_ALIGN);
        Self {
            memory: vec![0; capacity],
            free: vec![FreeRange { offset: 0, len: capacity }],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Total free bytes, possibly fragmented.
    pub fn available(&self) -> usize {
        self.free.iter().map(|r| r.len).sum()
    }

    /// Largest single allocation that could currently succeed.
    pub fn largest_free_block(&self) -> usize {
        self.free.iter().map(|r| r.len).max().unwrap_or(0)
    }

    /// Reserves `len` bytes (rounded up to pool alignment), first fit.
    pub fn alloc(&mut self, len: usize) -> Result<VramBlock> {
        let len = len.next_multiple_of(VRAM_ALIGN).max(VRAM_ALIGN);
        for i in 0..self.free.len() {
            if self.free[i].len >= len {
                let offset = self.free[i].offset;
                self.free[i].offset += len;
                self.free[i].len -= len;
                if self.free[i].len == 0 {
                    self.free.remove(i);
                }
                return Ok(VramBlock { offset, len });
            }
        }
        Err(RenderError::OutOfVideoMemory {
            wanted: len,
            largest: self.largest_free_block(),
            available: self.available(),
        })
    }

    /// Returns a block to the pool, merging with neighbors.
    pub fn free(&mut self, block: VramBlock) {
        let pos = self
            .free
            .partition_point(|r| r.offset < block.offset);
        self.free.insert(
            pos,
            FreeRange {
                offset: block.offset,
                len: block.len,
            },
        );

        // Coalesce with the following range, then the preceding one.
        if pos + 1 < self.free.len() && self.free[pos].offset + self.free[pos].len == self.free[pos + 1].offset {
            self.free[pos].len += self.free[pos + 1].len;
            self.free.remove(pos + 1);
        }
        if pos > 0 && self.free[pos - 1].offset + self.free[pos - 1].len == self.free[pos].offset {
            self.free[pos - 1].len += self.free[pos].len;
            self.free.remove(pos);
        }
    }

    #[inline]
    pub fn bytes(&self, block: VramBlock) -> &[u8] {
        &self.memory[block.offset..block.offset + block.len]
    }

    #[inline]
    pub fn bytes_mut(&mut self, block: VramBlock) -> &mut [u8] {
        &mut self.memory[block.offset..block.offset + block.len]
    }
}
