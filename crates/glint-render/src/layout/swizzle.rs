//! Block-tiled texture layout.
//!
//! The tiled layout stores 16-byte by 8-row blocks contiguously, left to
//! right then top to bottom. Sampling tiled textures keeps texture-cache
//! fetches inside one block, which is why the overcommit backend tiles
//! every texture it can.

const BLOCK_WIDTH: usize = 16; // bytes
const BLOCK_HEIGHT: usize = 8; // rows
const BLOCK_SIZE: usize = BLOCK_WIDTH * BLOCK_HEIGHT;

/// A surface can be tiled only when it divides evenly into blocks.
#[inline]
pub fn tile_eligible(pitch: usize, height: usize) -> bool {
    pitch % BLOCK_WIDTH == 0 && height % BLOCK_HEIGHT == 0 && pitch != 0 && height != 0
}

/// Converts `src` (linear, `pitch` bytes per row, `height` rows) into the
/// tiled layout in `dst`. Both buffers are `pitch * height` bytes.
pub fn swizzle(dst: &mut [u8], src: &[u8], pitch: usize, height: usize) {
    debug_assert!(tile_eligible(pitch, height));
    debug_assert_eq!(src.len(), pitch * height);
    debug_assert_eq!(dst.len(), pitch * height);

    let rowblocks = pitch / BLOCK_WIDTH;
    let mut blockaddress = 0;
    for j in 0..height {
        let src_row = &src[j * pitch..(j + 1) * pitch];
        let mut block = blockaddress;
        for i in 0..rowblocks {
            dst[block..block + BLOCK_WIDTH]
                .copy_from_slice(&src_row[i * BLOCK_WIDTH..(i + 1) * BLOCK_WIDTH]);
            block += BLOCK_SIZE;
        }
        blockaddress += BLOCK_WIDTH;
        if (j & (BLOCK_HEIGHT - 1)) == BLOCK_HEIGHT - 1 {
            blockaddress += (rowblocks - 1) * BLOCK_SIZE;
        }
    }
}

/// Converts `src` (tiled) back into linear rows in `dst`.
pub fn unswizzle(dst: &mut [u8], src: &[u8], pitch: usize, height: usize) {
    debug_assert!(tile_eligible(pitch, height));
    debug_assert_eq!(src.len(), pitch * height);
    debug_assert_eq!(dst.len(), pitch * height);

    let rowblocks = pitch / BLOCK_WIDTH;
    let mut offset = 0;
    for by in 0..height / BLOCK_HEIGHT {
        for bx in 0..rowblocks {
            for row in 0..BLOCK_HEIGHT {
                let dst_off = (by * BLOCK_HEIGHT + row) * pitch + bx * BLOCK_WIDTH;
                dst[dst_off..dst_off + BLOCK_WIDTH]
                    .copy_from_slice(&src[offset..offset + BLOCK_WIDTH]);
                offset += BLOCK_WIDTH;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_surface(pitch: usize, height: usize) -> Vec<u8> {
        (0..pitch * height).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn eligibility() {
        assert!(tile_eligible(16, 8));
        assert!(tile_eligible(128, 64));
        assert!(!tile_eligible(20, 8));
        assert!(!tile_eligible(16, 6));
        assert!(!tile_eligible(0, 8));
    }

    #[test]
    fn first_block_is_row_major_within_block() {
        let pitch = 32;
        let height = 8;
        let src = counting_surface(pitch, height);
        let mut tiled = vec![0; src.len()];
        swizzle(&mut tiled, &src, pitch, height);

        // Row r of the first block column lands at r*16 in tiled storage.
        for r in 0..8 {
            assert_eq!(&tiled[r * 16..r * 16 + 16], &src[r * pitch..r * pitch + 16]);
        }
        // The second block column starts one full block later.
        assert_eq!(&tiled[128..144], &src[16..32]);
    }

    #[test]
    fn round_trip_restores_linear_rows() {
        let pitch = 64;
        let height = 16;
        let src = counting_surface(pitch, height);
        let mut tiled = vec![0; src.len()];
        let mut back = vec![0; src.len()];
        swizzle(&mut tiled, &src, pitch, height);
        assert_ne!(tiled, src);
        unswizzle(&mut back, &tiled, pitch, height);
        assert_eq!(back, src);
    }

    #[test]
    fn round_trip_tiled_first() {
        let pitch = 16;
        let height = 24;
        let tiled = counting_surface(pitch, height);
        let mut linear = vec![0; tiled.len()];
        let mut back = vec![0; tiled.len()];
        unswizzle(&mut linear, &tiled, pitch, height);
        swizzle(&mut back, &linear, pitch, height);
        assert_eq!(back, tiled);
    }
}
