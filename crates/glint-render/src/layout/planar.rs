use crate::texture::PixelFormat;

/// Byte layout of a planar YUV surface inside one contiguous allocation.
///
/// The luma plane always comes first at offset 0. Chroma planes follow at
/// `pitch * height` with half resolution in both axes, rounded up. For the
/// three-plane formats the second stored plane is V for `Yv12` and U for
/// `Iyuv`; the two-plane formats store one interleaved chroma plane.
#[derive(Debug, Copy, Clone)]
pub struct PlanarLayout {
    pub format: PixelFormat,
    pub luma_pitch: usize,
    pub luma_height: usize,
    pub chroma_pitch: usize,
    pub chroma_height: usize,
}

impl PlanarLayout {
    pub fn new(format: PixelFormat, pitch: usize, height: usize) -> Self {
        debug_assert!(format.is_planar());
        let half_pitch = pitch.div_ceil(2);
        let chroma_pitch = match format {
            PixelFormat::Nv12 | PixelFormat::Nv21 => 2 * half_pitch,
            _ => half_pitch,
        };
        Self {
            format,
            luma_pitch: pitch,
            luma_height: height,
            chroma_pitch,
            chroma_height: height.div_ceil(2),
        }
    }

    #[inline]
    pub fn y_offset(&self) -> usize {
        0
    }

    /// Base of chroma storage, directly after the luma plane.
    #[inline]
    pub fn chroma_offset(&self) -> usize {
        self.luma_pitch * self.luma_height
    }

    pub fn u_offset(&self) -> usize {
        match self.format {
            PixelFormat::Yv12 => self.chroma_offset() + self.chroma_pitch * self.chroma_height,
            _ => self.chroma_offset(),
        }
    }

    pub fn v_offset(&self) -> usize {
        match self.format {
            PixelFormat::Iyuv => self.chroma_offset() + self.chroma_pitch * self.chroma_height,
            _ => self.chroma_offset(),
        }
    }

    /// Base of the interleaved chroma plane (two-plane formats only).
    #[inline]
    pub fn uv_offset(&self) -> usize {
        self.chroma_offset()
    }

    pub fn total_size(&self) -> usize {
        let chroma_planes = self.format.plane_count() - 1;
        self.chroma_offset() + chroma_planes * self.chroma_pitch * self.chroma_height
    }
}

/// Copies `rows` rows of `row_bytes` each between buffers with differing
/// pitches. The workhorse for texture uploads and plane updates.
pub fn copy_plane(dst: &mut [u8], dst_pitch: usize, src: &[u8], src_pitch: usize, row_bytes: usize, rows: usize) {
    if dst_pitch == src_pitch && src_pitch == row_bytes {
        dst[..row_bytes * rows].copy_from_slice(&src[..row_bytes * rows]);
        return;
    }
    for r in 0..rows {
        dst[r * dst_pitch..r * dst_pitch + row_bytes]
            .copy_from_slice(&src[r * src_pitch..r * src_pitch + row_bytes]);
    }
}
