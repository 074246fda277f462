use crate::coords::Rgba8;

/// Pixel formats understood by at least one backend.
///
/// Which subset a backend actually accepts is decided at texture creation;
/// unsupported formats fail with `RenderError::UnsupportedFormat`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Abgr8888,
    Argb8888,
    Bgr565,
    Rgb565,
    Abgr1555,
    Abgr4444,
    /// 3-plane YUV 4:2:0, V plane stored before U.
    Yv12,
    /// 3-plane YUV 4:2:0, U plane stored before V.
    Iyuv,
    /// 2-plane YUV 4:2:0, interleaved UV.
    Nv12,
    /// 2-plane YUV 4:2:0, interleaved VU.
    Nv21,
}

impl PixelFormat {
    /// Bytes per pixel of the addressable (Y, for planar formats) plane.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Abgr8888 | PixelFormat::Argb8888 => 4,
            PixelFormat::Bgr565
            | PixelFormat::Rgb565
            | PixelFormat::Abgr1555
            | PixelFormat::Abgr4444 => 2,
            PixelFormat::Yv12 | PixelFormat::Iyuv | PixelFormat::Nv12 | PixelFormat::Nv21 => 1,
        }
    }

    #[inline]
    pub const fn is_planar(self) -> bool {
        self.plane_count() > 1
    }

    #[inline]
    pub const fn plane_count(self) -> usize {
        match self {
            PixelFormat::Yv12 | PixelFormat::Iyuv => 3,
            PixelFormat::Nv12 | PixelFormat::Nv21 => 2,
            _ => 1,
        }
    }

    /// Packs a color into this format's byte representation (little-endian).
    ///
    /// Only meaningful for single-plane formats; planar formats cannot be
    /// render targets and are never color-filled through this path.
    pub fn pack(self, c: Rgba8) -> [u8; 4] {
        let (r, g, b, a) = (c.r() as u32, c.g() as u32, c.b() as u32, c.a() as u32);
        match self {
            PixelFormat::Abgr8888 => [c.r(), c.g(), c.b(), c.a()],
            PixelFormat::Argb8888 => [c.b(), c.g(), c.r(), c.a()],
            PixelFormat::Bgr565 => {
                let v = (r >> 3) | ((g >> 2) << 5) | ((b >> 3) << 11);
                let [lo, hi] = (v as u16).to_le_bytes();
                [lo, hi, 0, 0]
            }
            PixelFormat::Rgb565 => {
                let v = (b >> 3) | ((g >> 2) << 5) | ((r >> 3) << 11);
                let [lo, hi] = (v as u16).to_le_bytes();
                [lo, hi, 0, 0]
            }
            PixelFormat::Abgr1555 => {
                let v = (r >> 3) | ((g >> 3) << 5) | ((b >> 3) << 10) | if a > 0 { 0x8000 } else { 0 };
                let [lo, hi] = (v as u16).to_le_bytes();
                [lo, hi, 0, 0]
            }
            PixelFormat::Abgr4444 => {
                let v = (r >> 4) | ((g >> 4) << 4) | ((b >> 4) << 8) | ((a >> 4) << 12);
                let [lo, hi] = (v as u16).to_le_bytes();
                [lo, hi, 0, 0]
            }
            // Planar formats have no single packed form; callers must not
            // reach here (targets are single-plane by construction).
            PixelFormat::Yv12 | PixelFormat::Iyuv | PixelFormat::Nv12 | PixelFormat::Nv21 => {
                [0, 0, 0, 0]
            }
        }
    }

    /// Fills `dst` with the packed representation of `c`, repeated.
    pub fn fill(self, dst: &mut [u8], c: Rgba8) {
        let bpp = self.bytes_per_pixel();
        let px = self.pack(c);
        for chunk in dst.chunks_exact_mut(bpp) {
            chunk.copy_from_slice(&px[..bpp]);
        }
    }
}
