use bytemuck::{Pod, Zeroable};

/// Floating-point RGBA color, non-premultiplied, nominal range [0, 1].
///
/// Values outside the range are legal until conversion; `to_rgba8` clamps.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Converts to packed 8-bit RGBA, applying `scale` to the color channels
    /// (not alpha) before clamping. This is the conversion every vertex color
    /// goes through when it is baked into the frame's vertex pool.
    #[inline]
    pub fn to_rgba8(self, scale: f32) -> Rgba8 {
        #[inline]
        fn chan(v: f32) -> u8 {
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        Rgba8([
            chan(self.r * scale),
            chan(self.g * scale),
            chan(self.b * scale),
            chan(self.a),
        ])
    }
}

/// Packed 8-bit-per-channel RGBA, the wire format for vertex colors.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgba8(pub [u8; 4]);

impl Rgba8 {
    #[inline]
    pub const fn r(self) -> u8 {
        self.0[0]
    }
    #[inline]
    pub const fn g(self) -> u8 {
        self.0[1]
    }
    #[inline]
    pub const fn b(self) -> u8 {
        self.0[2]
    }
    #[inline]
    pub const fn a(self) -> u8 {
        self.0[3]
    }
}
