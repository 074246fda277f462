/// Axis-aligned rectangle in logical pixels (top-left origin).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    /// Normalizes the rectangle so width/height are non-negative.
    #[inline]
    pub fn normalized(self) -> Self {
        let mut r = self;
        if r.w < 0.0 {
            r.x += r.w;
            r.w = -r.w;
        }
        if r.h < 0.0 {
            r.y += r.h;
            r.h = -r.h;
        }
        r
    }
}

/// Integer rectangle for viewports, scissor rects and pixel regions.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct IRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl IRect {
    #[inline]
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Clamps this rect so it does not extend past `bounds` (origin-relative
    /// clamp on the near edges, extent clamp on the far edges).
    ///
    /// Mirrors the scissor clamping rule: a clip rect is only meaningful
    /// inside the active viewport.
    pub fn clamped_to(self, bounds: IRect) -> IRect {
        let mut r = self;

        if r.x < 0 {
            r.w += r.x;
            r.x = 0;
        }
        if r.y < 0 {
            r.h += r.y;
            r.y = 0;
        }

        let max_x_c = r.x + r.w;
        let max_y_c = r.y + r.h;
        let max_x_v = bounds.x + bounds.w;
        let max_y_v = bounds.y + bounds.h;

        if max_x_c > max_x_v {
            r.w -= max_x_c - max_x_v;
        }
        if max_y_c > max_y_v {
            r.h -= max_y_c - max_y_v;
        }

        r
    }
}
