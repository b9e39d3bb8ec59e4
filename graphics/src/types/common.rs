//! Colors, viewports and scissor rectangles.

/// Linear RGBA color used for clears and blend constants.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RgbaFloat {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl RgbaFloat {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Self = Self::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Self = Self::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Self = Self::new(0.0, 0.0, 1.0, 1.0);
    pub const CLEAR: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    pub const CORNFLOWER_BLUE: Self = Self::new(0.392, 0.584, 0.929, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<[f32; 4]> for RgbaFloat {
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Self::new(r, g, b, a)
    }
}

/// Region of the bound framebuffer that clip space maps to.
///
/// Every backend takes a top-left origin with depth in `[0, 1]`. OpenGL
/// flips `y` against the height of the framebuffer bound at the point the
/// viewport is replayed, see [`Viewport::flipped_y`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Covers a whole `width` x `height` target.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    /// Reverse-Z ranges (`min > max`) are accepted.
    pub fn with_depth_range(mut self, min_depth: f32, max_depth: f32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    /// `y` of the bottom edge measured from the bottom of a target
    /// `target_height` tall.
    pub fn flipped_y(&self, target_height: u32) -> f32 {
        target_height as f32 - (self.y + self.height)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

/// Scissor rectangle, top-left origin. Only applied when the bound
/// pipeline enables the scissor test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Bottom-left based `y`, the GL convention.
    pub fn flipped_y(&self, target_height: u32) -> i32 {
        let bottom = self.y.saturating_add_unsigned(self.height);
        i32::try_from(target_height)
            .unwrap_or(i32::MAX)
            .saturating_sub(bottom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_to_bottom_left() {
        let viewport = Viewport::new(1.0, 1.0, 4.0, 2.0);
        assert_eq!(viewport.flipped_y(8), 5.0);
        assert_eq!(Viewport::from_dimensions(8, 8).flipped_y(8), 0.0);

        assert_eq!(ScissorRect::new(0, 0, 8, 1).flipped_y(6), 5);
        assert_eq!(ScissorRect::new(i32::MAX, 0, 1, u32::MAX).flipped_y(6), 6 - i32::MAX);
    }

    #[test]
    fn color_from_array() {
        assert_eq!(RgbaFloat::from([1.0, 0.0, 0.0, 1.0]), RgbaFloat::RED);
        assert_eq!(RgbaFloat::CLEAR.to_array(), [0.0; 4]);
    }
}
