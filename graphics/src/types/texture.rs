//! Texture types and descriptors.

use bitflags::bitflags;

/// Portable pixel format enumeration.
///
/// Every backend maps these to a native format through a static table;
/// formats without a native equivalent are rejected at texture creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 16-bit red channel, unsigned normalized.
    R16Unorm,
    /// 32-bit red channel, float.
    R32Float,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RGBA channels, float.
    Rgba32Float,
    /// BC1 (DXT1) block compressed RGBA.
    Bc1RgbaUnorm,
    /// BC3 (DXT5) block compressed RGBA.
    Bc3RgbaUnorm,
    /// 24-bit depth with 8-bit stencil.
    Depth24UnormStencil8,
    /// 32-bit depth, float.
    Depth32Float,
    /// 32-bit depth float with 8-bit stencil.
    Depth32FloatStencil8,
}

impl PixelFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::Depth24UnormStencil8 | Self::Depth32Float | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Depth24UnormStencil8 | Self::Depth32FloatStencil8)
    }

    /// Returns true for block-compressed formats.
    pub fn is_compressed(self) -> bool {
        matches!(self, Self::Bc1RgbaUnorm | Self::Bc3RgbaUnorm)
    }

    /// Width and height of one block in pixels (1x1 for uncompressed formats).
    pub fn block_dimensions(self) -> (u32, u32) {
        if self.is_compressed() { (4, 4) } else { (1, 1) }
    }

    /// Returns the size in bytes per pixel/block.
    pub fn block_size(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R16Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::R32Float
            | Self::Depth24UnormStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float | Self::Depth32FloatStencil8 | Self::Bc1RgbaUnorm => 8,
            Self::Rgba32Float | Self::Bc3RgbaUnorm => 16,
        }
    }

    /// Number of bytes covering a `width` x `height` pixel region.
    pub fn region_size(self, width: u32, height: u32) -> u64 {
        let (block_w, block_h) = self.block_dimensions();
        let blocks_x = width.div_ceil(block_w) as u64;
        let blocks_y = height.div_ceil(block_h) as u64;
        blocks_x * blocks_y * self.block_size() as u64
    }

    /// Number of bytes in one row of blocks spanning `width` pixels.
    pub fn row_pitch(self, width: u32) -> u64 {
        let (block_w, _) = self.block_dimensions();
        width.div_ceil(block_w) as u64 * self.block_size() as u64
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be bound in a resource set and sampled.
        const SAMPLED = 1 << 0;
        /// Texture can be a color attachment of a framebuffer.
        const RENDER_TARGET = 1 << 1;
        /// Texture can be the depth attachment of a framebuffer.
        const DEPTH_STENCIL = 1 << 2;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Shape of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureKind {
    /// A 2D texture, optionally an array.
    #[default]
    Texture2D,
    /// A cube texture; each array layer holds six faces.
    Cube,
}

/// One face of a cube texture.
///
/// Faces are stored in the order +X, −X, +Y, −Y, +Z, −Z, so cube `n` of an
/// array occupies native layers `6n..6n + 6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    /// +X face (layer 0).
    PositiveX,
    /// −X face (layer 1).
    NegativeX,
    /// +Y face (layer 2).
    PositiveY,
    /// −Y face (layer 3).
    NegativeY,
    /// +Z face (layer 4).
    PositiveZ,
    /// −Z face (layer 5).
    NegativeZ,
}

impl CubeFace {
    /// All faces in storage order.
    pub const ALL: [CubeFace; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    /// Layer index of this face within its cube.
    pub fn index(self) -> u32 {
        self as u32
    }

    /// The face stored at `index` within a cube.
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// Descriptor for creating a texture.
///
/// For cube textures, `width` must equal `height` and `array_layers` counts
/// cubes, not faces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Mip level count.
    pub mip_levels: u32,
    /// Array layer count.
    pub array_layers: u32,
    /// Texture format.
    pub format: PixelFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            width,
            height,
            mip_levels: 1,
            array_layers: 1,
            format,
            usage,
        }
    }

    /// Create a new cube texture descriptor with square faces of `size` pixels.
    pub fn new_cube(size: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self::new_2d(size, size, format, usage)
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_levels = count;
        self
    }

    /// Use the full mip chain down to 1x1.
    pub fn with_full_mip_chain(mut self) -> Self {
        self.mip_levels = max_mip_levels(self.width, self.height);
        self
    }

    /// Set the array layer count.
    pub fn with_array_layers(mut self, count: u32) -> Self {
        self.array_layers = count;
        self
    }

    /// Dimensions of mip `level`, never smaller than 1x1.
    pub fn mip_extent(&self, level: u32) -> (u32, u32) {
        mip_extent(self.width, self.height, level)
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self::new_2d(1, 1, PixelFormat::default(), TextureUsage::SAMPLED)
    }
}

/// Number of levels in a full mip chain for the given base size.
pub fn max_mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Dimensions of mip `level` for the given base size, never smaller than 1x1.
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    let shift = level.min(31);
    ((width >> shift).max(1), (height >> shift).max(1))
}

/// A rectangular region of one mip level of one array layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureRegion {
    /// X offset in pixels.
    pub x: u32,
    /// Y offset in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Mip level.
    pub mip_level: u32,
    /// Native array layer. For cube textures this is `cube * 6 + face`.
    pub array_layer: u32,
}

impl TextureRegion {
    /// A region starting at `(x, y)` on mip 0 of layer 0.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            mip_level: 0,
            array_layer: 0,
        }
    }

    /// The whole of mip 0 of layer 0 for a texture of the given size.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Target a different mip level.
    pub fn with_mip_level(mut self, level: u32) -> Self {
        self.mip_level = level;
        self
    }

    /// Target a different native array layer.
    pub fn with_array_layer(mut self, layer: u32) -> Self {
        self.array_layer = layer;
        self
    }

    /// Target `face` of cube `cube` in a cube texture.
    pub fn with_cube_face(mut self, cube: u32, face: CubeFace) -> Self {
        self.array_layer = cube * 6 + face.index();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_face_order() {
        let indices: Vec<u32> = CubeFace::ALL.iter().map(|face| face.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(CubeFace::from_index(3), Some(CubeFace::NegativeY));
        assert_eq!(CubeFace::from_index(6), None);
    }

    #[test]
    fn test_mip_math() {
        assert_eq!(max_mip_levels(64, 64), 7);
        assert_eq!(max_mip_levels(256, 16), 9);
        assert_eq!(max_mip_levels(1, 1), 1);
        assert_eq!(mip_extent(64, 16, 3), (8, 2));
        assert_eq!(mip_extent(64, 16, 6), (1, 1));
    }

    #[test]
    fn test_compressed_region_size() {
        assert_eq!(PixelFormat::Bc1RgbaUnorm.region_size(8, 8), 32);
        assert_eq!(PixelFormat::Bc3RgbaUnorm.region_size(4, 4), 16);
        assert_eq!(PixelFormat::Bc1RgbaUnorm.region_size(2, 2), 8);
        assert_eq!(PixelFormat::Rgba8Unorm.region_size(3, 2), 24);
        assert_eq!(PixelFormat::Bc3RgbaUnorm.row_pitch(16), 64);
    }

    #[test]
    fn test_cube_region() {
        let region = TextureRegion::full(64, 64).with_cube_face(1, CubeFace::PositiveZ);
        assert_eq!(region.array_layer, 10);
    }
}
