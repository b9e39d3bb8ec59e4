//! Byte storage behind native buffers and images.

use crate::types::{PixelFormat, RgbaFloat, mip_extent};

/// An access fell outside the addressed memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RangeError;

/// Linear memory of a native buffer.
#[derive(Debug, Clone)]
pub(crate) struct BufferMemory {
    bytes: Vec<u8>,
}

impl BufferMemory {
    /// Zero-initialised memory of `size` bytes.
    pub fn new(size: u64) -> Self {
        Self {
            bytes: vec![0; size as usize],
        }
    }

    /// Memory initialised with `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            bytes: data.to_vec(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn range(&self, offset: u64, len: u64) -> Result<std::ops::Range<usize>, RangeError> {
        let end = offset.checked_add(len).ok_or(RangeError)?;
        if end > self.size() {
            return Err(RangeError);
        }
        Ok(offset as usize..end as usize)
    }

    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), RangeError> {
        let range = self.range(offset, data.len() as u64)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn read(&self, offset: u64, len: u64) -> Result<&[u8], RangeError> {
        let range = self.range(offset, len)?;
        Ok(&self.bytes[range])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Memory of a native image: one tightly packed subresource per
/// (array layer, mip level).
#[derive(Debug, Clone)]
pub(crate) struct ImageMemory {
    format: PixelFormat,
    width: u32,
    height: u32,
    mip_levels: u32,
    array_layers: u32,
    subresources: Vec<Vec<u8>>,
}

impl ImageMemory {
    pub fn new(
        format: PixelFormat,
        width: u32,
        height: u32,
        mip_levels: u32,
        array_layers: u32,
    ) -> Self {
        let mut subresources = Vec::with_capacity((mip_levels * array_layers) as usize);
        for _layer in 0..array_layers {
            for mip in 0..mip_levels {
                let (w, h) = mip_extent(width, height, mip);
                subresources.push(vec![0; format.region_size(w, h) as usize]);
            }
        }
        Self {
            format,
            width,
            height,
            mip_levels,
            array_layers,
            subresources,
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    /// Linear subresource index, matching `D3D11CalcSubresource`.
    pub fn subresource_index(&self, mip: u32, layer: u32) -> Option<usize> {
        (mip < self.mip_levels && layer < self.array_layers)
            .then(|| (layer * self.mip_levels + mip) as usize)
    }

    fn check_rect(&self, mip: u32, x: u32, y: u32, w: u32, h: u32) -> Result<(), RangeError> {
        let (mip_w, mip_h) = mip_extent(self.width, self.height, mip);
        let (block_w, block_h) = self.format.block_dimensions();
        let fits = x.checked_add(w).is_some_and(|end| end <= mip_w)
            && y.checked_add(h).is_some_and(|end| end <= mip_h);
        let aligned = x % block_w == 0 && y % block_h == 0;
        if fits && aligned && w > 0 && h > 0 {
            Ok(())
        } else {
            Err(RangeError)
        }
    }

    /// Write a tightly packed rectangle of pixels (or blocks).
    #[allow(clippy::too_many_arguments)]
    pub fn write_region(
        &mut self,
        mip: u32,
        layer: u32,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        data: &[u8],
    ) -> Result<(), RangeError> {
        let index = self.subresource_index(mip, layer).ok_or(RangeError)?;
        self.check_rect(mip, x, y, w, h)?;
        if data.len() as u64 != self.format.region_size(w, h) {
            return Err(RangeError);
        }

        let (mip_w, _) = mip_extent(self.width, self.height, mip);
        let (block_w, block_h) = self.format.block_dimensions();
        let block_size = self.format.block_size() as usize;
        let dst_pitch = self.format.row_pitch(mip_w) as usize;
        let src_pitch = self.format.row_pitch(w) as usize;
        let dst = &mut self.subresources[index];

        for row in 0..h.div_ceil(block_h) as usize {
            let dst_start = (y / block_h) as usize * dst_pitch
                + row * dst_pitch
                + (x / block_w) as usize * block_size;
            let src_start = row * src_pitch;
            dst[dst_start..dst_start + src_pitch]
                .copy_from_slice(&data[src_start..src_start + src_pitch]);
        }
        Ok(())
    }

    /// Read a rectangle of pixels (or blocks), tightly packed.
    pub fn read_region(
        &self,
        mip: u32,
        layer: u32,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<Vec<u8>, RangeError> {
        let index = self.subresource_index(mip, layer).ok_or(RangeError)?;
        self.check_rect(mip, x, y, w, h)?;

        let (mip_w, _) = mip_extent(self.width, self.height, mip);
        let (block_w, block_h) = self.format.block_dimensions();
        let block_size = self.format.block_size() as usize;
        let src_pitch = self.format.row_pitch(mip_w) as usize;
        let dst_pitch = self.format.row_pitch(w) as usize;
        let src = &self.subresources[index];

        let mut out = Vec::with_capacity(self.format.region_size(w, h) as usize);
        for row in 0..h.div_ceil(block_h) as usize {
            let start = (y / block_h) as usize * src_pitch
                + row * src_pitch
                + (x / block_w) as usize * block_size;
            out.extend_from_slice(&src[start..start + dst_pitch]);
        }
        Ok(out)
    }

    /// Fill a whole subresource with a repeated pixel value.
    pub fn fill(&mut self, mip: u32, layer: u32, pixel: &[u8]) -> Result<(), RangeError> {
        let index = self.subresource_index(mip, layer).ok_or(RangeError)?;
        if self.format.is_compressed() || pixel.len() != self.format.block_size() as usize {
            return Err(RangeError);
        }
        for chunk in self.subresources[index].chunks_exact_mut(pixel.len()) {
            chunk.copy_from_slice(pixel);
        }
        Ok(())
    }
}

fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn unorm16(value: f32) -> u16 {
    (value.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// IEEE 754 binary16 bits of `value`, truncating extra mantissa bits.
fn f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x7f_ffff;

    if exponent == 0xff {
        let nan = if mantissa != 0 { 0x200 } else { 0 };
        return sign | 0x7c00 | nan;
    }
    let half_exponent = exponent - 127 + 15;
    if half_exponent >= 0x1f {
        return sign | 0x7c00;
    }
    if half_exponent <= 0 {
        if half_exponent < -10 {
            return sign;
        }
        let subnormal = (mantissa | 0x80_0000) >> (14 - half_exponent);
        return sign | subnormal as u16;
    }
    sign | ((half_exponent as u16) << 10) | (mantissa >> 13) as u16
}

/// The bytes of one pixel of `format` cleared to `color`.
///
/// Returns `None` for depth and compressed formats.
pub(crate) fn encode_clear_color(format: PixelFormat, color: RgbaFloat) -> Option<Vec<u8>> {
    let RgbaFloat { r, g, b, a } = color;
    let bytes = match format {
        PixelFormat::Rgba8Unorm | PixelFormat::Rgba8UnormSrgb => {
            vec![unorm8(r), unorm8(g), unorm8(b), unorm8(a)]
        }
        PixelFormat::Bgra8Unorm => vec![unorm8(b), unorm8(g), unorm8(r), unorm8(a)],
        PixelFormat::R8Unorm => vec![unorm8(r)],
        PixelFormat::R16Unorm => unorm16(r).to_le_bytes().to_vec(),
        PixelFormat::R32Float => r.to_le_bytes().to_vec(),
        PixelFormat::Rgba16Float => {
            let halves = [f16_bits(r), f16_bits(g), f16_bits(b), f16_bits(a)];
            bytemuck::cast_slice::<u16, u8>(&halves).to_vec()
        }
        PixelFormat::Rgba32Float => bytemuck::cast_slice::<f32, u8>(&[r, g, b, a]).to_vec(),
        PixelFormat::Bc1RgbaUnorm
        | PixelFormat::Bc3RgbaUnorm
        | PixelFormat::Depth24UnormStencil8
        | PixelFormat::Depth32Float
        | PixelFormat::Depth32FloatStencil8 => return None,
    };
    Some(bytes)
}

/// The bytes of one texel of a depth `format` cleared to `depth`/`stencil`.
///
/// Returns `None` for color formats.
pub(crate) fn encode_clear_depth(format: PixelFormat, depth: f32, stencil: u8) -> Option<Vec<u8>> {
    let bytes = match format {
        PixelFormat::Depth32Float => depth.to_le_bytes().to_vec(),
        PixelFormat::Depth24UnormStencil8 => {
            let depth24 = (depth.clamp(0.0, 1.0) * 16_777_215.0).round() as u32;
            ((stencil as u32) << 24 | depth24).to_le_bytes().to_vec()
        }
        PixelFormat::Depth32FloatStencil8 => {
            let mut bytes = depth.to_le_bytes().to_vec();
            bytes.extend_from_slice(&(stencil as u32).to_le_bytes());
            bytes
        }
        _ => return None,
    };
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_memory_bounds() {
        let mut memory = BufferMemory::new(16);
        assert!(memory.write(12, &[1, 2, 3, 4]).is_ok());
        assert_eq!(memory.write(13, &[1, 2, 3, 4]), Err(RangeError));
        assert_eq!(memory.read(12, 4).unwrap(), &[1, 2, 3, 4]);
        assert!(memory.read(u64::MAX, 2).is_err());
    }

    #[test]
    fn test_image_region_roundtrip() {
        let mut image = ImageMemory::new(PixelFormat::Rgba8Unorm, 8, 8, 2, 3);
        let data: Vec<u8> = (0..2 * 3 * 4).map(|i| i as u8).collect();
        image.write_region(1, 2, 1, 0, 2, 3, &data).unwrap();
        assert_eq!(image.read_region(1, 2, 1, 0, 2, 3).unwrap(), data);

        // Mip 1 is 4x4; a 2x3 region at x=3 overflows.
        assert!(image.write_region(1, 2, 3, 0, 2, 3, &data).is_err());
        // Only three layers.
        assert!(image.read_region(0, 3, 0, 0, 1, 1).is_err());
    }

    #[test]
    fn test_compressed_region_alignment() {
        let mut image = ImageMemory::new(PixelFormat::Bc1RgbaUnorm, 8, 8, 1, 1);
        let block = [0xAB; 8];
        image.write_region(0, 0, 4, 4, 4, 4, &block).unwrap();
        assert_eq!(image.read_region(0, 0, 4, 4, 4, 4).unwrap(), block);
        assert!(image.write_region(0, 0, 2, 0, 4, 4, &block).is_err());
    }

    #[test]
    fn test_clear_encoding() {
        assert_eq!(
            encode_clear_color(PixelFormat::Bgra8Unorm, RgbaFloat::RED),
            Some(vec![0, 0, 255, 255])
        );
        assert_eq!(
            encode_clear_color(PixelFormat::Rgba16Float, RgbaFloat::WHITE),
            Some(vec![0x00, 0x3c, 0x00, 0x3c, 0x00, 0x3c, 0x00, 0x3c])
        );
        assert_eq!(encode_clear_color(PixelFormat::Depth32Float, RgbaFloat::RED), None);
        assert_eq!(
            encode_clear_depth(PixelFormat::Depth32Float, 1.0, 0),
            Some(1.0f32.to_le_bytes().to_vec())
        );
    }
}
