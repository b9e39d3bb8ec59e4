//! Type conversions from portable graphics types to GL enum values.

use crate::types::{
    AddressMode, BlendFactor, BlendFunction, ComparisonKind, FaceCullMode, FilterMode, FrontFace,
    IndexFormat, PixelFormat, PolygonFillMode, PrimitiveTopology, ShaderStage,
    VertexElementFormat,
};

use super::gl::{self, GLenum};

/// Internal format, transfer format and transfer type of a pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlFormat {
    pub internal: GLenum,
    pub format: GLenum,
    pub kind: GLenum,
}

impl GlFormat {
    const fn new(internal: GLenum, format: GLenum, kind: GLenum) -> Self {
        Self {
            internal,
            format,
            kind,
        }
    }
}

pub fn convert_pixel_format(format: PixelFormat) -> GlFormat {
    match format {
        PixelFormat::Rgba8Unorm => GlFormat::new(gl::RGBA8, gl::RGBA, gl::UNSIGNED_BYTE),
        PixelFormat::Rgba8UnormSrgb => GlFormat::new(gl::SRGB8_ALPHA8, gl::RGBA, gl::UNSIGNED_BYTE),
        PixelFormat::Bgra8Unorm => GlFormat::new(gl::RGBA8, gl::BGRA, gl::UNSIGNED_BYTE),
        PixelFormat::R8Unorm => GlFormat::new(gl::R8, gl::RED, gl::UNSIGNED_BYTE),
        PixelFormat::R16Unorm => GlFormat::new(gl::R16, gl::RED, gl::UNSIGNED_SHORT),
        PixelFormat::R32Float => GlFormat::new(gl::R32F, gl::RED, gl::FLOAT),
        PixelFormat::Rgba16Float => GlFormat::new(gl::RGBA16F, gl::RGBA, gl::HALF_FLOAT),
        PixelFormat::Rgba32Float => GlFormat::new(gl::RGBA32F, gl::RGBA, gl::FLOAT),
        PixelFormat::Bc1RgbaUnorm => {
            GlFormat::new(gl::COMPRESSED_RGBA_S3TC_DXT1_EXT, gl::RGBA, gl::UNSIGNED_BYTE)
        }
        PixelFormat::Bc3RgbaUnorm => {
            GlFormat::new(gl::COMPRESSED_RGBA_S3TC_DXT5_EXT, gl::RGBA, gl::UNSIGNED_BYTE)
        }
        PixelFormat::Depth24UnormStencil8 => {
            GlFormat::new(gl::DEPTH24_STENCIL8, gl::DEPTH_STENCIL, gl::UNSIGNED_INT_24_8)
        }
        PixelFormat::Depth32Float => {
            GlFormat::new(gl::DEPTH_COMPONENT32F, gl::DEPTH_COMPONENT, gl::FLOAT)
        }
        PixelFormat::Depth32FloatStencil8 => GlFormat::new(
            gl::DEPTH32F_STENCIL8,
            gl::DEPTH_STENCIL,
            gl::FLOAT_32_UNSIGNED_INT_24_8_REV,
        ),
    }
}

/// Recover the portable format a texture was allocated with.
pub fn pixel_format_from_gl(internal: GLenum, format: GLenum) -> Option<PixelFormat> {
    let format = match (internal, format) {
        (gl::RGBA8, gl::BGRA) => PixelFormat::Bgra8Unorm,
        (gl::RGBA8, _) => PixelFormat::Rgba8Unorm,
        (gl::SRGB8_ALPHA8, _) => PixelFormat::Rgba8UnormSrgb,
        (gl::R8, _) => PixelFormat::R8Unorm,
        (gl::R16, _) => PixelFormat::R16Unorm,
        (gl::R32F, _) => PixelFormat::R32Float,
        (gl::RGBA16F, _) => PixelFormat::Rgba16Float,
        (gl::RGBA32F, _) => PixelFormat::Rgba32Float,
        (gl::COMPRESSED_RGBA_S3TC_DXT1_EXT, _) => PixelFormat::Bc1RgbaUnorm,
        (gl::COMPRESSED_RGBA_S3TC_DXT5_EXT, _) => PixelFormat::Bc3RgbaUnorm,
        (gl::DEPTH24_STENCIL8, _) => PixelFormat::Depth24UnormStencil8,
        (gl::DEPTH_COMPONENT32F, _) => PixelFormat::Depth32Float,
        (gl::DEPTH32F_STENCIL8, _) => PixelFormat::Depth32FloatStencil8,
        _ => return None,
    };
    Some(format)
}

pub fn convert_index_format(format: IndexFormat) -> GLenum {
    match format {
        IndexFormat::UInt16 => gl::UNSIGNED_SHORT,
        IndexFormat::UInt32 => gl::UNSIGNED_INT,
    }
}

/// Component count, component type and normalization of a vertex element.
pub fn convert_vertex_format(format: VertexElementFormat) -> (i32, GLenum, bool) {
    match format {
        VertexElementFormat::Float1 => (1, gl::FLOAT, false),
        VertexElementFormat::Float2 => (2, gl::FLOAT, false),
        VertexElementFormat::Float3 => (3, gl::FLOAT, false),
        VertexElementFormat::Float4 => (4, gl::FLOAT, false),
        VertexElementFormat::Byte2Norm => (2, gl::UNSIGNED_BYTE, true),
        VertexElementFormat::Byte4Norm => (4, gl::UNSIGNED_BYTE, true),
        VertexElementFormat::UInt1 => (1, gl::UNSIGNED_INT, false),
        VertexElementFormat::UInt2 => (2, gl::UNSIGNED_INT, false),
        VertexElementFormat::UInt4 => (4, gl::UNSIGNED_INT, false),
        VertexElementFormat::Int1 => (1, gl::INT, false),
    }
}

pub fn convert_blend_factor(factor: BlendFactor) -> GLenum {
    match factor {
        BlendFactor::Zero => gl::ZERO,
        BlendFactor::One => gl::ONE,
        BlendFactor::SourceAlpha => gl::SRC_ALPHA,
        BlendFactor::InverseSourceAlpha => gl::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DestinationAlpha => gl::DST_ALPHA,
        BlendFactor::InverseDestinationAlpha => gl::ONE_MINUS_DST_ALPHA,
        BlendFactor::SourceColor => gl::SRC_COLOR,
        BlendFactor::InverseSourceColor => gl::ONE_MINUS_SRC_COLOR,
        BlendFactor::DestinationColor => gl::DST_COLOR,
        BlendFactor::InverseDestinationColor => gl::ONE_MINUS_DST_COLOR,
        BlendFactor::BlendFactor => gl::CONSTANT_COLOR,
        BlendFactor::InverseBlendFactor => gl::ONE_MINUS_CONSTANT_COLOR,
    }
}

pub fn convert_blend_function(function: BlendFunction) -> GLenum {
    match function {
        BlendFunction::Add => gl::FUNC_ADD,
        BlendFunction::Subtract => gl::FUNC_SUBTRACT,
        BlendFunction::ReverseSubtract => gl::FUNC_REVERSE_SUBTRACT,
        BlendFunction::Minimum => gl::MIN,
        BlendFunction::Maximum => gl::MAX,
    }
}

pub fn convert_comparison(kind: ComparisonKind) -> GLenum {
    match kind {
        ComparisonKind::Never => gl::NEVER,
        ComparisonKind::Less => gl::LESS,
        ComparisonKind::Equal => gl::EQUAL,
        ComparisonKind::LessEqual => gl::LEQUAL,
        ComparisonKind::Greater => gl::GREATER,
        ComparisonKind::NotEqual => gl::NOTEQUAL,
        ComparisonKind::GreaterEqual => gl::GEQUAL,
        ComparisonKind::Always => gl::ALWAYS,
    }
}

pub fn convert_topology(topology: PrimitiveTopology) -> GLenum {
    match topology {
        PrimitiveTopology::TriangleList => gl::TRIANGLES,
        PrimitiveTopology::TriangleStrip => gl::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => gl::LINES,
        PrimitiveTopology::LineStrip => gl::LINE_STRIP,
        PrimitiveTopology::PointList => gl::POINTS,
    }
}

pub fn topology_from_mode(mode: GLenum) -> Option<PrimitiveTopology> {
    match mode {
        gl::TRIANGLES => Some(PrimitiveTopology::TriangleList),
        gl::TRIANGLE_STRIP => Some(PrimitiveTopology::TriangleStrip),
        gl::LINES => Some(PrimitiveTopology::LineList),
        gl::LINE_STRIP => Some(PrimitiveTopology::LineStrip),
        gl::POINTS => Some(PrimitiveTopology::PointList),
        _ => None,
    }
}

/// `None` means culling is disabled.
pub fn convert_cull_mode(mode: FaceCullMode) -> Option<GLenum> {
    match mode {
        FaceCullMode::Back => Some(gl::BACK),
        FaceCullMode::Front => Some(gl::FRONT),
        FaceCullMode::None => None,
    }
}

pub fn convert_fill_mode(mode: PolygonFillMode) -> GLenum {
    match mode {
        PolygonFillMode::Solid => gl::FILL,
        PolygonFillMode::Wireframe => gl::LINE,
    }
}

pub fn convert_front_face(face: FrontFace) -> GLenum {
    match face {
        FrontFace::Clockwise => gl::CW,
        FrontFace::CounterClockwise => gl::CCW,
    }
}

pub fn convert_shader_stage(stage: ShaderStage) -> GLenum {
    match stage {
        ShaderStage::Vertex => gl::VERTEX_SHADER,
        ShaderStage::Fragment => gl::FRAGMENT_SHADER,
        ShaderStage::Geometry => gl::GEOMETRY_SHADER,
        ShaderStage::TessellationControl => gl::TESS_CONTROL_SHADER,
        ShaderStage::TessellationEvaluation => gl::TESS_EVALUATION_SHADER,
    }
}

pub fn convert_address_mode(mode: AddressMode) -> GLenum {
    match mode {
        AddressMode::ClampToEdge => gl::CLAMP_TO_EDGE,
        AddressMode::Repeat => gl::REPEAT,
        AddressMode::MirrorRepeat => gl::MIRRORED_REPEAT,
    }
}

/// `GL_TEXTURE_MIN_FILTER` value combining the minification and mip filters.
pub fn convert_min_filter(min: FilterMode, mip: FilterMode) -> GLenum {
    match (min, mip) {
        (FilterMode::Nearest, FilterMode::Nearest) => gl::NEAREST_MIPMAP_NEAREST,
        (FilterMode::Linear, FilterMode::Nearest) => gl::LINEAR_MIPMAP_NEAREST,
        (FilterMode::Nearest, FilterMode::Linear) => gl::NEAREST_MIPMAP_LINEAR,
        (FilterMode::Linear, FilterMode::Linear) => gl::LINEAR_MIPMAP_LINEAR,
    }
}

pub fn convert_mag_filter(mag: FilterMode) -> GLenum {
    match mag {
        FilterMode::Nearest => gl::NEAREST,
        FilterMode::Linear => gl::LINEAR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_formats_round_trip_through_gl() {
        let formats = [
            PixelFormat::Rgba8Unorm,
            PixelFormat::Bgra8Unorm,
            PixelFormat::R16Unorm,
            PixelFormat::Bc3RgbaUnorm,
            PixelFormat::Depth32FloatStencil8,
        ];
        for format in formats {
            let gl_format = convert_pixel_format(format);
            assert_eq!(
                pixel_format_from_gl(gl_format.internal, gl_format.format),
                Some(format)
            );
        }
    }

    #[test]
    fn test_min_filter_combines_mip_filter() {
        assert_eq!(
            convert_min_filter(FilterMode::Linear, FilterMode::Nearest),
            gl::LINEAR_MIPMAP_NEAREST
        );
        assert_eq!(convert_cull_mode(FaceCullMode::None), None);
        assert_eq!(convert_topology(PrimitiveTopology::LineStrip), gl::LINE_STRIP);
        assert_eq!(
            topology_from_mode(gl::TRIANGLE_STRIP),
            Some(PrimitiveTopology::TriangleStrip)
        );
    }
}
