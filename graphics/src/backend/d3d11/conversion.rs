//! Type conversions between Lattice types and DXGI/D3D11 enum values.

use crate::types::{
    AddressMode, BlendFactor, BlendFunction, BufferUsage, ComparisonKind, FaceCullMode,
    FilterMode, IndexFormat, PixelFormat, PolygonFillMode, PrimitiveTopology, ShaderStage,
    TextureUsage, VertexElementFormat, VertexElementSemantic,
};

use super::native::ShaderKind;

/// `DXGI_FORMAT` values.
pub mod dxgi {
    pub const FORMAT_UNKNOWN: u32 = 0;
    pub const FORMAT_R32G32B32A32_FLOAT: u32 = 2;
    pub const FORMAT_R32G32B32A32_UINT: u32 = 3;
    pub const FORMAT_R32G32B32_FLOAT: u32 = 6;
    pub const FORMAT_R16G16B16A16_FLOAT: u32 = 10;
    pub const FORMAT_R32G32_FLOAT: u32 = 16;
    pub const FORMAT_R32G32_UINT: u32 = 17;
    pub const FORMAT_D32_FLOAT_S8X24_UINT: u32 = 20;
    pub const FORMAT_R8G8B8A8_UNORM: u32 = 28;
    pub const FORMAT_R8G8B8A8_UNORM_SRGB: u32 = 29;
    pub const FORMAT_D32_FLOAT: u32 = 40;
    pub const FORMAT_R32_FLOAT: u32 = 41;
    pub const FORMAT_R32_UINT: u32 = 42;
    pub const FORMAT_R32_SINT: u32 = 43;
    pub const FORMAT_D24_UNORM_S8_UINT: u32 = 45;
    pub const FORMAT_R8G8_UNORM: u32 = 49;
    pub const FORMAT_R16_UNORM: u32 = 56;
    pub const FORMAT_R16_UINT: u32 = 57;
    pub const FORMAT_R8_UNORM: u32 = 61;
    pub const FORMAT_BC1_UNORM: u32 = 71;
    pub const FORMAT_BC3_UNORM: u32 = 77;
    pub const FORMAT_B8G8R8A8_UNORM: u32 = 87;
}

/// `D3D11_*` enum and flag values.
pub mod d3d11 {
    pub const BIND_VERTEX_BUFFER: u32 = 0x1;
    pub const BIND_INDEX_BUFFER: u32 = 0x2;
    pub const BIND_CONSTANT_BUFFER: u32 = 0x4;
    pub const BIND_SHADER_RESOURCE: u32 = 0x8;
    pub const BIND_RENDER_TARGET: u32 = 0x20;
    pub const BIND_DEPTH_STENCIL: u32 = 0x40;

    pub const RESOURCE_MISC_TEXTURECUBE: u32 = 0x4;

    pub const CLEAR_DEPTH: u32 = 0x1;
    pub const CLEAR_STENCIL: u32 = 0x2;

    pub const PRIMITIVE_TOPOLOGY_POINTLIST: u32 = 1;
    pub const PRIMITIVE_TOPOLOGY_LINELIST: u32 = 2;
    pub const PRIMITIVE_TOPOLOGY_LINESTRIP: u32 = 3;
    pub const PRIMITIVE_TOPOLOGY_TRIANGLELIST: u32 = 4;
    pub const PRIMITIVE_TOPOLOGY_TRIANGLESTRIP: u32 = 5;

    pub const FILTER_MIN_LINEAR: u32 = 0x10;
    pub const FILTER_MAG_LINEAR: u32 = 0x4;
    pub const FILTER_MIP_LINEAR: u32 = 0x1;
    pub const FILTER_ANISOTROPIC: u32 = 0x55;
    pub const FILTER_COMPARISON: u32 = 0x80;

    pub const TEXTURE_ADDRESS_WRAP: u32 = 1;
    pub const TEXTURE_ADDRESS_MIRROR: u32 = 2;
    pub const TEXTURE_ADDRESS_CLAMP: u32 = 3;

    pub const CULL_NONE: u32 = 1;
    pub const CULL_FRONT: u32 = 2;
    pub const CULL_BACK: u32 = 3;

    pub const FILL_WIREFRAME: u32 = 2;
    pub const FILL_SOLID: u32 = 3;
}

/// Convert a pixel format to its DXGI format, if there is one.
pub fn convert_pixel_format(format: PixelFormat) -> Option<u32> {
    let dxgi = match format {
        PixelFormat::Rgba8Unorm => dxgi::FORMAT_R8G8B8A8_UNORM,
        PixelFormat::Rgba8UnormSrgb => dxgi::FORMAT_R8G8B8A8_UNORM_SRGB,
        PixelFormat::Bgra8Unorm => dxgi::FORMAT_B8G8R8A8_UNORM,
        PixelFormat::R8Unorm => dxgi::FORMAT_R8_UNORM,
        PixelFormat::R16Unorm => dxgi::FORMAT_R16_UNORM,
        PixelFormat::R32Float => dxgi::FORMAT_R32_FLOAT,
        PixelFormat::Rgba16Float => dxgi::FORMAT_R16G16B16A16_FLOAT,
        PixelFormat::Rgba32Float => dxgi::FORMAT_R32G32B32A32_FLOAT,
        PixelFormat::Bc1RgbaUnorm => dxgi::FORMAT_BC1_UNORM,
        PixelFormat::Bc3RgbaUnorm => dxgi::FORMAT_BC3_UNORM,
        PixelFormat::Depth24UnormStencil8 => dxgi::FORMAT_D24_UNORM_S8_UINT,
        PixelFormat::Depth32Float => dxgi::FORMAT_D32_FLOAT,
        PixelFormat::Depth32FloatStencil8 => dxgi::FORMAT_D32_FLOAT_S8X24_UINT,
    };
    Some(dxgi)
}

/// Convert a DXGI format back to a pixel format.
pub fn pixel_format_from_dxgi(format: u32) -> Option<PixelFormat> {
    let pixel = match format {
        dxgi::FORMAT_R8G8B8A8_UNORM => PixelFormat::Rgba8Unorm,
        dxgi::FORMAT_R8G8B8A8_UNORM_SRGB => PixelFormat::Rgba8UnormSrgb,
        dxgi::FORMAT_B8G8R8A8_UNORM => PixelFormat::Bgra8Unorm,
        dxgi::FORMAT_R8_UNORM => PixelFormat::R8Unorm,
        dxgi::FORMAT_R16_UNORM => PixelFormat::R16Unorm,
        dxgi::FORMAT_R32_FLOAT => PixelFormat::R32Float,
        dxgi::FORMAT_R16G16B16A16_FLOAT => PixelFormat::Rgba16Float,
        dxgi::FORMAT_R32G32B32A32_FLOAT => PixelFormat::Rgba32Float,
        dxgi::FORMAT_BC1_UNORM => PixelFormat::Bc1RgbaUnorm,
        dxgi::FORMAT_BC3_UNORM => PixelFormat::Bc3RgbaUnorm,
        dxgi::FORMAT_D24_UNORM_S8_UINT => PixelFormat::Depth24UnormStencil8,
        dxgi::FORMAT_D32_FLOAT => PixelFormat::Depth32Float,
        dxgi::FORMAT_D32_FLOAT_S8X24_UINT => PixelFormat::Depth32FloatStencil8,
        _ => return None,
    };
    Some(pixel)
}

/// Convert buffer usage to `D3D11_BIND_FLAG` bits.
pub fn convert_buffer_usage(usage: BufferUsage) -> u32 {
    let mut flags = 0;
    if usage.contains(BufferUsage::VERTEX) {
        flags |= d3d11::BIND_VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= d3d11::BIND_INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= d3d11::BIND_CONSTANT_BUFFER;
    }
    flags
}

/// Convert texture usage to `D3D11_BIND_FLAG` bits.
pub fn convert_texture_usage(usage: TextureUsage) -> u32 {
    let mut flags = 0;
    if usage.contains(TextureUsage::SAMPLED) {
        flags |= d3d11::BIND_SHADER_RESOURCE;
    }
    if usage.contains(TextureUsage::RENDER_TARGET) {
        flags |= d3d11::BIND_RENDER_TARGET;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL) {
        flags |= d3d11::BIND_DEPTH_STENCIL;
    }
    flags
}

pub fn convert_index_format(format: IndexFormat) -> u32 {
    match format {
        IndexFormat::UInt16 => dxgi::FORMAT_R16_UINT,
        IndexFormat::UInt32 => dxgi::FORMAT_R32_UINT,
    }
}

pub fn convert_vertex_format(format: VertexElementFormat) -> u32 {
    match format {
        VertexElementFormat::Float1 => dxgi::FORMAT_R32_FLOAT,
        VertexElementFormat::Float2 => dxgi::FORMAT_R32G32_FLOAT,
        VertexElementFormat::Float3 => dxgi::FORMAT_R32G32B32_FLOAT,
        VertexElementFormat::Float4 => dxgi::FORMAT_R32G32B32A32_FLOAT,
        VertexElementFormat::Byte2Norm => dxgi::FORMAT_R8G8_UNORM,
        VertexElementFormat::Byte4Norm => dxgi::FORMAT_R8G8B8A8_UNORM,
        VertexElementFormat::UInt1 => dxgi::FORMAT_R32_UINT,
        VertexElementFormat::UInt2 => dxgi::FORMAT_R32G32_UINT,
        VertexElementFormat::UInt4 => dxgi::FORMAT_R32G32B32A32_UINT,
        VertexElementFormat::Int1 => dxgi::FORMAT_R32_SINT,
    }
}

/// HLSL semantic name of a vertex element.
pub fn convert_semantic(semantic: VertexElementSemantic) -> &'static str {
    match semantic {
        VertexElementSemantic::Position => "POSITION",
        VertexElementSemantic::Normal => "NORMAL",
        VertexElementSemantic::TextureCoordinate => "TEXCOORD",
        VertexElementSemantic::Color => "COLOR",
    }
}

pub fn convert_blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => 1,
        BlendFactor::One => 2,
        BlendFactor::SourceColor => 3,
        BlendFactor::InverseSourceColor => 4,
        BlendFactor::SourceAlpha => 5,
        BlendFactor::InverseSourceAlpha => 6,
        BlendFactor::DestinationAlpha => 7,
        BlendFactor::InverseDestinationAlpha => 8,
        BlendFactor::DestinationColor => 9,
        BlendFactor::InverseDestinationColor => 10,
        BlendFactor::BlendFactor => 14,
        BlendFactor::InverseBlendFactor => 15,
    }
}

pub fn convert_blend_function(function: BlendFunction) -> u32 {
    match function {
        BlendFunction::Add => 1,
        BlendFunction::Subtract => 2,
        BlendFunction::ReverseSubtract => 3,
        BlendFunction::Minimum => 4,
        BlendFunction::Maximum => 5,
    }
}

pub fn convert_comparison(kind: ComparisonKind) -> u32 {
    match kind {
        ComparisonKind::Never => 1,
        ComparisonKind::Less => 2,
        ComparisonKind::Equal => 3,
        ComparisonKind::LessEqual => 4,
        ComparisonKind::Greater => 5,
        ComparisonKind::NotEqual => 6,
        ComparisonKind::GreaterEqual => 7,
        ComparisonKind::Always => 8,
    }
}

pub fn convert_topology(topology: PrimitiveTopology) -> u32 {
    match topology {
        PrimitiveTopology::PointList => d3d11::PRIMITIVE_TOPOLOGY_POINTLIST,
        PrimitiveTopology::LineList => d3d11::PRIMITIVE_TOPOLOGY_LINELIST,
        PrimitiveTopology::LineStrip => d3d11::PRIMITIVE_TOPOLOGY_LINESTRIP,
        PrimitiveTopology::TriangleList => d3d11::PRIMITIVE_TOPOLOGY_TRIANGLELIST,
        PrimitiveTopology::TriangleStrip => d3d11::PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
    }
}

/// Convert a `D3D11_PRIMITIVE_TOPOLOGY` back to a topology.
pub fn topology_from_native(topology: u32) -> Option<PrimitiveTopology> {
    let converted = match topology {
        d3d11::PRIMITIVE_TOPOLOGY_POINTLIST => PrimitiveTopology::PointList,
        d3d11::PRIMITIVE_TOPOLOGY_LINELIST => PrimitiveTopology::LineList,
        d3d11::PRIMITIVE_TOPOLOGY_LINESTRIP => PrimitiveTopology::LineStrip,
        d3d11::PRIMITIVE_TOPOLOGY_TRIANGLELIST => PrimitiveTopology::TriangleList,
        d3d11::PRIMITIVE_TOPOLOGY_TRIANGLESTRIP => PrimitiveTopology::TriangleStrip,
        _ => return None,
    };
    Some(converted)
}

pub fn convert_cull_mode(mode: FaceCullMode) -> u32 {
    match mode {
        FaceCullMode::None => d3d11::CULL_NONE,
        FaceCullMode::Front => d3d11::CULL_FRONT,
        FaceCullMode::Back => d3d11::CULL_BACK,
    }
}

pub fn convert_fill_mode(mode: PolygonFillMode) -> u32 {
    match mode {
        PolygonFillMode::Solid => d3d11::FILL_SOLID,
        PolygonFillMode::Wireframe => d3d11::FILL_WIREFRAME,
    }
}

pub fn convert_address_mode(mode: AddressMode) -> u32 {
    match mode {
        AddressMode::Repeat => d3d11::TEXTURE_ADDRESS_WRAP,
        AddressMode::MirrorRepeat => d3d11::TEXTURE_ADDRESS_MIRROR,
        AddressMode::ClampToEdge => d3d11::TEXTURE_ADDRESS_CLAMP,
    }
}

/// Build a `D3D11_FILTER` from its components.
pub fn convert_filter(
    min: FilterMode,
    mag: FilterMode,
    mip: FilterMode,
    anisotropic: bool,
    comparison: bool,
) -> u32 {
    let mut filter = if anisotropic {
        d3d11::FILTER_ANISOTROPIC
    } else {
        let mut bits = 0;
        if min == FilterMode::Linear {
            bits |= d3d11::FILTER_MIN_LINEAR;
        }
        if mag == FilterMode::Linear {
            bits |= d3d11::FILTER_MAG_LINEAR;
        }
        if mip == FilterMode::Linear {
            bits |= d3d11::FILTER_MIP_LINEAR;
        }
        bits
    };
    if comparison {
        filter |= d3d11::FILTER_COMPARISON;
    }
    filter
}

pub fn convert_shader_stage(stage: ShaderStage) -> ShaderKind {
    match stage {
        ShaderStage::Vertex => ShaderKind::Vertex,
        ShaderStage::Fragment => ShaderKind::Pixel,
        ShaderStage::Geometry => ShaderKind::Geometry,
        ShaderStage::TessellationControl => ShaderKind::Hull,
        ShaderStage::TessellationEvaluation => ShaderKind::Domain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_roundtrip() {
        for format in [
            PixelFormat::Rgba8Unorm,
            PixelFormat::Bgra8Unorm,
            PixelFormat::Bc3RgbaUnorm,
            PixelFormat::Depth24UnormStencil8,
        ] {
            let dxgi = convert_pixel_format(format).unwrap();
            assert_eq!(pixel_format_from_dxgi(dxgi), Some(format));
        }
        assert_eq!(pixel_format_from_dxgi(dxgi::FORMAT_UNKNOWN), None);
    }

    #[test]
    fn test_filter_bits() {
        let linear = convert_filter(FilterMode::Linear, FilterMode::Linear, FilterMode::Linear, false, false);
        assert_eq!(linear, 0x15);
        let point_compare = convert_filter(FilterMode::Nearest, FilterMode::Nearest, FilterMode::Nearest, false, true);
        assert_eq!(point_compare, 0x80);
        assert_eq!(convert_filter(FilterMode::Nearest, FilterMode::Nearest, FilterMode::Nearest, true, false), 0x55);
    }
}
