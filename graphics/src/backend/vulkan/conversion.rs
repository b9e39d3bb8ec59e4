//! Type conversions between Lattice types and Vulkan types.

use ash::vk;

use crate::types::{
    AddressMode, BlendFactor, BlendFunction, BufferUsage, ComparisonKind, FaceCullMode,
    FilterMode, FrontFace, IndexFormat, PixelFormat, PolygonFillMode, PrimitiveTopology,
    ResourceKind, ShaderStage, ShaderStages, TextureUsage, VertexElementFormat,
};

/// Convert BufferUsage flags to Vulkan buffer usage flags.
///
/// Every buffer can be the destination of a staging copy and the source of a
/// readback.
pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut result = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;

    if usage.contains(BufferUsage::VERTEX) {
        result |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }

    // DYNAMIC has no Vulkan usage bit; it only affects memory placement.

    result
}

/// Convert PixelFormat to Vulkan format.
pub fn convert_pixel_format(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        PixelFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        PixelFormat::R8Unorm => vk::Format::R8_UNORM,
        PixelFormat::R16Unorm => vk::Format::R16_UNORM,
        PixelFormat::R32Float => vk::Format::R32_SFLOAT,
        PixelFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        PixelFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        PixelFormat::Bc1RgbaUnorm => vk::Format::BC1_RGBA_UNORM_BLOCK,
        PixelFormat::Bc3RgbaUnorm => vk::Format::BC3_UNORM_BLOCK,
        PixelFormat::Depth24UnormStencil8 => vk::Format::D24_UNORM_S8_UINT,
        PixelFormat::Depth32Float => vk::Format::D32_SFLOAT,
        PixelFormat::Depth32FloatStencil8 => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Inverse of [`convert_pixel_format`].
pub fn pixel_format_from_vk(format: vk::Format) -> Option<PixelFormat> {
    let pixel = match format {
        vk::Format::R8G8B8A8_UNORM => PixelFormat::Rgba8Unorm,
        vk::Format::R8G8B8A8_SRGB => PixelFormat::Rgba8UnormSrgb,
        vk::Format::B8G8R8A8_UNORM => PixelFormat::Bgra8Unorm,
        vk::Format::R8_UNORM => PixelFormat::R8Unorm,
        vk::Format::R16_UNORM => PixelFormat::R16Unorm,
        vk::Format::R32_SFLOAT => PixelFormat::R32Float,
        vk::Format::R16G16B16A16_SFLOAT => PixelFormat::Rgba16Float,
        vk::Format::R32G32B32A32_SFLOAT => PixelFormat::Rgba32Float,
        vk::Format::BC1_RGBA_UNORM_BLOCK => PixelFormat::Bc1RgbaUnorm,
        vk::Format::BC3_UNORM_BLOCK => PixelFormat::Bc3RgbaUnorm,
        vk::Format::D24_UNORM_S8_UINT => PixelFormat::Depth24UnormStencil8,
        vk::Format::D32_SFLOAT => PixelFormat::Depth32Float,
        vk::Format::D32_SFLOAT_S8_UINT => PixelFormat::Depth32FloatStencil8,
        _ => return None,
    };
    Some(pixel)
}

/// Convert TextureUsage flags to Vulkan image usage flags.
pub fn convert_texture_usage(usage: TextureUsage) -> vk::ImageUsageFlags {
    let mut result = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;

    if usage.contains(TextureUsage::SAMPLED) {
        result |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::RENDER_TARGET) {
        result |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL) {
        result |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }

    result
}

/// Format features an image with the given usage needs.
pub fn required_format_features(usage: TextureUsage) -> vk::FormatFeatureFlags {
    let mut result = vk::FormatFeatureFlags::TRANSFER_DST;
    if usage.contains(TextureUsage::SAMPLED) {
        result |= vk::FormatFeatureFlags::SAMPLED_IMAGE;
    }
    if usage.contains(TextureUsage::RENDER_TARGET) {
        result |= vk::FormatFeatureFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL) {
        result |= vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    result
}

/// Aspect of a format, for image views and copies.
pub fn aspect_mask(format: PixelFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth_stencil() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub fn convert_index_format(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::UInt16 => vk::IndexType::UINT16,
        IndexFormat::UInt32 => vk::IndexType::UINT32,
    }
}

pub fn convert_vertex_format(format: VertexElementFormat) -> vk::Format {
    match format {
        VertexElementFormat::Float1 => vk::Format::R32_SFLOAT,
        VertexElementFormat::Float2 => vk::Format::R32G32_SFLOAT,
        VertexElementFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        VertexElementFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexElementFormat::Byte2Norm => vk::Format::R8G8_UNORM,
        VertexElementFormat::Byte4Norm => vk::Format::R8G8B8A8_UNORM,
        VertexElementFormat::UInt1 => vk::Format::R32_UINT,
        VertexElementFormat::UInt2 => vk::Format::R32G32_UINT,
        VertexElementFormat::UInt4 => vk::Format::R32G32B32A32_UINT,
        VertexElementFormat::Int1 => vk::Format::R32_SINT,
    }
}

/// Convert FilterMode to Vulkan filter.
pub fn convert_filter_mode(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

/// Convert FilterMode to Vulkan mipmap filter mode.
pub fn convert_mipmap_filter_mode(mode: FilterMode) -> vk::SamplerMipmapMode {
    match mode {
        FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

/// Convert AddressMode to Vulkan sampler address mode.
pub fn convert_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
    }
}

/// Convert ComparisonKind to Vulkan compare op.
pub fn convert_compare_function(kind: ComparisonKind) -> vk::CompareOp {
    match kind {
        ComparisonKind::Never => vk::CompareOp::NEVER,
        ComparisonKind::Less => vk::CompareOp::LESS,
        ComparisonKind::Equal => vk::CompareOp::EQUAL,
        ComparisonKind::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        ComparisonKind::Greater => vk::CompareOp::GREATER,
        ComparisonKind::NotEqual => vk::CompareOp::NOT_EQUAL,
        ComparisonKind::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        ComparisonKind::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn convert_blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SourceColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::InverseSourceColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SourceAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::InverseSourceAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DestinationAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::InverseDestinationAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::DestinationColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::InverseDestinationColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::BlendFactor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::InverseBlendFactor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
    }
}

pub fn convert_blend_function(function: BlendFunction) -> vk::BlendOp {
    match function {
        BlendFunction::Add => vk::BlendOp::ADD,
        BlendFunction::Subtract => vk::BlendOp::SUBTRACT,
        BlendFunction::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendFunction::Minimum => vk::BlendOp::MIN,
        BlendFunction::Maximum => vk::BlendOp::MAX,
    }
}

pub fn convert_topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

pub fn topology_from_vk(topology: vk::PrimitiveTopology) -> Option<PrimitiveTopology> {
    let converted = match topology {
        vk::PrimitiveTopology::POINT_LIST => PrimitiveTopology::PointList,
        vk::PrimitiveTopology::LINE_LIST => PrimitiveTopology::LineList,
        vk::PrimitiveTopology::LINE_STRIP => PrimitiveTopology::LineStrip,
        vk::PrimitiveTopology::TRIANGLE_LIST => PrimitiveTopology::TriangleList,
        vk::PrimitiveTopology::TRIANGLE_STRIP => PrimitiveTopology::TriangleStrip,
        _ => return None,
    };
    Some(converted)
}

pub fn convert_cull_mode(mode: FaceCullMode) -> vk::CullModeFlags {
    match mode {
        FaceCullMode::None => vk::CullModeFlags::NONE,
        FaceCullMode::Front => vk::CullModeFlags::FRONT,
        FaceCullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub fn convert_fill_mode(mode: PolygonFillMode) -> vk::PolygonMode {
    match mode {
        PolygonFillMode::Solid => vk::PolygonMode::FILL,
        PolygonFillMode::Wireframe => vk::PolygonMode::LINE,
    }
}

pub fn convert_front_face(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
    }
}

pub fn convert_shader_stage(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderStage::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
        ShaderStage::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
    }
}

pub fn convert_shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    ShaderStage::ALL
        .into_iter()
        .filter(|stage| stages.contains(ShaderStages::from(*stage)))
        .fold(vk::ShaderStageFlags::empty(), |flags, stage| {
            flags | convert_shader_stage(stage)
        })
}

pub fn convert_resource_kind(kind: ResourceKind) -> vk::DescriptorType {
    match kind {
        ResourceKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        ResourceKind::Texture => vk::DescriptorType::SAMPLED_IMAGE,
        ResourceKind::Sampler => vk::DescriptorType::SAMPLER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_roundtrip() {
        for format in [
            PixelFormat::Rgba8UnormSrgb,
            PixelFormat::Bgra8Unorm,
            PixelFormat::Bc1RgbaUnorm,
            PixelFormat::Depth32FloatStencil8,
        ] {
            assert_eq!(pixel_format_from_vk(convert_pixel_format(format)), Some(format));
        }
        assert_eq!(pixel_format_from_vk(vk::Format::UNDEFINED), None);
    }

    #[test]
    fn test_shader_stage_flags() {
        let stages = ShaderStages::VERTEX | ShaderStages::FRAGMENT;
        assert_eq!(
            convert_shader_stages(stages),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_depth_aspect() {
        assert_eq!(aspect_mask(PixelFormat::Depth32Float), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_mask(PixelFormat::Depth24UnormStencil8),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(aspect_mask(PixelFormat::Rgba8Unorm), vk::ImageAspectFlags::COLOR);
    }
}
