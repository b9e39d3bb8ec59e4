//! Backend-independent validation of descriptors and command arguments.
//!
//! Every check here runs before a backend sees the request, so no native
//! object is created for an invalid description.

use crate::backend::DeviceFeatures;
use crate::config::BackendType;
use crate::error::GraphicsError;
use crate::resources::{
    BindingResource, Buffer, FramebufferAttachment, FramebufferDescriptor, PipelineDescriptor,
    ResourceSetDescriptor, Texture,
};
use crate::types::{
    BufferDescriptor, BufferUsage, MAX_ANISOTROPY, ResourceLayoutDescriptor, SamplerDescriptor,
    ShaderDescriptor, ShaderStage, TextureDescriptor, TextureKind, TextureRegion, TextureUsage,
    max_mip_levels,
};

/// Largest supported texture dimension.
pub const MAX_TEXTURE_DIMENSION: u32 = 16384;

/// Largest supported buffer size.
pub const MAX_BUFFER_SIZE: u64 = 1 << 30; // 1 GB

/// Resource set slots a pipeline may declare and a command list may bind.
pub const MAX_RESOURCE_SETS: u32 = 4;

/// Resources a single layout may declare.
pub const MAX_RESOURCES_PER_SET: usize = 16;

pub(crate) fn resource_set_slot(slot: u32) -> Result<(), GraphicsError> {
    if slot >= MAX_RESOURCE_SETS {
        return Err(GraphicsError::OutOfBounds(format!(
            "resource set slot {slot} exceeds the limit of {MAX_RESOURCE_SETS} sets"
        )));
    }
    Ok(())
}

pub(crate) fn check_backend(expected: BackendType, found: BackendType) -> Result<(), GraphicsError> {
    if expected != found {
        return Err(crate::backend::mismatch(expected, found));
    }
    Ok(())
}

pub(crate) fn buffer(descriptor: &BufferDescriptor) -> Result<(), GraphicsError> {
    if descriptor.size == 0 {
        return Err(GraphicsError::invalid("buffer size cannot be zero"));
    }
    if descriptor.size > MAX_BUFFER_SIZE {
        return Err(GraphicsError::invalid(format!(
            "buffer size {} exceeds maximum {}",
            descriptor.size, MAX_BUFFER_SIZE
        )));
    }
    let bindable = BufferUsage::VERTEX | BufferUsage::INDEX | BufferUsage::UNIFORM;
    if !descriptor.usage.intersects(bindable) {
        return Err(GraphicsError::invalid(format!(
            "buffer usage {:?} has no vertex, index or uniform bit",
            descriptor.usage
        )));
    }
    Ok(())
}

pub(crate) fn texture(
    descriptor: &TextureDescriptor,
    kind: TextureKind,
    features: &DeviceFeatures,
) -> Result<(), GraphicsError> {
    if descriptor.width == 0 || descriptor.height == 0 {
        return Err(GraphicsError::invalid("texture dimensions cannot be zero"));
    }
    if descriptor.width > MAX_TEXTURE_DIMENSION || descriptor.height > MAX_TEXTURE_DIMENSION {
        return Err(GraphicsError::invalid(format!(
            "texture dimension exceeds maximum {MAX_TEXTURE_DIMENSION}"
        )));
    }
    if kind == TextureKind::Cube && descriptor.width != descriptor.height {
        return Err(GraphicsError::invalid(format!(
            "cube faces must be square, got {}x{}",
            descriptor.width, descriptor.height
        )));
    }
    let max_mips = max_mip_levels(descriptor.width, descriptor.height);
    if descriptor.mip_levels == 0 || descriptor.mip_levels > max_mips {
        return Err(GraphicsError::invalid(format!(
            "mip level count {} outside 1..={max_mips}",
            descriptor.mip_levels
        )));
    }
    if descriptor.array_layers == 0 {
        return Err(GraphicsError::invalid("array layer count cannot be zero"));
    }
    if descriptor.usage.is_empty() {
        return Err(GraphicsError::invalid("texture usage cannot be empty"));
    }

    let format = descriptor.format;
    if format.is_depth_stencil() {
        if !descriptor.usage.contains(TextureUsage::DEPTH_STENCIL)
            || descriptor.usage.contains(TextureUsage::RENDER_TARGET)
        {
            return Err(GraphicsError::invalid(format!(
                "depth format {format:?} requires DEPTH_STENCIL usage without RENDER_TARGET"
            )));
        }
    } else if descriptor.usage.contains(TextureUsage::DEPTH_STENCIL) {
        return Err(GraphicsError::invalid(format!(
            "DEPTH_STENCIL usage requires a depth format, got {format:?}"
        )));
    }

    if format.is_compressed() {
        if descriptor.usage != TextureUsage::SAMPLED {
            return Err(GraphicsError::invalid(format!(
                "compressed format {format:?} only supports SAMPLED usage"
            )));
        }
        let (block_w, block_h) = format.block_dimensions();
        if descriptor.width % block_w != 0 || descriptor.height % block_h != 0 {
            return Err(GraphicsError::invalid(format!(
                "compressed texture size {}x{} is not a multiple of the {block_w}x{block_h} block",
                descriptor.width, descriptor.height
            )));
        }
        if !features.texture_compression_bc {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "BC texture compression ({format:?})"
            )));
        }
    }
    Ok(())
}

pub(crate) fn sampler(
    descriptor: &SamplerDescriptor,
    features: &DeviceFeatures,
) -> Result<(), GraphicsError> {
    if descriptor.lod_min_clamp > descriptor.lod_max_clamp {
        return Err(GraphicsError::invalid(format!(
            "sampler lod_min_clamp {} exceeds lod_max_clamp {}",
            descriptor.lod_min_clamp, descriptor.lod_max_clamp
        )));
    }
    if !(1..=MAX_ANISOTROPY).contains(&descriptor.max_anisotropy) {
        return Err(GraphicsError::invalid(format!(
            "max_anisotropy {} outside 1..={MAX_ANISOTROPY}",
            descriptor.max_anisotropy
        )));
    }
    if descriptor.is_anisotropic() && !features.sampler_anisotropy {
        return Err(GraphicsError::FeatureNotSupported(
            "anisotropic filtering".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn shader(
    descriptor: &ShaderDescriptor,
    features: &DeviceFeatures,
) -> Result<(), GraphicsError> {
    if descriptor.bytecode.is_empty() {
        return Err(GraphicsError::invalid("shader bytecode is empty"));
    }
    if descriptor.entry_point.is_empty() {
        return Err(GraphicsError::invalid("shader entry point is empty"));
    }
    match descriptor.stage {
        ShaderStage::Geometry if !features.geometry_shader => Err(
            GraphicsError::FeatureNotSupported("geometry shaders".to_string()),
        ),
        ShaderStage::TessellationControl | ShaderStage::TessellationEvaluation
            if !features.tessellation_shaders =>
        {
            Err(GraphicsError::FeatureNotSupported(
                "tessellation shaders".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

pub(crate) fn resource_layout(descriptor: &ResourceLayoutDescriptor) -> Result<(), GraphicsError> {
    if descriptor.elements.len() > MAX_RESOURCES_PER_SET {
        return Err(GraphicsError::invalid(format!(
            "resource layout has {} elements, at most {MAX_RESOURCES_PER_SET} are supported",
            descriptor.elements.len()
        )));
    }
    for (index, element) in descriptor.elements.iter().enumerate() {
        if element.stages.is_empty() {
            return Err(GraphicsError::invalid(format!(
                "resource layout element {index} ({}) is visible to no stage",
                element.name
            )));
        }
        if descriptor.elements[..index]
            .iter()
            .any(|other| other.name == element.name)
        {
            return Err(GraphicsError::invalid(format!(
                "resource layout element name {} is used twice",
                element.name
            )));
        }
    }
    Ok(())
}

/// Positional, strict matching of a set against its layout.
pub(crate) fn resource_set(
    descriptor: &ResourceSetDescriptor,
    backend: BackendType,
) -> Result<(), GraphicsError> {
    if descriptor.layout.is_disposed() {
        return Err(GraphicsError::ResourceDisposed("resource layout"));
    }
    let elements = descriptor.layout.elements();
    if elements.len() != descriptor.resources.len() {
        return Err(GraphicsError::ResourceCountMismatch {
            expected: elements.len(),
            found: descriptor.resources.len(),
        });
    }
    for (slot, (element, resource)) in elements.iter().zip(&descriptor.resources).enumerate() {
        if element.kind != resource.kind() {
            return Err(GraphicsError::ResourceSetMismatch {
                slot,
                expected: element.kind,
                found: resource.kind(),
            });
        }
        match resource {
            BindingResource::UniformBuffer(buffer) => {
                check_backend(backend, buffer.backend())?;
                if buffer.is_disposed() {
                    return Err(GraphicsError::ResourceDisposed("buffer"));
                }
                if !buffer.usage().contains(BufferUsage::UNIFORM) {
                    return Err(GraphicsError::invalid(format!(
                        "buffer {} bound to uniform slot {slot} lacks UNIFORM usage",
                        buffer.id()
                    )));
                }
            }
            BindingResource::Texture(texture) => {
                check_backend(backend, texture.backend())?;
                if texture.is_disposed() {
                    return Err(GraphicsError::ResourceDisposed("texture"));
                }
                if !texture.usage().contains(TextureUsage::SAMPLED) {
                    return Err(GraphicsError::invalid(format!(
                        "texture {} bound to slot {slot} lacks SAMPLED usage",
                        texture.id()
                    )));
                }
            }
            BindingResource::Sampler(sampler) => {
                check_backend(backend, sampler.native()?.backend())?;
            }
        }
    }
    Ok(())
}

pub(crate) fn pipeline(
    descriptor: &PipelineDescriptor,
    backend: BackendType,
) -> Result<(), GraphicsError> {
    let shaders = &descriptor.shader_set.shaders;
    for stage in ShaderStage::ALL {
        let count = shaders.iter().filter(|shader| shader.stage() == stage).count();
        if count > 1 {
            return Err(GraphicsError::invalid(format!(
                "pipeline has {count} {stage:?} shaders"
            )));
        }
        if stage == ShaderStage::Vertex && count == 0 {
            return Err(GraphicsError::invalid("pipeline has no vertex shader"));
        }
    }
    let has_control = descriptor.shader_set.shader(ShaderStage::TessellationControl).is_some();
    let has_evaluation = descriptor
        .shader_set
        .shader(ShaderStage::TessellationEvaluation)
        .is_some();
    if has_control != has_evaluation {
        return Err(GraphicsError::invalid(
            "tessellation control and evaluation shaders must be used together",
        ));
    }
    for shader in shaders {
        if shader.is_disposed() {
            return Err(GraphicsError::ResourceDisposed("shader"));
        }
        check_backend(backend, shader.native()?.backend())?;
    }
    if descriptor.resource_layouts.len() > MAX_RESOURCE_SETS as usize {
        return Err(GraphicsError::invalid(format!(
            "pipeline declares {} resource layouts, at most {MAX_RESOURCE_SETS} are supported",
            descriptor.resource_layouts.len()
        )));
    }
    for layout in &descriptor.resource_layouts {
        check_backend(backend, layout.native()?.backend())?;
    }

    let color_count = descriptor.outputs.color_formats.len();
    if descriptor.blend_state.attachments.len() != color_count {
        return Err(GraphicsError::invalid(format!(
            "blend state has {} attachments for {color_count} color outputs",
            descriptor.blend_state.attachments.len()
        )));
    }
    if let Some(format) = descriptor
        .outputs
        .color_formats
        .iter()
        .find(|format| format.is_depth_stencil() || format.is_compressed())
    {
        return Err(GraphicsError::invalid(format!(
            "{format:?} cannot be a color output"
        )));
    }
    if let Some(format) = descriptor.outputs.depth_format
        && !format.is_depth_stencil()
    {
        return Err(GraphicsError::invalid(format!(
            "{format:?} cannot be a depth output"
        )));
    }

    for (slot, layout) in descriptor.shader_set.vertex_layouts.iter().enumerate() {
        if layout.elements.is_empty() {
            return Err(GraphicsError::invalid(format!(
                "vertex layout {slot} has no elements"
            )));
        }
        let covered: u32 = layout.elements.iter().map(|element| element.format.size()).sum();
        if layout.stride == 0 || layout.stride < covered {
            return Err(GraphicsError::invalid(format!(
                "vertex layout {slot} stride {} does not cover its {covered} bytes of elements",
                layout.stride
            )));
        }
    }
    Ok(())
}

/// Validates an offscreen framebuffer and returns its dimensions.
pub(crate) fn framebuffer(
    descriptor: &FramebufferDescriptor,
    backend: BackendType,
) -> Result<(u32, u32), GraphicsError> {
    let mut extent = None;
    let mut check = |attachment: &FramebufferAttachment| -> Result<(), GraphicsError> {
        let texture = &attachment.texture;
        check_backend(backend, texture.backend())?;
        if texture.is_disposed() {
            return Err(GraphicsError::ResourceDisposed("texture"));
        }
        if attachment.mip_level >= texture.mip_levels() {
            return Err(GraphicsError::OutOfBounds(format!(
                "attachment mip level {} of texture {} with {} levels",
                attachment.mip_level,
                texture.id(),
                texture.mip_levels()
            )));
        }
        if attachment.array_layer >= texture.native_layers() {
            return Err(GraphicsError::OutOfBounds(format!(
                "attachment layer {} of texture {} with {} layers",
                attachment.array_layer,
                texture.id(),
                texture.native_layers()
            )));
        }
        let size = attachment.extent();
        match extent {
            None => extent = Some(size),
            Some(expected) if expected != size => {
                return Err(GraphicsError::invalid(format!(
                    "framebuffer attachments differ in size: {}x{} vs {}x{}",
                    expected.0, expected.1, size.0, size.1
                )));
            }
            Some(_) => {}
        }
        Ok(())
    };

    for (index, target) in descriptor.color_targets.iter().enumerate() {
        check(target)?;
        let texture = &target.texture;
        if !texture.usage().contains(TextureUsage::RENDER_TARGET)
            || texture.format().is_depth_stencil()
        {
            return Err(GraphicsError::invalid(format!(
                "color target {index} (texture {}) needs RENDER_TARGET usage and a color format",
                texture.id()
            )));
        }
    }
    if let Some(target) = &descriptor.depth_target {
        check(target)?;
        let texture = &target.texture;
        if !texture.usage().contains(TextureUsage::DEPTH_STENCIL)
            || !texture.format().is_depth_stencil()
        {
            return Err(GraphicsError::invalid(format!(
                "depth target (texture {}) needs DEPTH_STENCIL usage and a depth format",
                texture.id()
            )));
        }
    }
    extent.ok_or_else(|| GraphicsError::invalid("framebuffer has no attachments"))
}

pub(crate) fn buffer_update(buffer: &Buffer, offset: u64, len: usize) -> Result<(), GraphicsError> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= buffer.size() => Ok(()),
        _ => Err(GraphicsError::OutOfBounds(format!(
            "update of {len} bytes at offset {offset} into buffer {} of {} bytes",
            buffer.id(),
            buffer.size()
        ))),
    }
}

pub(crate) fn texture_update(
    texture: &Texture,
    region: &TextureRegion,
    len: usize,
) -> Result<(), GraphicsError> {
    if region.mip_level >= texture.mip_levels() {
        return Err(GraphicsError::OutOfBounds(format!(
            "mip level {} of texture {} with {} levels",
            region.mip_level,
            texture.id(),
            texture.mip_levels()
        )));
    }
    if region.array_layer >= texture.native_layers() {
        return Err(GraphicsError::OutOfBounds(format!(
            "array layer {} of texture {} with {} layers",
            region.array_layer,
            texture.id(),
            texture.native_layers()
        )));
    }
    if region.width == 0 || region.height == 0 {
        return Err(GraphicsError::invalid("texture region cannot be empty"));
    }
    let (mip_width, mip_height) = texture.descriptor().mip_extent(region.mip_level);
    let right = region.x.checked_add(region.width);
    let bottom = region.y.checked_add(region.height);
    if !matches!(right, Some(right) if right <= mip_width)
        || !matches!(bottom, Some(bottom) if bottom <= mip_height)
    {
        return Err(GraphicsError::OutOfBounds(format!(
            "region {}x{} at ({}, {}) outside mip {} of {mip_width}x{mip_height}",
            region.width, region.height, region.x, region.y, region.mip_level
        )));
    }

    let format = texture.format();
    let (block_w, block_h) = format.block_dimensions();
    let aligned = |origin: u32, size: u32, block: u32, limit: u32| {
        origin % block == 0 && (size % block == 0 || origin + size == limit)
    };
    if !aligned(region.x, region.width, block_w, mip_width)
        || !aligned(region.y, region.height, block_h, mip_height)
    {
        return Err(GraphicsError::invalid(format!(
            "region is not aligned to the {block_w}x{block_h} block of {format:?}"
        )));
    }

    let expected = format.region_size(region.width, region.height);
    if len as u64 != expected {
        return Err(GraphicsError::invalid(format!(
            "texture update carries {len} bytes, region needs {expected}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    fn all_features() -> DeviceFeatures {
        DeviceFeatures {
            geometry_shader: true,
            tessellation_shaders: true,
            texture_compression_bc: true,
            base_instance: true,
            debug_output: false,
            sampler_anisotropy: true,
        }
    }

    #[test]
    fn test_buffer_validation() {
        assert!(buffer(&BufferDescriptor::vertex(64)).is_ok());
        assert!(matches!(
            buffer(&BufferDescriptor::vertex(0)),
            Err(GraphicsError::InvalidDescriptor(_))
        ));
        assert!(buffer(&BufferDescriptor::new(16, BufferUsage::DYNAMIC)).is_err());
    }

    #[test]
    fn test_texture_validation() {
        let features = all_features();
        let color = TextureDescriptor::new_2d(64, 32, PixelFormat::Rgba8Unorm, TextureUsage::SAMPLED);
        assert!(texture(&color, TextureKind::Texture2D, &features).is_ok());
        assert!(texture(&color, TextureKind::Cube, &features).is_err());
        assert!(texture(&color.clone().with_mip_levels(8), TextureKind::Texture2D, &features).is_err());
        assert!(texture(&color.clone().with_full_mip_chain(), TextureKind::Texture2D, &features).is_ok());
        assert!(texture(&color.clone().with_array_layers(0), TextureKind::Texture2D, &features).is_err());

        let depth_as_target = TextureDescriptor::new_2d(
            16,
            16,
            PixelFormat::Depth32Float,
            TextureUsage::RENDER_TARGET | TextureUsage::DEPTH_STENCIL,
        );
        assert!(texture(&depth_as_target, TextureKind::Texture2D, &features).is_err());
    }

    #[test]
    fn test_compressed_texture_validation() {
        let mut features = all_features();
        let bc1 = TextureDescriptor::new_2d(64, 64, PixelFormat::Bc1RgbaUnorm, TextureUsage::SAMPLED);
        assert!(texture(&bc1, TextureKind::Texture2D, &features).is_ok());

        let unaligned = TextureDescriptor::new_2d(30, 64, PixelFormat::Bc1RgbaUnorm, TextureUsage::SAMPLED);
        assert!(texture(&unaligned, TextureKind::Texture2D, &features).is_err());

        features.texture_compression_bc = false;
        assert!(matches!(
            texture(&bc1, TextureKind::Texture2D, &features),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
    }

    #[test]
    fn test_resource_set_slot_limit() {
        assert!(resource_set_slot(0).is_ok());
        assert!(resource_set_slot(MAX_RESOURCE_SETS - 1).is_ok());
        assert!(matches!(
            resource_set_slot(MAX_RESOURCE_SETS),
            Err(GraphicsError::OutOfBounds(_))
        ));
        assert!(matches!(
            resource_set_slot(u32::MAX / 8),
            Err(GraphicsError::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_sampler_validation() {
        let mut features = all_features();
        assert!(sampler(&SamplerDescriptor::anisotropic(8), &features).is_ok());
        assert!(sampler(&SamplerDescriptor::linear().with_anisotropy(0), &features).is_err());
        assert!(sampler(&SamplerDescriptor::linear().with_anisotropy(17), &features).is_err());
        assert!(sampler(&SamplerDescriptor::point().with_lod_clamp(4.0, 1.0), &features).is_err());

        features.sampler_anisotropy = false;
        assert!(matches!(
            sampler(&SamplerDescriptor::anisotropic(8), &features),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
        assert!(sampler(&SamplerDescriptor::linear(), &features).is_ok());
    }

    #[test]
    fn test_shader_stage_gating() {
        let mut features = all_features();
        let geometry = ShaderDescriptor::new(ShaderStage::Geometry, vec![1, 2, 3, 4]);
        assert!(shader(&geometry, &features).is_ok());
        features.geometry_shader = false;
        assert!(matches!(
            shader(&geometry, &features),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
        assert!(shader(&ShaderDescriptor::new(ShaderStage::Vertex, Vec::new()), &features).is_err());
    }
}
