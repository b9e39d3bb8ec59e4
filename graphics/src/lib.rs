//! # Lattice Graphics
//!
//! Backend-agnostic GPU command and resource layer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDevice`] - Device, swapchain and command execution
//! - [`ResourceFactory`] - Validated creation of buffers, textures, samplers,
//!   shaders, resource layouts and sets, pipelines and framebuffers
//! - [`CommandList`] - Recording of framebuffer, pipeline and resource
//!   bindings, updates, clears and draws
//! - Three execution models behind one API: Vulkan (native command buffers),
//!   OpenGL (deferred replay on the context thread) and Direct3D 11
//!   (immediate context)
//!
//! ## Example
//!
//! ```ignore
//! use lattice_graphics::{BackendType, DeviceOptions, GraphicsDevice, RgbaFloat};
//!
//! let device = GraphicsDevice::new(DeviceOptions::new(BackendType::Vulkan))?;
//! let factory = device.create_factory();
//!
//! let mut commands = factory.create_command_list()?;
//! commands.set_framebuffer(&device.swapchain_framebuffer())?;
//! commands.clear_color_target(0, RgbaFloat::BLACK)?;
//! device.execute_commands(&mut commands)?;
//! device.swap_buffers()?;
//! ```

pub mod backend;
pub mod command_list;
pub mod config;
pub mod device;
pub(crate) mod driver;
pub mod error;
pub mod factory;
pub mod resources;
pub mod types;
pub(crate) mod validation;

// Re-export main types for convenience
pub use backend::DeviceFeatures;
pub use command_list::{CommandList, CommandListState};
pub use config::{BACKEND_ENV_VAR, BackendType, DEBUG_ENV_VAR, DeviceOptions};
pub use device::{DeviceStatistics, GraphicsDevice};
pub use driver::DrawCall;
pub use error::{GraphicsError, NativeError};
pub use factory::ResourceFactory;
pub use resources::{
    BindingResource, Buffer, Framebuffer, FramebufferAttachment, FramebufferDescriptor,
    FramebufferKind, Pipeline, PipelineDescriptor, ResourceId, ResourceLayout, ResourceSet,
    ResourceSetDescriptor, Sampler, Shader, ShaderSet, Texture,
};
pub use types::{
    AddressMode, BlendAttachment, BlendFactor, BlendFunction, BlendState, BufferDescriptor,
    BufferUsage, ComparisonKind, CubeFace, DepthStencilState, FaceCullMode, FilterMode, FrontFace,
    IndexFormat, MAX_ANISOTROPY, OutputDescription, PixelFormat, PolygonFillMode, PrimitiveTopology,
    RasterizerState, ResourceKind, ResourceLayoutDescriptor, ResourceLayoutElement, RgbaFloat,
    SamplerDescriptor, ScissorRect, ShaderDescriptor, ShaderStage, ShaderStages,
    TextureDescriptor, TextureKind, TextureRegion, TextureUsage, VertexElement,
    VertexElementFormat, VertexElementSemantic, VertexLayout, Viewport,
};
pub use validation::{
    MAX_BUFFER_SIZE, MAX_RESOURCE_SETS, MAX_RESOURCES_PER_SET, MAX_TEXTURE_DIMENSION,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static_assertions::assert_impl_all!(Buffer: Send, Sync);
static_assertions::assert_impl_all!(Texture: Send, Sync);
static_assertions::assert_impl_all!(Sampler: Send, Sync);
static_assertions::assert_impl_all!(Shader: Send, Sync);
static_assertions::assert_impl_all!(ResourceLayout: Send, Sync);
static_assertions::assert_impl_all!(ResourceSet: Send, Sync);
static_assertions::assert_impl_all!(Pipeline: Send, Sync);
static_assertions::assert_impl_all!(Framebuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_compiled_backends() {
        assert!(BackendType::ALL.iter().any(|backend| backend.is_compiled()));
        assert!(BackendType::preferred().is_compiled());
    }
}
