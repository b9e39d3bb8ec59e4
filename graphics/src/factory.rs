//! Resource creation.
//!
//! A [`ResourceFactory`] is bound to one device. Every descriptor goes
//! through the backend-independent checks in [`crate::validation`] before the
//! backend sees it, so an invalid description never creates a native object.

use std::sync::Arc;

use crate::backend::{DeviceFeatures, GpuFactory, dispatch};
use crate::command_list::CommandList;
use crate::config::BackendType;
use crate::error::GraphicsError;
use crate::resources::{
    Buffer, Framebuffer, FramebufferDescriptor, Pipeline, PipelineDescriptor, ResourceLayout,
    ResourceSet, ResourceSetDescriptor, Sampler, Shader, Texture,
};
use crate::types::{
    BufferDescriptor, ResourceLayoutDescriptor, SamplerDescriptor, ShaderDescriptor,
    TextureDescriptor, TextureKind,
};
use crate::validation;

/// Creates resources and command lists for one device.
///
/// Cloning is cheap; clones create resources against the same device and may
/// be used from any thread.
///
/// # Example
///
/// ```ignore
/// let factory = device.create_factory();
/// let vertices = factory.create_buffer(&BufferDescriptor::vertex(1024))?;
/// let texture = factory.create_texture_2d(&TextureDescriptor::new_2d(
///     256,
///     256,
///     PixelFormat::Rgba8Unorm,
///     TextureUsage::SAMPLED,
/// ))?;
/// ```
#[derive(Clone)]
pub struct ResourceFactory {
    inner: GpuFactory,
    features: DeviceFeatures,
}

impl ResourceFactory {
    pub(crate) fn new(inner: GpuFactory) -> Self {
        let features = dispatch!(GpuFactory, &inner, shared => shared.features());
        Self { inner, features }
    }

    /// The backend resources are created on.
    pub fn backend_type(&self) -> BackendType {
        self.inner.backend()
    }

    /// Capabilities of the device.
    pub fn features(&self) -> DeviceFeatures {
        self.features
    }

    /// Create a vertex, index or uniform buffer.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidDescriptor`] for a zero size, a usage
    /// without a vertex/index/uniform bit, or a size or usage combination the
    /// backend cannot express.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Arc<Buffer>, GraphicsError> {
        validation::buffer(descriptor)?;
        let native = dispatch!(GpuFactory, &self.inner, shared => shared.create_buffer(descriptor))?;
        log::trace!(
            "ResourceFactory: created buffer {:?}, size={}",
            descriptor.label,
            descriptor.size
        );
        Ok(Arc::new(Buffer::new(descriptor.clone(), native)))
    }

    /// Create a 2D texture, or a 2D array texture when `array_layers > 1`.
    pub fn create_texture_2d(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        self.create_texture(descriptor, TextureKind::Texture2D)
    }

    /// Create a cube texture; `array_layers` counts cubes, each with six
    /// faces in [`CubeFace`](crate::CubeFace) order.
    pub fn create_texture_cube(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        self.create_texture(descriptor, TextureKind::Cube)
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        kind: TextureKind,
    ) -> Result<Arc<Texture>, GraphicsError> {
        validation::texture(descriptor, kind, &self.features)?;
        let native = dispatch!(GpuFactory, &self.inner, shared => shared.create_texture(descriptor, kind))?;
        Ok(Arc::new(Texture::new(descriptor.clone(), kind, native)))
    }

    pub fn create_sampler(
        &self,
        descriptor: &SamplerDescriptor,
    ) -> Result<Arc<Sampler>, GraphicsError> {
        validation::sampler(descriptor, &self.features)?;
        let native = dispatch!(GpuFactory, &self.inner, shared => shared.create_sampler(descriptor))?;
        Ok(Arc::new(Sampler::new(descriptor.clone(), native)))
    }

    /// Create one shader stage from backend bytecode: SPIR-V on Vulkan, GLSL
    /// source on OpenGL, a DXBC container on Direct3D 11.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::FeatureNotSupported`] for geometry or
    /// tessellation stages the device lacks, and
    /// [`GraphicsError::InvalidDescriptor`] for bytecode the backend rejects.
    pub fn create_shader(&self, descriptor: &ShaderDescriptor) -> Result<Arc<Shader>, GraphicsError> {
        validation::shader(descriptor, &self.features)?;
        let native = dispatch!(GpuFactory, &self.inner, shared => shared.create_shader(descriptor))?;
        Ok(Arc::new(Shader::new(
            descriptor.stage,
            descriptor.entry_point.clone(),
            descriptor.label.clone(),
            native,
        )))
    }

    pub fn create_resource_layout(
        &self,
        descriptor: &ResourceLayoutDescriptor,
    ) -> Result<Arc<ResourceLayout>, GraphicsError> {
        validation::resource_layout(descriptor)?;
        let native =
            dispatch!(GpuFactory, &self.inner, shared => shared.create_resource_layout(descriptor))?;
        Ok(Arc::new(ResourceLayout::new(descriptor.clone(), native)))
    }

    /// Bind concrete resources to the slots of a layout.
    ///
    /// Resources are matched to slots by position. The set keeps only weak
    /// references to them.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::ResourceCountMismatch`] or
    /// [`GraphicsError::ResourceSetMismatch`] when the resources do not
    /// match the layout.
    pub fn create_resource_set(
        &self,
        descriptor: &ResourceSetDescriptor,
    ) -> Result<Arc<ResourceSet>, GraphicsError> {
        let backend = self.backend_type();
        validation::check_backend(backend, descriptor.layout.native()?.backend())?;
        validation::resource_set(descriptor, backend)?;
        let layout = &descriptor.layout;
        let resources = &descriptor.resources;
        let native = dispatch!(GpuFactory, &self.inner, shared => {
            shared.create_resource_set(layout, resources)
        })?;
        Ok(Arc::new(ResourceSet::new(
            Arc::clone(&descriptor.layout),
            &descriptor.resources,
            native,
        )))
    }

    pub fn create_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
    ) -> Result<Arc<Pipeline>, GraphicsError> {
        validation::pipeline(descriptor, self.backend_type())?;
        let native = dispatch!(GpuFactory, &self.inner, shared => shared.create_pipeline(descriptor))?;
        log::trace!(
            "ResourceFactory: created pipeline {:?} ({} shaders, {} layouts)",
            descriptor.label,
            descriptor.shader_set.shaders.len(),
            descriptor.resource_layouts.len()
        );
        Ok(Arc::new(Pipeline::new(descriptor.clone(), native)))
    }

    /// Create an offscreen framebuffer over existing textures.
    pub fn create_framebuffer(
        &self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<Arc<Framebuffer>, GraphicsError> {
        let (width, height) = validation::framebuffer(descriptor, self.backend_type())?;
        let native =
            dispatch!(GpuFactory, &self.inner, shared => shared.create_framebuffer(descriptor))?;
        Ok(Arc::new(Framebuffer::offscreen(
            descriptor.clone(),
            width,
            height,
            native,
        )))
    }

    /// Create a command list, ready to record.
    pub fn create_command_list(&self) -> Result<CommandList, GraphicsError> {
        let native = dispatch!(GpuFactory, &self.inner, shared => shared.create_command_list())?;
        Ok(CommandList::new(native))
    }
}

impl std::fmt::Debug for ResourceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceFactory")
            .field("backend", &self.backend_type())
            .field("features", &self.features)
            .finish()
    }
}

static_assertions::assert_impl_all!(ResourceFactory: Send, Sync);
