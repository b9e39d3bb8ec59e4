//! Vulkan backend: native command buffers.
//!
//! Every command list owns a command pool and records straight into a
//! primary command buffer. Executing a list submits that buffer to the single
//! graphics queue with a fresh fence and hands the list a new buffer, so the
//! list can be re-recorded while the previous submission is still running.
//!
//! Submissions are numbered by a monotonically increasing serial. Native
//! objects released while work is in flight are queued in the
//! [`DeferredDestructor`] under the last submitted serial and destroyed once
//! every submission up to it has signaled its fence.

mod command;
pub(crate) mod conversion;
mod debug;
mod deferred;
mod driver;
mod sync;

use std::any::Any;
use std::collections::VecDeque;
use std::ffi::CStr;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use parking_lot::Mutex;

use crate::backend::{
    DeviceFeatures, GpuBuffer, GpuCommandList, GpuFramebuffer, GpuPipeline, GpuResourceLayout,
    GpuResourceSet, GpuSampler, GpuShader, GpuTexture,
};
use crate::config::{BackendType, DeviceOptions};
use crate::device::DeviceStatistics;
use crate::driver::DrawCall;
use crate::error::{GraphicsError, NativeError};
use crate::resources::{
    BindingResource, Buffer, FramebufferDescriptor, PipelineDescriptor, ResourceLayout, Texture,
};
use crate::types::{
    BufferDescriptor, BufferUsage, PixelFormat, ResourceLayoutDescriptor, SamplerDescriptor,
    ShaderDescriptor, ShaderStage, TextureDescriptor, TextureKind, TextureRegion, TextureUsage,
};

pub(crate) use command::VulkanCommandList;

use self::conversion::{
    aspect_mask, convert_address_mode, convert_blend_factor, convert_blend_function,
    convert_buffer_usage, convert_compare_function, convert_cull_mode, convert_fill_mode,
    convert_filter_mode, convert_front_face, convert_mipmap_filter_mode, convert_pixel_format,
    convert_resource_kind, convert_shader_stage, convert_shader_stages, convert_texture_usage,
    convert_topology, convert_vertex_format, required_format_features,
};
use self::deferred::{DeferredDestructor, DeferredResource};
use self::driver::{DescriptorResource, GraphicsPipelineDesc, PhysicalDevice, VALIDATION_LAYER, VkDriver};

/// Number of presentable images.
const SWAPCHAIN_IMAGE_COUNT: u32 = 2;

/// A native object kept alive until the submission that uses it completes.
type Retained = Arc<dyn Any + Send + Sync>;

fn vk_error(operation: &'static str, result: vk::Result) -> GraphicsError {
    match result {
        vk::Result::ERROR_FEATURE_NOT_PRESENT => {
            GraphicsError::FeatureNotSupported(operation.to_string())
        }
        _ => GraphicsError::native(operation, NativeError::Vulkan(result.as_raw())),
    }
}

/// A submission whose fence has not been observed signaled yet.
struct InFlightSubmission {
    serial: u64,
    fence: vk::Fence,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    staging: Vec<vk::Buffer>,
    retained: Vec<Retained>,
}

/// State shared by the device, the factory, every command list and every
/// native object.
pub(crate) struct VulkanShared {
    driver: VkDriver,
    features: DeviceFeatures,
    deferred: DeferredDestructor,
    /// Serial of the most recent submission.
    submitted_serial: AtomicU64,
    /// Every submission up to this serial has completed and been reclaimed.
    completed_serial: AtomicU64,
    in_flight: Mutex<VecDeque<InFlightSubmission>>,
}

impl VulkanShared {
    fn call<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&VkDriver) -> ash::prelude::VkResult<T>,
    ) -> Result<T, GraphicsError> {
        f(&self.driver).map_err(|result| vk_error(operation, result))
    }

    /// Destroy `resource` now if no submission can reference it, otherwise
    /// once the current serial completes.
    fn release(&self, resource: DeferredResource) {
        let serial = self.submitted_serial.load(Ordering::Acquire);
        if serial <= self.completed_serial.load(Ordering::Acquire) {
            resource.destroy(&self.driver);
        } else {
            self.deferred.queue(serial, resource);
        }
    }

    /// Submit an ended command buffer. The staging buffers and retained
    /// objects live until the submission's fence is observed signaled.
    fn submit(
        &self,
        pool: vk::CommandPool,
        command_buffer: vk::CommandBuffer,
        staging: Vec<vk::Buffer>,
        retained: Vec<Retained>,
    ) -> Result<u64, GraphicsError> {
        let fence = self.driver.create_fence(false);
        let mut in_flight = self.in_flight.lock();
        if let Err(result) = self.driver.queue_submit(command_buffer, fence) {
            self.driver.destroy_fence(fence);
            return Err(vk_error("vkQueueSubmit", result));
        }
        let serial = self.submitted_serial.fetch_add(1, Ordering::AcqRel) + 1;
        in_flight.push_back(InFlightSubmission {
            serial,
            fence,
            pool,
            command_buffer,
            staging,
            retained,
        });
        log::trace!("VulkanShared: submitted serial {serial}");
        Ok(serial)
    }

    /// Reclaim completed submissions in order, then destroy every deferred
    /// object whose serial is complete.
    fn maintain(&self) {
        let completed: Vec<InFlightSubmission> = {
            let mut in_flight = self.in_flight.lock();
            let mut completed = Vec::new();
            while in_flight
                .front()
                .is_some_and(|submission| self.driver.get_fence_status(submission.fence).is_ok())
            {
                completed.extend(in_flight.pop_front());
            }
            completed
        };

        for submission in completed {
            self.completed_serial
                .fetch_max(submission.serial, Ordering::AcqRel);
            self.driver
                .free_command_buffer(submission.pool, submission.command_buffer);
            for buffer in submission.staging {
                self.driver.destroy_buffer(buffer);
            }
            self.driver.destroy_fence(submission.fence);
            // Retained natives drop here, with no lock held.
            drop(submission.retained);
        }

        let completed = self.completed_serial.load(Ordering::Acquire);
        for resource in self.deferred.collect(completed) {
            resource.destroy(&self.driver);
        }
    }

    fn wait_idle(&self) {
        self.driver.queue_wait_idle();
        self.maintain();
    }

    fn check_format(&self, format: PixelFormat, usage: TextureUsage) -> Result<vk::Format, GraphicsError> {
        let native = convert_pixel_format(format);
        let supported = self
            .driver
            .physical_device()
            .format_properties(native)
            .optimal_tiling_features;
        if supported.is_empty() || !supported.contains(required_format_features(usage)) {
            return Err(GraphicsError::UnsupportedFormat {
                format,
                backend: BackendType::Vulkan,
            });
        }
        Ok(native)
    }

    /// A single-subresource 2D view.
    fn create_view(
        &self,
        image: vk::Image,
        format: PixelFormat,
        mip_level: u32,
        array_layer: u32,
    ) -> Result<vk::ImageView, GraphicsError> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(convert_pixel_format(format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(format),
                base_mip_level: mip_level,
                level_count: 1,
                base_array_layer: array_layer,
                layer_count: 1,
            });
        self.call("vkCreateImageView", |driver| driver.create_image_view(&info))
    }

    fn create_render_pass(
        &self,
        color_formats: &[PixelFormat],
        depth_format: Option<PixelFormat>,
    ) -> Result<vk::RenderPass, GraphicsError> {
        let colors: Vec<vk::Format> = color_formats.iter().copied().map(convert_pixel_format).collect();
        let depth = depth_format.map(convert_pixel_format);
        self.call("vkCreateRenderPass", |driver| driver.create_render_pass(&colors, depth))
    }

    pub(crate) fn features(&self) -> DeviceFeatures {
        self.features
    }

    pub(crate) fn create_buffer(
        self: &Arc<Self>,
        descriptor: &BufferDescriptor,
    ) -> Result<GpuBuffer, GraphicsError> {
        let host_visible = descriptor.usage.contains(BufferUsage::DYNAMIC);
        let properties = if host_visible {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };
        let info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(convert_buffer_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = self.call("vkCreateBuffer", |driver| driver.create_buffer(&info, properties))?;
        log::trace!(
            "VulkanShared: created buffer {buffer:?} {:?}, size={}",
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::Vulkan(Arc::new(VulkanBuffer {
            shared: Arc::clone(self),
            buffer,
            size: descriptor.size,
        })))
    }

    pub(crate) fn create_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
        kind: TextureKind,
    ) -> Result<GpuTexture, GraphicsError> {
        let format = self.check_format(descriptor.format, descriptor.usage)?;
        let (layers, flags, view_type) = match kind {
            TextureKind::Texture2D if descriptor.array_layers > 1 => (
                descriptor.array_layers,
                vk::ImageCreateFlags::empty(),
                vk::ImageViewType::TYPE_2D_ARRAY,
            ),
            TextureKind::Texture2D => (1, vk::ImageCreateFlags::empty(), vk::ImageViewType::TYPE_2D),
            TextureKind::Cube => (
                descriptor.array_layers * 6,
                vk::ImageCreateFlags::CUBE_COMPATIBLE,
                if descriptor.array_layers > 1 {
                    vk::ImageViewType::CUBE_ARRAY
                } else {
                    vk::ImageViewType::CUBE
                },
            ),
        };
        let info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: descriptor.width,
                height: descriptor.height,
                depth: 1,
            })
            .mip_levels(descriptor.mip_levels)
            .array_layers(layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(descriptor.usage))
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = self.call("vkCreateImage", |driver| driver.create_image(&info))?;

        // From here on, dropping `texture` releases whatever was created.
        let mut texture = VulkanTexture {
            shared: Arc::clone(self),
            image,
            view: vk::ImageView::null(),
            format: descriptor.format,
        };
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(descriptor.format),
                base_mip_level: 0,
                level_count: descriptor.mip_levels,
                base_array_layer: 0,
                layer_count: layers,
            });
        texture.view = self.call("vkCreateImageView", |driver| driver.create_image_view(&view_info))?;
        log::trace!(
            "VulkanShared: created {kind:?} texture {image:?} {:?}, {}x{}",
            descriptor.label,
            descriptor.width,
            descriptor.height
        );
        Ok(GpuTexture::Vulkan(Arc::new(texture)))
    }

    pub(crate) fn create_sampler(
        self: &Arc<Self>,
        descriptor: &SamplerDescriptor,
    ) -> Result<GpuSampler, GraphicsError> {
        let anisotropy = descriptor.is_anisotropic();
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(convert_filter_mode(descriptor.mag_filter))
            .min_filter(convert_filter_mode(descriptor.min_filter))
            .mipmap_mode(convert_mipmap_filter_mode(descriptor.mipmap_filter))
            .address_mode_u(convert_address_mode(descriptor.address_mode_u))
            .address_mode_v(convert_address_mode(descriptor.address_mode_v))
            .address_mode_w(convert_address_mode(descriptor.address_mode_w))
            .anisotropy_enable(anisotropy)
            .max_anisotropy(descriptor.max_anisotropy.max(1) as f32)
            .compare_enable(descriptor.compare.is_some())
            .compare_op(descriptor.compare.map_or(vk::CompareOp::NEVER, convert_compare_function))
            .min_lod(descriptor.lod_min_clamp)
            .max_lod(descriptor.lod_max_clamp);
        let sampler = self.call("vkCreateSampler", |driver| driver.create_sampler(&info))?;
        Ok(GpuSampler::Vulkan(Arc::new(VulkanSampler {
            shared: Arc::clone(self),
            sampler,
        })))
    }

    pub(crate) fn create_shader(
        self: &Arc<Self>,
        descriptor: &ShaderDescriptor,
    ) -> Result<GpuShader, GraphicsError> {
        let code = ash::util::read_spv(&mut Cursor::new(&descriptor.bytecode)).map_err(|_| {
            GraphicsError::invalid("Vulkan shader bytecode must be a whole number of SPIR-V words")
        })?;
        if code.first() != Some(&driver::SPIRV_MAGIC) {
            return Err(GraphicsError::invalid(
                "Vulkan shader bytecode does not start with the SPIR-V magic number",
            ));
        }
        let module = self.call("vkCreateShaderModule", |driver| driver.create_shader_module(&code))?;
        Ok(GpuShader::Vulkan(Arc::new(VulkanShader {
            shared: Arc::clone(self),
            module,
            stage: descriptor.stage,
        })))
    }

    pub(crate) fn create_resource_layout(
        self: &Arc<Self>,
        descriptor: &ResourceLayoutDescriptor,
    ) -> Result<GpuResourceLayout, GraphicsError> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding<'_>> = descriptor
            .elements
            .iter()
            .enumerate()
            .map(|(index, element)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(index as u32)
                    .descriptor_type(convert_resource_kind(element.kind))
                    .descriptor_count(1)
                    .stage_flags(convert_shader_stages(element.stages))
            })
            .collect();
        let layout = self.call("vkCreateDescriptorSetLayout", |driver| {
            driver.create_descriptor_set_layout(&bindings)
        })?;
        Ok(GpuResourceLayout::Vulkan(Arc::new(VulkanResourceLayout {
            shared: Arc::clone(self),
            layout,
        })))
    }

    /// Allocates a descriptor set and writes every element into it.
    pub(crate) fn create_resource_set(
        self: &Arc<Self>,
        layout: &ResourceLayout,
        resources: &[BindingResource],
    ) -> Result<GpuResourceSet, GraphicsError> {
        let native = layout.native()?;
        let layout = Arc::clone(native.vulkan()?);
        let set = self.call("vkAllocateDescriptorSets", |driver| {
            driver.allocate_descriptor_set(layout.layout)
        })?;
        let resource_set = VulkanResourceSet {
            shared: Arc::clone(self),
            set,
            _layout: layout,
        };

        for (binding, resource) in resources.iter().enumerate() {
            let write = match resource {
                BindingResource::UniformBuffer(buffer) => {
                    let native = buffer.native()?;
                    DescriptorResource::UniformBuffer(native.vulkan()?.buffer)
                }
                BindingResource::Texture(texture) => {
                    let native = texture.native()?;
                    DescriptorResource::SampledImage(native.vulkan()?.view)
                }
                BindingResource::Sampler(sampler) => {
                    let native = sampler.native()?;
                    DescriptorResource::Sampler(native.vulkan()?.sampler)
                }
            };
            self.call("vkUpdateDescriptorSets", |driver| {
                driver.update_descriptor_set(set, binding as u32, write)
            })?;
        }
        Ok(GpuResourceSet::Vulkan(Arc::new(resource_set)))
    }

    pub(crate) fn create_pipeline(
        self: &Arc<Self>,
        descriptor: &PipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError> {
        let mut stages = Vec::with_capacity(descriptor.shader_set.shaders.len());
        for shader in &descriptor.shader_set.shaders {
            let native = shader.native()?;
            let shader = native.vulkan()?;
            stages.push((convert_shader_stage(shader.stage), shader.module));
        }
        let mut set_layouts = Vec::with_capacity(descriptor.resource_layouts.len());
        for layout in &descriptor.resource_layouts {
            let native = layout.native()?;
            set_layouts.push(Arc::clone(native.vulkan()?));
        }

        let mut bindings = Vec::new();
        let mut attributes = Vec::new();
        for (slot, layout) in descriptor.shader_set.vertex_layouts.iter().enumerate() {
            bindings.push(vk::VertexInputBindingDescription {
                binding: slot as u32,
                stride: layout.stride,
                input_rate: if layout.instance_step_rate > 0 {
                    vk::VertexInputRate::INSTANCE
                } else {
                    vk::VertexInputRate::VERTEX
                },
            });
            for (element, offset) in layout.elements.iter().zip(layout.offsets()) {
                attributes.push(vk::VertexInputAttributeDescription {
                    location: attributes.len() as u32,
                    binding: slot as u32,
                    format: convert_vertex_format(element.format),
                    offset,
                });
            }
        }

        let color_blend = descriptor
            .blend_state
            .attachments
            .iter()
            .map(|attachment| vk::PipelineColorBlendAttachmentState {
                blend_enable: attachment.enabled.into(),
                src_color_blend_factor: convert_blend_factor(attachment.source_color),
                dst_color_blend_factor: convert_blend_factor(attachment.destination_color),
                color_blend_op: convert_blend_function(attachment.color_function),
                src_alpha_blend_factor: convert_blend_factor(attachment.source_alpha),
                dst_alpha_blend_factor: convert_blend_factor(attachment.destination_alpha),
                alpha_blend_op: convert_blend_function(attachment.alpha_function),
                color_write_mask: vk::ColorComponentFlags::RGBA,
            })
            .collect();
        let depth = &descriptor.depth_stencil_state;
        let raster = &descriptor.rasterizer_state;

        let mut pipeline = VulkanPipeline {
            shared: Arc::clone(self),
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            set_layouts,
        };
        let raw_layouts: Vec<vk::DescriptorSetLayout> =
            pipeline.set_layouts.iter().map(|layout| layout.layout).collect();
        pipeline.layout = self.call("vkCreatePipelineLayout", |driver| {
            driver.create_pipeline_layout(&raw_layouts)
        })?;
        pipeline.render_pass = self.create_render_pass(
            &descriptor.outputs.color_formats,
            descriptor.outputs.depth_format,
        )?;

        let desc = GraphicsPipelineDesc {
            layout: pipeline.layout,
            render_pass: pipeline.render_pass,
            stages,
            topology: convert_topology(descriptor.primitive_topology),
            bindings,
            attributes,
            color_blend,
            blend_constants: descriptor.blend_state.blend_factor.to_array(),
            depth_stencil: vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(depth.depth_test_enabled)
                .depth_write_enable(depth.depth_write_enabled)
                .depth_compare_op(convert_compare_function(depth.comparison)),
            rasterization: vk::PipelineRasterizationStateCreateInfo::default()
                .polygon_mode(convert_fill_mode(raster.fill_mode))
                .cull_mode(convert_cull_mode(raster.cull_mode))
                .front_face(convert_front_face(raster.front_face))
                .depth_clamp_enable(!raster.depth_clip_enabled)
                .line_width(1.0),
        };
        pipeline.pipeline = self.call("vkCreateGraphicsPipelines", |driver| {
            driver.create_graphics_pipeline(&desc)
        })?;
        log::trace!(
            "VulkanShared: created pipeline {:?} {:?}",
            pipeline.pipeline,
            descriptor.label
        );
        Ok(GpuPipeline::Vulkan(Arc::new(pipeline)))
    }

    pub(crate) fn create_framebuffer(
        self: &Arc<Self>,
        descriptor: &FramebufferDescriptor,
    ) -> Result<GpuFramebuffer, GraphicsError> {
        let mut targets = Vec::new();
        for target in descriptor.color_targets.iter().chain(&descriptor.depth_target) {
            let native = target.texture.native()?;
            targets.push((Arc::clone(native.vulkan()?), target.mip_level, target.array_layer));
        }
        let (width, height) = descriptor
            .color_targets
            .first()
            .or(descriptor.depth_target.as_ref())
            .map(|target| target.extent())
            .ok_or_else(|| GraphicsError::invalid("framebuffer has no attachments"))?;
        let outputs = descriptor.outputs();

        let mut framebuffer = VulkanFramebuffer {
            shared: Arc::clone(self),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            views: Vec::with_capacity(targets.len()),
            depth_image: None,
            extent: vk::Extent2D { width, height },
            color_count: outputs.color_formats.len(),
            _targets: Vec::new(),
        };
        for (texture, mip_level, array_layer) in &targets {
            let view = self.create_view(texture.image, texture.format, *mip_level, *array_layer)?;
            framebuffer.views.push(view);
        }
        framebuffer.render_pass =
            self.create_render_pass(&outputs.color_formats, outputs.depth_format)?;
        let handle = self.call("vkCreateFramebuffer", |driver| {
            driver.create_framebuffer(framebuffer.render_pass, &framebuffer.views, framebuffer.extent)
        })?;
        framebuffer.framebuffers.push(handle);
        framebuffer._targets = targets.into_iter().map(|(texture, _, _)| texture).collect();
        Ok(GpuFramebuffer::Vulkan(Arc::new(framebuffer)))
    }

    pub(crate) fn create_command_list(self: &Arc<Self>) -> Result<GpuCommandList, GraphicsError> {
        Ok(GpuCommandList::Vulkan(VulkanCommandList::new(Arc::clone(self))?))
    }
}

impl Drop for VulkanShared {
    fn drop(&mut self) {
        self.wait_idle();
        for resource in self.deferred.drain_all() {
            resource.destroy(&self.driver);
        }
    }
}

// ============================================================================
// Native objects
// ============================================================================

macro_rules! release_on_drop {
    ($name:ident, |$this:ident| $resource:expr) => {
        impl Drop for $name {
            fn drop(&mut self) {
                let $this = &mut *self;
                let resource = $resource;
                $this.shared.release(resource);
            }
        }
    };
}

pub(crate) struct VulkanBuffer {
    shared: Arc<VulkanShared>,
    buffer: vk::Buffer,
    size: u64,
}

release_on_drop!(VulkanBuffer, |this| DeferredResource::Buffer(this.buffer));

pub(crate) struct VulkanTexture {
    shared: Arc<VulkanShared>,
    image: vk::Image,
    /// View over every mip level and layer, used for sampling.
    view: vk::ImageView,
    format: PixelFormat,
}

release_on_drop!(VulkanTexture, |this| DeferredResource::Texture {
    image: this.image,
    view: this.view,
});

pub(crate) struct VulkanSampler {
    shared: Arc<VulkanShared>,
    sampler: vk::Sampler,
}

release_on_drop!(VulkanSampler, |this| DeferredResource::Sampler(this.sampler));

pub(crate) struct VulkanShader {
    shared: Arc<VulkanShared>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

release_on_drop!(VulkanShader, |this| DeferredResource::ShaderModule(this.module));

pub(crate) struct VulkanResourceLayout {
    shared: Arc<VulkanShared>,
    layout: vk::DescriptorSetLayout,
}

release_on_drop!(VulkanResourceLayout, |this| {
    DeferredResource::DescriptorSetLayout(this.layout)
});

pub(crate) struct VulkanResourceSet {
    shared: Arc<VulkanShared>,
    set: vk::DescriptorSet,
    /// Keeps the set layout alive as long as the set.
    _layout: Arc<VulkanResourceLayout>,
}

release_on_drop!(VulkanResourceSet, |this| DeferredResource::DescriptorSet(this.set));

/// A graphics pipeline with the pipeline layout and the render pass it was
/// created against.
pub(crate) struct VulkanPipeline {
    shared: Arc<VulkanShared>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    set_layouts: Vec<Arc<VulkanResourceLayout>>,
}

release_on_drop!(VulkanPipeline, |this| DeferredResource::Pipeline {
    pipeline: this.pipeline,
    layout: this.layout,
    render_pass: this.render_pass,
});

/// One framebuffer per presentable image (a single one when offscreen), the
/// render pass they share and the views they own.
pub(crate) struct VulkanFramebuffer {
    shared: Arc<VulkanShared>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    views: Vec<vk::ImageView>,
    /// Depth image owned by a swapchain framebuffer.
    depth_image: Option<vk::Image>,
    extent: vk::Extent2D,
    color_count: usize,
    /// Attachment textures of an offscreen framebuffer.
    _targets: Vec<Arc<VulkanTexture>>,
}

impl VulkanFramebuffer {
    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers
            .get(image_index as usize)
            .or_else(|| self.framebuffers.first())
            .copied()
            .unwrap_or_default()
    }

    fn has_depth(&self) -> bool {
        self.views.len() > self.color_count
    }
}

release_on_drop!(VulkanFramebuffer, |this| DeferredResource::Framebuffer {
    framebuffers: std::mem::take(&mut this.framebuffers),
    render_pass: this.render_pass,
    views: std::mem::take(&mut this.views),
    depth_image: this.depth_image.take(),
});

// ============================================================================
// Device
// ============================================================================

struct Swapchain {
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    extent: vk::Extent2D,
    image_index: u32,
}

/// The Vulkan device with its queue worker and swapchain.
pub(crate) struct VulkanDevice {
    shared: Arc<VulkanShared>,
    swapchain: Mutex<Swapchain>,
    acquire_fence: vk::Fence,
    swapchain_format: PixelFormat,
    depth_format: Option<PixelFormat>,
}

impl VulkanDevice {
    pub(crate) fn new(options: &DeviceOptions) -> Result<Self, GraphicsError> {
        let physical = PhysicalDevice::probe(|name| options.is_masked(name));
        let required: [&'static CStr; 2] = [ash::khr::surface::NAME, ash::khr::swapchain::NAME];
        if let Some(missing) = required
            .iter()
            .find(|name| !physical.extensions.contains(name))
        {
            return Err(GraphicsError::MissingExtension(
                missing.to_string_lossy().into_owned(),
            ));
        }

        let debug_available = physical.extensions.contains(&ash::ext::debug_utils::NAME)
            && physical.layers.contains(&VALIDATION_LAYER);
        let debug = options.debug && debug_available;
        if options.debug && !debug {
            log::warn!("VulkanDevice: validation requested but not available");
        }
        let mut extensions = required.to_vec();
        let mut layers = Vec::new();
        if debug {
            extensions.push(ash::ext::debug_utils::NAME);
            layers.push(VALIDATION_LAYER);
        }

        let physical_features = physical.features;
        let messenger = debug.then(debug::messenger_create_info);
        let driver = VkDriver::new(physical, &extensions, &layers, messenger.as_ref())
            .map_err(|result| GraphicsError::InitializationFailed(format!("vkCreateDevice: {result:?}")))?;

        let features = DeviceFeatures {
            geometry_shader: physical_features.geometry_shader == vk::TRUE,
            tessellation_shaders: physical_features.tessellation_shader == vk::TRUE,
            texture_compression_bc: physical_features.texture_compression_bc == vk::TRUE,
            base_instance: true,
            debug_output: debug,
            sampler_anisotropy: physical_features.sampler_anisotropy == vk::TRUE,
        };
        log::debug!(
            "VulkanDevice: {} extensions enabled, {features:?}",
            extensions.len()
        );

        let shared = Arc::new(VulkanShared {
            driver,
            features,
            deferred: DeferredDestructor::new(),
            submitted_serial: AtomicU64::new(0),
            completed_serial: AtomicU64::new(0),
            in_flight: Mutex::new(VecDeque::new()),
        });
        let acquire_fence = shared.driver.create_fence(false);
        let swapchain = Self::create_swapchain(
            &shared,
            acquire_fence,
            options.swapchain_format,
            options.width,
            options.height,
        )?;
        Ok(Self {
            shared,
            swapchain: Mutex::new(swapchain),
            acquire_fence,
            swapchain_format: options.swapchain_format,
            depth_format: options.swapchain_depth_format,
        })
    }

    /// Create the swapchain and acquire its first image.
    fn create_swapchain(
        shared: &VulkanShared,
        acquire_fence: vk::Fence,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<Swapchain, GraphicsError> {
        let native = shared.check_format(format, TextureUsage::RENDER_TARGET)?;
        let extent = vk::Extent2D { width, height };
        let handle = shared.call("vkCreateSwapchainKHR", |driver| {
            driver.create_swapchain(native, extent, SWAPCHAIN_IMAGE_COUNT)
        })?;
        let mut swapchain = Swapchain {
            handle,
            images: shared.call("vkGetSwapchainImagesKHR", |driver| {
                driver.get_swapchain_images(handle)
            })?,
            extent,
            image_index: 0,
        };
        Self::acquire(shared, acquire_fence, &mut swapchain)?;
        log::debug!(
            "VulkanDevice: swapchain {width}x{height} with {} images",
            swapchain.images.len()
        );
        Ok(swapchain)
    }

    fn acquire(
        shared: &VulkanShared,
        fence: vk::Fence,
        swapchain: &mut Swapchain,
    ) -> Result<(), GraphicsError> {
        shared.call("vkResetFences", |driver| driver.reset_fence(fence))?;
        swapchain.image_index = shared.call("vkAcquireNextImageKHR", |driver| {
            driver.acquire_next_image(swapchain.handle, fence)
        })?;
        shared.call("vkWaitForFences", |driver| driver.wait_for_fence(fence))
    }

    pub(crate) fn shared(&self) -> &Arc<VulkanShared> {
        &self.shared
    }

    /// Framebuffers over every swapchain image plus a fresh depth image.
    pub(crate) fn create_swapchain_framebuffer(
        &self,
        width: u32,
        height: u32,
    ) -> Result<(GpuFramebuffer, u32), GraphicsError> {
        let shared = &self.shared;
        let (images, image_index) = {
            let swapchain = self.swapchain.lock();
            (swapchain.images.clone(), swapchain.image_index)
        };
        let extent = vk::Extent2D { width, height };
        let mut framebuffer = VulkanFramebuffer {
            shared: Arc::clone(shared),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::with_capacity(images.len()),
            views: Vec::with_capacity(images.len() + 1),
            depth_image: None,
            extent,
            color_count: 1,
            _targets: Vec::new(),
        };
        framebuffer.render_pass = shared.create_render_pass(&[self.swapchain_format], self.depth_format)?;

        let depth_view = match self.depth_format {
            Some(format) => {
                let native = shared.check_format(format, TextureUsage::DEPTH_STENCIL)?;
                let info = vk::ImageCreateInfo::default()
                    .image_type(vk::ImageType::TYPE_2D)
                    .format(native)
                    .extent(vk::Extent3D {
                        width,
                        height,
                        depth: 1,
                    })
                    .mip_levels(1)
                    .array_layers(1)
                    .usage(
                        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                            | vk::ImageUsageFlags::TRANSFER_SRC,
                    );
                let image = shared.call("vkCreateImage", |driver| driver.create_image(&info))?;
                framebuffer.depth_image = Some(image);
                Some(shared.create_view(image, format, 0, 0)?)
            }
            None => None,
        };

        let mut color_views = Vec::with_capacity(images.len());
        for image in &images {
            let view = shared.create_view(*image, self.swapchain_format, 0, 0)?;
            color_views.push(view);
            framebuffer.views.push(view);
        }
        framebuffer.views.extend(depth_view);
        for view in color_views {
            let attachments: Vec<vk::ImageView> = std::iter::once(view).chain(depth_view).collect();
            let handle = shared.call("vkCreateFramebuffer", |driver| {
                driver.create_framebuffer(framebuffer.render_pass, &attachments, extent)
            })?;
            framebuffer.framebuffers.push(handle);
        }
        log::debug!(
            "VulkanDevice: swapchain framebuffer {width}x{height} ({:?})",
            self.swapchain_format
        );
        Ok((GpuFramebuffer::Vulkan(Arc::new(framebuffer)), image_index))
    }

    pub(crate) fn execute_commands(&self, list: &mut VulkanCommandList) -> Result<(), GraphicsError> {
        list.submit()?;
        self.shared.maintain();
        Ok(())
    }

    /// Wait for the queue, present the current image and acquire the next.
    pub(crate) fn swap_buffers(&self) -> Result<u32, GraphicsError> {
        self.shared.wait_idle();
        let mut swapchain = self.swapchain.lock();
        let (handle, index) = (swapchain.handle, swapchain.image_index);
        self.shared.call("vkQueuePresentKHR", |driver| driver.queue_present(handle, index))?;
        Self::acquire(&self.shared, self.acquire_fence, &mut swapchain)?;
        Ok(swapchain.image_index)
    }

    pub(crate) fn wait_for_idle(&self) -> Result<(), GraphicsError> {
        self.shared.wait_idle();
        Ok(())
    }

    /// Nothing on the Vulkan device is thread-bound.
    pub(crate) fn check_resize(&self) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// Recreate the swapchain. The previous swapchain framebuffer must
    /// already be released. The old swapchain stays in place if creating the
    /// replacement fails.
    pub(crate) fn resize_swapchain(
        &self,
        width: u32,
        height: u32,
    ) -> Result<(GpuFramebuffer, u32), GraphicsError> {
        self.shared.wait_idle();
        {
            let mut swapchain = self.swapchain.lock();
            let replacement = Self::create_swapchain(
                &self.shared,
                self.acquire_fence,
                self.swapchain_format,
                width,
                height,
            )?;
            let previous = std::mem::replace(&mut *swapchain, replacement);
            self.shared.driver.destroy_swapchain(previous.handle);
        }
        self.create_swapchain_framebuffer(width, height)
    }

    pub(crate) fn read_buffer(&self, buffer: &Buffer) -> Result<Vec<u8>, GraphicsError> {
        let native = buffer.native()?;
        let handle = native.vulkan()?.buffer;
        self.shared.wait_idle();
        self.shared.call("vkMapMemory", |driver| driver.read_buffer(handle))
    }

    pub(crate) fn read_texture(
        &self,
        texture: &Texture,
        region: &TextureRegion,
    ) -> Result<Vec<u8>, GraphicsError> {
        let native = texture.native()?;
        let image = native.vulkan()?.image;
        self.shared.wait_idle();
        self.shared.call("vkCmdCopyImageToBuffer", |driver| {
            driver.read_image(
                image,
                region.mip_level,
                region.array_layer,
                region.x,
                region.y,
                region.width,
                region.height,
            )
        })
    }

    pub(crate) fn take_draw_calls(&self) -> Vec<DrawCall> {
        self.shared.driver.take_draws()
    }

    pub(crate) fn statistics(&self) -> DeviceStatistics {
        let counts = self.shared.driver.counts();
        let pending = self.shared.deferred.pending_count();
        self.shared
            .driver
            .with_log(|log| DeviceStatistics::from_driver(log, counts, pending))
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        self.shared.wait_idle();
        self.shared.driver.destroy_swapchain(self.swapchain.lock().handle);
        self.shared.driver.destroy_fence(self.acquire_fence);
        for resource in self.shared.deferred.drain_all() {
            resource.destroy(&self.shared.driver);
        }
        log::debug!("VulkanDevice: destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> VulkanDevice {
        VulkanDevice::new(&DeviceOptions::new(BackendType::Vulkan).with_size(4, 4)).unwrap()
    }

    #[test]
    fn test_masked_swapchain_extension_is_missing() {
        let options =
            DeviceOptions::new(BackendType::Vulkan).with_masked_extension("VK_KHR_swapchain");
        assert!(matches!(
            VulkanDevice::new(&options),
            Err(GraphicsError::MissingExtension(name)) if name == "VK_KHR_swapchain"
        ));
    }

    #[test]
    fn test_masked_bc_compression() {
        let options = DeviceOptions::new(BackendType::Vulkan)
            .with_masked_extension("textureCompressionBC");
        let device = VulkanDevice::new(&options).unwrap();
        assert!(!device.shared().features().texture_compression_bc);
        let descriptor = TextureDescriptor::new_2d(
            4,
            4,
            PixelFormat::Bc1RgbaUnorm,
            TextureUsage::SAMPLED,
        );
        assert!(matches!(
            device
                .shared()
                .create_texture(&descriptor, TextureKind::Texture2D),
            Err(GraphicsError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_shader_requires_spirv() {
        let device = device();
        let result = device.shared().create_shader(&ShaderDescriptor::new(
            ShaderStage::Vertex,
            b"void main() {}\n".to_vec(),
        ));
        assert!(matches!(result, Err(GraphicsError::InvalidDescriptor(_))));

        let mut spirv = driver::SPIRV_MAGIC.to_le_bytes().to_vec();
        spirv.extend_from_slice(&[0; 16]);
        assert!(
            device
                .shared()
                .create_shader(&ShaderDescriptor::new(ShaderStage::Vertex, spirv))
                .is_ok()
        );
    }

    #[test]
    fn test_release_is_deferred_while_in_flight() {
        let device = device();
        let shared = Arc::clone(device.shared());
        shared.submitted_serial.store(1, Ordering::Release);

        let buffer = shared.create_buffer(&BufferDescriptor::vertex(16)).unwrap();
        drop(buffer);
        assert_eq!(shared.deferred.pending_count(), 1);

        shared.completed_serial.store(1, Ordering::Release);
        shared.maintain();
        assert_eq!(shared.deferred.pending_count(), 0);
        assert_eq!(device.statistics().pending_destructions, 0);
    }

    #[test]
    fn test_swap_buffers_cycles_images() {
        let device = device();
        assert_eq!(device.swap_buffers().unwrap(), 1);
        assert_eq!(device.swap_buffers().unwrap(), 0);
        assert_eq!(device.statistics().presents, 2);
    }
}
