//! Headless Vulkan instance, device and queue.
//!
//! [`VkDriver`] is shaped like `ash::Device`: every call takes `&self`,
//! handles are `ash::vk` handle types and results are `VkResult`s. Commands
//! recorded into a command buffer are validated at record time the way the
//! validation layer does it; submitted command buffers are executed in order
//! by a dedicated queue thread that signals the submission's fence when done.
//! Validation failures are reported through the debug messenger, if one is
//! installed, and returned as `ERROR_VALIDATION_FAILED_EXT`.

use std::ffi::CStr;
use std::sync::Arc;
use std::thread::JoinHandle;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::driver::{
    BufferMemory, DrawCall, DriverLog, ImageMemory, ObjectCounts, ObjectTable, encode_clear_color,
    encode_clear_depth,
};
use crate::types::{PixelFormat, PrimitiveTopology, RgbaFloat, mip_extent};

use super::conversion::{pixel_format_from_vk, topology_from_vk};
use super::debug::DebugMessenger;
use super::sync::FenceTable;

pub(super) const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Extensions the loader and device report before masking.
const EXTENSIONS: [&CStr; 3] = [
    ash::khr::surface::NAME,
    ash::khr::swapchain::NAME,
    ash::ext::debug_utils::NAME,
];

pub(super) const SPIRV_MAGIC: u32 = 0x0723_0203;

/// `maxVertexInputBindings`.
pub(super) const MAX_VERTEX_BINDINGS: u32 = 16;

const MAX_BUFFER_BYTES: u64 = 1 << 30;

// ============================================================================
// Physical device
// ============================================================================

/// What the loader and the physical device expose.
#[derive(Debug, Clone)]
pub(super) struct PhysicalDevice {
    pub extensions: Vec<&'static CStr>,
    pub layers: Vec<&'static CStr>,
    pub features: vk::PhysicalDeviceFeatures,
    unsupported_formats: Vec<vk::Format>,
}

impl PhysicalDevice {
    /// Enumerate extensions, layers and features, hiding every name for
    /// which `is_masked` returns true.
    pub fn probe(is_masked: impl Fn(&str) -> bool) -> Self {
        let available = |name: &&CStr| !is_masked(&name.to_string_lossy());
        let feature = |name: &str| if is_masked(name) { vk::FALSE } else { vk::TRUE };

        let features = vk::PhysicalDeviceFeatures {
            geometry_shader: feature("geometryShader"),
            tessellation_shader: feature("tessellationShader"),
            texture_compression_bc: feature("textureCompressionBC"),
            sampler_anisotropy: feature("samplerAnisotropy"),
            depth_clamp: vk::TRUE,
            fill_mode_non_solid: vk::TRUE,
            ..Default::default()
        };
        let unsupported_formats = if features.texture_compression_bc == vk::TRUE {
            Vec::new()
        } else {
            vec![vk::Format::BC1_RGBA_UNORM_BLOCK, vk::Format::BC3_UNORM_BLOCK]
        };

        Self {
            extensions: EXTENSIONS.into_iter().filter(available).collect(),
            layers: [VALIDATION_LAYER].into_iter().filter(available).collect(),
            features,
            unsupported_formats,
        }
    }

    /// `vkGetPhysicalDeviceFormatProperties`.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        let Some(pixel) = pixel_format_from_vk(format) else {
            return vk::FormatProperties::default();
        };
        if self.unsupported_formats.contains(&format) {
            return vk::FormatProperties::default();
        }
        let mut features = vk::FormatFeatureFlags::TRANSFER_SRC
            | vk::FormatFeatureFlags::TRANSFER_DST
            | vk::FormatFeatureFlags::SAMPLED_IMAGE;
        if pixel.is_depth_stencil() {
            features |= vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        } else if !pixel.is_compressed() {
            features |= vk::FormatFeatureFlags::COLOR_ATTACHMENT;
        }
        vk::FormatProperties {
            optimal_tiling_features: features,
            ..Default::default()
        }
    }
}

// ============================================================================
// Objects
// ============================================================================

#[derive(Debug)]
struct BufferObject {
    usage: vk::BufferUsageFlags,
    host_visible: bool,
    memory: BufferMemory,
}

#[derive(Debug)]
struct ImageObject {
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    cube_compatible: bool,
    swapchain: bool,
    memory: ImageMemory,
}

#[derive(Debug, Clone, Copy)]
struct ImageViewObject {
    image: vk::Image,
    format: vk::Format,
    base_mip: u32,
    base_layer: u32,
}

/// A resource written into a descriptor set binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DescriptorResource {
    UniformBuffer(vk::Buffer),
    SampledImage(vk::ImageView),
    Sampler(vk::Sampler),
}

impl DescriptorResource {
    fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer(_) => vk::DescriptorType::UNIFORM_BUFFER,
            Self::SampledImage(_) => vk::DescriptorType::SAMPLED_IMAGE,
            Self::Sampler(_) => vk::DescriptorType::SAMPLER,
        }
    }
}

#[derive(Debug)]
struct DescriptorSetObject {
    layout: vk::DescriptorSetLayout,
    writes: Vec<Option<DescriptorResource>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RenderPassObject {
    color_formats: Vec<vk::Format>,
    depth_format: Option<vk::Format>,
}

#[derive(Debug)]
struct FramebufferObject {
    render_pass: vk::RenderPass,
    attachments: Vec<vk::ImageView>,
    extent: vk::Extent2D,
}

#[derive(Debug)]
struct PipelineObject {
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    topology: vk::PrimitiveTopology,
}

/// Everything `vkCreateGraphicsPipelines` needs, flattened.
#[derive(Debug, Clone, Default)]
pub(super) struct GraphicsPipelineDesc {
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    pub topology: vk::PrimitiveTopology,
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    pub color_blend: Vec<vk::PipelineColorBlendAttachmentState>,
    pub blend_constants: [f32; 4],
    pub depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    pub rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
}

#[derive(Debug)]
struct CommandPoolObject {
    flags: vk::CommandPoolCreateFlags,
    buffers: Vec<vk::CommandBuffer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
}

/// Bindings tracked while recording, for record-time validation.
#[derive(Debug, Clone, Copy, Default)]
struct Tracking {
    render_pass: Option<vk::RenderPass>,
    pipeline: Option<vk::Pipeline>,
    index_buffer: bool,
}

#[derive(Debug)]
struct CommandBufferObject {
    pool: vk::CommandPool,
    state: CommandBufferState,
    tracking: Tracking,
    commands: Vec<VkCommand>,
}

#[derive(Debug)]
struct SwapchainObject {
    images: Vec<vk::Image>,
    acquired: Option<u32>,
    next: u32,
}

/// One `vkCmd*` call.
#[derive(Debug, Clone, Copy)]
pub(super) enum VkCommand {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
    },
    EndRenderPass,
    BindPipeline(vk::Pipeline),
    SetViewport(vk::Viewport),
    SetScissor(vk::Rect2D),
    BindVertexBuffer {
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    BindDescriptorSet {
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        region: vk::BufferCopy,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        region: vk::BufferImageCopy,
    },
    ClearColorAttachment {
        attachment: u32,
        color: [f32; 4],
    },
    ClearDepthStencilAttachment {
        depth: f32,
        stencil: u32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
}

impl VkCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::BeginRenderPass { .. } => "vkCmdBeginRenderPass",
            Self::EndRenderPass => "vkCmdEndRenderPass",
            Self::BindPipeline(_) => "vkCmdBindPipeline",
            Self::SetViewport(_) => "vkCmdSetViewport",
            Self::SetScissor(_) => "vkCmdSetScissor",
            Self::BindVertexBuffer { .. } => "vkCmdBindVertexBuffers",
            Self::BindIndexBuffer { .. } => "vkCmdBindIndexBuffer",
            Self::BindDescriptorSet { .. } => "vkCmdBindDescriptorSets",
            Self::CopyBuffer { .. } => "vkCmdCopyBuffer",
            Self::CopyBufferToImage { .. } => "vkCmdCopyBufferToImage",
            Self::ClearColorAttachment { .. } | Self::ClearDepthStencilAttachment { .. } => {
                "vkCmdClearAttachments"
            }
            Self::Draw { .. } => "vkCmdDraw",
            Self::DrawIndexed { .. } => "vkCmdDrawIndexed",
        }
    }
}

/// A failed call: the result code plus the validation message.
#[derive(Debug)]
struct Failure {
    result: vk::Result,
    message: String,
}

impl Failure {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            result: vk::Result::ERROR_VALIDATION_FAILED_EXT,
            message: message.into(),
        }
    }

    fn with(result: vk::Result, message: impl Into<String>) -> Self {
        Self {
            result,
            message: message.into(),
        }
    }

    fn unknown(kind: &str, handle: u64) -> Self {
        Self::invalid(format!("invalid {kind} handle 0x{handle:x}"))
    }
}

type Checked<T> = Result<T, Failure>;

fn index_size(index_type: vk::IndexType) -> u64 {
    if index_type == vk::IndexType::UINT16 { 2 } else { 4 }
}

// ============================================================================
// Device state
// ============================================================================

#[derive(Debug, Default)]
struct DeviceState {
    buffers: ObjectTable<BufferObject>,
    images: ObjectTable<ImageObject>,
    image_views: ObjectTable<ImageViewObject>,
    samplers: ObjectTable<()>,
    shader_modules: ObjectTable<()>,
    descriptor_set_layouts: ObjectTable<Vec<vk::DescriptorType>>,
    descriptor_sets: ObjectTable<DescriptorSetObject>,
    pipeline_layouts: ObjectTable<Vec<vk::DescriptorSetLayout>>,
    render_passes: ObjectTable<RenderPassObject>,
    framebuffers: ObjectTable<FramebufferObject>,
    pipelines: ObjectTable<PipelineObject>,
    command_pools: ObjectTable<CommandPoolObject>,
    command_buffers: ObjectTable<CommandBufferObject>,
    swapchains: ObjectTable<SwapchainObject>,
    log: DriverLog,
}

impl DeviceState {
    fn counts(&self) -> ObjectCounts {
        [
            self.buffers.counts(),
            self.images.counts(),
            self.image_views.counts(),
            self.samplers.counts(),
            self.shader_modules.counts(),
            self.descriptor_set_layouts.counts(),
            self.descriptor_sets.counts(),
            self.pipeline_layouts.counts(),
            self.render_passes.counts(),
            self.framebuffers.counts(),
            self.pipelines.counts(),
            self.command_pools.counts(),
            self.command_buffers.counts(),
            self.swapchains.counts(),
        ]
        .into_iter()
        .sum()
    }

    fn buffer(&self, buffer: vk::Buffer) -> Checked<&BufferObject> {
        self.buffers
            .get(buffer.as_raw())
            .ok_or_else(|| Failure::unknown("VkBuffer", buffer.as_raw()))
    }

    fn image(&self, image: vk::Image) -> Checked<&ImageObject> {
        self.images
            .get(image.as_raw())
            .ok_or_else(|| Failure::unknown("VkImage", image.as_raw()))
    }

    fn image_view(&self, view: vk::ImageView) -> Checked<ImageViewObject> {
        self.image_views
            .get(view.as_raw())
            .copied()
            .ok_or_else(|| Failure::unknown("VkImageView", view.as_raw()))
    }

    fn render_pass(&self, render_pass: vk::RenderPass) -> Checked<&RenderPassObject> {
        self.render_passes
            .get(render_pass.as_raw())
            .ok_or_else(|| Failure::unknown("VkRenderPass", render_pass.as_raw()))
    }

    fn framebuffer(&self, framebuffer: vk::Framebuffer) -> Checked<&FramebufferObject> {
        self.framebuffers
            .get(framebuffer.as_raw())
            .ok_or_else(|| Failure::unknown("VkFramebuffer", framebuffer.as_raw()))
    }

    fn pipeline(&self, pipeline: vk::Pipeline) -> Checked<&PipelineObject> {
        self.pipelines
            .get(pipeline.as_raw())
            .ok_or_else(|| Failure::unknown("VkPipeline", pipeline.as_raw()))
    }

    /// Render passes are compatible when their attachment formats match.
    fn compatible(&self, a: vk::RenderPass, b: vk::RenderPass) -> Checked<bool> {
        Ok(a == b || self.render_pass(a)? == self.render_pass(b)?)
    }

    fn check_image_rect(
        &self,
        image: &ImageObject,
        mip: u32,
        layer: u32,
        offset: vk::Offset3D,
        extent: vk::Extent3D,
    ) -> Checked<()> {
        let memory = &image.memory;
        if mip >= memory.mip_levels() || layer >= memory.array_layers() {
            return Err(Failure::invalid(format!(
                "subresource (mip {mip}, layer {layer}) outside the image"
            )));
        }
        let (width, height) = memory.extent();
        let (mip_width, mip_height) = mip_extent(width, height, mip);
        let fits = offset.x >= 0
            && offset.y >= 0
            && offset.x as u64 + extent.width as u64 <= mip_width as u64
            && offset.y as u64 + extent.height as u64 <= mip_height as u64;
        if !fits {
            return Err(Failure::invalid(format!(
                "region {}x{} at ({}, {}) exceeds the {mip_width}x{mip_height} subresource",
                extent.width, extent.height, offset.x, offset.y
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Record-time validation
    // ------------------------------------------------------------------------

    fn record(&mut self, command_buffer: vk::CommandBuffer, command: VkCommand) -> Checked<()> {
        let object = self
            .command_buffers
            .get(command_buffer.as_raw())
            .ok_or_else(|| Failure::unknown("VkCommandBuffer", command_buffer.as_raw()))?;
        if object.state != CommandBufferState::Recording {
            return Err(Failure::invalid(format!(
                "{}: command buffer is not in the recording state",
                command.name()
            )));
        }
        let mut tracking = object.tracking;
        self.validate(&mut tracking, &command)
            .map_err(|failure| Failure {
                message: format!("{}: {}", command.name(), failure.message),
                ..failure
            })?;

        if let Some(object) = self.command_buffers.get_mut(command_buffer.as_raw()) {
            object.tracking = tracking;
            object.commands.push(command);
        }
        Ok(())
    }

    fn validate(&self, tracking: &mut Tracking, command: &VkCommand) -> Checked<()> {
        let inside = tracking.render_pass.is_some();
        match *command {
            VkCommand::BeginRenderPass {
                render_pass,
                framebuffer,
                render_area,
            } => {
                if inside {
                    return Err(Failure::invalid("a render pass is already active"));
                }
                let target = self.framebuffer(framebuffer)?;
                if !self.compatible(render_pass, target.render_pass)? {
                    return Err(Failure::invalid(
                        "framebuffer is not compatible with the render pass",
                    ));
                }
                let right = render_area.offset.x as i64 + render_area.extent.width as i64;
                let bottom = render_area.offset.y as i64 + render_area.extent.height as i64;
                if render_area.offset.x < 0
                    || render_area.offset.y < 0
                    || right > target.extent.width as i64
                    || bottom > target.extent.height as i64
                {
                    return Err(Failure::invalid("render area exceeds the framebuffer"));
                }
                tracking.render_pass = Some(render_pass);
            }
            VkCommand::EndRenderPass => {
                if !inside {
                    return Err(Failure::invalid("no render pass is active"));
                }
                tracking.render_pass = None;
            }
            VkCommand::BindPipeline(pipeline) => {
                let object = self.pipeline(pipeline)?;
                if !self.pipeline_layouts.contains(object.layout.as_raw()) {
                    return Err(Failure::invalid("pipeline layout was destroyed"));
                }
                if let Some(active) = tracking.render_pass
                    && !self.compatible(active, object.render_pass)?
                {
                    return Err(Failure::invalid(
                        "pipeline is not compatible with the active render pass",
                    ));
                }
                tracking.pipeline = Some(pipeline);
            }
            VkCommand::SetViewport(viewport) => {
                if viewport.width <= 0.0 || viewport.height == 0.0 {
                    return Err(Failure::invalid("viewport has an empty extent"));
                }
                let depth_range = 0.0..=1.0;
                if !depth_range.contains(&viewport.min_depth)
                    || !depth_range.contains(&viewport.max_depth)
                {
                    return Err(Failure::invalid("viewport depth outside [0, 1]"));
                }
            }
            VkCommand::SetScissor(rect) => {
                if rect.offset.x < 0 || rect.offset.y < 0 {
                    return Err(Failure::invalid("scissor offset is negative"));
                }
            }
            VkCommand::BindVertexBuffer {
                binding,
                buffer,
                offset,
            } => {
                if binding >= MAX_VERTEX_BINDINGS {
                    return Err(Failure::invalid(format!(
                        "binding {binding} exceeds maxVertexInputBindings"
                    )));
                }
                let object = self.buffer(buffer)?;
                if !object.usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER) {
                    return Err(Failure::invalid("buffer lacks VERTEX_BUFFER usage"));
                }
                if offset >= object.memory.size() {
                    return Err(Failure::invalid("offset is past the end of the buffer"));
                }
            }
            VkCommand::BindIndexBuffer {
                buffer,
                offset,
                index_type,
            } => {
                let object = self.buffer(buffer)?;
                if !object.usage.contains(vk::BufferUsageFlags::INDEX_BUFFER) {
                    return Err(Failure::invalid("buffer lacks INDEX_BUFFER usage"));
                }
                if offset % index_size(index_type) != 0 || offset >= object.memory.size() {
                    return Err(Failure::invalid("index buffer offset is invalid"));
                }
                tracking.index_buffer = true;
            }
            VkCommand::BindDescriptorSet {
                layout,
                set_index,
                set,
            } => {
                let set_layouts = self
                    .pipeline_layouts
                    .get(layout.as_raw())
                    .ok_or_else(|| Failure::unknown("VkPipelineLayout", layout.as_raw()))?;
                let expected = set_layouts.get(set_index as usize).ok_or_else(|| {
                    Failure::invalid(format!("pipeline layout has no set {set_index}"))
                })?;
                let object = self
                    .descriptor_sets
                    .get(set.as_raw())
                    .ok_or_else(|| Failure::unknown("VkDescriptorSet", set.as_raw()))?;
                let expected_types = self.descriptor_set_layouts.get(expected.as_raw());
                let found_types = self.descriptor_set_layouts.get(object.layout.as_raw());
                if expected_types.is_none() || expected_types != found_types {
                    return Err(Failure::invalid(format!(
                        "descriptor set is incompatible with set {set_index} of the layout"
                    )));
                }
                for (binding, write) in object.writes.iter().enumerate() {
                    let alive = match write {
                        None => {
                            return Err(Failure::invalid(format!(
                                "descriptor set binding {binding} was never written"
                            )));
                        }
                        Some(DescriptorResource::UniformBuffer(buffer)) => {
                            self.buffers.contains(buffer.as_raw())
                        }
                        Some(DescriptorResource::SampledImage(view)) => {
                            self.image_views.contains(view.as_raw())
                        }
                        Some(DescriptorResource::Sampler(sampler)) => {
                            self.samplers.contains(sampler.as_raw())
                        }
                    };
                    if !alive {
                        return Err(Failure::invalid(format!(
                            "descriptor set binding {binding} refers to a destroyed object"
                        )));
                    }
                }
            }
            VkCommand::CopyBuffer { src, dst, region } => {
                if inside {
                    return Err(Failure::invalid("transfers are not allowed in a render pass"));
                }
                let source = self.buffer(src)?;
                let target = self.buffer(dst)?;
                if !source.usage.contains(vk::BufferUsageFlags::TRANSFER_SRC)
                    || !target.usage.contains(vk::BufferUsageFlags::TRANSFER_DST)
                {
                    return Err(Failure::invalid("buffers lack transfer usage"));
                }
                if source.memory.read(region.src_offset, region.size).is_err()
                    || region.dst_offset.saturating_add(region.size) > target.memory.size()
                {
                    return Err(Failure::invalid("copy region exceeds a buffer"));
                }
            }
            VkCommand::CopyBufferToImage { src, dst, region } => {
                if inside {
                    return Err(Failure::invalid("transfers are not allowed in a render pass"));
                }
                let source = self.buffer(src)?;
                let target = self.image(dst)?;
                if !target.usage.contains(vk::ImageUsageFlags::TRANSFER_DST) {
                    return Err(Failure::invalid("image lacks TRANSFER_DST usage"));
                }
                let subresource = region.image_subresource;
                self.check_image_rect(
                    target,
                    subresource.mip_level,
                    subresource.base_array_layer,
                    region.image_offset,
                    region.image_extent,
                )?;
                let size = target
                    .memory
                    .format()
                    .region_size(region.image_extent.width, region.image_extent.height);
                if source.memory.read(region.buffer_offset, size).is_err() {
                    return Err(Failure::invalid("copy reads past the end of the buffer"));
                }
            }
            VkCommand::ClearColorAttachment { attachment, .. } => {
                let active = tracking
                    .render_pass
                    .ok_or_else(|| Failure::invalid("no render pass is active"))?;
                if attachment as usize >= self.render_pass(active)?.color_formats.len() {
                    return Err(Failure::invalid(format!(
                        "color attachment {attachment} does not exist"
                    )));
                }
            }
            VkCommand::ClearDepthStencilAttachment { .. } => {
                let active = tracking
                    .render_pass
                    .ok_or_else(|| Failure::invalid("no render pass is active"))?;
                if self.render_pass(active)?.depth_format.is_none() {
                    return Err(Failure::invalid("render pass has no depth attachment"));
                }
            }
            VkCommand::Draw { .. } | VkCommand::DrawIndexed { .. } => {
                if !inside {
                    return Err(Failure::invalid("no render pass is active"));
                }
                if tracking.pipeline.is_none() {
                    return Err(Failure::invalid("no pipeline is bound"));
                }
                if matches!(command, VkCommand::DrawIndexed { .. }) && !tracking.index_buffer {
                    return Err(Failure::invalid("no index buffer is bound"));
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queue execution
    // ------------------------------------------------------------------------

    fn execute(&mut self, command_buffer: vk::CommandBuffer) -> Checked<()> {
        let raw = command_buffer.as_raw();
        let commands = match self.command_buffers.get_mut(raw) {
            Some(object) => std::mem::take(&mut object.commands),
            None => return Err(Failure::unknown("VkCommandBuffer", raw)),
        };
        let result = self.run(&commands);
        if let Some(object) = self.command_buffers.get_mut(raw) {
            object.commands = commands;
            object.state = CommandBufferState::Executable;
        }
        result
    }

    fn run(&mut self, commands: &[VkCommand]) -> Checked<()> {
        let mut framebuffer = None;
        let mut topology = PrimitiveTopology::TriangleList;
        for command in commands {
            match *command {
                VkCommand::BeginRenderPass {
                    framebuffer: target,
                    ..
                } => framebuffer = Some(target),
                VkCommand::EndRenderPass => framebuffer = None,
                VkCommand::BindPipeline(pipeline) => {
                    topology = topology_from_vk(self.pipeline(pipeline)?.topology)
                        .unwrap_or_default();
                }
                VkCommand::CopyBuffer { src, dst, region } => {
                    let bytes = self
                        .buffer(src)?
                        .memory
                        .read(region.src_offset, region.size)
                        .map_err(|_| Failure::invalid("copy source out of range"))?
                        .to_vec();
                    self.buffers
                        .get_mut(dst.as_raw())
                        .ok_or_else(|| Failure::unknown("VkBuffer", dst.as_raw()))?
                        .memory
                        .write(region.dst_offset, &bytes)
                        .map_err(|_| Failure::invalid("copy destination out of range"))?;
                }
                VkCommand::CopyBufferToImage { src, dst, region } => {
                    self.copy_buffer_to_image(src, dst, &region)?;
                }
                VkCommand::ClearColorAttachment { attachment, color } => {
                    let view = self.attachment(framebuffer, attachment as usize)?;
                    self.clear_view(view, |format| {
                        encode_clear_color(format, RgbaFloat::from(color))
                    })?;
                }
                VkCommand::ClearDepthStencilAttachment { depth, stencil } => {
                    let target = framebuffer
                        .ok_or_else(|| Failure::invalid("clear outside a render pass"))?;
                    let last = self.framebuffer(target)?.attachments.len().saturating_sub(1);
                    let view = self.attachment(framebuffer, last)?;
                    self.clear_view(view, |format| {
                        encode_clear_depth(format, depth, stencil as u8)
                    })?;
                }
                VkCommand::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => {
                    let draw = DrawCall::non_indexed(
                        vertex_count,
                        instance_count,
                        first_vertex,
                        first_instance,
                    );
                    self.log.record_draw(draw.with_topology(topology));
                }
                VkCommand::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                } => {
                    let draw = DrawCall::indexed(
                        index_count,
                        instance_count,
                        first_index,
                        vertex_offset,
                        first_instance,
                    );
                    self.log.record_draw(draw.with_topology(topology));
                }
                VkCommand::SetViewport(_)
                | VkCommand::SetScissor(_)
                | VkCommand::BindVertexBuffer { .. }
                | VkCommand::BindIndexBuffer { .. }
                | VkCommand::BindDescriptorSet { .. } => {}
            }
        }
        Ok(())
    }

    fn attachment(&self, framebuffer: Option<vk::Framebuffer>, index: usize) -> Checked<vk::ImageView> {
        let framebuffer =
            framebuffer.ok_or_else(|| Failure::invalid("clear outside a render pass"))?;
        self.framebuffer(framebuffer)?
            .attachments
            .get(index)
            .copied()
            .ok_or_else(|| Failure::invalid(format!("attachment {index} does not exist")))
    }

    fn clear_view(
        &mut self,
        view: vk::ImageView,
        encode: impl FnOnce(PixelFormat) -> Option<Vec<u8>>,
    ) -> Checked<()> {
        let view = self.image_view(view)?;
        let image = self
            .images
            .get_mut(view.image.as_raw())
            .ok_or_else(|| Failure::unknown("VkImage", view.image.as_raw()))?;
        let texel = encode(image.memory.format())
            .ok_or_else(|| Failure::invalid("clear value cannot be encoded in the format"))?;
        image
            .memory
            .fill(view.base_mip, view.base_layer, &texel)
            .map_err(|_| Failure::invalid("clear target out of range"))?;
        self.log.clears += 1;
        Ok(())
    }

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        region: &vk::BufferImageCopy,
    ) -> Checked<()> {
        let format = self.image(dst)?.memory.format();
        let extent = region.image_extent;
        let size = format.region_size(extent.width, extent.height);
        let bytes = self
            .buffer(src)?
            .memory
            .read(region.buffer_offset, size)
            .map_err(|_| Failure::invalid("copy source out of range"))?
            .to_vec();
        let subresource = region.image_subresource;
        self.images
            .get_mut(dst.as_raw())
            .ok_or_else(|| Failure::unknown("VkImage", dst.as_raw()))?
            .memory
            .write_region(
                subresource.mip_level,
                subresource.base_array_layer,
                region.image_offset.x as u32,
                region.image_offset.y as u32,
                extent.width,
                extent.height,
                &bytes,
            )
            .map_err(|_| Failure::invalid("copy destination out of range"))
    }

    fn create_image(&mut self, info: &vk::ImageCreateInfo<'_>, swapchain: bool) -> Checked<vk::Image> {
        let format = pixel_format_from_vk(info.format).ok_or_else(|| {
            Failure::with(vk::Result::ERROR_FORMAT_NOT_SUPPORTED, "unknown image format")
        })?;
        let memory = ImageMemory::new(
            format,
            info.extent.width,
            info.extent.height,
            info.mip_levels,
            info.array_layers,
        );
        let handle = self.images.insert(ImageObject {
            format: info.format,
            usage: info.usage,
            cube_compatible: info.flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE),
            swapchain,
            memory,
        });
        Ok(vk::Image::from_raw(handle))
    }
}

// ============================================================================
// Driver
// ============================================================================

struct Submission {
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

/// The instance, the logical device and its single graphics queue.
pub(super) struct VkDriver {
    physical: PhysicalDevice,
    enabled_extensions: Vec<&'static CStr>,
    messenger: Option<DebugMessenger>,
    state: Arc<Mutex<DeviceState>>,
    fences: Arc<FenceTable>,
    queue: Option<Sender<Submission>>,
    worker: Option<JoinHandle<()>>,
}

impl VkDriver {
    /// `vkCreateInstance` + `vkCreateDevice`, enabling the given extensions
    /// and layers and, if `messenger` is set, installing a debug messenger.
    pub fn new(
        physical: PhysicalDevice,
        extensions: &[&'static CStr],
        layers: &[&'static CStr],
        messenger: Option<&vk::DebugUtilsMessengerCreateInfoEXT<'_>>,
    ) -> VkResult<Self> {
        if extensions.iter().any(|name| !physical.extensions.contains(name)) {
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        }
        if layers.iter().any(|name| !physical.layers.contains(name)) {
            return Err(vk::Result::ERROR_LAYER_NOT_PRESENT);
        }
        if messenger.is_some() && !extensions.contains(&ash::ext::debug_utils::NAME) {
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        }
        let messenger = messenger.map(DebugMessenger::new);

        let state = Arc::new(Mutex::new(DeviceState::default()));
        let fences = Arc::new(FenceTable::new());
        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker = {
            let state = Arc::clone(&state);
            let fences = Arc::clone(&fences);
            std::thread::Builder::new()
                .name("vk-queue".to_string())
                .spawn(move || run_queue(&state, &fences, receiver, messenger))
                .map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED)?
        };

        Ok(Self {
            physical,
            enabled_extensions: extensions.to_vec(),
            messenger,
            state,
            fences,
            queue: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn physical_device(&self) -> &PhysicalDevice {
        &self.physical
    }

    fn call<T>(&self, f: impl FnOnce(&mut DeviceState) -> Checked<T>) -> VkResult<T> {
        let result = f(&mut self.state.lock());
        result.map_err(|failure| {
            self.report(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, &failure.message);
            failure.result
        })
    }

    fn report(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT, message: &str) {
        if let Some(messenger) = &self.messenger {
            messenger.emit(severity, vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION, message);
        }
    }

    /// Destroy an object, warning about unknown handles.
    fn destroy<H: Handle + Copy>(
        &self,
        kind: &str,
        handle: H,
        f: impl FnOnce(&mut DeviceState, u64) -> bool,
    ) {
        let raw = handle.as_raw();
        if raw == 0 {
            return;
        }
        let removed = f(&mut self.state.lock(), raw);
        if !removed {
            self.report(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                &format!("vkDestroy{kind}: invalid handle 0x{raw:x}"),
            );
        }
    }

    pub fn counts(&self) -> ObjectCounts {
        let counts = self.state.lock().counts();
        counts + self.fences.counts()
    }

    pub fn take_draws(&self) -> Vec<DrawCall> {
        self.state.lock().log.take_draws()
    }

    /// Run `f` against the driver log.
    pub fn with_log<T>(&self, f: impl FnOnce(&DriverLog) -> T) -> T {
        f(&self.state.lock().log)
    }

    // ------------------------------------------------------------------------
    // Buffers and images
    // ------------------------------------------------------------------------

    pub fn create_buffer(
        &self,
        info: &vk::BufferCreateInfo<'_>,
        properties: vk::MemoryPropertyFlags,
    ) -> VkResult<vk::Buffer> {
        self.call(|state| {
            if info.size == 0 {
                return Err(Failure::invalid("vkCreateBuffer: size is zero"));
            }
            if info.size > MAX_BUFFER_BYTES {
                return Err(Failure::with(
                    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                    "vkCreateBuffer: allocation too large",
                ));
            }
            let handle = state.buffers.insert(BufferObject {
                usage: info.usage,
                host_visible: properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE),
                memory: BufferMemory::new(info.size),
            });
            Ok(vk::Buffer::from_raw(handle))
        })
    }

    pub fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.destroy("Buffer", buffer, |state, raw| state.buffers.remove(raw).is_some());
    }

    /// `vkMapMemory` + copy + `vkUnmapMemory` on host-visible memory.
    pub fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> VkResult<()> {
        self.call(|state| {
            let object = state
                .buffers
                .get_mut(buffer.as_raw())
                .ok_or_else(|| Failure::unknown("VkBuffer", buffer.as_raw()))?;
            if !object.host_visible {
                return Err(Failure::with(
                    vk::Result::ERROR_MEMORY_MAP_FAILED,
                    "vkMapMemory: memory is not host visible",
                ));
            }
            object
                .memory
                .write(offset, data)
                .map_err(|_| Failure::invalid("vkMapMemory: range exceeds the allocation"))
        })
    }

    /// Copy the buffer's contents back to the host.
    pub fn read_buffer(&self, buffer: vk::Buffer) -> VkResult<Vec<u8>> {
        self.call(|state| Ok(state.buffer(buffer)?.memory.as_bytes().to_vec()))
    }

    pub fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        let properties = self.physical.format_properties(info.format);
        self.call(|state| {
            if info.image_type != vk::ImageType::TYPE_2D {
                return Err(Failure::invalid("vkCreateImage: only 2D images are supported"));
            }
            let mut required = vk::FormatFeatureFlags::empty();
            if info.usage.contains(vk::ImageUsageFlags::SAMPLED) {
                required |= vk::FormatFeatureFlags::SAMPLED_IMAGE;
            }
            if info.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
                required |= vk::FormatFeatureFlags::COLOR_ATTACHMENT;
            }
            if info.usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
                required |= vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
            }
            if properties.optimal_tiling_features.is_empty()
                || !properties.optimal_tiling_features.contains(required)
            {
                return Err(Failure::with(
                    vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
                    format!("vkCreateImage: {:?} does not support {:?}", info.format, info.usage),
                ));
            }
            let extent = info.extent;
            if extent.width == 0 || extent.height == 0 || info.mip_levels == 0 || info.array_layers == 0 {
                return Err(Failure::invalid("vkCreateImage: empty extent"));
            }
            if info.flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE)
                && (extent.width != extent.height || info.array_layers % 6 != 0)
            {
                return Err(Failure::invalid(
                    "vkCreateImage: cube compatible images must be square with 6n layers",
                ));
            }
            state.create_image(info, false)
        })
    }

    pub fn destroy_image(&self, image: vk::Image) {
        self.destroy("Image", image, |state, raw| {
            if state.images.get(raw).is_some_and(|image| image.swapchain) {
                return false;
            }
            state.images.remove(raw).is_some()
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn read_image(
        &self,
        image: vk::Image,
        mip: u32,
        layer: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> VkResult<Vec<u8>> {
        self.call(|state| {
            state
                .image(image)?
                .memory
                .read_region(mip, layer, x, y, width, height)
                .map_err(|_| Failure::invalid("read region exceeds the image"))
        })
    }

    pub fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        self.call(|state| {
            let image = state.image(info.image)?;
            let range = info.subresource_range;
            let layers = image.memory.array_layers();
            let layer_count = if range.layer_count == vk::REMAINING_ARRAY_LAYERS {
                layers.saturating_sub(range.base_array_layer)
            } else {
                range.layer_count
            };
            if range.base_mip_level >= image.memory.mip_levels()
                || layer_count == 0
                || range.base_array_layer + layer_count > layers
            {
                return Err(Failure::invalid(
                    "vkCreateImageView: subresource range exceeds the image",
                ));
            }
            let cube = matches!(
                info.view_type,
                vk::ImageViewType::CUBE | vk::ImageViewType::CUBE_ARRAY
            );
            if cube && !image.cube_compatible {
                return Err(Failure::invalid(
                    "vkCreateImageView: cube view of an image that is not cube compatible",
                ));
            }
            if info.format != image.format {
                return Err(Failure::invalid("vkCreateImageView: format differs from the image"));
            }
            let handle = state.image_views.insert(ImageViewObject {
                image: info.image,
                format: info.format,
                base_mip: range.base_mip_level,
                base_layer: range.base_array_layer,
            });
            Ok(vk::ImageView::from_raw(handle))
        })
    }

    pub fn destroy_image_view(&self, view: vk::ImageView) {
        self.destroy("ImageView", view, |state, raw| state.image_views.remove(raw).is_some());
    }

    pub fn create_sampler(&self, info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler> {
        let anisotropy_supported = self.physical.features.sampler_anisotropy == vk::TRUE;
        self.call(|state| {
            if info.anisotropy_enable == vk::TRUE {
                if !anisotropy_supported {
                    return Err(Failure::with(
                        vk::Result::ERROR_FEATURE_NOT_PRESENT,
                        "vkCreateSampler: samplerAnisotropy is not enabled",
                    ));
                }
                if !(1.0..=16.0).contains(&info.max_anisotropy) {
                    return Err(Failure::invalid("vkCreateSampler: maxAnisotropy out of range"));
                }
            }
            if info.min_lod > info.max_lod {
                return Err(Failure::invalid("vkCreateSampler: minLod greater than maxLod"));
            }
            Ok(vk::Sampler::from_raw(state.samplers.insert(())))
        })
    }

    pub fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.destroy("Sampler", sampler, |state, raw| state.samplers.remove(raw).is_some());
    }

    pub fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        self.call(|state| {
            if code.first() != Some(&SPIRV_MAGIC) {
                return Err(Failure::with(
                    vk::Result::ERROR_INVALID_SHADER_NV,
                    "vkCreateShaderModule: code is not SPIR-V",
                ));
            }
            Ok(vk::ShaderModule::from_raw(state.shader_modules.insert(())))
        })
    }

    pub fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.destroy("ShaderModule", module, |state, raw| {
            state.shader_modules.remove(raw).is_some()
        });
    }

    // ------------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------------

    /// Bindings must be numbered densely from zero, one descriptor each.
    pub fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.call(|state| {
            let mut types = Vec::with_capacity(bindings.len());
            for (index, binding) in bindings.iter().enumerate() {
                if binding.binding as usize != index || binding.descriptor_count != 1 {
                    return Err(Failure::invalid(format!(
                        "vkCreateDescriptorSetLayout: binding {} is not dense",
                        binding.binding
                    )));
                }
                if binding.stage_flags.is_empty() {
                    return Err(Failure::invalid(format!(
                        "vkCreateDescriptorSetLayout: binding {index} has no stages"
                    )));
                }
                types.push(binding.descriptor_type);
            }
            Ok(vk::DescriptorSetLayout::from_raw(
                state.descriptor_set_layouts.insert(types),
            ))
        })
    }

    pub fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.destroy("DescriptorSetLayout", layout, |state, raw| {
            state.descriptor_set_layouts.remove(raw).is_some()
        });
    }

    pub fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        self.call(|state| {
            let count = state
                .descriptor_set_layouts
                .get(layout.as_raw())
                .ok_or_else(|| Failure::unknown("VkDescriptorSetLayout", layout.as_raw()))?
                .len();
            let handle = state.descriptor_sets.insert(DescriptorSetObject {
                layout,
                writes: vec![None; count],
            });
            Ok(vk::DescriptorSet::from_raw(handle))
        })
    }

    /// `vkUpdateDescriptorSets` with a single write.
    pub fn update_descriptor_set(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        resource: DescriptorResource,
    ) -> VkResult<()> {
        self.call(|state| {
            let layout = state
                .descriptor_sets
                .get(set.as_raw())
                .ok_or_else(|| Failure::unknown("VkDescriptorSet", set.as_raw()))?
                .layout;
            let expected = state
                .descriptor_set_layouts
                .get(layout.as_raw())
                .and_then(|types| types.get(binding as usize).copied())
                .ok_or_else(|| {
                    Failure::invalid(format!("vkUpdateDescriptorSets: no binding {binding}"))
                })?;
            if resource.descriptor_type() != expected {
                return Err(Failure::invalid(format!(
                    "vkUpdateDescriptorSets: binding {binding} expects {expected:?}, got {:?}",
                    resource.descriptor_type()
                )));
            }
            let usable = match resource {
                DescriptorResource::UniformBuffer(buffer) => state
                    .buffer(buffer)?
                    .usage
                    .contains(vk::BufferUsageFlags::UNIFORM_BUFFER),
                DescriptorResource::SampledImage(view) => {
                    let view = state.image_view(view)?;
                    state
                        .image(view.image)?
                        .usage
                        .contains(vk::ImageUsageFlags::SAMPLED)
                }
                DescriptorResource::Sampler(sampler) => state.samplers.contains(sampler.as_raw()),
            };
            if !usable {
                return Err(Failure::invalid(format!(
                    "vkUpdateDescriptorSets: resource for binding {binding} lacks the required usage"
                )));
            }
            if let Some(object) = state.descriptor_sets.get_mut(set.as_raw()) {
                object.writes[binding as usize] = Some(resource);
            }
            Ok(())
        })
    }

    pub fn free_descriptor_set(&self, set: vk::DescriptorSet) {
        self.destroy("DescriptorSet", set, |state, raw| {
            state.descriptor_sets.remove(raw).is_some()
        });
    }

    pub fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<vk::PipelineLayout> {
        self.call(|state| {
            if let Some(missing) = set_layouts
                .iter()
                .find(|layout| !state.descriptor_set_layouts.contains(layout.as_raw()))
            {
                return Err(Failure::unknown("VkDescriptorSetLayout", missing.as_raw()));
            }
            Ok(vk::PipelineLayout::from_raw(
                state.pipeline_layouts.insert(set_layouts.to_vec()),
            ))
        })
    }

    pub fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.destroy("PipelineLayout", layout, |state, raw| {
            state.pipeline_layouts.remove(raw).is_some()
        });
    }

    // ------------------------------------------------------------------------
    // Render passes, framebuffers, pipelines
    // ------------------------------------------------------------------------

    /// A single-subpass render pass that loads and stores every attachment.
    pub fn create_render_pass(
        &self,
        color_formats: &[vk::Format],
        depth_format: Option<vk::Format>,
    ) -> VkResult<vk::RenderPass> {
        self.call(|state| {
            let is_depth = |format: vk::Format| {
                pixel_format_from_vk(format).is_some_and(PixelFormat::is_depth_stencil)
            };
            if color_formats.iter().any(|format| is_depth(*format)) {
                return Err(Failure::invalid(
                    "vkCreateRenderPass: color attachment with a depth format",
                ));
            }
            if depth_format.is_some_and(|format| !is_depth(format)) {
                return Err(Failure::invalid(
                    "vkCreateRenderPass: depth attachment with a color format",
                ));
            }
            let handle = state.render_passes.insert(RenderPassObject {
                color_formats: color_formats.to_vec(),
                depth_format,
            });
            Ok(vk::RenderPass::from_raw(handle))
        })
    }

    pub fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.destroy("RenderPass", render_pass, |state, raw| {
            state.render_passes.remove(raw).is_some()
        });
    }

    /// Attachments are the color views followed by the depth view.
    pub fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        self.call(|state| {
            let pass = state.render_pass(render_pass)?;
            let formats: Vec<vk::Format> = pass
                .color_formats
                .iter()
                .copied()
                .chain(pass.depth_format)
                .collect();
            if formats.len() != attachments.len() {
                return Err(Failure::invalid(format!(
                    "vkCreateFramebuffer: {} attachments for a render pass with {}",
                    attachments.len(),
                    formats.len()
                )));
            }
            for (index, (view, format)) in attachments.iter().zip(&formats).enumerate() {
                let view = state.image_view(*view)?;
                if view.format != *format {
                    return Err(Failure::invalid(format!(
                        "vkCreateFramebuffer: attachment {index} format mismatch"
                    )));
                }
                let (width, height) = state.image(view.image)?.memory.extent();
                let (width, height) = mip_extent(width, height, view.base_mip);
                if width < extent.width || height < extent.height {
                    return Err(Failure::invalid(format!(
                        "vkCreateFramebuffer: attachment {index} is smaller than the framebuffer"
                    )));
                }
            }
            let handle = state.framebuffers.insert(FramebufferObject {
                render_pass,
                attachments: attachments.to_vec(),
                extent,
            });
            Ok(vk::Framebuffer::from_raw(handle))
        })
    }

    pub fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.destroy("Framebuffer", framebuffer, |state, raw| {
            state.framebuffers.remove(raw).is_some()
        });
    }

    pub fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> VkResult<vk::Pipeline> {
        let features = self.physical.features;
        self.call(|state| {
            if !state.pipeline_layouts.contains(desc.layout.as_raw()) {
                return Err(Failure::unknown("VkPipelineLayout", desc.layout.as_raw()));
            }
            let color_count = state.render_pass(desc.render_pass)?.color_formats.len();
            if desc.color_blend.len() != color_count {
                return Err(Failure::invalid(format!(
                    "vkCreateGraphicsPipelines: {} blend attachments for {color_count} color attachments",
                    desc.color_blend.len()
                )));
            }

            let mut stages = vk::ShaderStageFlags::empty();
            for (stage, module) in &desc.stages {
                if !state.shader_modules.contains(module.as_raw()) {
                    return Err(Failure::unknown("VkShaderModule", module.as_raw()));
                }
                if stages.intersects(*stage) {
                    return Err(Failure::invalid(format!(
                        "vkCreateGraphicsPipelines: duplicate {stage:?} stage"
                    )));
                }
                stages |= *stage;
            }
            if !stages.contains(vk::ShaderStageFlags::VERTEX) {
                return Err(Failure::invalid("vkCreateGraphicsPipelines: no vertex stage"));
            }
            if stages.contains(vk::ShaderStageFlags::GEOMETRY) && features.geometry_shader != vk::TRUE
            {
                return Err(Failure::with(
                    vk::Result::ERROR_FEATURE_NOT_PRESENT,
                    "vkCreateGraphicsPipelines: geometryShader is not enabled",
                ));
            }
            let tessellation = vk::ShaderStageFlags::TESSELLATION_CONTROL
                | vk::ShaderStageFlags::TESSELLATION_EVALUATION;
            if stages.intersects(tessellation) && features.tessellation_shader != vk::TRUE {
                return Err(Failure::with(
                    vk::Result::ERROR_FEATURE_NOT_PRESENT,
                    "vkCreateGraphicsPipelines: tessellationShader is not enabled",
                ));
            }
            if desc.rasterization.depth_clamp_enable == vk::TRUE && features.depth_clamp != vk::TRUE
            {
                return Err(Failure::with(
                    vk::Result::ERROR_FEATURE_NOT_PRESENT,
                    "vkCreateGraphicsPipelines: depthClamp is not enabled",
                ));
            }

            for attribute in &desc.attributes {
                let Some(binding) = desc
                    .bindings
                    .iter()
                    .find(|binding| binding.binding == attribute.binding)
                else {
                    return Err(Failure::invalid(format!(
                        "vkCreateGraphicsPipelines: attribute {} uses undeclared binding {}",
                        attribute.location, attribute.binding
                    )));
                };
                if attribute.offset >= binding.stride {
                    return Err(Failure::invalid(format!(
                        "vkCreateGraphicsPipelines: attribute {} offset exceeds the stride",
                        attribute.location
                    )));
                }
            }

            let handle = state.pipelines.insert(PipelineObject {
                layout: desc.layout,
                render_pass: desc.render_pass,
                topology: desc.topology,
            });
            Ok(vk::Pipeline::from_raw(handle))
        })
    }

    pub fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.destroy("Pipeline", pipeline, |state, raw| state.pipelines.remove(raw).is_some());
    }

    // ------------------------------------------------------------------------
    // Command pools and buffers
    // ------------------------------------------------------------------------

    pub fn create_command_pool(
        &self,
        flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        self.call(|state| {
            let handle = state.command_pools.insert(CommandPoolObject {
                flags,
                buffers: Vec::new(),
            });
            Ok(vk::CommandPool::from_raw(handle))
        })
    }

    /// Destroying a pool frees every command buffer allocated from it.
    pub fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut pending = false;
        self.destroy("CommandPool", pool, |state, raw| {
            let Some(object) = state.command_pools.remove(raw) else {
                return false;
            };
            for buffer in object.buffers {
                if let Some(removed) = state.command_buffers.remove(buffer.as_raw()) {
                    pending |= removed.state == CommandBufferState::Pending;
                }
            }
            true
        });
        if pending {
            self.report(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                "vkDestroyCommandPool: a command buffer from the pool is still pending",
            );
        }
    }

    pub fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        self.call(|state| {
            if !state.command_pools.contains(pool.as_raw()) {
                return Err(Failure::unknown("VkCommandPool", pool.as_raw()));
            }
            let handle = vk::CommandBuffer::from_raw(state.command_buffers.insert(
                CommandBufferObject {
                    pool,
                    state: CommandBufferState::Initial,
                    tracking: Tracking::default(),
                    commands: Vec::new(),
                },
            ));
            if let Some(object) = state.command_pools.get_mut(pool.as_raw()) {
                object.buffers.push(handle);
            }
            Ok(handle)
        })
    }

    pub fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        self.destroy("CommandBuffer", command_buffer, |state, raw| {
            let owned = state
                .command_buffers
                .get(raw)
                .is_some_and(|object| object.pool == pool && object.state != CommandBufferState::Pending);
            if !owned {
                return false;
            }
            if let Some(object) = state.command_pools.get_mut(pool.as_raw()) {
                object.buffers.retain(|buffer| buffer.as_raw() != raw);
            }
            state.command_buffers.remove(raw).is_some()
        });
    }

    fn transition(
        &self,
        command_buffer: vk::CommandBuffer,
        operation: &'static str,
        f: impl FnOnce(CommandBufferState, vk::CommandPoolCreateFlags) -> Option<CommandBufferState>,
    ) -> VkResult<()> {
        self.call(|state| {
            let raw = command_buffer.as_raw();
            let object = state
                .command_buffers
                .get(raw)
                .ok_or_else(|| Failure::unknown("VkCommandBuffer", raw))?;
            let pool_flags = state
                .command_pools
                .get(object.pool.as_raw())
                .map_or(vk::CommandPoolCreateFlags::empty(), |pool| pool.flags);
            let current = object.state;
            let next = f(current, pool_flags).ok_or_else(|| {
                Failure::invalid(format!("{operation}: invalid in the {current:?} state"))
            })?;
            let object = state
                .command_buffers
                .get_mut(raw)
                .ok_or_else(|| Failure::unknown("VkCommandBuffer", raw))?;
            if next != CommandBufferState::Executable {
                object.commands.clear();
                object.tracking = Tracking::default();
            }
            object.state = next;
            Ok(())
        })
    }

    /// Begin recording; an executable buffer is implicitly reset if its pool
    /// allows it.
    pub fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.transition(command_buffer, "vkBeginCommandBuffer", |current, flags| {
            let resettable = flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            match current {
                CommandBufferState::Initial => Some(CommandBufferState::Recording),
                CommandBufferState::Executable if resettable => Some(CommandBufferState::Recording),
                _ => None,
            }
        })
    }

    pub fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.call(|state| {
            let raw = command_buffer.as_raw();
            let object = state
                .command_buffers
                .get_mut(raw)
                .ok_or_else(|| Failure::unknown("VkCommandBuffer", raw))?;
            if object.state != CommandBufferState::Recording {
                return Err(Failure::invalid(
                    "vkEndCommandBuffer: command buffer is not recording",
                ));
            }
            if object.tracking.render_pass.is_some() {
                return Err(Failure::invalid("vkEndCommandBuffer: render pass still active"));
            }
            object.state = CommandBufferState::Executable;
            Ok(())
        })
    }

    pub fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.transition(command_buffer, "vkResetCommandBuffer", |current, flags| {
            let resettable = flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            (current != CommandBufferState::Pending && resettable)
                .then_some(CommandBufferState::Initial)
        })
    }

    /// Record one command.
    pub fn cmd(&self, command_buffer: vk::CommandBuffer, command: VkCommand) -> VkResult<()> {
        self.call(|state| state.record(command_buffer, command))
    }

    // ------------------------------------------------------------------------
    // Fences and the queue
    // ------------------------------------------------------------------------

    pub fn create_fence(&self, signaled: bool) -> vk::Fence {
        self.fences.create(signaled)
    }

    pub fn destroy_fence(&self, fence: vk::Fence) {
        if !self.fences.destroy(fence) {
            self.report(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                &format!("vkDestroyFence: invalid handle 0x{:x}", fence.as_raw()),
            );
        }
    }

    pub fn get_fence_status(&self, fence: vk::Fence) -> VkResult<()> {
        self.fences.status(fence)
    }

    pub fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.fences.wait(fence)
    }

    pub fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.fences.reset(fence)
    }

    /// Submit an executable command buffer; `fence` is signaled once the
    /// queue has executed it.
    pub fn queue_submit(&self, command_buffer: vk::CommandBuffer, fence: vk::Fence) -> VkResult<()> {
        let queue = self.queue.as_ref().ok_or(vk::Result::ERROR_DEVICE_LOST)?;
        self.transition(command_buffer, "vkQueueSubmit", |current, _| {
            (current == CommandBufferState::Executable).then_some(CommandBufferState::Pending)
        })?;

        let revert = || {
            let mut state = self.state.lock();
            if let Some(object) = state.command_buffers.get_mut(command_buffer.as_raw()) {
                object.state = CommandBufferState::Executable;
            }
        };
        if let Err(result) = self.fences.mark_submitted(fence) {
            revert();
            self.report(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                "vkQueueSubmit: fence is invalid or already signaled",
            );
            return Err(result);
        }
        self.state.lock().log.submissions += 1;
        if queue
            .send(Submission {
                command_buffer,
                fence,
            })
            .is_err()
        {
            self.fences.abandon_submission();
            revert();
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        Ok(())
    }

    /// `vkQueueWaitIdle`.
    pub fn queue_wait_idle(&self) {
        self.fences.wait_idle();
    }

    // ------------------------------------------------------------------------
    // Swapchain
    // ------------------------------------------------------------------------

    pub fn create_swapchain(
        &self,
        format: vk::Format,
        extent: vk::Extent2D,
        image_count: u32,
    ) -> VkResult<vk::SwapchainKHR> {
        if !self.enabled_extensions.contains(&ash::khr::swapchain::NAME) {
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        }
        let supported = self
            .physical
            .format_properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::COLOR_ATTACHMENT);
        self.call(|state| {
            if !supported {
                return Err(Failure::with(
                    vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
                    format!("vkCreateSwapchainKHR: {format:?} is not presentable"),
                ));
            }
            if extent.width == 0 || extent.height == 0 || image_count == 0 {
                return Err(Failure::invalid("vkCreateSwapchainKHR: empty swapchain"));
            }
            let info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .usage(
                    vk::ImageUsageFlags::COLOR_ATTACHMENT
                        | vk::ImageUsageFlags::TRANSFER_SRC
                        | vk::ImageUsageFlags::TRANSFER_DST,
                );
            let images = (0..image_count)
                .map(|_| state.create_image(&info, true))
                .collect::<Checked<Vec<_>>>()?;
            let handle = state.swapchains.insert(SwapchainObject {
                images,
                acquired: None,
                next: 0,
            });
            Ok(vk::SwapchainKHR::from_raw(handle))
        })
    }

    pub fn get_swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.call(|state| {
            state
                .swapchains
                .get(swapchain.as_raw())
                .map(|object| object.images.clone())
                .ok_or_else(|| Failure::unknown("VkSwapchainKHR", swapchain.as_raw()))
        })
    }

    /// Acquire the next presentable image; `fence` is signaled when it is
    /// ready, which in this driver is immediately.
    pub fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, fence: vk::Fence) -> VkResult<u32> {
        let index = self.call(|state| {
            let object = state
                .swapchains
                .get_mut(swapchain.as_raw())
                .ok_or_else(|| Failure::unknown("VkSwapchainKHR", swapchain.as_raw()))?;
            if object.acquired.is_some() {
                return Err(Failure::invalid(
                    "vkAcquireNextImageKHR: an image is already acquired",
                ));
            }
            let index = object.next;
            object.next = (index + 1) % object.images.len() as u32;
            object.acquired = Some(index);
            Ok(index)
        })?;
        self.fences.signal(fence);
        Ok(index)
    }

    pub fn queue_present(&self, swapchain: vk::SwapchainKHR, image_index: u32) -> VkResult<()> {
        self.call(|state| {
            let object = state
                .swapchains
                .get_mut(swapchain.as_raw())
                .ok_or_else(|| Failure::unknown("VkSwapchainKHR", swapchain.as_raw()))?;
            if object.acquired != Some(image_index) {
                return Err(Failure::invalid(format!(
                    "vkQueuePresentKHR: image {image_index} was not acquired"
                )));
            }
            object.acquired = None;
            state.log.presents += 1;
            Ok(())
        })
    }

    /// Destroying a swapchain destroys its images; views created over them
    /// must already be gone.
    pub fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut dangling = 0;
        self.destroy("SwapchainKHR", swapchain, |state, raw| {
            let Some(object) = state.swapchains.remove(raw) else {
                return false;
            };
            for image in &object.images {
                state.images.remove(image.as_raw());
            }
            dangling = state
                .image_views
                .values_mut()
                .filter(|view| object.images.contains(&view.image))
                .count();
            true
        });
        if dangling > 0 {
            self.report(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                &format!("vkDestroySwapchainKHR: {dangling} image views still reference its images"),
            );
        }
    }
}

impl Drop for VkDriver {
    fn drop(&mut self) {
        // Disconnecting the channel stops the worker after the queued work.
        drop(self.queue.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::error!("VkDriver: queue worker panicked");
        }
        let counts = self.counts();
        if counts.live > 0 {
            self.report(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                &format!("vkDestroyDevice: {} objects were not destroyed", counts.live),
            );
        }
    }
}

fn run_queue(
    state: &Mutex<DeviceState>,
    fences: &FenceTable,
    submissions: Receiver<Submission>,
    messenger: Option<DebugMessenger>,
) {
    for Submission {
        command_buffer,
        fence,
    } in submissions
    {
        let result = state.lock().execute(command_buffer);
        if let Err(failure) = result
            && let Some(messenger) = &messenger
        {
            messenger.emit(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &format!("vkQueueSubmit: {}", failure.message),
            );
        }
        fences.complete_submission(fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> VkDriver {
        let physical = PhysicalDevice::probe(|_| false);
        VkDriver::new(
            physical,
            &[ash::khr::surface::NAME, ash::khr::swapchain::NAME],
            &[],
            None,
        )
        .unwrap()
    }

    fn color_image(driver: &VkDriver, width: u32, height: u32) -> (vk::Image, vk::ImageView) {
        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST);
        let image = driver.create_image(&info).unwrap();
        let view = driver
            .create_image_view(
                &vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(vk::Format::R8G8B8A8_UNORM)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    }),
            )
            .unwrap();
        (image, view)
    }

    fn recording(driver: &VkDriver) -> (vk::CommandPool, vk::CommandBuffer) {
        let pool = driver
            .create_command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .unwrap();
        let command_buffer = driver.allocate_command_buffer(pool).unwrap();
        driver.begin_command_buffer(command_buffer).unwrap();
        (pool, command_buffer)
    }

    #[test]
    fn test_masked_extensions_and_features() {
        let physical = PhysicalDevice::probe(|name| {
            name == "VK_KHR_swapchain" || name == "textureCompressionBC"
        });
        assert!(!physical.extensions.contains(&ash::khr::swapchain::NAME));
        assert_eq!(physical.features.texture_compression_bc, vk::FALSE);
        assert!(
            physical
                .format_properties(vk::Format::BC1_RGBA_UNORM_BLOCK)
                .optimal_tiling_features
                .is_empty()
        );

        let result = VkDriver::new(physical, &[ash::khr::swapchain::NAME], &[], None);
        assert_eq!(result.err(), Some(vk::Result::ERROR_EXTENSION_NOT_PRESENT));
    }

    #[test]
    fn test_transfer_inside_render_pass_is_rejected() {
        let driver = driver();
        let (_, view) = color_image(&driver, 4, 4);
        let render_pass = driver
            .create_render_pass(&[vk::Format::R8G8B8A8_UNORM], None)
            .unwrap();
        let extent = vk::Extent2D {
            width: 4,
            height: 4,
        };
        let framebuffer = driver.create_framebuffer(render_pass, &[view], extent).unwrap();
        let buffer = driver
            .create_buffer(
                &vk::BufferCreateInfo::default()
                    .size(16)
                    .usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST),
                vk::MemoryPropertyFlags::HOST_VISIBLE,
            )
            .unwrap();
        let (_, command_buffer) = recording(&driver);

        driver
            .cmd(
                command_buffer,
                VkCommand::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    render_area: vk::Rect2D {
                        offset: vk::Offset2D::default(),
                        extent,
                    },
                },
            )
            .unwrap();
        let copy = VkCommand::CopyBuffer {
            src: buffer,
            dst: buffer,
            region: vk::BufferCopy {
                src_offset: 0,
                dst_offset: 8,
                size: 8,
            },
        };
        assert_eq!(
            driver.cmd(command_buffer, copy),
            Err(vk::Result::ERROR_VALIDATION_FAILED_EXT)
        );
        assert_eq!(
            driver.end_command_buffer(command_buffer),
            Err(vk::Result::ERROR_VALIDATION_FAILED_EXT)
        );
        driver.cmd(command_buffer, VkCommand::EndRenderPass).unwrap();
        driver.cmd(command_buffer, copy).unwrap();
        driver.end_command_buffer(command_buffer).unwrap();
    }

    #[test]
    fn test_submission_executes_copy_and_clear() {
        let driver = driver();
        let (image, view) = color_image(&driver, 2, 2);
        let render_pass = driver
            .create_render_pass(&[vk::Format::R8G8B8A8_UNORM], None)
            .unwrap();
        let extent = vk::Extent2D {
            width: 2,
            height: 2,
        };
        let framebuffer = driver.create_framebuffer(render_pass, &[view], extent).unwrap();
        let staging = driver
            .create_buffer(
                &vk::BufferCreateInfo::default()
                    .size(4)
                    .usage(vk::BufferUsageFlags::TRANSFER_SRC),
                vk::MemoryPropertyFlags::HOST_VISIBLE,
            )
            .unwrap();
        let target = driver
            .create_buffer(
                &vk::BufferCreateInfo::default()
                    .size(8)
                    .usage(vk::BufferUsageFlags::TRANSFER_DST),
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
            .unwrap();
        assert_eq!(
            driver.write_buffer(target, 0, &[1]),
            Err(vk::Result::ERROR_MEMORY_MAP_FAILED)
        );
        driver.write_buffer(staging, 0, &[1, 2, 3, 4]).unwrap();

        let (_, command_buffer) = recording(&driver);
        let commands = [
            VkCommand::CopyBuffer {
                src: staging,
                dst: target,
                region: vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 4,
                    size: 4,
                },
            },
            VkCommand::BeginRenderPass {
                render_pass,
                framebuffer,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent,
                },
            },
            VkCommand::ClearColorAttachment {
                attachment: 0,
                color: [0.0, 1.0, 0.0, 1.0],
            },
            VkCommand::EndRenderPass,
        ];
        for command in commands {
            driver.cmd(command_buffer, command).unwrap();
        }
        driver.end_command_buffer(command_buffer).unwrap();

        let fence = driver.create_fence(false);
        driver.queue_submit(command_buffer, fence).unwrap();
        driver.wait_for_fence(fence).unwrap();

        assert_eq!(driver.read_buffer(target).unwrap(), [0, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(
            driver.read_image(image, 0, 0, 1, 1, 1, 1).unwrap(),
            [0, 255, 0, 255]
        );
        driver.with_log(|log| {
            assert_eq!(log.submissions, 1);
            assert_eq!(log.clears, 1);
        });
    }

    #[test]
    fn test_pending_command_buffer_cannot_be_reset() {
        let driver = driver();
        let (_, command_buffer) = recording(&driver);
        driver.end_command_buffer(command_buffer).unwrap();
        let fence = driver.create_fence(false);
        driver.queue_submit(command_buffer, fence).unwrap();
        driver.wait_for_fence(fence).unwrap();
        driver.queue_wait_idle();
        // Executed buffers return to the executable state.
        driver.reset_command_buffer(command_buffer).unwrap();
        assert_eq!(
            driver.queue_submit(command_buffer, fence),
            Err(vk::Result::ERROR_VALIDATION_FAILED_EXT)
        );
    }

    #[test]
    fn test_swapchain_acquire_present_cycle() {
        let driver = driver();
        let swapchain = driver
            .create_swapchain(
                vk::Format::B8G8R8A8_UNORM,
                vk::Extent2D {
                    width: 8,
                    height: 8,
                },
                2,
            )
            .unwrap();
        let images = driver.get_swapchain_images(swapchain).unwrap();
        assert_eq!(images.len(), 2);

        let fence = driver.create_fence(false);
        assert_eq!(driver.acquire_next_image(swapchain, fence), Ok(0));
        driver.wait_for_fence(fence).unwrap();
        assert_eq!(
            driver.queue_present(swapchain, 1),
            Err(vk::Result::ERROR_VALIDATION_FAILED_EXT)
        );
        driver.queue_present(swapchain, 0).unwrap();
        driver.reset_fence(fence).unwrap();
        assert_eq!(driver.acquire_next_image(swapchain, fence), Ok(1));

        // Swapchain images are owned by the swapchain.
        driver.destroy_image(images[0]);
        assert!(driver.read_image(images[0], 0, 0, 0, 0, 1, 1).is_ok());
        driver.destroy_swapchain(swapchain);
        driver.destroy_fence(fence);
        assert_eq!(driver.counts().live, 0);
    }
}
