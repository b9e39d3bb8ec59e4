//! Vulkan command recording into primary command buffers.

use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;

use crate::error::GraphicsError;
use crate::resources::{BindingResource, Buffer, Framebuffer, Pipeline, ResourceSet, Texture};
use crate::types::{IndexFormat, RgbaFloat, ScissorRect, TextureRegion, Viewport};

use super::conversion::{aspect_mask, convert_index_format};
use super::deferred::DeferredResource;
use super::driver::VkCommand;
use super::{Retained, VulkanFramebuffer, VulkanPipeline, VulkanResourceSet, VulkanShared};

/// A command list owning one command pool.
///
/// The render pass of the bound framebuffer begins lazily on the first clear
/// or draw and ends before any transfer, so updates can be interleaved with
/// drawing. Resource sets are bound at draw time against the pipeline layout
/// of the bound pipeline.
pub(crate) struct VulkanCommandList {
    shared: Arc<VulkanShared>,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    framebuffer: Option<Arc<VulkanFramebuffer>>,
    image_index: u32,
    render_pass_active: bool,
    pipeline: Option<Arc<VulkanPipeline>>,
    pending_sets: BTreeMap<u32, Arc<VulkanResourceSet>>,
    /// Upload buffers referenced by recorded copies.
    staging: Vec<vk::Buffer>,
    /// Natives referenced by recorded commands.
    retained: Vec<Retained>,
}

impl VulkanCommandList {
    pub(super) fn new(shared: Arc<VulkanShared>) -> Result<Self, GraphicsError> {
        let pool = shared.call("vkCreateCommandPool", |driver| {
            driver.create_command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        })?;
        let mut list = Self {
            shared,
            pool,
            command_buffer: vk::CommandBuffer::null(),
            framebuffer: None,
            image_index: 0,
            render_pass_active: false,
            pipeline: None,
            pending_sets: BTreeMap::new(),
            staging: Vec::new(),
            retained: Vec::new(),
        };
        list.allocate()?;
        Ok(list)
    }

    /// Allocate a fresh command buffer and begin recording into it.
    fn allocate(&mut self) -> Result<(), GraphicsError> {
        let pool = self.pool;
        let command_buffer = self.shared.call("vkAllocateCommandBuffers", |driver| {
            driver.allocate_command_buffer(pool)
        })?;
        self.command_buffer = command_buffer;
        self.shared.call("vkBeginCommandBuffer", |driver| {
            driver.begin_command_buffer(command_buffer)
        })
    }

    fn record(&mut self, command: VkCommand) -> Result<(), GraphicsError> {
        let command_buffer = self.command_buffer;
        self.shared
            .call("vkCmd", |driver| driver.cmd(command_buffer, command))
    }

    fn clear_bindings(&mut self) {
        let framebuffer = self.framebuffer.take();
        let pipeline = self.pipeline.take();
        let sets = std::mem::take(&mut self.pending_sets);
        let retained = std::mem::take(&mut self.retained);
        for buffer in self.staging.drain(..) {
            self.shared.release(DeferredResource::Buffer(buffer));
        }
        self.render_pass_active = false;
        drop((framebuffer, pipeline, sets, retained));
    }

    /// Throw away everything recorded and start over.
    fn restart(&mut self) -> Result<(), GraphicsError> {
        self.clear_bindings();
        let command_buffer = self.command_buffer;
        self.shared.call("vkResetCommandBuffer", |driver| {
            driver.reset_command_buffer(command_buffer)
        })?;
        self.shared.call("vkBeginCommandBuffer", |driver| {
            driver.begin_command_buffer(command_buffer)
        })
    }

    pub(crate) fn begin(&mut self) -> Result<(), GraphicsError> {
        self.restart()
    }

    pub(crate) fn end(&mut self) -> Result<(), GraphicsError> {
        self.end_render_pass()
    }

    pub(crate) fn reset(&mut self) -> Result<(), GraphicsError> {
        self.restart()
    }

    /// Submit the recorded commands and continue in a new command buffer.
    pub(super) fn submit(&mut self) -> Result<(), GraphicsError> {
        self.end_render_pass()?;
        let command_buffer = self.command_buffer;
        self.shared.call("vkEndCommandBuffer", |driver| {
            driver.end_command_buffer(command_buffer)
        })?;

        let mut retained = std::mem::take(&mut self.retained);
        retained.extend(self.framebuffer.take().map(|native| native as Retained));
        retained.extend(self.pipeline.take().map(|native| native as Retained));
        retained.extend(
            std::mem::take(&mut self.pending_sets)
                .into_values()
                .map(|native| native as Retained),
        );
        let staging = std::mem::take(&mut self.staging);
        let serial = self
            .shared
            .submit(self.pool, command_buffer, staging, retained)?;
        log::trace!("VulkanCommandList: command buffer {command_buffer:?} is serial {serial}");
        self.allocate()
    }

    fn ensure_render_pass(&mut self) -> Result<(), GraphicsError> {
        if self.render_pass_active {
            return Ok(());
        }
        let framebuffer = self
            .framebuffer
            .as_ref()
            .ok_or_else(|| GraphicsError::state("no framebuffer is bound"))?;
        let command = VkCommand::BeginRenderPass {
            render_pass: framebuffer.render_pass,
            framebuffer: framebuffer.framebuffer(self.image_index),
            render_area: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: framebuffer.extent,
            },
        };
        self.record(command)?;
        self.render_pass_active = true;
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<(), GraphicsError> {
        if self.render_pass_active {
            self.record(VkCommand::EndRenderPass)?;
            self.render_pass_active = false;
        }
        Ok(())
    }

    pub(crate) fn set_framebuffer(&mut self, framebuffer: &Framebuffer) -> Result<(), GraphicsError> {
        let native = framebuffer.native()?;
        let native = Arc::clone(native.vulkan()?);
        self.end_render_pass()?;
        if let Some(previous) = self.framebuffer.replace(native) {
            self.retained.push(previous);
        }
        self.image_index = framebuffer.image_index();
        Ok(())
    }

    pub(crate) fn set_viewport(&mut self, viewport: &Viewport) -> Result<(), GraphicsError> {
        self.record(VkCommand::SetViewport(vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        }))
    }

    pub(crate) fn set_scissor_rect(&mut self, rect: &ScissorRect) -> Result<(), GraphicsError> {
        // Negative origins shrink the rectangle instead of failing.
        let x = rect.x.max(0);
        let y = rect.y.max(0);
        let width = rect.width.saturating_sub(x.abs_diff(rect.x));
        let height = rect.height.saturating_sub(y.abs_diff(rect.y));
        self.record(VkCommand::SetScissor(vk::Rect2D {
            offset: vk::Offset2D { x, y },
            extent: vk::Extent2D { width, height },
        }))
    }

    pub(crate) fn set_vertex_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<(), GraphicsError> {
        let native = buffer.native()?;
        let native = Arc::clone(native.vulkan()?);
        self.record(VkCommand::BindVertexBuffer {
            binding: slot,
            buffer: native.buffer,
            offset: 0,
        })?;
        self.retained.push(native);
        Ok(())
    }

    pub(crate) fn set_index_buffer(
        &mut self,
        buffer: &Buffer,
        format: IndexFormat,
    ) -> Result<(), GraphicsError> {
        let native = buffer.native()?;
        let native = Arc::clone(native.vulkan()?);
        self.record(VkCommand::BindIndexBuffer {
            buffer: native.buffer,
            offset: 0,
            index_type: convert_index_format(format),
        })?;
        self.retained.push(native);
        Ok(())
    }

    pub(crate) fn set_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), GraphicsError> {
        let native = pipeline.native()?;
        let native = Arc::clone(native.vulkan()?);
        self.record(VkCommand::BindPipeline(native.pipeline))?;
        if let Some(previous) = self.pipeline.replace(native) {
            self.retained.push(previous);
        }
        Ok(())
    }

    pub(crate) fn set_resource_set(&mut self, slot: u32, set: &ResourceSet) -> Result<(), GraphicsError> {
        let native = set.native()?;
        let native = Arc::clone(native.vulkan()?);
        // The set's contents must still be alive when it is bound.
        let resources = set.resolve()?;
        if let Some(previous) = self.pending_sets.insert(slot, native) {
            self.retained.push(previous);
        }
        for resource in &resources {
            let native: Retained = match resource {
                BindingResource::UniformBuffer(buffer) => {
                    let native = buffer.native()?;
                    Arc::clone(native.vulkan()?) as Retained
                }
                BindingResource::Texture(texture) => {
                    let native = texture.native()?;
                    Arc::clone(native.vulkan()?) as Retained
                }
                BindingResource::Sampler(sampler) => {
                    let native = sampler.native()?;
                    Arc::clone(native.vulkan()?) as Retained
                }
            };
            self.retained.push(native);
        }
        Ok(())
    }

    fn bind_pending_sets(&mut self) -> Result<(), GraphicsError> {
        let Some(layout) = self.pipeline.as_ref().map(|pipeline| pipeline.layout) else {
            return Ok(());
        };
        let sets: Vec<(u32, vk::DescriptorSet)> = self
            .pending_sets
            .iter()
            .map(|(slot, set)| (*slot, set.set))
            .collect();
        for (set_index, set) in sets {
            self.record(VkCommand::BindDescriptorSet {
                layout,
                set_index,
                set,
            })?;
        }
        Ok(())
    }

    /// Copy `data` into a new host-visible buffer and return it.
    fn stage(&mut self, data: &[u8]) -> Result<vk::Buffer, GraphicsError> {
        let info = vk::BufferCreateInfo::default()
            .size(data.len() as u64)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC);
        let buffer = self.shared.call("vkCreateBuffer", |driver| {
            driver.create_buffer(
                &info,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )
        })?;
        self.staging.push(buffer);
        self.shared
            .call("vkMapMemory", |driver| driver.write_buffer(buffer, 0, data))?;
        Ok(buffer)
    }

    pub(crate) fn update_buffer(
        &mut self,
        buffer: &Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        if data.is_empty() {
            return Ok(());
        }
        let native = buffer.native()?;
        let native = Arc::clone(native.vulkan()?);
        if offset + data.len() as u64 > native.size {
            return Err(GraphicsError::OutOfBounds(format!(
                "update of {} bytes at {offset} exceeds buffer of {} bytes",
                data.len(),
                native.size
            )));
        }
        self.end_render_pass()?;
        let src = self.stage(data)?;
        self.record(VkCommand::CopyBuffer {
            src,
            dst: native.buffer,
            region: vk::BufferCopy {
                src_offset: 0,
                dst_offset: offset,
                size: data.len() as u64,
            },
        })?;
        self.retained.push(native);
        Ok(())
    }

    pub(crate) fn update_texture(
        &mut self,
        texture: &Texture,
        region: &TextureRegion,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        if data.is_empty() {
            return Ok(());
        }
        let native = texture.native()?;
        let native = Arc::clone(native.vulkan()?);
        self.end_render_pass()?;
        let src = self.stage(data)?;
        self.record(VkCommand::CopyBufferToImage {
            src,
            dst: native.image,
            region: vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect_mask(native.format),
                    mip_level: region.mip_level,
                    base_array_layer: region.array_layer,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D {
                    x: region.x as i32,
                    y: region.y as i32,
                    z: 0,
                },
                image_extent: vk::Extent3D {
                    width: region.width,
                    height: region.height,
                    depth: 1,
                },
            },
        })?;
        self.retained.push(native);
        Ok(())
    }

    pub(crate) fn clear_color_target(&mut self, index: u32, color: RgbaFloat) -> Result<(), GraphicsError> {
        self.ensure_render_pass()?;
        self.record(VkCommand::ClearColorAttachment {
            attachment: index,
            color: color.to_array(),
        })
    }

    pub(crate) fn clear_depth_target(&mut self, depth: f32, stencil: u8) -> Result<(), GraphicsError> {
        if !self
            .framebuffer
            .as_ref()
            .is_some_and(|framebuffer| framebuffer.has_depth())
        {
            return Err(GraphicsError::state("framebuffer has no depth target"));
        }
        self.ensure_render_pass()?;
        self.record(VkCommand::ClearDepthStencilAttachment {
            depth,
            stencil: u32::from(stencil),
        })
    }

    pub(crate) fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.ensure_render_pass()?;
        self.bind_pending_sets()?;
        self.record(VkCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        })
    }

    pub(crate) fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.ensure_render_pass()?;
        self.bind_pending_sets()?;
        self.record(VkCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        })
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        self.clear_bindings();
        // Destroying the pool frees the current command buffer with it.
        self.shared.release(DeferredResource::CommandPool(self.pool));
    }
}
