//! Replays recorded command entries against the context.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GraphicsError;
use crate::types::{IndexFormat, ScissorRect, Viewport};

use super::context::GlContext;
use super::conversion::convert_index_format;
use super::entries::{CommandEntry, CommandEntryList, GlBinding};
use super::gl::{self, GLuint};
use super::{OpenGlPipeline, SCRATCH_TEXTURE_UNIT, UNITS_PER_SET, check_error};

/// Replay state for one `execute_commands` call.
///
/// Vertex attributes are resolved lazily at draw time because the pipeline
/// and the vertex buffers can be bound in either order.
pub(crate) struct OpenGlCommandExecutor<'a> {
    context: &'a mut GlContext,
    texture_storage: bool,
    generation: u64,
    framebuffer_height: Option<u32>,
    pipeline: Option<Arc<OpenGlPipeline>>,
    vertex_buffers: HashMap<u32, GLuint>,
    index_format: Option<IndexFormat>,
    attributes_dirty: bool,
}

impl<'a> OpenGlCommandExecutor<'a> {
    pub(crate) fn new(context: &'a mut GlContext, texture_storage: bool, generation: u64) -> Self {
        Self {
            context,
            texture_storage,
            generation,
            framebuffer_height: None,
            pipeline: None,
            vertex_buffers: HashMap::new(),
            index_format: None,
            attributes_dirty: true,
        }
    }

    pub(crate) fn execute(mut self, entries: &CommandEntryList) -> Result<(), GraphicsError> {
        log::trace!("OpenGlCommandExecutor: replaying {} entries", entries.len());
        for entry in entries.iter() {
            self.execute_entry(entry)?;
            check_error(self.context, entry.name())?;
        }
        Ok(())
    }

    fn execute_entry(&mut self, entry: &CommandEntry) -> Result<(), GraphicsError> {
        match entry {
            CommandEntry::Empty => {}
            CommandEntry::SetFramebuffer {
                framebuffer,
                height,
            } => {
                let framebuffer = framebuffer.as_ref().ok_or_else(released)?;
                framebuffer.bind(self.context, self.texture_storage, self.generation)?;
                self.framebuffer_height = Some(*height);
            }
            CommandEntry::SetViewport(viewport) => self.set_viewport(viewport)?,
            CommandEntry::SetScissorRect(rect) => self.set_scissor_rect(rect)?,
            CommandEntry::SetVertexBuffer { slot, buffer } => {
                let buffer = buffer.as_ref().ok_or_else(released)?;
                let name = buffer.materialize(self.context)?;
                self.vertex_buffers.insert(*slot, name);
                self.attributes_dirty = true;
            }
            CommandEntry::SetIndexBuffer { buffer, format } => {
                let buffer = buffer.as_ref().ok_or_else(released)?;
                let name = buffer.materialize(self.context)?;
                self.context.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, name);
                self.index_format = Some(*format);
            }
            CommandEntry::SetPipeline(pipeline) => {
                let pipeline = pipeline.as_ref().ok_or_else(released)?;
                self.set_pipeline(pipeline)?;
            }
            CommandEntry::SetResourceSet { slot, resources } => {
                self.set_resource_set(*slot, resources)?
            }
            CommandEntry::UpdateBuffer {
                buffer,
                offset,
                data,
            } => {
                let buffer = buffer.as_ref().ok_or_else(released)?;
                let name = buffer.materialize(self.context)?;
                self.context.bind_buffer(gl::ARRAY_BUFFER, name);
                self.context.buffer_sub_data(gl::ARRAY_BUFFER, *offset, data);
                // The array buffer binding feeds attribute setup.
                self.attributes_dirty = true;
            }
            CommandEntry::UpdateTexture {
                texture,
                region,
                data,
            } => {
                let texture = texture.as_ref().ok_or_else(released)?;
                let name = texture.materialize(self.context, self.texture_storage)?;
                let (target, zoffset) = texture.upload_target(region.array_layer);
                self.context
                    .active_texture(gl::TEXTURE0 + SCRATCH_TEXTURE_UNIT);
                self.context.bind_texture(texture.target, name);
                self.context.tex_sub_image(
                    target,
                    region.mip_level,
                    region.x,
                    region.y,
                    zoffset,
                    region.width,
                    region.height,
                    data,
                );
            }
            CommandEntry::ClearColorTarget { index, color } => {
                self.context.clear_buffer_color(*index, color.to_array())
            }
            CommandEntry::ClearDepthTarget { depth, stencil } => {
                self.context.clear_buffer_depth_stencil(*depth, *stencil)
            }
            CommandEntry::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => {
                let mode = self.prepare_draw()?;
                self.context.draw_arrays_instanced_base_instance(
                    mode,
                    *first_vertex,
                    *vertex_count,
                    *instance_count,
                    *first_instance,
                );
            }
            CommandEntry::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            } => {
                let mode = self.prepare_draw()?;
                let format = self
                    .index_format
                    .ok_or_else(|| GraphicsError::state("indexed draw without an index buffer"))?;
                self.context.draw_elements_instanced_base_vertex_base_instance(
                    mode,
                    *index_count,
                    convert_index_format(format),
                    u64::from(*first_index) * format.size(),
                    *instance_count,
                    *vertex_offset,
                    *first_instance,
                );
            }
        }
        Ok(())
    }

    fn framebuffer_height(&self) -> Result<u32, GraphicsError> {
        self.framebuffer_height
            .ok_or_else(|| GraphicsError::state("no framebuffer bound"))
    }

    /// GL's window origin is bottom-left.
    fn set_viewport(&mut self, viewport: &Viewport) -> Result<(), GraphicsError> {
        let y = viewport.flipped_y(self.framebuffer_height()?) as i32;
        self.context.viewport(
            viewport.x as i32,
            y,
            viewport.width as i32,
            viewport.height as i32,
        );
        self.context
            .depth_range(viewport.min_depth, viewport.max_depth);
        Ok(())
    }

    fn set_scissor_rect(&mut self, rect: &ScissorRect) -> Result<(), GraphicsError> {
        let y = rect.flipped_y(self.framebuffer_height()?);
        self.context
            .scissor(rect.x, y, rect.width as i32, rect.height as i32);
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: &Arc<OpenGlPipeline>) -> Result<(), GraphicsError> {
        let program = pipeline.materialize(self.context)?;
        self.context.use_program(program);

        let state = &pipeline.state;
        let context = &mut *self.context;
        toggle(context, gl::BLEND, state.blend_enabled);
        let [src_rgb, dst_rgb, src_alpha, dst_alpha] = state.blend_factors;
        context.blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha);
        context.blend_equation_separate(state.blend_equations[0], state.blend_equations[1]);
        context.blend_color(state.blend_color);

        toggle(context, gl::DEPTH_TEST, state.depth_test);
        context.depth_func(state.depth_func);
        context.depth_mask(state.depth_write);

        match state.cull_face {
            Some(face) => {
                context.enable(gl::CULL_FACE);
                context.cull_face(face);
            }
            None => context.disable(gl::CULL_FACE),
        }
        context.front_face(state.front_face);
        context.polygon_mode(gl::FRONT_AND_BACK, state.polygon_mode);
        toggle(context, gl::DEPTH_CLAMP, state.depth_clamp);
        toggle(context, gl::SCISSOR_TEST, state.scissor_test);

        self.pipeline = Some(Arc::clone(pipeline));
        self.attributes_dirty = true;
        Ok(())
    }

    /// Slot `n` owns texture units and uniform buffer indices
    /// `n * 16 .. n * 16 + 16`.
    fn set_resource_set(&mut self, slot: u32, resources: &[GlBinding]) -> Result<(), GraphicsError> {
        for (index, resource) in resources.iter().enumerate() {
            let unit = slot * UNITS_PER_SET + index as u32;
            match resource {
                GlBinding::UniformBuffer(buffer) => {
                    let name = buffer.materialize(self.context)?;
                    self.context
                        .bind_buffer_base(gl::UNIFORM_BUFFER, unit, name);
                }
                GlBinding::Texture(texture) => {
                    let name = texture.materialize(self.context, self.texture_storage)?;
                    self.context.active_texture(gl::TEXTURE0 + unit);
                    self.context.bind_texture(texture.target, name);
                }
                GlBinding::Sampler(sampler) => {
                    let name = sampler.materialize(self.context)?;
                    self.context.bind_sampler(unit, name);
                }
            }
        }
        Ok(())
    }

    /// Point vertex attributes at the bound buffers and return the draw mode.
    ///
    /// Attribute locations are assigned in order across all vertex layouts.
    fn prepare_draw(&mut self) -> Result<gl::GLenum, GraphicsError> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| GraphicsError::state("draw without a pipeline"))?;
        if self.attributes_dirty {
            let mut location = 0;
            for (slot, layout) in pipeline.vertex_layouts.iter().enumerate() {
                let buffer = self.vertex_buffers.get(&(slot as u32)).copied().ok_or_else(|| {
                    GraphicsError::state(format!("no vertex buffer bound at slot {slot}"))
                })?;
                self.context.bind_buffer(gl::ARRAY_BUFFER, buffer);
                for attribute in &layout.attributes {
                    self.context.vertex_attrib_pointer(
                        location,
                        attribute.size,
                        attribute.kind,
                        attribute.normalized,
                        layout.stride,
                        attribute.offset,
                    );
                    self.context.vertex_attrib_divisor(location, layout.divisor);
                    location += 1;
                }
            }
            self.attributes_dirty = false;
        }
        Ok(pipeline.state.mode)
    }
}

fn toggle(context: &mut GlContext, capability: gl::GLenum, enabled: bool) {
    if enabled {
        context.enable(capability);
    } else {
        context.disable(capability);
    }
}

fn released() -> GraphicsError {
    GraphicsError::state("command entry references a released resource")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::opengl::{OpenGlDevice, OpenGlFramebuffer};
    use crate::config::{BackendType, DeviceOptions};
    use crate::types::{BufferDescriptor, RgbaFloat};

    fn device(width: u32, height: u32) -> OpenGlDevice {
        OpenGlDevice::new(&DeviceOptions::new(BackendType::OpenGl).with_size(width, height))
            .unwrap()
    }

    fn default_framebuffer(device: &OpenGlDevice) -> Arc<OpenGlFramebuffer> {
        let (framebuffer, _) = device.create_swapchain_framebuffer(8, 6).unwrap();
        Arc::clone(framebuffer.opengl().unwrap())
    }

    fn replay(device: &OpenGlDevice, entries: &CommandEntryList) -> Result<(), GraphicsError> {
        let mut context = device.shared().context.lock();
        let generation = device.shared().swapchain_generation.load(std::sync::atomic::Ordering::Acquire);
        OpenGlCommandExecutor::new(&mut context, true, generation).execute(entries)
    }

    #[test]
    fn test_viewport_and_scissor_are_flipped() {
        let device = device(8, 6);
        let mut entries = CommandEntryList::new();
        entries.push(CommandEntry::SetFramebuffer {
            framebuffer: Some(default_framebuffer(&device)),
            height: 6,
        });
        entries.push(CommandEntry::SetViewport(
            Viewport::new(1.0, 1.0, 4.0, 2.0).with_depth_range(0.25, 0.75),
        ));
        entries.push(CommandEntry::SetScissorRect(ScissorRect::new(0, 0, 8, 1)));
        replay(&device, &entries).unwrap();

        let context = device.shared().context.lock();
        assert_eq!(context.viewport_state(), [1, 3, 4, 2]);
        assert_eq!(context.depth_range_state(), [0.25, 0.75]);
        assert_eq!(context.scissor_state(), [0, 5, 8, 1]);
    }

    #[test]
    fn test_viewport_requires_framebuffer() {
        let device = device(4, 4);
        let mut entries = CommandEntryList::new();
        entries.push(CommandEntry::SetViewport(Viewport::from_dimensions(4, 4)));
        assert!(matches!(
            replay(&device, &entries),
            Err(GraphicsError::InvalidState(_))
        ));
    }

    #[test]
    fn test_stale_default_framebuffer_fails() {
        let device = device(4, 4);
        let stale = default_framebuffer(&device);
        device.resize_swapchain(8, 8).unwrap();

        let mut entries = CommandEntryList::new();
        entries.push(CommandEntry::SetFramebuffer {
            framebuffer: Some(stale),
            height: 4,
        });
        assert!(matches!(
            replay(&device, &entries),
            Err(GraphicsError::InvalidState(_))
        ));
    }

    #[test]
    fn test_clear_default_framebuffer() {
        let device = device(2, 2);
        let mut entries = CommandEntryList::new();
        entries.push(CommandEntry::SetFramebuffer {
            framebuffer: Some(default_framebuffer(&device)),
            height: 2,
        });
        entries.push(CommandEntry::ClearColorTarget {
            index: 0,
            color: RgbaFloat::RED,
        });
        replay(&device, &entries).unwrap();

        let context = device.shared().context.lock();
        assert_eq!(context.log.clears, 1);
        // BGRA8
        assert_eq!(&context.read_default_color()[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_buffer_update_materializes_buffer() {
        let device = device(2, 2);
        let buffer = device
            .shared()
            .create_buffer(&BufferDescriptor::uniform(8))
            .unwrap();
        let native = Arc::clone(buffer.opengl().unwrap());

        let mut entries = CommandEntryList::new();
        entries.push_update_buffer(Arc::clone(&native), 4, &[1, 2, 3, 4]);
        replay(&device, &entries).unwrap();

        let name = native.object.name().unwrap();
        let mut context = device.shared().context.lock();
        assert_eq!(
            context.get_buffer_sub_data(name, 0, 8),
            vec![0, 0, 0, 0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_draw_without_pipeline_fails() {
        let device = device(2, 2);
        let mut entries = CommandEntryList::new();
        entries.push(CommandEntry::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        });
        assert!(replay(&device, &entries).is_err());
    }
}
