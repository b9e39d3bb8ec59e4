//! Command recording.
//!
//! A [`CommandList`] validates every command against its own binding state
//! before forwarding it to the backend recorder, so a backend only ever sees
//! well-formed command streams.
//!
//! ```text
//!            begin / reset                      end / execute
//! (new) ─► Recording ───────────────────────────────► Executable
//!              ▲                                          │
//!              └────────────── begin / reset ─────────────┘
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::backend::{GpuCommandList, dispatch};
use crate::config::BackendType;
use crate::error::GraphicsError;
use crate::resources::{Buffer, Framebuffer, Pipeline, ResourceLayout, ResourceSet, Texture};
use crate::types::{
    BufferUsage, IndexFormat, OutputDescription, RgbaFloat, ScissorRect, TextureRegion, Viewport,
};
use crate::validation::{self, check_backend};

/// Recording state of a [`CommandList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListState {
    /// Commands may be recorded.
    Recording,
    /// Recording has ended; the list can be executed once.
    Executable,
}

/// What the bound framebuffer offers to clears and draws.
#[derive(Debug, Clone)]
struct FramebufferBinding {
    outputs: OutputDescription,
    width: u32,
    height: u32,
}

/// What the bound pipeline requires from the other bindings.
#[derive(Debug, Clone)]
struct PipelineBinding {
    outputs: OutputDescription,
    vertex_slots: u32,
    resource_layouts: Vec<Arc<ResourceLayout>>,
}

#[derive(Debug, Default)]
struct Bindings {
    framebuffer: Option<FramebufferBinding>,
    pipeline: Option<PipelineBinding>,
    vertex_buffers: BTreeSet<u32>,
    index_buffer: bool,
    resource_sets: BTreeMap<u32, Arc<ResourceLayout>>,
}

/// A sequence of rendering commands for one backend.
///
/// Lists are created by [`ResourceFactory::create_command_list`] in the
/// `Recording` state. Binding state persists across draws until it is
/// overwritten or the list is reset.
///
/// # Thread Safety
///
/// `CommandList` is `Send`: lists may be recorded on worker threads. OpenGL
/// lists execute on the context thread only; Direct3D 11 lists record and
/// execute on the thread that created the device.
///
/// [`ResourceFactory::create_command_list`]: crate::ResourceFactory::create_command_list
pub struct CommandList {
    native: GpuCommandList,
    state: CommandListState,
    /// Set by execution, cleared by `begin`/`reset`.
    executed: bool,
    bindings: Bindings,
}

impl CommandList {
    pub(crate) fn new(native: GpuCommandList) -> Self {
        Self {
            native,
            state: CommandListState::Recording,
            executed: false,
            bindings: Bindings::default(),
        }
    }

    /// The backend this list records for.
    pub fn backend_type(&self) -> BackendType {
        self.native.backend()
    }

    /// Current recording state.
    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// Discard everything recorded and start recording again.
    pub fn begin(&mut self) -> Result<(), GraphicsError> {
        dispatch!(GpuCommandList, &mut self.native, list => list.begin())?;
        self.restart();
        Ok(())
    }

    /// Discard everything recorded and return to an empty `Recording` state.
    pub fn reset(&mut self) -> Result<(), GraphicsError> {
        dispatch!(GpuCommandList, &mut self.native, list => list.reset())?;
        self.restart();
        Ok(())
    }

    fn restart(&mut self) {
        self.state = CommandListState::Recording;
        self.executed = false;
        self.bindings = Bindings::default();
    }

    /// Finish recording.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidState`] if the list is not recording.
    pub fn end(&mut self) -> Result<(), GraphicsError> {
        self.check_recording("end")?;
        dispatch!(GpuCommandList, &mut self.native, list => list.end())?;
        self.state = CommandListState::Executable;
        Ok(())
    }

    fn check_recording(&self, operation: &str) -> Result<(), GraphicsError> {
        match self.state {
            CommandListState::Recording => Ok(()),
            CommandListState::Executable => Err(GraphicsError::state(format!(
                "{operation}: command list is not recording; call begin or reset first"
            ))),
        }
    }

    /// Prepare the list for execution, ending it if it is still recording.
    pub(crate) fn prepare_execution(&mut self) -> Result<&mut GpuCommandList, GraphicsError> {
        if self.executed {
            return Err(GraphicsError::state(
                "command list was already executed; call begin or reset to record again",
            ));
        }
        if self.state == CommandListState::Recording {
            self.end()?;
        }
        Ok(&mut self.native)
    }

    pub(crate) fn mark_executed(&mut self) {
        self.executed = true;
    }

    fn check_backend(&self, found: BackendType) -> Result<(), GraphicsError> {
        check_backend(self.backend_type(), found)
    }

    pub fn set_framebuffer(&mut self, framebuffer: &Framebuffer) -> Result<(), GraphicsError> {
        self.check_recording("set_framebuffer")?;
        self.check_backend(framebuffer.native()?.backend())?;
        dispatch!(GpuCommandList, &mut self.native, list => list.set_framebuffer(framebuffer))?;
        self.bindings.framebuffer = Some(FramebufferBinding {
            outputs: framebuffer.outputs().clone(),
            width: framebuffer.width(),
            height: framebuffer.height(),
        });
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) -> Result<(), GraphicsError> {
        self.check_recording("set_viewport")?;
        if !(viewport.width > 0.0 && viewport.height > 0.0) {
            return Err(GraphicsError::invalid(format!(
                "viewport extent {}x{} must be positive",
                viewport.width, viewport.height
            )));
        }
        dispatch!(GpuCommandList, &mut self.native, list => list.set_viewport(viewport))
    }

    /// Set the viewport to cover the whole bound framebuffer.
    pub fn set_full_viewport(&mut self) -> Result<(), GraphicsError> {
        let (width, height) = self
            .bindings
            .framebuffer
            .as_ref()
            .map(|framebuffer| (framebuffer.width, framebuffer.height))
            .ok_or_else(|| GraphicsError::state("set_full_viewport: no framebuffer is bound"))?;
        self.set_viewport(&Viewport::from_dimensions(width, height))
    }

    pub fn set_scissor_rect(&mut self, rect: &ScissorRect) -> Result<(), GraphicsError> {
        self.check_recording("set_scissor_rect")?;
        dispatch!(GpuCommandList, &mut self.native, list => list.set_scissor_rect(rect))
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<(), GraphicsError> {
        self.check_recording("set_vertex_buffer")?;
        self.check_backend(buffer.backend())?;
        if !buffer.usage().contains(BufferUsage::VERTEX) {
            return Err(GraphicsError::invalid(format!(
                "buffer {} bound to vertex slot {slot} lacks VERTEX usage",
                buffer.id()
            )));
        }
        dispatch!(GpuCommandList, &mut self.native, list => list.set_vertex_buffer(slot, buffer))?;
        self.bindings.vertex_buffers.insert(slot);
        Ok(())
    }

    pub fn set_index_buffer(
        &mut self,
        buffer: &Buffer,
        format: IndexFormat,
    ) -> Result<(), GraphicsError> {
        self.check_recording("set_index_buffer")?;
        self.check_backend(buffer.backend())?;
        if !buffer.usage().contains(BufferUsage::INDEX) {
            return Err(GraphicsError::invalid(format!(
                "buffer {} lacks INDEX usage",
                buffer.id()
            )));
        }
        dispatch!(GpuCommandList, &mut self.native, list => list.set_index_buffer(buffer, format))?;
        self.bindings.index_buffer = true;
        Ok(())
    }

    pub fn set_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), GraphicsError> {
        self.check_recording("set_pipeline")?;
        self.check_backend(pipeline.native()?.backend())?;
        dispatch!(GpuCommandList, &mut self.native, list => list.set_pipeline(pipeline))?;
        self.bindings.pipeline = Some(PipelineBinding {
            outputs: pipeline.outputs().clone(),
            vertex_slots: pipeline.vertex_layouts().len() as u32,
            resource_layouts: pipeline.resource_layouts().to_vec(),
        });
        Ok(())
    }

    /// Bind a resource set to `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::ResourceDisposed`] if the set or any of its
    /// resources is gone.
    pub fn set_resource_set(&mut self, slot: u32, set: &ResourceSet) -> Result<(), GraphicsError> {
        self.check_recording("set_resource_set")?;
        validation::resource_set_slot(slot)?;
        self.check_backend(set.native()?.backend())?;
        set.resolve()?;
        dispatch!(GpuCommandList, &mut self.native, list => list.set_resource_set(slot, set))?;
        self.bindings
            .resource_sets
            .insert(slot, Arc::clone(set.layout()));
        Ok(())
    }

    /// Copy `data` into `buffer` at `offset` when the list executes.
    pub fn update_buffer(
        &mut self,
        buffer: &Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.check_recording("update_buffer")?;
        self.check_backend(buffer.backend())?;
        validation::buffer_update(buffer, offset, data.len())?;
        dispatch!(GpuCommandList, &mut self.native, list => list.update_buffer(buffer, offset, data))
    }

    /// Typed convenience over [`update_buffer`](Self::update_buffer).
    pub fn update_buffer_typed<T: bytemuck::Pod>(
        &mut self,
        buffer: &Buffer,
        offset: u64,
        data: &[T],
    ) -> Result<(), GraphicsError> {
        self.update_buffer(buffer, offset, bytemuck::cast_slice(data))
    }

    /// Replace the texels of `region`. `data` must hold exactly the region's
    /// bytes, tightly packed.
    pub fn update_texture(
        &mut self,
        texture: &Texture,
        region: &TextureRegion,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.check_recording("update_texture")?;
        self.check_backend(texture.backend())?;
        validation::texture_update(texture, region, data.len())?;
        dispatch!(GpuCommandList, &mut self.native, list => list.update_texture(texture, region, data))
    }

    pub fn clear_color_target(&mut self, index: u32, color: RgbaFloat) -> Result<(), GraphicsError> {
        self.check_recording("clear_color_target")?;
        let framebuffer = self.bound_framebuffer("clear_color_target")?;
        let count = framebuffer.outputs.color_formats.len();
        if index as usize >= count {
            return Err(GraphicsError::OutOfBounds(format!(
                "color target {index} of a framebuffer with {count}"
            )));
        }
        dispatch!(GpuCommandList, &mut self.native, list => list.clear_color_target(index, color))
    }

    pub fn clear_depth_target(&mut self, depth: f32, stencil: u8) -> Result<(), GraphicsError> {
        self.check_recording("clear_depth_target")?;
        if self.bound_framebuffer("clear_depth_target")?.outputs.depth_format.is_none() {
            return Err(GraphicsError::state(
                "clear_depth_target: bound framebuffer has no depth target",
            ));
        }
        dispatch!(GpuCommandList, &mut self.native, list => list.clear_depth_target(depth, stencil))
    }

    fn bound_framebuffer(&self, operation: &str) -> Result<&FramebufferBinding, GraphicsError> {
        self.bindings
            .framebuffer
            .as_ref()
            .ok_or_else(|| GraphicsError::state(format!("{operation}: no framebuffer is bound")))
    }

    /// Check that the bindings satisfy the bound pipeline.
    fn check_draw(&self, operation: &str, indexed: bool) -> Result<(), GraphicsError> {
        self.check_recording(operation)?;
        let framebuffer = self.bound_framebuffer(operation)?;
        let pipeline = self
            .bindings
            .pipeline
            .as_ref()
            .ok_or_else(|| GraphicsError::state(format!("{operation}: no pipeline is bound")))?;
        if pipeline.outputs != framebuffer.outputs {
            return Err(GraphicsError::state(format!(
                "{operation}: pipeline outputs {:?} differ from framebuffer outputs {:?}",
                pipeline.outputs, framebuffer.outputs
            )));
        }
        if let Some(slot) =
            (0..pipeline.vertex_slots).find(|slot| !self.bindings.vertex_buffers.contains(slot))
        {
            return Err(GraphicsError::state(format!(
                "{operation}: no vertex buffer bound to slot {slot}"
            )));
        }
        if indexed && !self.bindings.index_buffer {
            return Err(GraphicsError::state(format!("{operation}: no index buffer is bound")));
        }
        for (slot, expected) in pipeline.resource_layouts.iter().enumerate() {
            let bound = self.bindings.resource_sets.get(&(slot as u32)).ok_or_else(|| {
                GraphicsError::state(format!("{operation}: no resource set bound to slot {slot}"))
            })?;
            if !expected.is_compatible(bound) {
                return Err(GraphicsError::state(format!(
                    "{operation}: resource set at slot {slot} does not match the pipeline layout"
                )));
            }
        }
        Ok(())
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.check_draw("draw", false)?;
        dispatch!(GpuCommandList, &mut self.native, list => {
            list.draw(vertex_count, instance_count, first_vertex, first_instance)
        })
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.check_draw("draw_indexed", true)?;
        dispatch!(GpuCommandList, &mut self.native, list => {
            list.draw_indexed(index_count, instance_count, first_index, vertex_offset, first_instance)
        })
    }
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("backend", &self.backend_type())
            .field("state", &self.state)
            .field("executed", &self.executed)
            .finish()
    }
}

static_assertions::assert_impl_all!(CommandList: Send);
