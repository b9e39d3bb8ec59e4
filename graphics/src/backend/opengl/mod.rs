//! OpenGL backend: deferred replay on the context thread.
//!
//! A GL context is current on exactly one thread, the one that created the
//! device. Factories and command lists may live on any thread, so:
//!
//! - factories only *declare* native objects; each is created the first time
//!   replay (or a readback) needs it, see [`LazyGlObject`];
//! - command lists record [`CommandEntry`] values into a pooled arena, and
//!   [`OpenGlCommandExecutor`] replays them when the list is executed on the
//!   context thread;
//! - dropping a materialized native object sends its name over a channel
//!   that the context thread drains on `swap_buffers` and `wait_for_idle`.
//!
//! The swapchain is the context's default framebuffer. Viewports and scissor
//! rectangles are flipped to GL's bottom-left origin during replay.

mod context;
mod conversion;
mod entries;
mod executor;
mod gl;
mod lazy;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};

use crate::backend::{
    DeviceFeatures, GpuBuffer, GpuCommandList, GpuFramebuffer, GpuPipeline, GpuResourceLayout,
    GpuResourceSet, GpuSampler, GpuShader, GpuTexture,
};
use crate::config::DeviceOptions;
use crate::device::DeviceStatistics;
use crate::driver::DrawCall;
use crate::error::{GraphicsError, NativeError};
use crate::resources::{
    BindingResource, Buffer, Framebuffer, FramebufferDescriptor, Pipeline, PipelineDescriptor,
    ResourceLayout, ResourceSet, Texture,
};
use crate::types::{
    BufferDescriptor, BufferUsage, IndexFormat, PixelFormat, ResourceKind,
    ResourceLayoutDescriptor, RgbaFloat, SamplerDescriptor, ScissorRect, ShaderDescriptor,
    TextureDescriptor, TextureKind, TextureRegion, Viewport, mip_extent,
};

use self::context::{GlContext, GlDebugMessage};
use self::conversion::{
    GlFormat, convert_address_mode, convert_blend_factor, convert_blend_function,
    convert_comparison, convert_cull_mode, convert_fill_mode, convert_front_face,
    convert_mag_filter, convert_min_filter, convert_pixel_format, convert_shader_stage,
    convert_topology, convert_vertex_format,
};
use self::entries::{CommandEntry, CommandEntryList, GlBinding};
use self::executor::OpenGlCommandExecutor;
use self::gl::GLenum;
use self::lazy::LazyGlObject;

/// Texture and uniform buffer units reserved per resource set slot.
const UNITS_PER_SET: u32 = 16;

/// Texture unit used for uploads, kept clear of resource set bindings.
const SCRATCH_TEXTURE_UNIT: u32 = 79;

/// Turn the context's sticky error flag into a result.
fn check_error(context: &mut GlContext, operation: &'static str) -> Result<(), GraphicsError> {
    match context.get_error() {
        gl::NO_ERROR => Ok(()),
        code => Err(GraphicsError::native(operation, NativeError::OpenGl(code))),
    }
}

/// `KHR_debug` callback forwarding driver messages to `log`.
fn log_debug_message(message: &GlDebugMessage) {
    let kind = match message.kind {
        gl::DEBUG_TYPE_ERROR => "Error",
        gl::DEBUG_TYPE_PERFORMANCE => "Performance",
        _ => "Other",
    };
    match message.severity {
        gl::DEBUG_SEVERITY_HIGH => log::error!("[OpenGL {kind}] {}", message.message),
        gl::DEBUG_SEVERITY_MEDIUM => log::warn!("[OpenGL {kind}] {}", message.message),
        gl::DEBUG_SEVERITY_LOW => log::info!("[OpenGL {kind}] {}", message.message),
        _ => log::debug!("[OpenGL {kind}] {}", message.message),
    }
}

/// A GL object whose last owner was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlDisposal {
    Buffer(u32),
    Texture(u32),
    Sampler(u32),
    Shader(u32),
    Program(u32),
    Framebuffer(u32),
}

impl GlDisposal {
    fn destroy(self, context: &mut GlContext) {
        match self {
            Self::Buffer(name) => context.delete_buffer(name),
            Self::Texture(name) => context.delete_texture(name),
            Self::Sampler(name) => context.delete_sampler(name),
            Self::Shader(name) => context.delete_shader(name),
            Self::Program(name) => context.delete_program(name),
            Self::Framebuffer(name) => context.delete_framebuffer(name),
        }
    }
}

/// State shared by the device, the factory and every native object.
pub(crate) struct OpenGlShared {
    context: Mutex<GlContext>,
    owner: ThreadId,
    disposal_sender: Sender<GlDisposal>,
    disposal_receiver: Receiver<GlDisposal>,
    texture_storage: bool,
    features: DeviceFeatures,
    /// Bumped by every resize; default framebuffer natives remember the value
    /// they were created with.
    swapchain_generation: AtomicU64,
}

impl OpenGlShared {
    /// Lock the context from its owning thread.
    fn lock_context(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, GlContext>, GraphicsError> {
        if thread::current().id() != self.owner {
            return Err(GraphicsError::WrongThread(operation));
        }
        Ok(self.context.lock())
    }

    fn dispose(&self, disposal: GlDisposal) {
        if self.disposal_sender.send(disposal).is_err() {
            log::warn!("OpenGlShared: disposal queue closed, leaking {disposal:?}");
        }
    }

    /// Destroy everything queued for disposal. Runs on the context thread.
    fn flush_disposals(&self, context: &mut GlContext) -> usize {
        let mut count = 0;
        for disposal in self.disposal_receiver.try_iter() {
            disposal.destroy(context);
            count += 1;
        }
        if count > 0 {
            log::trace!("OpenGlShared: destroyed {count} queued objects");
        }
        count
    }

    pub(crate) fn features(&self) -> DeviceFeatures {
        self.features
    }

    pub(crate) fn create_buffer(
        self: &Arc<Self>,
        descriptor: &BufferDescriptor,
    ) -> Result<GpuBuffer, GraphicsError> {
        let usage = if descriptor.usage.contains(BufferUsage::DYNAMIC) {
            gl::DYNAMIC_DRAW
        } else {
            gl::STATIC_DRAW
        };
        Ok(GpuBuffer::OpenGl(Arc::new(OpenGlBuffer {
            shared: Arc::clone(self),
            object: LazyGlObject::new(),
            size: descriptor.size,
            usage,
        })))
    }

    pub(crate) fn create_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
        kind: TextureKind,
    ) -> Result<GpuTexture, GraphicsError> {
        let (target, layers) = match (kind, descriptor.array_layers) {
            (TextureKind::Texture2D, 1) => (gl::TEXTURE_2D, 1),
            (TextureKind::Texture2D, layers) => (gl::TEXTURE_2D_ARRAY, layers),
            (TextureKind::Cube, 1) => (gl::TEXTURE_CUBE_MAP, 6),
            (TextureKind::Cube, cubes) => (gl::TEXTURE_CUBE_MAP_ARRAY, cubes * 6),
        };
        Ok(GpuTexture::OpenGl(Arc::new(OpenGlTexture {
            shared: Arc::clone(self),
            object: LazyGlObject::new(),
            target,
            format: convert_pixel_format(descriptor.format),
            width: descriptor.width,
            height: descriptor.height,
            mip_levels: descriptor.mip_levels,
            layers,
        })))
    }

    pub(crate) fn create_sampler(
        self: &Arc<Self>,
        descriptor: &SamplerDescriptor,
    ) -> Result<GpuSampler, GraphicsError> {
        let mut parameters = vec![
            (gl::TEXTURE_WRAP_S, convert_address_mode(descriptor.address_mode_u) as f32),
            (gl::TEXTURE_WRAP_T, convert_address_mode(descriptor.address_mode_v) as f32),
            (gl::TEXTURE_WRAP_R, convert_address_mode(descriptor.address_mode_w) as f32),
            (
                gl::TEXTURE_MIN_FILTER,
                convert_min_filter(descriptor.min_filter, descriptor.mipmap_filter) as f32,
            ),
            (gl::TEXTURE_MAG_FILTER, convert_mag_filter(descriptor.mag_filter) as f32),
            (gl::TEXTURE_MIN_LOD, descriptor.lod_min_clamp),
            (gl::TEXTURE_MAX_LOD, descriptor.lod_max_clamp),
        ];
        if let Some(compare) = descriptor.compare {
            parameters.push((gl::TEXTURE_COMPARE_MODE, gl::COMPARE_REF_TO_TEXTURE as f32));
            parameters.push((gl::TEXTURE_COMPARE_FUNC, convert_comparison(compare) as f32));
        }
        if descriptor.is_anisotropic() {
            parameters.push((gl::TEXTURE_MAX_ANISOTROPY_EXT, descriptor.max_anisotropy as f32));
        }
        Ok(GpuSampler::OpenGl(Arc::new(OpenGlSampler {
            shared: Arc::clone(self),
            object: LazyGlObject::new(),
            parameters,
        })))
    }

    pub(crate) fn create_shader(
        self: &Arc<Self>,
        descriptor: &ShaderDescriptor,
    ) -> Result<GpuShader, GraphicsError> {
        let source = std::str::from_utf8(&descriptor.bytecode)
            .map_err(|_| GraphicsError::invalid("OpenGL shader source must be UTF-8 GLSL"))?;
        Ok(GpuShader::OpenGl(Arc::new(OpenGlShader {
            shared: Arc::clone(self),
            object: LazyGlObject::new(),
            kind: convert_shader_stage(descriptor.stage),
            source: source.to_string(),
        })))
    }

    pub(crate) fn create_resource_layout(
        self: &Arc<Self>,
        descriptor: &ResourceLayoutDescriptor,
    ) -> Result<GpuResourceLayout, GraphicsError> {
        Ok(GpuResourceLayout::OpenGl(Arc::new(OpenGlResourceLayout {
            kinds: descriptor.kinds().collect(),
        })))
    }

    pub(crate) fn create_resource_set(
        self: &Arc<Self>,
        layout: &ResourceLayout,
        _resources: &[BindingResource],
    ) -> Result<GpuResourceSet, GraphicsError> {
        let layout = Arc::clone(layout.native()?.opengl()?);
        Ok(GpuResourceSet::OpenGl(Arc::new(OpenGlResourceSet { layout })))
    }

    pub(crate) fn create_pipeline(
        self: &Arc<Self>,
        descriptor: &PipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError> {
        let mut shaders = Vec::with_capacity(descriptor.shader_set.shaders.len());
        for shader in &descriptor.shader_set.shaders {
            let native = shader.native()?;
            shaders.push(Arc::clone(native.opengl()?));
        }

        let vertex_layouts = descriptor
            .shader_set
            .vertex_layouts
            .iter()
            .map(|layout| GlVertexLayout {
                stride: layout.stride,
                divisor: layout.instance_step_rate,
                attributes: layout
                    .elements
                    .iter()
                    .zip(layout.offsets())
                    .map(|(element, offset)| {
                        let (size, kind, normalized) = convert_vertex_format(element.format);
                        GlVertexAttribute {
                            size,
                            kind,
                            normalized,
                            offset,
                        }
                    })
                    .collect(),
            })
            .collect();

        let blend = descriptor.blend_state.attachments.first().copied().unwrap_or_default();
        let depth = &descriptor.depth_stencil_state;
        let raster = &descriptor.rasterizer_state;
        let state = GlPipelineState {
            blend_enabled: blend.enabled,
            blend_factors: [
                convert_blend_factor(blend.source_color),
                convert_blend_factor(blend.destination_color),
                convert_blend_factor(blend.source_alpha),
                convert_blend_factor(blend.destination_alpha),
            ],
            blend_equations: [
                convert_blend_function(blend.color_function),
                convert_blend_function(blend.alpha_function),
            ],
            blend_color: descriptor.blend_state.blend_factor.to_array(),
            depth_test: depth.depth_test_enabled,
            depth_write: depth.depth_write_enabled,
            depth_func: convert_comparison(depth.comparison),
            cull_face: convert_cull_mode(raster.cull_mode),
            front_face: convert_front_face(raster.front_face),
            polygon_mode: convert_fill_mode(raster.fill_mode),
            depth_clamp: !raster.depth_clip_enabled,
            scissor_test: raster.scissor_test_enabled,
            mode: convert_topology(descriptor.primitive_topology),
        };

        Ok(GpuPipeline::OpenGl(Arc::new(OpenGlPipeline {
            shared: Arc::clone(self),
            program: LazyGlObject::new(),
            shaders,
            vertex_layouts,
            state,
        })))
    }

    pub(crate) fn create_framebuffer(
        self: &Arc<Self>,
        descriptor: &FramebufferDescriptor,
    ) -> Result<GpuFramebuffer, GraphicsError> {
        let mut colors = Vec::with_capacity(descriptor.color_targets.len());
        for target in &descriptor.color_targets {
            let native = target.texture.native()?;
            colors.push(GlAttachment {
                texture: Arc::clone(native.opengl()?),
                mip_level: target.mip_level,
                array_layer: target.array_layer,
            });
        }
        let depth = match &descriptor.depth_target {
            Some(target) => {
                let native = target.texture.native()?;
                Some(GlAttachment {
                    texture: Arc::clone(native.opengl()?),
                    mip_level: target.mip_level,
                    array_layer: target.array_layer,
                })
            }
            None => None,
        };
        let has_stencil = descriptor
            .depth_target
            .as_ref()
            .is_some_and(|target| target.texture.format().has_stencil());
        Ok(GpuFramebuffer::OpenGl(Arc::new(OpenGlFramebuffer {
            shared: Arc::clone(self),
            target: GlFramebufferTarget::Offscreen {
                object: LazyGlObject::new(),
                colors,
                depth,
                has_stencil,
            },
        })))
    }

    pub(crate) fn create_command_list(self: &Arc<Self>) -> Result<GpuCommandList, GraphicsError> {
        Ok(GpuCommandList::OpenGl(OpenGlCommandList::new(Arc::clone(self))))
    }
}

// ============================================================================
// Native objects
// ============================================================================

/// Queue the object's name for deletion if it was ever created.
macro_rules! dispose_on_drop {
    ($name:ident, $field:ident => $disposal:ident) => {
        impl Drop for $name {
            fn drop(&mut self) {
                if let Some(name) = self.$field.take() {
                    self.shared.dispose(GlDisposal::$disposal(name));
                }
            }
        }
    };
}

pub(crate) struct OpenGlBuffer {
    shared: Arc<OpenGlShared>,
    object: LazyGlObject,
    size: u64,
    usage: GLenum,
}

impl OpenGlBuffer {
    fn materialize(&self, context: &mut GlContext) -> Result<u32, GraphicsError> {
        self.object.ensure_created(|| {
            let name = context.gen_buffer();
            context.bind_buffer(gl::ARRAY_BUFFER, name);
            context.buffer_data(gl::ARRAY_BUFFER, self.size, None, self.usage);
            check_error(context, "glBufferData").inspect_err(|_| context.delete_buffer(name))?;
            Ok(name)
        })
    }
}

dispose_on_drop!(OpenGlBuffer, object => Buffer);

pub(crate) struct OpenGlTexture {
    shared: Arc<OpenGlShared>,
    object: LazyGlObject,
    target: GLenum,
    format: GlFormat,
    width: u32,
    height: u32,
    mip_levels: u32,
    /// Native array layers (six per cube).
    layers: u32,
}

impl OpenGlTexture {
    fn materialize(
        &self,
        context: &mut GlContext,
        texture_storage: bool,
    ) -> Result<u32, GraphicsError> {
        self.object.ensure_created(|| {
            let GlFormat {
                internal, format, ..
            } = self.format;
            let name = context.gen_texture();
            context.active_texture(gl::TEXTURE0 + SCRATCH_TEXTURE_UNIT);
            context.bind_texture(self.target, name);
            if texture_storage {
                context.tex_storage(
                    self.target,
                    self.mip_levels,
                    internal,
                    format,
                    self.width,
                    self.height,
                    self.layers,
                );
            } else {
                for level in 0..self.mip_levels {
                    let (width, height) = mip_extent(self.width, self.height, level);
                    if self.target == gl::TEXTURE_CUBE_MAP {
                        for face in 0..6 {
                            let target = gl::TEXTURE_CUBE_MAP_POSITIVE_X + face;
                            context.tex_image(target, level, internal, format, width, height, 1);
                        }
                    } else {
                        context.tex_image(
                            self.target,
                            level,
                            internal,
                            format,
                            width,
                            height,
                            self.layers,
                        );
                    }
                }
            }
            check_error(context, "glTexStorage").inspect_err(|_| context.delete_texture(name))?;
            Ok(name)
        })
    }

    /// Target and z offset of a `glTexSubImage` call for one array layer.
    fn upload_target(&self, layer: u32) -> (GLenum, u32) {
        match self.target {
            gl::TEXTURE_2D => (gl::TEXTURE_2D, 0),
            gl::TEXTURE_CUBE_MAP => (gl::TEXTURE_CUBE_MAP_POSITIVE_X + layer, 0),
            target => (target, layer),
        }
    }
}

dispose_on_drop!(OpenGlTexture, object => Texture);

pub(crate) struct OpenGlSampler {
    shared: Arc<OpenGlShared>,
    object: LazyGlObject,
    parameters: Vec<(GLenum, f32)>,
}

impl OpenGlSampler {
    fn materialize(&self, context: &mut GlContext) -> Result<u32, GraphicsError> {
        self.object.ensure_created(|| {
            let name = context.gen_sampler();
            for (pname, value) in &self.parameters {
                context.sampler_parameter(name, *pname, *value);
            }
            check_error(context, "glSamplerParameter")
                .inspect_err(|_| context.delete_sampler(name))?;
            Ok(name)
        })
    }
}

dispose_on_drop!(OpenGlSampler, object => Sampler);

pub(crate) struct OpenGlShader {
    shared: Arc<OpenGlShared>,
    object: LazyGlObject,
    kind: GLenum,
    source: String,
}

impl OpenGlShader {
    fn materialize(&self, context: &mut GlContext) -> Result<u32, GraphicsError> {
        self.object.ensure_created(|| {
            let name = context.create_shader(self.kind);
            check_error(context, "glCreateShader")?;
            context.shader_source(name, &self.source);
            context.compile_shader(name);
            let (compiled, info_log) = context.shader_status(name);
            if !compiled {
                context.delete_shader(name);
                return Err(GraphicsError::state(format!(
                    "GLSL compilation failed: {info_log}"
                )));
            }
            Ok(name)
        })
    }
}

dispose_on_drop!(OpenGlShader, object => Shader);

pub(crate) struct OpenGlResourceLayout {
    kinds: Vec<ResourceKind>,
}

pub(crate) struct OpenGlResourceSet {
    layout: Arc<OpenGlResourceLayout>,
}

#[derive(Debug, Clone, Copy)]
struct GlVertexAttribute {
    size: i32,
    kind: GLenum,
    normalized: bool,
    offset: u32,
}

#[derive(Debug, Clone)]
struct GlVertexLayout {
    stride: u32,
    divisor: u32,
    attributes: Vec<GlVertexAttribute>,
}

/// Fixed-function state applied when a pipeline is bound.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GlPipelineState {
    blend_enabled: bool,
    blend_factors: [GLenum; 4],
    blend_equations: [GLenum; 2],
    blend_color: [f32; 4],
    depth_test: bool,
    depth_write: bool,
    depth_func: GLenum,
    cull_face: Option<GLenum>,
    front_face: GLenum,
    polygon_mode: GLenum,
    depth_clamp: bool,
    scissor_test: bool,
    mode: GLenum,
}

pub(crate) struct OpenGlPipeline {
    shared: Arc<OpenGlShared>,
    program: LazyGlObject,
    shaders: Vec<Arc<OpenGlShader>>,
    vertex_layouts: Vec<GlVertexLayout>,
    state: GlPipelineState,
}

impl OpenGlPipeline {
    fn materialize(&self, context: &mut GlContext) -> Result<u32, GraphicsError> {
        self.program.ensure_created(|| {
            let mut shader_names = Vec::with_capacity(self.shaders.len());
            for shader in &self.shaders {
                shader_names.push(shader.materialize(context)?);
            }
            let name = context.create_program();
            for shader in shader_names {
                context.attach_shader(name, shader);
            }
            context.link_program(name);
            if !context.program_linked(name) {
                context.delete_program(name);
                return Err(GraphicsError::state("GLSL program failed to link"));
            }
            check_error(context, "glLinkProgram")?;
            Ok(name)
        })
    }
}

dispose_on_drop!(OpenGlPipeline, program => Program);

struct GlAttachment {
    texture: Arc<OpenGlTexture>,
    mip_level: u32,
    array_layer: u32,
}

enum GlFramebufferTarget {
    /// The context's default framebuffer as of one swapchain generation.
    Default { generation: u64 },
    Offscreen {
        object: LazyGlObject,
        colors: Vec<GlAttachment>,
        depth: Option<GlAttachment>,
        has_stencil: bool,
    },
}

pub(crate) struct OpenGlFramebuffer {
    shared: Arc<OpenGlShared>,
    target: GlFramebufferTarget,
}

impl OpenGlFramebuffer {
    /// Bind the framebuffer for drawing, creating it if needed.
    fn bind(
        &self,
        context: &mut GlContext,
        texture_storage: bool,
        generation: u64,
    ) -> Result<(), GraphicsError> {
        let (object, colors, depth, has_stencil) = match &self.target {
            GlFramebufferTarget::Default {
                generation: captured,
            } => {
                if *captured != generation {
                    return Err(GraphicsError::state(
                        "swapchain framebuffer was recorded before a resize",
                    ));
                }
                context.bind_framebuffer(gl::FRAMEBUFFER, 0);
                return Ok(());
            }
            GlFramebufferTarget::Offscreen {
                object,
                colors,
                depth,
                has_stencil,
            } => (object, colors, depth, *has_stencil),
        };

        let name = object.ensure_created(|| {
            let mut attachments = Vec::with_capacity(colors.len() + 1);
            for (index, color) in colors.iter().enumerate() {
                let texture = color.texture.materialize(context, texture_storage)?;
                attachments.push((gl::COLOR_ATTACHMENT0 + index as u32, texture, color));
            }
            if let Some(depth) = depth {
                let texture = depth.texture.materialize(context, texture_storage)?;
                let point = if has_stencil {
                    gl::DEPTH_STENCIL_ATTACHMENT
                } else {
                    gl::DEPTH_ATTACHMENT
                };
                attachments.push((point, texture, depth));
            }

            let name = context.gen_framebuffer();
            context.bind_framebuffer(gl::FRAMEBUFFER, name);
            for (point, texture, attachment) in attachments {
                context.framebuffer_texture_layer(
                    point,
                    texture,
                    attachment.mip_level,
                    attachment.array_layer,
                );
            }
            let status = context.check_framebuffer_status(gl::FRAMEBUFFER);
            if status != gl::FRAMEBUFFER_COMPLETE {
                context.delete_framebuffer(name);
                return Err(GraphicsError::state(format!(
                    "framebuffer incomplete (status 0x{status:04X})"
                )));
            }
            check_error(context, "glFramebufferTextureLayer")?;
            Ok(name)
        })?;
        context.bind_framebuffer(gl::FRAMEBUFFER, name);
        Ok(())
    }
}

impl Drop for OpenGlFramebuffer {
    fn drop(&mut self) {
        if let GlFramebufferTarget::Offscreen { object, .. } = &self.target
            && let Some(name) = object.take()
        {
            self.shared.dispose(GlDisposal::Framebuffer(name));
        }
    }
}

// ============================================================================
// Command list
// ============================================================================

/// A command list recording pooled entries for replay on the context thread.
///
/// Recording never touches the context, so lists can be filled on any thread.
pub(crate) struct OpenGlCommandList {
    shared: Arc<OpenGlShared>,
    entries: CommandEntryList,
}

impl OpenGlCommandList {
    fn new(shared: Arc<OpenGlShared>) -> Self {
        Self {
            shared,
            entries: CommandEntryList::new(),
        }
    }

    pub(crate) fn begin(&mut self) -> Result<(), GraphicsError> {
        self.entries.clear_references();
        Ok(())
    }

    pub(crate) fn end(&mut self) -> Result<(), GraphicsError> {
        Ok(())
    }

    pub(crate) fn reset(&mut self) -> Result<(), GraphicsError> {
        self.entries.clear_references();
        Ok(())
    }

    /// Number of recorded entries awaiting replay.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn set_framebuffer(&mut self, framebuffer: &Framebuffer) -> Result<(), GraphicsError> {
        let native = framebuffer.native()?;
        self.entries.push(CommandEntry::SetFramebuffer {
            framebuffer: Some(Arc::clone(native.opengl()?)),
            height: framebuffer.height(),
        });
        Ok(())
    }

    pub(crate) fn set_viewport(&mut self, viewport: &Viewport) -> Result<(), GraphicsError> {
        self.entries.push(CommandEntry::SetViewport(*viewport));
        Ok(())
    }

    pub(crate) fn set_scissor_rect(&mut self, rect: &ScissorRect) -> Result<(), GraphicsError> {
        self.entries.push(CommandEntry::SetScissorRect(*rect));
        Ok(())
    }

    pub(crate) fn set_vertex_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<(), GraphicsError> {
        let native = buffer.native()?;
        self.entries.push(CommandEntry::SetVertexBuffer {
            slot,
            buffer: Some(Arc::clone(native.opengl()?)),
        });
        Ok(())
    }

    pub(crate) fn set_index_buffer(
        &mut self,
        buffer: &Buffer,
        format: IndexFormat,
    ) -> Result<(), GraphicsError> {
        let native = buffer.native()?;
        self.entries.push(CommandEntry::SetIndexBuffer {
            buffer: Some(Arc::clone(native.opengl()?)),
            format,
        });
        Ok(())
    }

    pub(crate) fn set_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), GraphicsError> {
        let native = pipeline.native()?;
        self.entries
            .push(CommandEntry::SetPipeline(Some(Arc::clone(native.opengl()?))));
        Ok(())
    }

    pub(crate) fn set_resource_set(&mut self, slot: u32, set: &ResourceSet) -> Result<(), GraphicsError> {
        let units_end = slot
            .checked_add(1)
            .and_then(|sets| sets.checked_mul(UNITS_PER_SET));
        if units_end.is_none_or(|end| end > SCRATCH_TEXTURE_UNIT) {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "resource set slot {slot} exceeds the available texture units"
            )));
        }
        let native = set.native()?;
        let layout = Arc::clone(&native.opengl()?.layout);
        let resources = set.resolve()?;

        let mut bindings = Vec::with_capacity(resources.len());
        for (index, (resource, kind)) in resources.iter().zip(&layout.kinds).enumerate() {
            if resource.kind() != *kind {
                return Err(GraphicsError::ResourceSetMismatch {
                    slot: index,
                    expected: *kind,
                    found: resource.kind(),
                });
            }
            let binding = match resource {
                BindingResource::UniformBuffer(buffer) => {
                    GlBinding::UniformBuffer(Arc::clone(buffer.native()?.opengl()?))
                }
                BindingResource::Texture(texture) => {
                    GlBinding::Texture(Arc::clone(texture.native()?.opengl()?))
                }
                BindingResource::Sampler(sampler) => {
                    GlBinding::Sampler(Arc::clone(sampler.native()?.opengl()?))
                }
            };
            bindings.push(binding);
        }
        self.entries.push_resource_set(slot, bindings);
        Ok(())
    }

    pub(crate) fn update_buffer(
        &mut self,
        buffer: &Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let native = buffer.native()?;
        self.entries
            .push_update_buffer(Arc::clone(native.opengl()?), offset, data);
        Ok(())
    }

    pub(crate) fn update_texture(
        &mut self,
        texture: &Texture,
        region: &TextureRegion,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let native = texture.native()?;
        self.entries
            .push_update_texture(Arc::clone(native.opengl()?), *region, data);
        Ok(())
    }

    pub(crate) fn clear_color_target(
        &mut self,
        index: u32,
        color: RgbaFloat,
    ) -> Result<(), GraphicsError> {
        self.entries
            .push(CommandEntry::ClearColorTarget { index, color });
        Ok(())
    }

    pub(crate) fn clear_depth_target(&mut self, depth: f32, stencil: u8) -> Result<(), GraphicsError> {
        self.entries
            .push(CommandEntry::ClearDepthTarget { depth, stencil });
        Ok(())
    }

    fn check_first_instance(&self, first_instance: u32) -> Result<(), GraphicsError> {
        if first_instance != 0 && !self.shared.features.base_instance {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "first_instance {first_instance} requires {}",
                gl::ARB_BASE_INSTANCE
            )));
        }
        Ok(())
    }

    pub(crate) fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.check_first_instance(first_instance)?;
        self.entries.push(CommandEntry::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
        Ok(())
    }

    pub(crate) fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.check_first_instance(first_instance)?;
        self.entries.push(CommandEntry::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
        Ok(())
    }
}

// ============================================================================
// Device
// ============================================================================

/// The OpenGL device: the context, its default framebuffer and the disposal
/// queue.
pub(crate) struct OpenGlDevice {
    shared: Arc<OpenGlShared>,
    vertex_array: u32,
    swapchain_format: PixelFormat,
}

impl OpenGlDevice {
    pub(crate) fn new(options: &DeviceOptions) -> Result<Self, GraphicsError> {
        let mut context = GlContext::new(
            options.width,
            options.height,
            options.swapchain_format,
            options.swapchain_depth_format,
            &options.masked_extensions,
        );
        let extensions = context.extensions();
        let has = |name: &str| extensions.iter().any(|extension| extension == name);

        let debug_output = options.debug && (has(gl::KHR_DEBUG) || has(gl::ARB_DEBUG_OUTPUT));
        if options.debug && !debug_output {
            log::warn!(
                "OpenGlDevice: debug output requested but neither {} nor {} is available",
                gl::KHR_DEBUG,
                gl::ARB_DEBUG_OUTPUT
            );
        }
        let features = DeviceFeatures {
            geometry_shader: true,
            tessellation_shaders: has(gl::ARB_TESSELLATION_SHADER),
            texture_compression_bc: has(gl::EXT_TEXTURE_COMPRESSION_S3TC),
            base_instance: has(gl::ARB_BASE_INSTANCE),
            debug_output,
            sampler_anisotropy: has(gl::EXT_TEXTURE_FILTER_ANISOTROPIC),
        };
        let texture_storage = has(gl::ARB_TEXTURE_STORAGE);
        log::debug!(
            "OpenGlDevice: {} extensions, texture_storage={texture_storage}, {features:?}",
            extensions.len()
        );

        if debug_output {
            context.enable(gl::DEBUG_OUTPUT);
            context.debug_message_callback(Some(Box::new(log_debug_message)));
        }
        context.enable(gl::TEXTURE_CUBE_MAP_SEAMLESS);
        let vertex_array = context.gen_vertex_array();
        context.bind_vertex_array(vertex_array);
        check_error(&mut context, "glBindVertexArray")?;

        let (disposal_sender, disposal_receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(OpenGlShared {
            context: Mutex::new(context),
            owner: thread::current().id(),
            disposal_sender,
            disposal_receiver,
            texture_storage,
            features,
            swapchain_generation: AtomicU64::new(0),
        });
        Ok(Self {
            shared,
            vertex_array,
            swapchain_format: options.swapchain_format,
        })
    }

    pub(crate) fn shared(&self) -> &Arc<OpenGlShared> {
        &self.shared
    }

    /// The default framebuffer; there is a single presentable image.
    pub(crate) fn create_swapchain_framebuffer(
        &self,
        width: u32,
        height: u32,
    ) -> Result<(GpuFramebuffer, u32), GraphicsError> {
        let generation = self.shared.swapchain_generation.load(Ordering::Acquire);
        log::debug!(
            "OpenGlDevice: default framebuffer {width}x{height} ({:?}), generation {generation}",
            self.swapchain_format
        );
        let framebuffer = OpenGlFramebuffer {
            shared: Arc::clone(&self.shared),
            target: GlFramebufferTarget::Default { generation },
        };
        Ok((GpuFramebuffer::OpenGl(Arc::new(framebuffer)), 0))
    }

    /// Replay the list on the context thread.
    ///
    /// The list's references are released whether or not replay succeeds.
    pub(crate) fn execute_commands(
        &self,
        list: &mut OpenGlCommandList,
    ) -> Result<(), GraphicsError> {
        let result = self
            .shared
            .lock_context("OpenGlDevice::execute_commands")
            .and_then(|mut context| {
                let generation = self.shared.swapchain_generation.load(Ordering::Acquire);
                OpenGlCommandExecutor::new(&mut context, self.shared.texture_storage, generation)
                    .execute(&list.entries)?;
                context.log.submissions += 1;
                Ok(())
            });
        // The context guard is gone; dropping references may queue disposals.
        list.entries.clear_references();
        result
    }

    pub(crate) fn swap_buffers(&self) -> Result<u32, GraphicsError> {
        let mut context = self.shared.lock_context("SwapBuffers")?;
        self.shared.flush_disposals(&mut context);
        context.swap_buffers();
        check_error(&mut context, "SwapBuffers")?;
        Ok(0)
    }

    pub(crate) fn wait_for_idle(&self) -> Result<(), GraphicsError> {
        let mut context = self.shared.lock_context("glFinish")?;
        self.shared.flush_disposals(&mut context);
        check_error(&mut context, "glFinish")
    }

    /// The default framebuffer belongs to the context thread.
    pub(crate) fn check_resize(&self) -> Result<(), GraphicsError> {
        self.shared
            .lock_context("ResizeDefaultFramebuffer")
            .map(drop)
    }

    /// Resize the default framebuffer. Framebuffer natives from earlier
    /// generations fail to replay afterwards.
    pub(crate) fn resize_swapchain(
        &self,
        width: u32,
        height: u32,
    ) -> Result<(GpuFramebuffer, u32), GraphicsError> {
        {
            let mut context = self.shared.lock_context("ResizeDefaultFramebuffer")?;
            self.shared.flush_disposals(&mut context);
            context.resize_default_framebuffer(width, height);
        }
        self.shared
            .swapchain_generation
            .fetch_add(1, Ordering::AcqRel);
        self.create_swapchain_framebuffer(width, height)
    }

    pub(crate) fn read_buffer(&self, buffer: &Buffer) -> Result<Vec<u8>, GraphicsError> {
        let native = buffer.native()?;
        let target = Arc::clone(native.opengl()?);
        let mut context = self.shared.lock_context("glGetNamedBufferSubData")?;
        let name = target.materialize(&mut context)?;
        let bytes = context.get_buffer_sub_data(name, 0, target.size);
        check_error(&mut context, "glGetNamedBufferSubData")?;
        Ok(bytes)
    }

    pub(crate) fn read_texture(
        &self,
        texture: &Texture,
        region: &TextureRegion,
    ) -> Result<Vec<u8>, GraphicsError> {
        let native = texture.native()?;
        let target = Arc::clone(native.opengl()?);
        let mut context = self.shared.lock_context("glGetTextureSubImage")?;
        let name = target.materialize(&mut context, self.shared.texture_storage)?;
        let pixels = context.get_texture_sub_image(
            name,
            region.mip_level,
            region.x,
            region.y,
            region.array_layer,
            region.width,
            region.height,
        );
        check_error(&mut context, "glGetTextureSubImage")?;
        Ok(pixels)
    }

    pub(crate) fn take_draw_calls(&self) -> Vec<DrawCall> {
        self.shared.context.lock().log.take_draws()
    }

    pub(crate) fn statistics(&self) -> DeviceStatistics {
        let context = self.shared.context.lock();
        DeviceStatistics::from_driver(
            &context.log,
            context.counts(),
            self.shared.disposal_receiver.len(),
        )
    }
}

impl Drop for OpenGlDevice {
    fn drop(&mut self) {
        match self.shared.lock_context("OpenGlDevice::drop") {
            Ok(mut context) => {
                self.shared.flush_disposals(&mut context);
                context.delete_vertex_array(self.vertex_array);
            }
            Err(_) => log::warn!(
                "OpenGlDevice: dropped off the context thread, {} queued disposals leaked",
                self.shared.disposal_receiver.len()
            ),
        }
        log::debug!("OpenGlDevice: destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> OpenGlDevice {
        OpenGlDevice::new(&DeviceOptions::new(crate::config::BackendType::OpenGl).with_size(4, 4))
            .unwrap()
    }

    #[test]
    fn test_objects_are_declared_until_replay() {
        let device = device();
        let buffer = device
            .shared()
            .create_buffer(&BufferDescriptor::vertex(64))
            .unwrap();
        assert_eq!(device.statistics().objects_created, 1); // vertex array

        let native = Arc::clone(buffer.opengl().unwrap());
        let name = native.materialize(&mut device.shared.context.lock()).unwrap();
        assert_eq!(native.object.name(), Some(name));
        assert_eq!(device.statistics().objects_created, 2);
    }

    #[test]
    fn test_disposal_is_queued_until_swap() {
        let device = device();
        let buffer = device
            .shared()
            .create_buffer(&BufferDescriptor::vertex(16))
            .unwrap();
        let native = Arc::clone(buffer.opengl().unwrap());
        native.materialize(&mut device.shared.context.lock()).unwrap();
        drop(native);

        std::thread::spawn(move || drop(buffer)).join().unwrap();
        assert_eq!(device.statistics().pending_destructions, 1);

        device.swap_buffers().unwrap();
        let stats = device.statistics();
        assert_eq!(stats.pending_destructions, 0);
        assert_eq!(stats.objects_destroyed, 1);
    }

    #[test]
    fn test_context_calls_require_owner_thread() {
        let device = Arc::new(device());
        let remote = Arc::clone(&device);
        let result = std::thread::spawn(move || remote.swap_buffers()).join().unwrap();
        assert_eq!(result, Err(GraphicsError::WrongThread("SwapBuffers")));
    }

    #[test]
    fn test_execution_off_thread_releases_references() {
        let device = Arc::new(device());
        let buffer = device
            .shared()
            .create_buffer(&BufferDescriptor::vertex(16))
            .unwrap();
        let buffer = Buffer::new(BufferDescriptor::vertex(16), buffer);
        let native = Arc::clone(buffer.native().unwrap().opengl().unwrap());
        let baseline = Arc::strong_count(&native);

        let mut list = OpenGlCommandList::new(Arc::clone(device.shared()));
        list.update_buffer(&buffer, 0, &[1; 16]).unwrap();
        assert_eq!(Arc::strong_count(&native), baseline + 1);

        let remote = Arc::clone(&device);
        let result = std::thread::spawn(move || {
            let result = remote.execute_commands(&mut list);
            (result, list)
        })
        .join()
        .unwrap()
        .0;
        assert_eq!(
            result,
            Err(GraphicsError::WrongThread("OpenGlDevice::execute_commands"))
        );
        assert_eq!(Arc::strong_count(&native), baseline);
    }

    #[test]
    fn test_masked_base_instance_rejects_first_instance() {
        let options = DeviceOptions::new(crate::config::BackendType::OpenGl)
            .with_masked_extension(gl::ARB_BASE_INSTANCE);
        let device = OpenGlDevice::new(&options).unwrap();
        assert!(!device.shared().features().base_instance);

        let mut list = OpenGlCommandList::new(Arc::clone(device.shared()));
        assert!(matches!(
            list.draw(3, 1, 0, 1),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
        assert!(list.draw(3, 1, 0, 0).is_ok());
        assert_eq!(list.len(), 1);
    }
}
