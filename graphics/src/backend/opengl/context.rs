//! Headless OpenGL context.
//!
//! A single-threaded state machine with GL's object model: integer names per
//! object type, bind-to-edit, a sticky error flag read with `get_error`, and a
//! `KHR_debug` style callback. Name `0` of every object type is "no object";
//! framebuffer `0` is the default (window) framebuffer.

use std::collections::{HashMap, HashSet};

use crate::driver::{
    BufferMemory, DrawCall, DriverLog, ImageMemory, ObjectCounts, ObjectTable, encode_clear_color,
    encode_clear_depth,
};
use crate::types::{PixelFormat, RgbaFloat, max_mip_levels};

use super::conversion::{pixel_format_from_gl, topology_from_mode};
use super::gl::{self, GLenum, GLuint};

/// Extensions the context exposes unless masked.
const EXTENSIONS: [&str; 7] = [
    gl::ARB_DEBUG_OUTPUT,
    gl::KHR_DEBUG,
    gl::ARB_BASE_INSTANCE,
    gl::ARB_TEXTURE_STORAGE,
    gl::ARB_TESSELLATION_SHADER,
    gl::EXT_TEXTURE_COMPRESSION_S3TC,
    gl::EXT_TEXTURE_FILTER_ANISOTROPIC,
];

/// A message delivered to the debug callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlDebugMessage {
    pub source: GLenum,
    pub kind: GLenum,
    pub id: u32,
    pub severity: GLenum,
    pub message: String,
}

pub type DebugCallback = Box<dyn FnMut(&GlDebugMessage) + Send>;

#[derive(Debug)]
struct BufferObject {
    memory: Option<BufferMemory>,
}

#[derive(Debug)]
struct TextureObject {
    /// Target of the first bind; fixed afterwards.
    target: GLenum,
    internal: GLenum,
    immutable: bool,
    memory: Option<ImageMemory>,
}

#[derive(Debug, Default)]
struct SamplerObject {
    parameters: HashMap<GLenum, f32>,
}

#[derive(Debug)]
struct ShaderObject {
    kind: GLenum,
    source: String,
    compiled: bool,
    info_log: String,
}

#[derive(Debug, Default)]
struct ProgramObject {
    shaders: Vec<GLuint>,
    linked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attachment {
    texture: GLuint,
    level: u32,
    layer: u32,
}

#[derive(Debug, Default)]
struct FramebufferObject {
    colors: HashMap<u32, Attachment>,
    depth: Option<Attachment>,
}

#[derive(Debug)]
struct DefaultFramebuffer {
    color: ImageMemory,
    depth: Option<ImageMemory>,
}

/// Fixed-function state set by `glBlendFuncSeparate`, `glDepthFunc` and
/// friends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedFunctionState {
    pub blend_factors: [GLenum; 4],
    pub blend_equations: [GLenum; 2],
    pub blend_color: [f32; 4],
    pub depth_func: GLenum,
    pub depth_mask: bool,
    pub cull_face: GLenum,
    pub front_face: GLenum,
    pub polygon_mode: GLenum,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            blend_factors: [gl::ONE, gl::ZERO, gl::ONE, gl::ZERO],
            blend_equations: [gl::FUNC_ADD, gl::FUNC_ADD],
            blend_color: [0.0; 4],
            depth_func: gl::LESS,
            depth_mask: true,
            cull_face: gl::BACK,
            front_face: gl::CCW,
            polygon_mode: gl::FILL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct VertexAttrib {
    buffer: GLuint,
    divisor: u32,
}

#[derive(Debug, Default)]
struct ContextState {
    draw_framebuffer: GLuint,
    program: GLuint,
    array_buffer: GLuint,
    element_buffer: GLuint,
    vertex_attribs: HashMap<u32, VertexAttrib>,
    uniform_buffers: HashMap<u32, GLuint>,
    active_texture: u32,
    texture_units: HashMap<(u32, GLenum), GLuint>,
    sampler_units: HashMap<u32, GLuint>,
    capabilities: HashSet<GLenum>,
    viewport: [i32; 4],
    scissor: [i32; 4],
    depth_range: [f32; 2],
    fixed: FixedFunctionState,
}

/// The headless context.
pub struct GlContext {
    buffers: ObjectTable<BufferObject>,
    textures: ObjectTable<TextureObject>,
    samplers: ObjectTable<SamplerObject>,
    shaders: ObjectTable<ShaderObject>,
    programs: ObjectTable<ProgramObject>,
    framebuffers: ObjectTable<FramebufferObject>,
    vertex_arrays: ObjectTable<()>,
    default_framebuffer: DefaultFramebuffer,
    state: ContextState,
    error: GLenum,
    extensions: Vec<&'static str>,
    debug_callback: Option<DebugCallback>,
    pub log: DriverLog,
}

impl std::fmt::Debug for GlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlContext")
            .field("extensions", &self.extensions)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

fn name(handle: u64) -> GLuint {
    handle as GLuint
}

impl GlContext {
    /// Make a context current with a default framebuffer of the given size.
    pub fn new(
        width: u32,
        height: u32,
        color_format: PixelFormat,
        depth_format: Option<PixelFormat>,
        masked_extensions: &[String],
    ) -> Self {
        let extensions = EXTENSIONS
            .into_iter()
            .filter(|extension| !masked_extensions.iter().any(|masked| masked == extension))
            .collect();
        Self {
            buffers: ObjectTable::new(),
            textures: ObjectTable::new(),
            samplers: ObjectTable::new(),
            shaders: ObjectTable::new(),
            programs: ObjectTable::new(),
            framebuffers: ObjectTable::new(),
            vertex_arrays: ObjectTable::new(),
            default_framebuffer: DefaultFramebuffer {
                color: ImageMemory::new(color_format, width, height, 1, 1),
                depth: depth_format.map(|format| ImageMemory::new(format, width, height, 1, 1)),
            },
            state: ContextState {
                viewport: [0, 0, width as i32, height as i32],
                scissor: [0, 0, width as i32, height as i32],
                depth_range: [0.0, 1.0],
                ..Default::default()
            },
            error: gl::NO_ERROR,
            extensions,
            debug_callback: None,
            log: DriverLog::default(),
        }
    }

    // ========================================================================
    // Errors and debug output
    // ========================================================================

    fn set_error(&mut self, code: GLenum, message: &str) {
        if self.error == gl::NO_ERROR {
            self.error = code;
        }
        if self.state.capabilities.contains(&gl::DEBUG_OUTPUT)
            && let Some(callback) = &mut self.debug_callback
        {
            callback(&GlDebugMessage {
                source: gl::DEBUG_SOURCE_API,
                kind: gl::DEBUG_TYPE_ERROR,
                id: code,
                severity: gl::DEBUG_SEVERITY_HIGH,
                message: message.to_string(),
            });
        }
    }

    /// `glGetError`: return and clear the error flag.
    pub fn get_error(&mut self) -> GLenum {
        std::mem::replace(&mut self.error, gl::NO_ERROR)
    }

    /// `glDebugMessageCallback`.
    pub fn debug_message_callback(&mut self, callback: Option<DebugCallback>) {
        self.debug_callback = callback;
    }

    /// `glDebugMessageInsert`.
    pub fn debug_message_insert(&mut self, kind: GLenum, severity: GLenum, message: &str) {
        if self.state.capabilities.contains(&gl::DEBUG_OUTPUT)
            && let Some(callback) = &mut self.debug_callback
        {
            callback(&GlDebugMessage {
                source: gl::DEBUG_SOURCE_API,
                kind,
                id: 0,
                severity,
                message: message.to_string(),
            });
        }
    }

    /// `glGetStringi(GL_EXTENSIONS, i)` for every `i < GL_NUM_EXTENSIONS`.
    pub fn extensions(&self) -> Vec<String> {
        self.extensions.iter().map(|name| name.to_string()).collect()
    }

    pub fn enable(&mut self, capability: GLenum) {
        self.state.capabilities.insert(capability);
    }

    pub fn disable(&mut self, capability: GLenum) {
        self.state.capabilities.remove(&capability);
    }

    pub fn is_enabled(&self, capability: GLenum) -> bool {
        self.state.capabilities.contains(&capability)
    }

    pub fn counts(&self) -> ObjectCounts {
        [
            self.buffers.counts(),
            self.textures.counts(),
            self.samplers.counts(),
            self.shaders.counts(),
            self.programs.counts(),
            self.framebuffers.counts(),
            self.vertex_arrays.counts(),
        ]
        .into_iter()
        .sum()
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    pub fn gen_buffer(&mut self) -> GLuint {
        name(self.buffers.insert(BufferObject { memory: None }))
    }

    pub fn bind_buffer(&mut self, target: GLenum, buffer: GLuint) {
        if buffer != 0 && !self.buffers.contains(buffer as u64) {
            return self.set_error(gl::INVALID_VALUE, "glBindBuffer: unknown buffer name");
        }
        match target {
            gl::ARRAY_BUFFER => self.state.array_buffer = buffer,
            gl::ELEMENT_ARRAY_BUFFER => self.state.element_buffer = buffer,
            gl::UNIFORM_BUFFER => {}
            _ => self.set_error(gl::INVALID_ENUM, "glBindBuffer: invalid target"),
        }
    }

    fn bound_buffer(&self, target: GLenum) -> GLuint {
        match target {
            gl::ARRAY_BUFFER => self.state.array_buffer,
            gl::ELEMENT_ARRAY_BUFFER => self.state.element_buffer,
            _ => 0,
        }
    }

    /// `glBufferData` on the buffer bound to `target`.
    pub fn buffer_data(&mut self, target: GLenum, size: u64, data: Option<&[u8]>, _usage: GLenum) {
        let bound = self.bound_buffer(target);
        let Some(buffer) = self.buffers.get_mut(bound as u64) else {
            return self.set_error(gl::INVALID_OPERATION, "glBufferData: no buffer bound");
        };
        buffer.memory = Some(match data {
            Some(bytes) => BufferMemory::from_bytes(bytes),
            None => BufferMemory::new(size),
        });
    }

    /// `glBufferSubData` on the buffer bound to `target`.
    pub fn buffer_sub_data(&mut self, target: GLenum, offset: u64, data: &[u8]) {
        let bound = self.bound_buffer(target);
        let result = match self
            .buffers
            .get_mut(bound as u64)
            .and_then(|buffer| buffer.memory.as_mut())
        {
            Some(memory) => memory.write(offset, data).map_err(|_| gl::INVALID_VALUE),
            None => Err(gl::INVALID_OPERATION),
        };
        if let Err(code) = result {
            self.set_error(code, "glBufferSubData: invalid range or unallocated buffer");
        }
    }

    /// `glGetNamedBufferSubData`.
    pub fn get_buffer_sub_data(&mut self, buffer: GLuint, offset: u64, len: u64) -> Vec<u8> {
        let bytes = self
            .buffers
            .get(buffer as u64)
            .and_then(|object| object.memory.as_ref())
            .and_then(|memory| memory.read(offset, len).ok())
            .map(<[u8]>::to_vec);
        bytes.unwrap_or_else(|| {
            self.set_error(gl::INVALID_VALUE, "glGetNamedBufferSubData: invalid range");
            Vec::new()
        })
    }

    /// `glBindBufferBase`.
    pub fn bind_buffer_base(&mut self, target: GLenum, index: u32, buffer: GLuint) {
        if target != gl::UNIFORM_BUFFER {
            return self.set_error(gl::INVALID_ENUM, "glBindBufferBase: invalid target");
        }
        if !self.buffers.contains(buffer as u64) {
            return self.set_error(gl::INVALID_VALUE, "glBindBufferBase: unknown buffer name");
        }
        self.state.uniform_buffers.insert(index, buffer);
    }

    pub fn delete_buffer(&mut self, buffer: GLuint) {
        if self.buffers.remove(buffer as u64).is_some() {
            let state = &mut self.state;
            if state.array_buffer == buffer {
                state.array_buffer = 0;
            }
            if state.element_buffer == buffer {
                state.element_buffer = 0;
            }
            state.vertex_attribs.retain(|_, attrib| attrib.buffer != buffer);
            state.uniform_buffers.retain(|_, bound| *bound != buffer);
        }
    }

    // ========================================================================
    // Vertex arrays
    // ========================================================================

    pub fn gen_vertex_array(&mut self) -> GLuint {
        name(self.vertex_arrays.insert(()))
    }

    pub fn bind_vertex_array(&mut self, array: GLuint) {
        if !self.vertex_arrays.contains(array as u64) {
            self.set_error(gl::INVALID_OPERATION, "glBindVertexArray: unknown name");
        }
    }

    /// `glVertexAttribPointer`: source attribute `index` from the buffer
    /// currently bound to `GL_ARRAY_BUFFER`.
    pub fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        _kind: GLenum,
        _normalized: bool,
        _stride: u32,
        _offset: u32,
    ) {
        if !(1..=4).contains(&size) {
            return self.set_error(gl::INVALID_VALUE, "glVertexAttribPointer: invalid size");
        }
        if self.state.array_buffer == 0 {
            return self.set_error(gl::INVALID_OPERATION, "glVertexAttribPointer: no array buffer");
        }
        let buffer = self.state.array_buffer;
        self.state.vertex_attribs.entry(index).or_default().buffer = buffer;
    }

    /// `glVertexAttribDivisor`.
    pub fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        self.state.vertex_attribs.entry(index).or_default().divisor = divisor;
    }

    /// Buffer and divisor feeding attribute `index`.
    pub fn vertex_attrib(&self, index: u32) -> Option<(GLuint, u32)> {
        self.state
            .vertex_attribs
            .get(&index)
            .map(|attrib| (attrib.buffer, attrib.divisor))
    }

    pub fn delete_vertex_array(&mut self, array: GLuint) {
        self.vertex_arrays.remove(array as u64);
    }

    // ========================================================================
    // Textures
    // ========================================================================

    pub fn gen_texture(&mut self) -> GLuint {
        name(self.textures.insert(TextureObject {
            target: 0,
            internal: 0,
            immutable: false,
            memory: None,
        }))
    }

    /// `glActiveTexture`.
    pub fn active_texture(&mut self, unit: GLenum) {
        self.state.active_texture = unit - gl::TEXTURE0;
    }

    pub fn bind_texture(&mut self, target: GLenum, texture: GLuint) {
        if texture != 0 {
            let Some(object) = self.textures.get_mut(texture as u64) else {
                return self.set_error(gl::INVALID_VALUE, "glBindTexture: unknown texture name");
            };
            if object.target == 0 {
                object.target = target;
            } else if object.target != target {
                return self.set_error(gl::INVALID_OPERATION, "glBindTexture: target mismatch");
            }
        }
        self.state
            .texture_units
            .insert((self.state.active_texture, target), texture);
    }

    /// Texture bound to the target a texture call addresses, plus the array
    /// layer implied by a cube face target.
    fn texture_for(&self, target: GLenum) -> Option<(GLuint, u32)> {
        let face_targets = gl::TEXTURE_CUBE_MAP_POSITIVE_X..gl::TEXTURE_CUBE_MAP_POSITIVE_X + 6;
        let (bind_target, face) = if face_targets.contains(&target) {
            (gl::TEXTURE_CUBE_MAP, target - gl::TEXTURE_CUBE_MAP_POSITIVE_X)
        } else {
            (target, 0)
        };
        self.state
            .texture_units
            .get(&(self.state.active_texture, bind_target))
            .copied()
            .filter(|texture| *texture != 0)
            .map(|texture| (texture, face))
    }

    #[allow(clippy::too_many_arguments)]
    fn allocate_texture(
        &mut self,
        target: GLenum,
        levels: u32,
        internal: GLenum,
        format: GLenum,
        width: u32,
        height: u32,
        layers: u32,
        immutable: bool,
    ) {
        let Some((texture, _)) = self.texture_for(target) else {
            return self.set_error(gl::INVALID_OPERATION, "texture allocation: no texture bound");
        };
        let Some(pixel_format) = pixel_format_from_gl(internal, format) else {
            return self.set_error(gl::INVALID_ENUM, "texture allocation: unknown internal format");
        };
        let compressed = pixel_format.is_compressed();
        if compressed && !self.extensions.contains(&gl::EXT_TEXTURE_COMPRESSION_S3TC) {
            return self.set_error(gl::INVALID_ENUM, "S3TC formats are not supported");
        }
        if width == 0 || height == 0 || levels == 0 || layers == 0 {
            return self.set_error(gl::INVALID_VALUE, "texture allocation: empty texture");
        }
        let Some(object) = self.textures.get_mut(texture as u64) else {
            return;
        };
        if object.immutable {
            return self.set_error(gl::INVALID_OPERATION, "texture storage is immutable");
        }
        object.internal = internal;
        object.immutable = immutable;
        object.memory = Some(ImageMemory::new(pixel_format, width, height, levels, layers));
    }

    fn layer_count(target: GLenum, depth: u32) -> u32 {
        match target {
            gl::TEXTURE_CUBE_MAP => 6,
            gl::TEXTURE_2D_ARRAY | gl::TEXTURE_CUBE_MAP_ARRAY => depth,
            _ => 1,
        }
    }

    /// `glTexStorage2D` / `glTexStorage3D` (`GL_ARB_texture_storage`).
    #[allow(clippy::too_many_arguments)]
    pub fn tex_storage(
        &mut self,
        target: GLenum,
        levels: u32,
        internal: GLenum,
        format: GLenum,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        if !self.extensions.contains(&gl::ARB_TEXTURE_STORAGE) {
            return self.set_error(gl::INVALID_OPERATION, "glTexStorage: extension unavailable");
        }
        let layers = Self::layer_count(target, depth);
        self.allocate_texture(target, levels, internal, format, width, height, layers, true);
    }

    /// `glTexImage2D` / `glTexImage3D` with no data.
    ///
    /// The first call on a texture allocates the full mip chain; later calls
    /// for other levels or faces only check they fit.
    #[allow(clippy::too_many_arguments)]
    pub fn tex_image(
        &mut self,
        target: GLenum,
        level: u32,
        internal: GLenum,
        format: GLenum,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        let Some((texture, face)) = self.texture_for(target) else {
            return self.set_error(gl::INVALID_OPERATION, "glTexImage: no texture bound");
        };
        let allocated = self
            .textures
            .get(texture as u64)
            .is_some_and(|object| object.memory.is_some());
        if allocated {
            let fits = self
                .textures
                .get(texture as u64)
                .and_then(|object| object.memory.as_ref())
                .is_some_and(|memory| {
                    level < memory.mip_levels() && face < memory.array_layers()
                });
            if !fits {
                self.set_error(gl::INVALID_VALUE, "glTexImage: level out of range");
            }
            return;
        }
        if level != 0 {
            return self.set_error(gl::INVALID_OPERATION, "glTexImage: level 0 must come first");
        }
        let is_face = (gl::TEXTURE_CUBE_MAP_POSITIVE_X..gl::TEXTURE_CUBE_MAP_POSITIVE_X + 6)
            .contains(&target);
        let layers = if is_face {
            6
        } else {
            Self::layer_count(target, depth)
        };
        let levels = max_mip_levels(width, height);
        self.allocate_texture(target, levels, internal, format, width, height, layers, false);
    }

    /// `glTexSubImage2D` (2D and cube face targets) and `glTexSubImage3D`
    /// (array targets, `zoffset` selects the layer).
    #[allow(clippy::too_many_arguments)]
    pub fn tex_sub_image(
        &mut self,
        target: GLenum,
        level: u32,
        x: u32,
        y: u32,
        zoffset: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) {
        let Some((texture, face)) = self.texture_for(target) else {
            return self.set_error(gl::INVALID_OPERATION, "glTexSubImage: no texture bound");
        };
        let result = match self
            .textures
            .get_mut(texture as u64)
            .and_then(|object| object.memory.as_mut())
        {
            Some(memory) => memory
                .write_region(level, zoffset + face, x, y, width, height, data)
                .map_err(|_| gl::INVALID_VALUE),
            None => Err(gl::INVALID_OPERATION),
        };
        if let Err(code) = result {
            self.set_error(code, "glTexSubImage: region outside the texture");
        }
    }

    /// `glGetTextureSubImage`. `zoffset` is the layer (`cube * 6 + face` for
    /// cube textures).
    #[allow(clippy::too_many_arguments)]
    pub fn get_texture_sub_image(
        &mut self,
        texture: GLuint,
        level: u32,
        x: u32,
        y: u32,
        zoffset: u32,
        width: u32,
        height: u32,
    ) -> Vec<u8> {
        let pixels = self
            .textures
            .get(texture as u64)
            .and_then(|object| object.memory.as_ref())
            .and_then(|memory| memory.read_region(level, zoffset, x, y, width, height).ok());
        pixels.unwrap_or_else(|| {
            self.set_error(gl::INVALID_VALUE, "glGetTextureSubImage: invalid region");
            Vec::new()
        })
    }

    pub fn delete_texture(&mut self, texture: GLuint) {
        if self.textures.remove(texture as u64).is_some() {
            self.state.texture_units.retain(|_, bound| *bound != texture);
            for framebuffer in self.framebuffers.values_mut() {
                framebuffer.colors.retain(|_, attachment| attachment.texture != texture);
                if framebuffer.depth.is_some_and(|depth| depth.texture == texture) {
                    framebuffer.depth = None;
                }
            }
        }
    }

    // ========================================================================
    // Samplers
    // ========================================================================

    pub fn gen_sampler(&mut self) -> GLuint {
        name(self.samplers.insert(SamplerObject::default()))
    }

    /// `glSamplerParameteri` / `glSamplerParameterf`.
    pub fn sampler_parameter(&mut self, sampler: GLuint, pname: GLenum, value: f32) {
        if pname == gl::TEXTURE_MAX_ANISOTROPY_EXT
            && !self.extensions.contains(&gl::EXT_TEXTURE_FILTER_ANISOTROPIC)
        {
            return self.set_error(gl::INVALID_ENUM, "glSamplerParameter: anisotropy unavailable");
        }
        match self.samplers.get_mut(sampler as u64) {
            Some(object) => {
                object.parameters.insert(pname, value);
            }
            None => self.set_error(gl::INVALID_VALUE, "glSamplerParameter: unknown sampler"),
        }
    }

    pub fn bind_sampler(&mut self, unit: u32, sampler: GLuint) {
        if sampler != 0 && !self.samplers.contains(sampler as u64) {
            return self.set_error(gl::INVALID_VALUE, "glBindSampler: unknown sampler");
        }
        self.state.sampler_units.insert(unit, sampler);
    }

    pub fn delete_sampler(&mut self, sampler: GLuint) {
        if self.samplers.remove(sampler as u64).is_some() {
            self.state.sampler_units.retain(|_, bound| *bound != sampler);
        }
    }

    // ========================================================================
    // Shaders and programs
    // ========================================================================

    pub fn create_shader(&mut self, kind: GLenum) -> GLuint {
        if matches!(kind, gl::TESS_CONTROL_SHADER | gl::TESS_EVALUATION_SHADER)
            && !self.extensions.contains(&gl::ARB_TESSELLATION_SHADER)
        {
            self.set_error(gl::INVALID_ENUM, "glCreateShader: tessellation unavailable");
            return 0;
        }
        name(self.shaders.insert(ShaderObject {
            kind,
            source: String::new(),
            compiled: false,
            info_log: String::new(),
        }))
    }

    pub fn shader_source(&mut self, shader: GLuint, source: &str) {
        match self.shaders.get_mut(shader as u64) {
            Some(object) => object.source = source.to_string(),
            None => self.set_error(gl::INVALID_VALUE, "glShaderSource: unknown shader"),
        }
    }

    /// `glCompileShader`. A source without a `main` function fails to compile.
    pub fn compile_shader(&mut self, shader: GLuint) {
        let Some(object) = self.shaders.get_mut(shader as u64) else {
            return self.set_error(gl::INVALID_VALUE, "glCompileShader: unknown shader");
        };
        object.compiled = object.source.contains("main");
        object.info_log = if object.compiled {
            String::new()
        } else {
            "error: no function main() defined".to_string()
        };
    }

    /// `GL_COMPILE_STATUS` and the info log.
    pub fn shader_status(&self, shader: GLuint) -> (bool, String) {
        self.shaders
            .get(shader as u64)
            .map_or((false, String::new()), |object| {
                (object.compiled, object.info_log.clone())
            })
    }

    pub fn delete_shader(&mut self, shader: GLuint) {
        self.shaders.remove(shader as u64);
    }

    pub fn create_program(&mut self) -> GLuint {
        name(self.programs.insert(ProgramObject::default()))
    }

    pub fn attach_shader(&mut self, program: GLuint, shader: GLuint) {
        if !self.shaders.contains(shader as u64) {
            return self.set_error(gl::INVALID_VALUE, "glAttachShader: unknown shader");
        }
        match self.programs.get_mut(program as u64) {
            Some(object) => object.shaders.push(shader),
            None => self.set_error(gl::INVALID_VALUE, "glAttachShader: unknown program"),
        }
    }

    /// `glLinkProgram`: needs a compiled vertex shader and every attached
    /// shader compiled.
    pub fn link_program(&mut self, program: GLuint) {
        let Some(object) = self.programs.get(program as u64) else {
            return self.set_error(gl::INVALID_VALUE, "glLinkProgram: unknown program");
        };
        let shaders: Vec<&ShaderObject> = object
            .shaders
            .iter()
            .filter_map(|shader| self.shaders.get(*shader as u64))
            .collect();
        let linked = shaders.iter().all(|shader| shader.compiled)
            && shaders.iter().any(|shader| shader.kind == gl::VERTEX_SHADER);
        if let Some(object) = self.programs.get_mut(program as u64) {
            object.linked = linked;
        }
    }

    pub fn program_linked(&self, program: GLuint) -> bool {
        self.programs
            .get(program as u64)
            .is_some_and(|object| object.linked)
    }

    pub fn use_program(&mut self, program: GLuint) {
        if program != 0 && !self.program_linked(program) {
            return self.set_error(gl::INVALID_OPERATION, "glUseProgram: program not linked");
        }
        self.state.program = program;
    }

    pub fn delete_program(&mut self, program: GLuint) {
        if self.programs.remove(program as u64).is_some() && self.state.program == program {
            self.state.program = 0;
        }
    }

    // ========================================================================
    // Framebuffers
    // ========================================================================

    pub fn gen_framebuffer(&mut self) -> GLuint {
        name(self.framebuffers.insert(FramebufferObject::default()))
    }

    pub fn bind_framebuffer(&mut self, target: GLenum, framebuffer: GLuint) {
        if target != gl::FRAMEBUFFER {
            return self.set_error(gl::INVALID_ENUM, "glBindFramebuffer: invalid target");
        }
        if framebuffer != 0 && !self.framebuffers.contains(framebuffer as u64) {
            return self.set_error(gl::INVALID_OPERATION, "glBindFramebuffer: unknown name");
        }
        self.state.draw_framebuffer = framebuffer;
    }

    /// `glFramebufferTextureLayer` on the bound framebuffer.
    pub fn framebuffer_texture_layer(
        &mut self,
        attachment: GLenum,
        texture: GLuint,
        level: u32,
        layer: u32,
    ) {
        let fits = self
            .textures
            .get(texture as u64)
            .and_then(|object| object.memory.as_ref())
            .is_some_and(|memory| level < memory.mip_levels() && layer < memory.array_layers());
        if !fits {
            return self.set_error(gl::INVALID_VALUE, "glFramebufferTextureLayer: bad texture");
        }
        let bound = self.state.draw_framebuffer;
        let Some(framebuffer) = self.framebuffers.get_mut(bound as u64) else {
            return self.set_error(
                gl::INVALID_OPERATION,
                "glFramebufferTextureLayer: default framebuffer bound",
            );
        };
        let entry = Attachment {
            texture,
            level,
            layer,
        };
        match attachment {
            gl::DEPTH_ATTACHMENT | gl::DEPTH_STENCIL_ATTACHMENT => framebuffer.depth = Some(entry),
            color if color >= gl::COLOR_ATTACHMENT0 && color < gl::COLOR_ATTACHMENT0 + 8 => {
                framebuffer.colors.insert(color - gl::COLOR_ATTACHMENT0, entry);
            }
            _ => self.set_error(gl::INVALID_ENUM, "glFramebufferTextureLayer: bad attachment"),
        }
    }

    fn attachment_extent(&self, attachment: &Attachment) -> Option<(u32, u32)> {
        let memory = self.textures.get(attachment.texture as u64)?.memory.as_ref()?;
        let (width, height) = memory.extent();
        Some(crate::types::mip_extent(width, height, attachment.level))
    }

    /// `glCheckFramebufferStatus` for the bound framebuffer.
    pub fn check_framebuffer_status(&self, target: GLenum) -> GLenum {
        if target != gl::FRAMEBUFFER {
            return 0;
        }
        let Some(framebuffer) = self.framebuffers.get(self.state.draw_framebuffer as u64) else {
            return gl::FRAMEBUFFER_COMPLETE;
        };
        let attachments: Vec<&Attachment> = framebuffer
            .colors
            .values()
            .chain(framebuffer.depth.as_ref())
            .collect();
        if attachments.is_empty() {
            return gl::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT;
        }
        let extents: Option<Vec<(u32, u32)>> = attachments
            .iter()
            .map(|attachment| self.attachment_extent(attachment))
            .collect();
        match extents {
            Some(extents) if extents.windows(2).all(|pair| pair[0] == pair[1]) => {
                gl::FRAMEBUFFER_COMPLETE
            }
            _ => gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT,
        }
    }

    pub fn delete_framebuffer(&mut self, framebuffer: GLuint) {
        if self.framebuffers.remove(framebuffer as u64).is_some()
            && self.state.draw_framebuffer == framebuffer
        {
            self.state.draw_framebuffer = 0;
        }
    }

    /// Size of the window surface, changed by the windowing system.
    pub fn resize_default_framebuffer(&mut self, width: u32, height: u32) {
        let color_format = self.default_framebuffer.color.format();
        let depth_format = self
            .default_framebuffer
            .depth
            .as_ref()
            .map(ImageMemory::format);
        self.default_framebuffer = DefaultFramebuffer {
            color: ImageMemory::new(color_format, width, height, 1, 1),
            depth: depth_format.map(|format| ImageMemory::new(format, width, height, 1, 1)),
        };
    }

    /// Read back the default framebuffer's color buffer (`glReadPixels`).
    pub fn read_default_color(&self) -> Vec<u8> {
        let (width, height) = self.default_framebuffer.color.extent();
        self.default_framebuffer
            .color
            .read_region(0, 0, 0, 0, width, height)
            .unwrap_or_default()
    }

    // ========================================================================
    // Fixed function state
    // ========================================================================

    pub fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if width < 0 || height < 0 {
            return self.set_error(gl::INVALID_VALUE, "glViewport: negative size");
        }
        self.state.viewport = [x, y, width, height];
    }

    pub fn depth_range(&mut self, near: f32, far: f32) {
        self.state.depth_range = [near, far];
    }

    pub fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if width < 0 || height < 0 {
            return self.set_error(gl::INVALID_VALUE, "glScissor: negative size");
        }
        self.state.scissor = [x, y, width, height];
    }

    pub fn blend_func_separate(
        &mut self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    ) {
        self.state.fixed.blend_factors = [src_rgb, dst_rgb, src_alpha, dst_alpha];
    }

    pub fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum) {
        self.state.fixed.blend_equations = [rgb, alpha];
    }

    pub fn blend_color(&mut self, color: [f32; 4]) {
        self.state.fixed.blend_color = color;
    }

    pub fn depth_func(&mut self, func: GLenum) {
        self.state.fixed.depth_func = func;
    }

    pub fn depth_mask(&mut self, enabled: bool) {
        self.state.fixed.depth_mask = enabled;
    }

    pub fn cull_face(&mut self, face: GLenum) {
        self.state.fixed.cull_face = face;
    }

    pub fn front_face(&mut self, face: GLenum) {
        self.state.fixed.front_face = face;
    }

    pub fn polygon_mode(&mut self, face: GLenum, mode: GLenum) {
        if face != gl::FRONT_AND_BACK {
            return self.set_error(gl::INVALID_ENUM, "glPolygonMode: face must be GL_FRONT_AND_BACK");
        }
        self.state.fixed.polygon_mode = mode;
    }

    /// Current `GL_VIEWPORT`.
    pub fn viewport_state(&self) -> [i32; 4] {
        self.state.viewport
    }

    /// Current `GL_SCISSOR_BOX`.
    pub fn scissor_state(&self) -> [i32; 4] {
        self.state.scissor
    }

    /// Current `GL_DEPTH_RANGE`.
    pub fn depth_range_state(&self) -> [f32; 2] {
        self.state.depth_range
    }

    pub fn fixed_function_state(&self) -> FixedFunctionState {
        self.state.fixed
    }

    pub fn current_program(&self) -> GLuint {
        self.state.program
    }

    pub fn texture_binding(&self, unit: u32, target: GLenum) -> GLuint {
        self.state
            .texture_units
            .get(&(unit, target))
            .copied()
            .unwrap_or(0)
    }

    pub fn uniform_buffer_binding(&self, index: u32) -> GLuint {
        self.state.uniform_buffers.get(&index).copied().unwrap_or(0)
    }

    pub fn sampler_binding(&self, unit: u32) -> GLuint {
        self.state.sampler_units.get(&unit).copied().unwrap_or(0)
    }

    pub fn draw_framebuffer_binding(&self) -> GLuint {
        self.state.draw_framebuffer
    }

    // ========================================================================
    // Clears and draws
    // ========================================================================

    fn color_target(&mut self, draw_buffer: u32) -> Option<(&mut ImageMemory, u32, u32)> {
        let bound = self.state.draw_framebuffer;
        if bound == 0 {
            return (draw_buffer == 0).then_some((&mut self.default_framebuffer.color, 0, 0));
        }
        let attachment = *self.framebuffers.get(bound as u64)?.colors.get(&draw_buffer)?;
        let memory = self.textures.get_mut(attachment.texture as u64)?.memory.as_mut()?;
        Some((memory, attachment.level, attachment.layer))
    }

    fn depth_target(&mut self) -> Option<(&mut ImageMemory, u32, u32)> {
        let bound = self.state.draw_framebuffer;
        if bound == 0 {
            return self.default_framebuffer.depth.as_mut().map(|memory| (memory, 0, 0));
        }
        let attachment = self.framebuffers.get(bound as u64)?.depth?;
        let memory = self.textures.get_mut(attachment.texture as u64)?.memory.as_mut()?;
        Some((memory, attachment.level, attachment.layer))
    }

    /// `glClearBufferfv(GL_COLOR, draw_buffer, color)`.
    pub fn clear_buffer_color(&mut self, draw_buffer: u32, color: [f32; 4]) {
        let [r, g, b, a] = color;
        let cleared = self.color_target(draw_buffer).and_then(|(memory, level, layer)| {
            let pixel = encode_clear_color(memory.format(), RgbaFloat::new(r, g, b, a))?;
            memory.fill(level, layer, &pixel).ok()
        });
        match cleared {
            Some(()) => self.log.clears += 1,
            None => self.set_error(gl::INVALID_VALUE, "glClearBufferfv: no such draw buffer"),
        }
    }

    /// `glClearBufferfi(GL_DEPTH_STENCIL, 0, depth, stencil)`.
    pub fn clear_buffer_depth_stencil(&mut self, depth: f32, stencil: u8) {
        let cleared = self.depth_target().and_then(|(memory, level, layer)| {
            let texel = encode_clear_depth(memory.format(), depth, stencil)?;
            memory.fill(level, layer, &texel).ok()
        });
        match cleared {
            Some(()) => self.log.clears += 1,
            None => self.set_error(gl::INVALID_OPERATION, "glClearBufferfi: no depth buffer"),
        }
    }

    fn draw_ready(&mut self, indexed: bool) -> bool {
        if self.state.program == 0 {
            self.set_error(gl::INVALID_OPERATION, "draw: no program in use");
            return false;
        }
        if indexed && self.state.element_buffer == 0 {
            self.set_error(gl::INVALID_OPERATION, "draw: no element array buffer bound");
            return false;
        }
        if self.check_framebuffer_status(gl::FRAMEBUFFER) != gl::FRAMEBUFFER_COMPLETE {
            self.set_error(gl::INVALID_FRAMEBUFFER_OPERATION, "draw: framebuffer incomplete");
            return false;
        }
        true
    }

    /// `glDrawArraysInstancedBaseInstance`.
    pub fn draw_arrays_instanced_base_instance(
        &mut self,
        mode: GLenum,
        first: u32,
        count: u32,
        instance_count: u32,
        base_instance: u32,
    ) {
        let Some(topology) = topology_from_mode(mode) else {
            return self.set_error(gl::INVALID_ENUM, "glDrawArrays: invalid mode");
        };
        if base_instance != 0 && !self.extensions.contains(&gl::ARB_BASE_INSTANCE) {
            return self.set_error(gl::INVALID_OPERATION, "base instance unavailable");
        }
        if self.draw_ready(false) {
            let draw = DrawCall::non_indexed(count, instance_count, first, base_instance);
            self.log.record_draw(draw.with_topology(topology));
        }
    }

    /// `glDrawElementsInstancedBaseVertexBaseInstance`. `offset` is in bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_elements_instanced_base_vertex_base_instance(
        &mut self,
        mode: GLenum,
        count: u32,
        kind: GLenum,
        offset: u64,
        instance_count: u32,
        base_vertex: i32,
        base_instance: u32,
    ) {
        let Some(topology) = topology_from_mode(mode) else {
            return self.set_error(gl::INVALID_ENUM, "glDrawElements: invalid mode");
        };
        let index_size = match kind {
            gl::UNSIGNED_SHORT => 2,
            gl::UNSIGNED_INT => 4,
            _ => return self.set_error(gl::INVALID_ENUM, "glDrawElements: invalid type"),
        };
        if base_instance != 0 && !self.extensions.contains(&gl::ARB_BASE_INSTANCE) {
            return self.set_error(gl::INVALID_OPERATION, "base instance unavailable");
        }
        if self.draw_ready(true) {
            let first_index = (offset / index_size) as u32;
            let draw = DrawCall::indexed(count, instance_count, first_index, base_vertex, base_instance);
            self.log.record_draw(draw.with_topology(topology));
        }
    }

    /// Present the default framebuffer.
    pub fn swap_buffers(&mut self) {
        self.log.presents += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> GlContext {
        GlContext::new(8, 8, PixelFormat::Rgba8Unorm, Some(PixelFormat::Depth32Float), &[])
    }

    #[test]
    fn test_error_flag_is_sticky_until_read() {
        let mut gl = context();
        gl.bind_buffer(gl::ARRAY_BUFFER, 42);
        gl.bind_framebuffer(gl::FRAMEBUFFER, 42);
        assert_eq!(gl.get_error(), gl::INVALID_VALUE);
        assert_eq!(gl.get_error(), gl::NO_ERROR);
    }

    #[test]
    fn test_cube_face_targets_address_layers() {
        let mut gl = context();
        let texture = gl.gen_texture();
        gl.bind_texture(gl::TEXTURE_CUBE_MAP, texture);
        gl.tex_storage(gl::TEXTURE_CUBE_MAP, 1, gl::RGBA8, gl::RGBA, 2, 2, 1);
        for face in 0..6u8 {
            let pixels = [face; 16];
            gl.tex_sub_image(gl::TEXTURE_CUBE_MAP_POSITIVE_X + face as u32, 0, 0, 0, 0, 2, 2, &pixels);
        }
        assert_eq!(gl.get_error(), gl::NO_ERROR);
        assert_eq!(gl.get_texture_sub_image(texture, 0, 0, 0, 4, 1, 1), vec![4; 4]);
    }

    #[test]
    fn test_masked_extension_rejects_storage_and_base_instance() {
        let masked = vec![gl::ARB_TEXTURE_STORAGE.to_string(), gl::ARB_BASE_INSTANCE.to_string()];
        let mut gl = GlContext::new(4, 4, PixelFormat::Rgba8Unorm, None, &masked);
        assert!(!gl.extensions().iter().any(|name| name == gl::ARB_BASE_INSTANCE));

        let texture = gl.gen_texture();
        gl.bind_texture(gl::TEXTURE_2D, texture);
        gl.tex_storage(gl::TEXTURE_2D, 1, gl::RGBA8, gl::RGBA, 4, 4, 1);
        assert_eq!(gl.get_error(), gl::INVALID_OPERATION);

        gl.tex_image(gl::TEXTURE_2D, 0, gl::RGBA8, gl::RGBA, 4, 4, 1);
        assert_eq!(gl.get_error(), gl::NO_ERROR);

        gl.draw_arrays_instanced_base_instance(gl::TRIANGLES, 0, 3, 1, 1);
        assert_eq!(gl.get_error(), gl::INVALID_OPERATION);
    }

    #[test]
    fn test_debug_callback_receives_errors() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut gl = context();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        gl.enable(gl::DEBUG_OUTPUT);
        gl.debug_message_callback(Some(Box::new(move |message| {
            assert_eq!(message.kind, gl::DEBUG_TYPE_ERROR);
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        gl.use_program(99);
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_default_framebuffer() {
        let mut gl = context();
        gl.clear_buffer_color(0, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(&gl.read_default_color()[..4], &[0, 255, 0, 255]);
        gl.clear_buffer_color(1, [0.0; 4]);
        assert_eq!(gl.get_error(), gl::INVALID_VALUE);
        assert_eq!(gl.log.clears, 1);
    }
}
