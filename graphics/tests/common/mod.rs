//! Common utilities for device integration tests.
//!
//! This module provides shared test infrastructure that can be reused
//! across the Vulkan, OpenGL and Direct3D 11 backends.

use std::sync::Arc;

use lattice_graphics::{
    BackendType, Buffer, BufferDescriptor, CommandList, DeviceOptions, Framebuffer,
    FramebufferDescriptor, GraphicsDevice, IndexFormat, OutputDescription, PixelFormat, Pipeline,
    PipelineDescriptor, ResourceFactory, ResourceLayout, Shader, ShaderDescriptor, ShaderSet,
    ShaderStage, Texture, TextureDescriptor, TextureUsage, VertexElement, VertexElementFormat,
    VertexElementSemantic, VertexLayout,
};

/// Side length of the swapchain used by the tests.
pub const SWAPCHAIN_SIZE: u32 = 16;

/// Quad corners as `(x, y)` positions.
pub const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

/// Two triangles covering [`QUAD_VERTICES`].
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Test Context
// ============================================================================

/// A device and its factory for one test.
pub struct TestContext {
    pub backend: BackendType,
    pub device: GraphicsDevice,
    pub factory: ResourceFactory,
}

impl TestContext {
    /// Open a device on `backend`.
    ///
    /// Returns `None` if the backend is not compiled in.
    pub fn new(backend: BackendType) -> Option<Self> {
        Self::with_options(DeviceOptions::new(backend))
    }

    pub fn with_options(options: DeviceOptions) -> Option<Self> {
        init_logging();
        if !options.backend.is_compiled() {
            return None;
        }
        let backend = options.backend;
        let device = GraphicsDevice::new(options.with_size(SWAPCHAIN_SIZE, SWAPCHAIN_SIZE))
            .expect("Failed to create device");
        let factory = device.create_factory();
        Some(Self {
            backend,
            device,
            factory,
        })
    }

    pub fn command_list(&self) -> CommandList {
        self.factory
            .create_command_list()
            .expect("Failed to create command list")
    }

    /// Create a shader with bytecode the backend accepts.
    pub fn create_shader(&self, stage: ShaderStage) -> Arc<Shader> {
        self.factory
            .create_shader(&ShaderDescriptor::new(stage, shader_bytecode(self.backend)))
            .expect("Failed to create shader")
    }

    /// Create a color texture usable as a render target and for sampling.
    pub fn create_color_texture(&self, width: u32, height: u32) -> Arc<Texture> {
        self.factory
            .create_texture_2d(&TextureDescriptor::new_2d(
                width,
                height,
                PixelFormat::Rgba8Unorm,
                TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
            ))
            .expect("Failed to create texture")
    }

    /// Create an offscreen framebuffer with a single color target.
    pub fn create_offscreen(&self, width: u32, height: u32) -> (Arc<Texture>, Arc<Framebuffer>) {
        let texture = self.create_color_texture(width, height);
        let framebuffer = self
            .factory
            .create_framebuffer(&FramebufferDescriptor::new(
                vec![Arc::clone(&texture)],
                None,
            ))
            .expect("Failed to create framebuffer");
        (texture, framebuffer)
    }

    /// A position-only pipeline rendering into `outputs`.
    pub fn create_quad_pipeline(
        &self,
        outputs: OutputDescription,
        resource_layouts: Vec<Arc<ResourceLayout>>,
    ) -> Arc<Pipeline> {
        let shader_set = ShaderSet::new(
            vec![quad_vertex_layout()],
            vec![
                self.create_shader(ShaderStage::Vertex),
                self.create_shader(ShaderStage::Fragment),
            ],
        );
        self.factory
            .create_pipeline(
                &PipelineDescriptor::new(shader_set, outputs)
                    .with_resource_layouts(resource_layouts),
            )
            .expect("Failed to create pipeline")
    }

    /// Vertex and index buffers holding the quad, filled through `list`.
    pub fn create_quad_buffers(&self, list: &mut CommandList) -> (Arc<Buffer>, Arc<Buffer>) {
        let vertices = self
            .factory
            .create_buffer(&BufferDescriptor::vertex(
                std::mem::size_of_val(&QUAD_VERTICES) as u64,
            ))
            .expect("Failed to create vertex buffer");
        let indices = self
            .factory
            .create_buffer(&BufferDescriptor::index(
                std::mem::size_of_val(&QUAD_INDICES) as u64,
            ))
            .expect("Failed to create index buffer");
        list.update_buffer_typed(&vertices, 0, &QUAD_VERTICES)
            .expect("Failed to upload vertices");
        list.update_buffer_typed(&indices, 0, &QUAD_INDICES)
            .expect("Failed to upload indices");
        (vertices, indices)
    }

    /// Record an indexed quad draw into `list` against `framebuffer`.
    pub fn record_quad(
        &self,
        list: &mut CommandList,
        framebuffer: &Framebuffer,
        pipeline: &Pipeline,
        vertices: &Buffer,
        indices: &Buffer,
    ) {
        list.set_framebuffer(framebuffer).expect("set_framebuffer");
        list.set_full_viewport().expect("set_full_viewport");
        list.set_pipeline(pipeline).expect("set_pipeline");
        list.set_vertex_buffer(0, vertices).expect("set_vertex_buffer");
        list.set_index_buffer(indices, IndexFormat::UInt16)
            .expect("set_index_buffer");
        list.draw_indexed(QUAD_INDICES.len() as u32, 1, 0, 0, 0)
            .expect("draw_indexed");
    }
}

/// Bytecode in the form each backend expects: SPIR-V, GLSL source or DXBC.
pub fn shader_bytecode(backend: BackendType) -> Vec<u8> {
    match backend {
        BackendType::Vulkan => {
            let mut words = vec![0x0723_0203u32, 0x0001_0000, 0, 1, 0];
            words.resize(8, 0);
            words.iter().flat_map(|word| word.to_le_bytes()).collect()
        }
        BackendType::OpenGl => b"#version 330 core\nvoid main() {}\n".to_vec(),
        BackendType::D3D11 => {
            let mut bytes = b"DXBC".to_vec();
            bytes.resize(32, 0);
            bytes
        }
    }
}

pub fn quad_vertex_layout() -> VertexLayout {
    VertexLayout::new(vec![VertexElement::new(
        "position",
        VertexElementSemantic::Position,
        VertexElementFormat::Float2,
    )])
}

/// Tightly packed RGBA8 pixels of one color.
pub fn solid_pixels(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.repeat((width * height) as usize)
}
