//! Direct3D 11 backend: immediate context.
//!
//! Every recorded command is issued against the immediate context while it is
//! recorded, so executing a command list only releases the context bindings
//! it left behind and counts the submission. The immediate context belongs to
//! the thread that created the device; the device itself is free-threaded, so
//! resources can be created and released from any thread and are released
//! immediately.

mod command;
pub(crate) mod conversion;
// Mirrors the D3D11 API surface; not every descriptor field is read.
#[allow(dead_code)]
mod native;

use std::sync::Arc;
use std::thread::{self, ThreadId};

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
    BufferDescriptor, BufferUsage, PixelFormat, ResourceKind, ResourceLayoutDescriptor,
    SamplerDescriptor, ShaderDescriptor, ShaderStage, ShaderStages, TextureDescriptor,
    TextureKind, TextureRegion, TextureUsage,
};

pub(crate) use command::D3D11CommandList;

use self::conversion::{
    convert_address_mode, convert_blend_factor, convert_blend_function, convert_buffer_usage,
    convert_comparison, convert_cull_mode, convert_fill_mode, convert_filter, convert_pixel_format,
    convert_semantic, convert_shader_stage, convert_texture_usage, convert_topology,
    convert_vertex_format, d3d11, dxgi,
};
use self::native::{
    BufferDesc, DepthStencilDesc, HResult, InputElementDesc, MessageSeverity, NativeDevice,
    RasterizerDesc, RenderTargetBlendDesc, SamplerDesc, ShaderKind, Texture2dDesc,
};

/// Number of swapchain back buffers.
const BACK_BUFFER_COUNT: u32 = 2;

/// Feature level name hiding geometry and tessellation support when masked.
const FEATURE_LEVEL_11_0: &str = "D3D_FEATURE_LEVEL_11_0";

/// State shared by the device, the factory and every native object.
pub(crate) struct D3D11Shared {
    device: Mutex<NativeDevice>,
    owner: ThreadId,
    features: DeviceFeatures,
}

impl D3D11Shared {
    /// Run a native call and translate its `HRESULT`.
    ///
    /// Info queue messages are forwarded to the log after the device lock is
    /// released.
    fn call<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut NativeDevice) -> HResult<T>,
    ) -> Result<T, GraphicsError> {
        let (result, messages) = {
            let mut device = self.device.lock();
            let result = f(&mut device);
            (result, device.take_messages())
        };
        for (severity, message) in messages {
            match severity {
                MessageSeverity::Error => log::error!("[D3D11 {operation}] {message}"),
                MessageSeverity::Warning => log::warn!("[D3D11 {operation}] {message}"),
                MessageSeverity::Info => log::info!("[D3D11 {operation}] {message}"),
            }
        }
        result.map_err(|hresult| GraphicsError::native(operation, NativeError::Direct3D(hresult)))
    }

    fn release(&self, handle: u64) {
        self.device.lock().release(handle);
    }

    /// Fail unless called from the thread owning the immediate context.
    fn check_owner(&self, operation: &'static str) -> Result<(), GraphicsError> {
        if thread::current().id() != self.owner {
            return Err(GraphicsError::WrongThread(operation));
        }
        Ok(())
    }

    pub(crate) fn features(&self) -> DeviceFeatures {
        self.features
    }

    pub(crate) fn create_buffer(
        self: &Arc<Self>,
        descriptor: &BufferDescriptor,
    ) -> Result<GpuBuffer, GraphicsError> {
        let constant = descriptor.usage.contains(BufferUsage::UNIFORM);
        if constant {
            if descriptor.size % 16 != 0 {
                return Err(GraphicsError::invalid(format!(
                    "constant buffer size {} is not a multiple of 16",
                    descriptor.size
                )));
            }
            if descriptor
                .usage
                .intersects(BufferUsage::VERTEX | BufferUsage::INDEX)
            {
                return Err(GraphicsError::invalid(
                    "constant buffers cannot also be vertex or index buffers",
                ));
            }
        }
        let desc = BufferDesc {
            byte_width: u32::try_from(descriptor.size)
                .map_err(|_| GraphicsError::invalid("buffer too large for Direct3D 11"))?,
            bind_flags: convert_buffer_usage(descriptor.usage),
        };
        let handle = self.call("ID3D11Device::CreateBuffer", |device| {
            device.create_buffer(desc, None)
        })?;
        log::trace!(
            "D3D11Shared: created buffer {handle} {:?}, size={}",
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::D3D11(Arc::new(D3D11Buffer {
            shared: Arc::clone(self),
            handle,
            constant,
            size: descriptor.size,
        })))
    }

    pub(crate) fn create_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
        kind: TextureKind,
    ) -> Result<GpuTexture, GraphicsError> {
        let format = self.native_format(descriptor.format)?;
        let (array_size, misc_flags) = match kind {
            TextureKind::Texture2D => (descriptor.array_layers, 0),
            TextureKind::Cube => (
                descriptor.array_layers * 6,
                d3d11::RESOURCE_MISC_TEXTURECUBE,
            ),
        };
        let desc = Texture2dDesc {
            width: descriptor.width,
            height: descriptor.height,
            mip_levels: descriptor.mip_levels,
            array_size,
            format,
            bind_flags: convert_texture_usage(descriptor.usage),
            misc_flags,
        };
        let (handle, srv) = self.call("ID3D11Device::CreateTexture2D", |device| {
            let handle = device.create_texture_2d(desc)?;
            if !descriptor.usage.contains(TextureUsage::SAMPLED) {
                return Ok((handle, None));
            }
            match device.create_shader_resource_view(handle) {
                Ok(srv) => Ok((handle, Some(srv))),
                Err(hresult) => {
                    device.release(handle);
                    Err(hresult)
                }
            }
        })?;
        log::trace!(
            "D3D11Shared: created {kind:?} texture {handle} {:?}, {}x{}",
            descriptor.label,
            descriptor.width,
            descriptor.height
        );
        Ok(GpuTexture::D3D11(Arc::new(D3D11Texture {
            shared: Arc::clone(self),
            handle,
            srv,
            mip_levels: descriptor.mip_levels,
        })))
    }

    fn native_format(&self, format: PixelFormat) -> Result<u32, GraphicsError> {
        convert_pixel_format(format)
            .filter(|dxgi| self.device.lock().check_format_support(*dxgi))
            .ok_or(GraphicsError::UnsupportedFormat {
                format,
                backend: BackendType::D3D11,
            })
    }

    pub(crate) fn create_sampler(
        self: &Arc<Self>,
        descriptor: &SamplerDescriptor,
    ) -> Result<GpuSampler, GraphicsError> {
        let desc = SamplerDesc {
            filter: convert_filter(
                descriptor.min_filter,
                descriptor.mag_filter,
                descriptor.mipmap_filter,
                descriptor.is_anisotropic(),
                descriptor.compare.is_some(),
            ),
            address: [
                convert_address_mode(descriptor.address_mode_u),
                convert_address_mode(descriptor.address_mode_v),
                convert_address_mode(descriptor.address_mode_w),
            ],
            max_anisotropy: descriptor.max_anisotropy as u32,
            comparison_func: descriptor.compare.map_or(0, convert_comparison),
            min_lod: descriptor.lod_min_clamp,
            max_lod: descriptor.lod_max_clamp,
        };
        let handle = self.call("ID3D11Device::CreateSamplerState", |device| {
            device.create_sampler_state(desc)
        })?;
        Ok(GpuSampler::D3D11(Arc::new(D3D11Sampler {
            shared: Arc::clone(self),
            handle,
        })))
    }

    pub(crate) fn create_shader(
        self: &Arc<Self>,
        descriptor: &ShaderDescriptor,
    ) -> Result<GpuShader, GraphicsError> {
        if !descriptor.bytecode.starts_with(b"DXBC") {
            return Err(GraphicsError::invalid(
                "Direct3D 11 shader bytecode must be a DXBC container",
            ));
        }
        let kind = convert_shader_stage(descriptor.stage);
        let handle = self.call("ID3D11Device::CreateShader", |device| {
            device.create_shader(kind, &descriptor.bytecode)
        })?;
        Ok(GpuShader::D3D11(Arc::new(D3D11Shader {
            shared: Arc::clone(self),
            handle,
            kind,
            bytecode: descriptor.bytecode.clone(),
        })))
    }

    pub(crate) fn create_resource_layout(
        self: &Arc<Self>,
        descriptor: &ResourceLayoutDescriptor,
    ) -> Result<GpuResourceLayout, GraphicsError> {
        let elements = descriptor
            .elements
            .iter()
            .map(|element| (element.kind, shader_kinds(element.stages)))
            .collect();
        Ok(GpuResourceLayout::D3D11(Arc::new(D3D11ResourceLayout {
            elements,
        })))
    }

    pub(crate) fn create_resource_set(
        self: &Arc<Self>,
        layout: &ResourceLayout,
        _resources: &[BindingResource],
    ) -> Result<GpuResourceSet, GraphicsError> {
        let layout = Arc::clone(layout.native()?.d3d11()?);
        Ok(GpuResourceSet::D3D11(Arc::new(D3D11ResourceSet { layout })))
    }

    pub(crate) fn create_pipeline(
        self: &Arc<Self>,
        descriptor: &PipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError> {
        let mut shaders = Vec::with_capacity(descriptor.shader_set.shaders.len());
        for shader in &descriptor.shader_set.shaders {
            let native = shader.native()?;
            shaders.push(Arc::clone(native.d3d11()?));
        }
        let vertex_bytecode = shaders
            .iter()
            .find(|shader| shader.kind == ShaderKind::Vertex)
            .map(|shader| shader.bytecode.clone())
            .ok_or_else(|| GraphicsError::invalid("pipeline has no vertex shader"))?;

        let mut elements = Vec::new();
        let mut semantic_counts = std::collections::HashMap::<&'static str, u32>::new();
        for (slot, layout) in descriptor.shader_set.vertex_layouts.iter().enumerate() {
            for (element, offset) in layout.elements.iter().zip(layout.offsets()) {
                let semantic_name = convert_semantic(element.semantic);
                let semantic_index = semantic_counts.entry(semantic_name).or_default();
                elements.push(InputElementDesc {
                    semantic_name,
                    semantic_index: *semantic_index,
                    format: convert_vertex_format(element.format),
                    input_slot: slot as u32,
                    aligned_byte_offset: offset,
                    instance_data_step_rate: layout.instance_step_rate,
                });
                *semantic_index += 1;
            }
        }

        let blend_targets = descriptor
            .blend_state
            .attachments
            .iter()
            .map(|attachment| RenderTargetBlendDesc {
                blend_enable: attachment.enabled,
                src_blend: convert_blend_factor(attachment.source_color),
                dest_blend: convert_blend_factor(attachment.destination_color),
                blend_op: convert_blend_function(attachment.color_function),
                src_blend_alpha: convert_blend_factor(attachment.source_alpha),
                dest_blend_alpha: convert_blend_factor(attachment.destination_alpha),
                blend_op_alpha: convert_blend_function(attachment.alpha_function),
            })
            .collect();
        let depth = &descriptor.depth_stencil_state;
        let raster = &descriptor.rasterizer_state;

        let pipeline = self.call("ID3D11Device::CreatePipelineState", |device| {
            let input_layout = device.create_input_layout(elements, &vertex_bytecode)?;
            let blend_state = device.create_blend_state(blend_targets)?;
            let depth_stencil_state = device.create_depth_stencil_state(DepthStencilDesc {
                depth_enable: depth.depth_test_enabled,
                depth_write: depth.depth_write_enabled,
                depth_func: convert_comparison(depth.comparison),
            })?;
            let rasterizer_state = device.create_rasterizer_state(RasterizerDesc {
                fill_mode: convert_fill_mode(raster.fill_mode),
                cull_mode: convert_cull_mode(raster.cull_mode),
                front_counter_clockwise: raster.front_face
                    == crate::types::FrontFace::CounterClockwise,
                depth_clip_enable: raster.depth_clip_enabled,
                scissor_enable: raster.scissor_test_enabled,
            })?;
            let shader_handles: Vec<(ShaderKind, u64)> = shaders
                .iter()
                .map(|shader| {
                    device.add_ref(shader.handle);
                    (shader.kind, shader.handle)
                })
                .collect();
            Ok(D3D11Pipeline {
                shared: Arc::clone(self),
                shaders: shader_handles,
                input_layout,
                blend_state,
                depth_stencil_state,
                rasterizer_state,
                topology: convert_topology(descriptor.primitive_topology),
                strides: descriptor
                    .shader_set
                    .vertex_layouts
                    .iter()
                    .map(|layout| layout.stride)
                    .collect(),
                blend_factor: descriptor.blend_state.blend_factor.to_array(),
            })
        })?;
        drop(shaders);
        Ok(GpuPipeline::D3D11(Arc::new(pipeline)))
    }

    pub(crate) fn create_framebuffer(
        self: &Arc<Self>,
        descriptor: &FramebufferDescriptor,
    ) -> Result<GpuFramebuffer, GraphicsError> {
        let mut color_targets = Vec::with_capacity(descriptor.color_targets.len());
        for target in &descriptor.color_targets {
            let native = target.texture.native()?;
            color_targets.push((Arc::clone(native.d3d11()?), target.mip_level, target.array_layer));
        }
        let depth_target = match &descriptor.depth_target {
            Some(target) => {
                let native = target.texture.native()?;
                Some((Arc::clone(native.d3d11()?), target.mip_level, target.array_layer))
            }
            None => None,
        };

        let framebuffer = self.call("ID3D11Device::CreateRenderTargetView", |device| {
            let mut color_views = Vec::with_capacity(color_targets.len());
            for (texture, mip, layer) in &color_targets {
                color_views.push(device.create_render_target_view(texture.handle, *mip, *layer)?);
            }
            let depth_view = match &depth_target {
                Some((texture, mip, layer)) => {
                    Some(device.create_depth_stencil_view(texture.handle, *mip, *layer)?)
                }
                None => None,
            };
            Ok(D3D11Framebuffer {
                shared: Arc::clone(self),
                color_views: vec![color_views],
                depth_view,
            })
        })?;
        Ok(GpuFramebuffer::D3D11(Arc::new(framebuffer)))
    }

    pub(crate) fn create_command_list(self: &Arc<Self>) -> Result<GpuCommandList, GraphicsError> {
        Ok(GpuCommandList::D3D11(D3D11CommandList::new(Arc::clone(self))))
    }
}

fn shader_kinds(stages: ShaderStages) -> Vec<ShaderKind> {
    ShaderStage::ALL
        .into_iter()
        .filter(|stage| stages.contains(ShaderStages::from(*stage)))
        .map(convert_shader_stage)
        .collect()
}

// ============================================================================
// Native objects
// ============================================================================

macro_rules! release_on_drop {
    ($name:ident, $label:literal) => {
        impl Drop for $name {
            fn drop(&mut self) {
                log::trace!(concat!("D3D11: releasing ", $label, " {}"), self.handle);
                self.shared.release(self.handle);
            }
        }
    };
}

pub(crate) struct D3D11Buffer {
    shared: Arc<D3D11Shared>,
    handle: u64,
    constant: bool,
    size: u64,
}

release_on_drop!(D3D11Buffer, "buffer");

pub(crate) struct D3D11Texture {
    shared: Arc<D3D11Shared>,
    handle: u64,
    srv: Option<u64>,
    mip_levels: u32,
}

impl Drop for D3D11Texture {
    fn drop(&mut self) {
        log::trace!("D3D11: releasing texture {}", self.handle);
        let mut device = self.shared.device.lock();
        if let Some(srv) = self.srv {
            device.release(srv);
        }
        device.release(self.handle);
    }
}

pub(crate) struct D3D11Sampler {
    shared: Arc<D3D11Shared>,
    handle: u64,
}

release_on_drop!(D3D11Sampler, "sampler");

pub(crate) struct D3D11Shader {
    shared: Arc<D3D11Shared>,
    handle: u64,
    kind: ShaderKind,
    bytecode: Vec<u8>,
}

release_on_drop!(D3D11Shader, "shader");

/// Slot kinds and the shader stages each slot is bound to.
pub(crate) struct D3D11ResourceLayout {
    elements: Vec<(ResourceKind, Vec<ShaderKind>)>,
}

pub(crate) struct D3D11ResourceSet {
    layout: Arc<D3D11ResourceLayout>,
}

pub(crate) struct D3D11Pipeline {
    shared: Arc<D3D11Shared>,
    shaders: Vec<(ShaderKind, u64)>,
    input_layout: u64,
    blend_state: u64,
    depth_stencil_state: u64,
    rasterizer_state: u64,
    topology: u32,
    strides: Vec<u32>,
    blend_factor: [f32; 4],
}

impl Drop for D3D11Pipeline {
    fn drop(&mut self) {
        let mut device = self.shared.device.lock();
        for (_, shader) in &self.shaders {
            device.release(*shader);
        }
        device.release(self.input_layout);
        device.release(self.blend_state);
        device.release(self.depth_stencil_state);
        device.release(self.rasterizer_state);
    }
}

/// Render target views per presentable image (one entry for offscreen
/// framebuffers) and the depth stencil view.
pub(crate) struct D3D11Framebuffer {
    shared: Arc<D3D11Shared>,
    color_views: Vec<Vec<u64>>,
    depth_view: Option<u64>,
}

impl D3D11Framebuffer {
    fn views(&self, image_index: u32) -> &[u64] {
        self.color_views
            .get(image_index as usize)
            .or_else(|| self.color_views.first())
            .map_or(&[], Vec::as_slice)
    }
}

impl Drop for D3D11Framebuffer {
    fn drop(&mut self) {
        let mut device = self.shared.device.lock();
        for view in self.color_views.iter().flatten() {
            device.release(*view);
        }
        if let Some(view) = self.depth_view {
            device.release(view);
        }
    }
}

// ============================================================================
// Device
// ============================================================================

/// The D3D11 device with its immediate context and DXGI swapchain.
pub(crate) struct D3D11Device {
    shared: Arc<D3D11Shared>,
    swapchain_format: PixelFormat,
    depth_format: Option<PixelFormat>,
}

impl D3D11Device {
    pub(crate) fn new(options: &DeviceOptions) -> Result<Self, GraphicsError> {
        let mut debug = options.debug;
        if debug && options.is_masked("D3D11_CREATE_DEVICE_DEBUG") {
            log::warn!("D3D11Device: debug layer requested but not available");
            debug = false;
        }

        let unsupported_formats: Vec<u32> = [dxgi::FORMAT_BC1_UNORM, dxgi::FORMAT_BC3_UNORM]
            .into_iter()
            .filter(|format| {
                let name = match *format {
                    dxgi::FORMAT_BC1_UNORM => "DXGI_FORMAT_BC1_UNORM",
                    _ => "DXGI_FORMAT_BC3_UNORM",
                };
                options.is_masked(name)
            })
            .collect();
        let feature_level_11 = !options.is_masked(FEATURE_LEVEL_11_0);
        let features = DeviceFeatures {
            geometry_shader: feature_level_11,
            tessellation_shaders: feature_level_11,
            texture_compression_bc: unsupported_formats.is_empty(),
            base_instance: true,
            debug_output: debug,
            sampler_anisotropy: true,
        };
        log::debug!("D3D11Device: probed {features:?}");

        let shared = Arc::new(D3D11Shared {
            device: Mutex::new(NativeDevice::new(debug, unsupported_formats)),
            owner: thread::current().id(),
            features,
        });
        let format = shared.native_format(options.swapchain_format)?;
        shared.call("IDXGIFactory::CreateSwapChain", |device| {
            device.create_swap_chain(options.width, options.height, format, BACK_BUFFER_COUNT)
        })?;

        Ok(Self {
            shared,
            swapchain_format: options.swapchain_format,
            depth_format: options.swapchain_depth_format,
        })
    }

    pub(crate) fn shared(&self) -> &Arc<D3D11Shared> {
        &self.shared
    }

    /// Views over every back buffer plus a fresh depth buffer.
    pub(crate) fn create_swapchain_framebuffer(
        &self,
        width: u32,
        height: u32,
    ) -> Result<(GpuFramebuffer, u32), GraphicsError> {
        let depth_format = match self.depth_format {
            Some(format) => Some(self.shared.native_format(format)?),
            None => None,
        };
        let shared = &self.shared;
        let framebuffer = shared.call("IDXGISwapChain::GetBuffer", |device| {
            let mut color_views = Vec::with_capacity(BACK_BUFFER_COUNT as usize);
            for index in 0..BACK_BUFFER_COUNT {
                let back_buffer = device.get_buffer(index)?;
                let view = device.create_render_target_view(back_buffer, 0, 0);
                device.release(back_buffer);
                color_views.push(vec![view?]);
            }
            let depth_view = match depth_format {
                Some(format) => {
                    let texture = device.create_texture_2d(Texture2dDesc {
                        width,
                        height,
                        mip_levels: 1,
                        array_size: 1,
                        format,
                        bind_flags: d3d11::BIND_DEPTH_STENCIL,
                        misc_flags: 0,
                    })?;
                    let view = device.create_depth_stencil_view(texture, 0, 0);
                    device.release(texture);
                    Some(view?)
                }
                None => None,
            };
            Ok(D3D11Framebuffer {
                shared: Arc::clone(shared),
                color_views,
                depth_view,
            })
        })?;
        let image_index = self.shared.device.lock().current_back_buffer_index();
        log::debug!(
            "D3D11Device: swapchain framebuffer {width}x{height} ({:?})",
            self.swapchain_format
        );
        Ok((GpuFramebuffer::D3D11(Arc::new(framebuffer)), image_index))
    }

    pub(crate) fn execute_commands(&self, list: &mut D3D11CommandList) -> Result<(), GraphicsError> {
        self.shared.check_owner("ID3D11DeviceContext::ExecuteCommandList")?;
        list.finish_execution()?;
        self.shared.device.lock().log.submissions += 1;
        Ok(())
    }

    pub(crate) fn swap_buffers(&self) -> Result<u32, GraphicsError> {
        self.shared.check_owner("IDXGISwapChain::Present")?;
        self.shared
            .call("IDXGISwapChain::Present", |device| device.present())
    }

    pub(crate) fn wait_for_idle(&self) -> Result<(), GraphicsError> {
        // The immediate context has already executed everything recorded.
        Ok(())
    }

    /// `ResizeBuffers` goes through the immediate context.
    pub(crate) fn check_resize(&self) -> Result<(), GraphicsError> {
        self.shared.check_owner("IDXGISwapChain::ResizeBuffers")
    }

    /// The previous swapchain framebuffer must already be released.
    pub(crate) fn resize_swapchain(
        &self,
        width: u32,
        height: u32,
    ) -> Result<(GpuFramebuffer, u32), GraphicsError> {
        self.shared.check_owner("IDXGISwapChain::ResizeBuffers")?;
        self.shared.call("IDXGISwapChain::ResizeBuffers", |device| {
            device.clear_state();
            device.resize_buffers(width, height)
        })?;
        self.create_swapchain_framebuffer(width, height)
    }

    pub(crate) fn read_buffer(&self, buffer: &Buffer) -> Result<Vec<u8>, GraphicsError> {
        let native = buffer.native()?;
        let handle = native.d3d11()?.handle;
        self.shared
            .call("ID3D11DeviceContext::Map", |device| device.read_buffer(handle))
    }

    pub(crate) fn read_texture(
        &self,
        texture: &Texture,
        region: &TextureRegion,
    ) -> Result<Vec<u8>, GraphicsError> {
        let native = texture.native()?;
        let handle = native.d3d11()?.handle;
        self.shared.call("ID3D11DeviceContext::Map", |device| {
            device.read_texture(
                handle,
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
        self.shared.device.lock().log.take_draws()
    }

    pub(crate) fn statistics(&self) -> DeviceStatistics {
        let device = self.shared.device.lock();
        DeviceStatistics::from_driver(&device.log, device.counts(), 0)
    }
}

impl Drop for D3D11Device {
    fn drop(&mut self) {
        self.shared.device.lock().shutdown();
        log::debug!("D3D11Device: destroyed");
    }
}
