//! Headless Direct3D 11 device, immediate context and DXGI swapchain.
//!
//! Objects are reference counted the way COM device children are: views and
//! context bindings hold a reference on the objects they point at, and an
//! object is destroyed when its last reference is released.

use std::collections::HashMap;

use crate::driver::{
    BufferMemory, DrawCall, DriverLog, ImageMemory, ObjectCounts, ObjectTable, encode_clear_color,
    encode_clear_depth,
};

use super::conversion::{d3d11, pixel_format_from_dxgi, topology_from_native};

pub const E_INVALIDARG: u32 = 0x8007_0057;
pub const E_OUTOFMEMORY: u32 = 0x8007_000E;
pub const DXGI_ERROR_INVALID_CALL: u32 = 0x887A_0001;

pub type HResult<T> = Result<T, u32>;

/// Register slots per shader stage and resource kind.
pub const SLOT_COUNT: u32 = 128;

/// `D3D11_REQ_RESOURCE_SIZE_IN_MEGABYTES_EXPRESSION_A_TERM` in bytes.
const MAX_RESOURCE_BYTES: u32 = 128 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct BufferDesc {
    pub byte_width: u32,
    pub bind_flags: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Texture2dDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub array_size: u32,
    pub format: u32,
    pub bind_flags: u32,
    pub misc_flags: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc {
    pub filter: u32,
    pub address: [u32; 3],
    pub max_anisotropy: u32,
    pub comparison_func: u32,
    pub min_lod: f32,
    pub max_lod: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Vertex,
    Pixel,
    Geometry,
    Hull,
    Domain,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 5] = [
        Self::Vertex,
        Self::Pixel,
        Self::Geometry,
        Self::Hull,
        Self::Domain,
    ];
}

#[derive(Debug, Clone)]
pub struct InputElementDesc {
    pub semantic_name: &'static str,
    pub semantic_index: u32,
    pub format: u32,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    pub instance_data_step_rate: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub src_blend: u32,
    pub dest_blend: u32,
    pub blend_op: u32,
    pub src_blend_alpha: u32,
    pub dest_blend_alpha: u32,
    pub blend_op_alpha: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RasterizerDesc {
    pub fill_mode: u32,
    pub cull_mode: u32,
    pub front_counter_clockwise: bool,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
}

/// A source or destination box, in bytes for buffers and pixels for textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct D3dBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

#[derive(Debug)]
enum DeviceChild {
    Buffer {
        desc: BufferDesc,
        memory: BufferMemory,
    },
    Texture2D {
        desc: Texture2dDesc,
        memory: ImageMemory,
    },
    ShaderResourceView {
        resource: u64,
    },
    RenderTargetView {
        resource: u64,
        mip: u32,
        layer: u32,
    },
    DepthStencilView {
        resource: u64,
        mip: u32,
        layer: u32,
    },
    SamplerState(SamplerDesc),
    Shader(ShaderKind),
    InputLayout(Vec<InputElementDesc>),
    BlendState(Vec<RenderTargetBlendDesc>),
    DepthStencilState(DepthStencilDesc),
    RasterizerState(RasterizerDesc),
}

impl DeviceChild {
    /// The object this child keeps a reference on.
    fn referenced(&self) -> Option<u64> {
        match self {
            Self::ShaderResourceView { resource }
            | Self::RenderTargetView { resource, .. }
            | Self::DepthStencilView { resource, .. } => Some(*resource),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct ComObject {
    refs: u32,
    child: DeviceChild,
}

/// A pipeline binding point of the immediate context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    RenderTarget(u32),
    DepthStencil,
    VertexBuffer(u32),
    IndexBuffer,
    InputLayout,
    Shader(ShaderKind),
    BlendState,
    DepthStencilState,
    RasterizerState,
    ConstantBuffer(ShaderKind, u32),
    ShaderResource(ShaderKind, u32),
    Sampler(ShaderKind, u32),
}

/// Non-object state of the immediate context.
#[derive(Debug, Default, Clone)]
struct ContextValues {
    vertex_strides: HashMap<u32, (u32, u32)>,
    index_format: u32,
    index_offset: u32,
    topology: u32,
    viewport: [f32; 6],
    scissor: [i32; 4],
    blend_factor: [f32; 4],
}

#[derive(Debug)]
struct SwapChain {
    buffers: Vec<u64>,
    current: u32,
    format: u32,
}

/// Severity of an info queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Error,
    Warning,
    Info,
}

/// The device, its immediate context and the swapchain.
#[derive(Debug)]
pub struct NativeDevice {
    objects: ObjectTable<ComObject>,
    bindings: HashMap<BindPoint, u64>,
    values: ContextValues,
    swapchain: Option<SwapChain>,
    info_queue: Option<Vec<(MessageSeverity, String)>>,
    unsupported_formats: Vec<u32>,
    pub log: DriverLog,
}

impl NativeDevice {
    /// `D3D11CreateDevice`; `debug` installs the info queue.
    pub fn new(debug: bool, unsupported_formats: Vec<u32>) -> Self {
        Self {
            objects: ObjectTable::new(),
            bindings: HashMap::new(),
            values: ContextValues::default(),
            swapchain: None,
            info_queue: debug.then(Vec::new),
            unsupported_formats,
            log: DriverLog::default(),
        }
    }

    fn message(&mut self, severity: MessageSeverity, text: String) {
        if let Some(queue) = &mut self.info_queue {
            queue.push((severity, text));
        }
    }

    fn fail<T>(&mut self, hresult: u32, text: String) -> HResult<T> {
        self.message(MessageSeverity::Error, text);
        Err(hresult)
    }

    /// Drain the debug info queue.
    pub fn take_messages(&mut self) -> Vec<(MessageSeverity, String)> {
        self.info_queue.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn check_format_support(&self, format: u32) -> bool {
        format != 0
            && pixel_format_from_dxgi(format).is_some()
            && !self.unsupported_formats.contains(&format)
    }

    pub fn counts(&self) -> ObjectCounts {
        self.objects.counts()
    }

    fn insert(&mut self, child: DeviceChild) -> u64 {
        self.objects.insert(ComObject { refs: 1, child })
    }

    fn child(&self, handle: u64) -> Option<&DeviceChild> {
        self.objects.get(handle).map(|object| &object.child)
    }

    // ========================================================================
    // Reference counting
    // ========================================================================

    pub fn add_ref(&mut self, handle: u64) -> u32 {
        match self.objects.get_mut(handle) {
            Some(object) => {
                object.refs += 1;
                object.refs
            }
            None => 0,
        }
    }

    /// `IUnknown::Release`. Returns the remaining reference count.
    pub fn release(&mut self, handle: u64) -> u32 {
        let Some(object) = self.objects.get_mut(handle) else {
            return 0;
        };
        object.refs -= 1;
        let refs = object.refs;
        if refs == 0
            && let Some(object) = self.objects.remove(handle)
            && let Some(referenced) = object.child.referenced()
        {
            self.release(referenced);
        }
        refs
    }

    pub fn ref_count(&self, handle: u64) -> u32 {
        self.objects.get(handle).map_or(0, |object| object.refs)
    }

    // ========================================================================
    // ID3D11Device
    // ========================================================================

    pub fn create_buffer(&mut self, desc: BufferDesc, initial: Option<&[u8]>) -> HResult<u64> {
        if desc.byte_width == 0 {
            return self.fail(E_INVALIDARG, "CreateBuffer: ByteWidth is zero".to_string());
        }
        if desc.byte_width > MAX_RESOURCE_BYTES {
            return self.fail(E_OUTOFMEMORY, "CreateBuffer: allocation too large".to_string());
        }
        if desc.bind_flags & d3d11::BIND_CONSTANT_BUFFER != 0 {
            if desc.byte_width % 16 != 0 {
                return self.fail(
                    E_INVALIDARG,
                    format!(
                        "CreateBuffer: constant buffer ByteWidth {} is not a multiple of 16",
                        desc.byte_width
                    ),
                );
            }
            if desc.bind_flags != d3d11::BIND_CONSTANT_BUFFER {
                return self.fail(
                    E_INVALIDARG,
                    "CreateBuffer: D3D11_BIND_CONSTANT_BUFFER cannot be combined".to_string(),
                );
            }
        }
        let memory = match initial {
            Some(data) if data.len() == desc.byte_width as usize => BufferMemory::from_bytes(data),
            Some(_) => {
                return self.fail(E_INVALIDARG, "CreateBuffer: initial data size".to_string());
            }
            None => BufferMemory::new(desc.byte_width as u64),
        };
        Ok(self.insert(DeviceChild::Buffer { desc, memory }))
    }

    pub fn create_texture_2d(&mut self, desc: Texture2dDesc) -> HResult<u64> {
        let Some(format) = pixel_format_from_dxgi(desc.format)
            .filter(|_| self.check_format_support(desc.format))
        else {
            return self.fail(
                E_INVALIDARG,
                format!("CreateTexture2D: format {} not supported", desc.format),
            );
        };
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 || desc.array_size == 0 {
            return self.fail(E_INVALIDARG, "CreateTexture2D: empty texture".to_string());
        }
        if desc.misc_flags & d3d11::RESOURCE_MISC_TEXTURECUBE != 0 && desc.array_size % 6 != 0 {
            return self.fail(
                E_INVALIDARG,
                "CreateTexture2D: cube ArraySize is not a multiple of 6".to_string(),
            );
        }
        let memory = ImageMemory::new(
            format,
            desc.width,
            desc.height,
            desc.mip_levels,
            desc.array_size,
        );
        Ok(self.insert(DeviceChild::Texture2D { desc, memory }))
    }

    fn texture_desc(&self, handle: u64) -> Option<Texture2dDesc> {
        match self.child(handle) {
            Some(DeviceChild::Texture2D { desc, .. }) => Some(*desc),
            _ => None,
        }
    }

    pub fn create_shader_resource_view(&mut self, resource: u64) -> HResult<u64> {
        match self.texture_desc(resource) {
            Some(desc) if desc.bind_flags & d3d11::BIND_SHADER_RESOURCE != 0 => {
                self.add_ref(resource);
                Ok(self.insert(DeviceChild::ShaderResourceView { resource }))
            }
            _ => self.fail(
                E_INVALIDARG,
                "CreateShaderResourceView: resource lacks D3D11_BIND_SHADER_RESOURCE".to_string(),
            ),
        }
    }

    pub fn create_render_target_view(&mut self, resource: u64, mip: u32, layer: u32) -> HResult<u64> {
        match self.texture_desc(resource) {
            Some(desc)
                if desc.bind_flags & d3d11::BIND_RENDER_TARGET != 0
                    && mip < desc.mip_levels
                    && layer < desc.array_size =>
            {
                self.add_ref(resource);
                Ok(self.insert(DeviceChild::RenderTargetView {
                    resource,
                    mip,
                    layer,
                }))
            }
            _ => self.fail(
                E_INVALIDARG,
                "CreateRenderTargetView: invalid resource or subresource".to_string(),
            ),
        }
    }

    pub fn create_depth_stencil_view(&mut self, resource: u64, mip: u32, layer: u32) -> HResult<u64> {
        match self.texture_desc(resource) {
            Some(desc)
                if desc.bind_flags & d3d11::BIND_DEPTH_STENCIL != 0
                    && mip < desc.mip_levels
                    && layer < desc.array_size =>
            {
                self.add_ref(resource);
                Ok(self.insert(DeviceChild::DepthStencilView {
                    resource,
                    mip,
                    layer,
                }))
            }
            _ => self.fail(
                E_INVALIDARG,
                "CreateDepthStencilView: invalid resource or subresource".to_string(),
            ),
        }
    }

    pub fn create_sampler_state(&mut self, desc: SamplerDesc) -> HResult<u64> {
        if desc.max_anisotropy > 16 || desc.min_lod > desc.max_lod {
            return self.fail(E_INVALIDARG, "CreateSamplerState: invalid desc".to_string());
        }
        Ok(self.insert(DeviceChild::SamplerState(desc)))
    }

    /// `Create{Vertex,Pixel,Geometry,Hull,Domain}Shader`.
    pub fn create_shader(&mut self, kind: ShaderKind, bytecode: &[u8]) -> HResult<u64> {
        if bytecode.len() < 4 || &bytecode[..4] != b"DXBC" {
            return self.fail(
                E_INVALIDARG,
                format!("Create{kind:?}Shader: bytecode is not a DXBC container"),
            );
        }
        Ok(self.insert(DeviceChild::Shader(kind)))
    }

    pub fn create_input_layout(
        &mut self,
        elements: Vec<InputElementDesc>,
        vertex_bytecode: &[u8],
    ) -> HResult<u64> {
        if vertex_bytecode.len() < 4 || &vertex_bytecode[..4] != b"DXBC" {
            return self.fail(
                E_INVALIDARG,
                "CreateInputLayout: vertex shader signature missing".to_string(),
            );
        }
        Ok(self.insert(DeviceChild::InputLayout(elements)))
    }

    pub fn create_blend_state(&mut self, targets: Vec<RenderTargetBlendDesc>) -> HResult<u64> {
        if targets.len() > 8 {
            return self.fail(E_INVALIDARG, "CreateBlendState: too many targets".to_string());
        }
        Ok(self.insert(DeviceChild::BlendState(targets)))
    }

    pub fn create_depth_stencil_state(&mut self, desc: DepthStencilDesc) -> HResult<u64> {
        Ok(self.insert(DeviceChild::DepthStencilState(desc)))
    }

    pub fn create_rasterizer_state(&mut self, desc: RasterizerDesc) -> HResult<u64> {
        Ok(self.insert(DeviceChild::RasterizerState(desc)))
    }

    // ========================================================================
    // ID3D11DeviceContext (immediate)
    // ========================================================================

    /// Bind `handle` at `point`, taking a reference on it and releasing the
    /// previous binding.
    pub fn bind(&mut self, point: BindPoint, handle: Option<u64>) {
        if let Some(handle) = handle {
            self.add_ref(handle);
        }
        let previous = match handle {
            Some(handle) => self.bindings.insert(point, handle),
            None => self.bindings.remove(&point),
        };
        if let Some(previous) = previous {
            self.release(previous);
        }
    }

    pub fn bound(&self, point: BindPoint) -> Option<u64> {
        self.bindings.get(&point).copied()
    }

    pub fn om_set_render_targets(&mut self, rtvs: &[u64], dsv: Option<u64>) {
        let stale: Vec<BindPoint> = self
            .bindings
            .keys()
            .filter(|point| matches!(point, BindPoint::RenderTarget(index) if *index as usize >= rtvs.len()))
            .copied()
            .collect();
        for point in stale {
            self.bind(point, None);
        }
        for (index, rtv) in rtvs.iter().enumerate() {
            self.bind(BindPoint::RenderTarget(index as u32), Some(*rtv));
        }
        self.bind(BindPoint::DepthStencil, dsv);
    }

    pub fn om_set_blend_state(&mut self, state: u64, blend_factor: [f32; 4]) {
        self.bind(BindPoint::BlendState, Some(state));
        self.values.blend_factor = blend_factor;
    }

    pub fn ia_set_vertex_buffer(&mut self, slot: u32, buffer: u64, stride: u32, offset: u32) {
        self.bind(BindPoint::VertexBuffer(slot), Some(buffer));
        self.values.vertex_strides.insert(slot, (stride, offset));
    }

    pub fn ia_set_index_buffer(&mut self, buffer: u64, format: u32, offset: u32) {
        self.bind(BindPoint::IndexBuffer, Some(buffer));
        self.values.index_format = format;
        self.values.index_offset = offset;
    }

    pub fn ia_set_primitive_topology(&mut self, topology: u32) {
        self.values.topology = topology;
    }

    pub fn rs_set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min: f32, max: f32) {
        self.values.viewport = [x, y, width, height, min, max];
    }

    pub fn rs_set_scissor_rect(&mut self, left: i32, top: i32, right: i32, bottom: i32) {
        self.values.scissor = [left, top, right, bottom];
    }

    /// `ClearState`: unbind everything, releasing the context's references.
    pub fn clear_state(&mut self) {
        let bound: Vec<u64> = self.bindings.drain().map(|(_, handle)| handle).collect();
        for handle in bound {
            self.release(handle);
        }
        self.values = ContextValues::default();
    }

    pub fn clear_render_target_view(&mut self, rtv: u64, color: [f32; 4]) -> HResult<()> {
        let Some(&DeviceChild::RenderTargetView {
            resource,
            mip,
            layer,
        }) = self.child(rtv)
        else {
            return self.fail(E_INVALIDARG, "ClearRenderTargetView: not a view".to_string());
        };
        let Some(ComObject {
            child: DeviceChild::Texture2D { memory, .. },
            ..
        }) = self.objects.get_mut(resource)
        else {
            return Err(E_INVALIDARG);
        };
        let [r, g, b, a] = color;
        let pixel = encode_clear_color(memory.format(), crate::types::RgbaFloat::new(r, g, b, a))
            .ok_or(E_INVALIDARG)?;
        memory.fill(mip, layer, &pixel).map_err(|_| E_INVALIDARG)?;
        self.log.clears += 1;
        Ok(())
    }

    pub fn clear_depth_stencil_view(
        &mut self,
        dsv: u64,
        flags: u32,
        depth: f32,
        stencil: u8,
    ) -> HResult<()> {
        let Some(&DeviceChild::DepthStencilView {
            resource,
            mip,
            layer,
        }) = self.child(dsv)
        else {
            return self.fail(E_INVALIDARG, "ClearDepthStencilView: not a view".to_string());
        };
        if flags & (d3d11::CLEAR_DEPTH | d3d11::CLEAR_STENCIL) == 0 {
            return Err(E_INVALIDARG);
        }
        let Some(ComObject {
            child: DeviceChild::Texture2D { memory, .. },
            ..
        }) = self.objects.get_mut(resource)
        else {
            return Err(E_INVALIDARG);
        };
        let texel = encode_clear_depth(memory.format(), depth, stencil).ok_or(E_INVALIDARG)?;
        memory.fill(mip, layer, &texel).map_err(|_| E_INVALIDARG)?;
        self.log.clears += 1;
        Ok(())
    }

    /// `UpdateSubresource`. Constant buffers only accept whole-buffer updates.
    pub fn update_subresource(
        &mut self,
        resource: u64,
        subresource: u32,
        dst_box: Option<D3dBox>,
        data: &[u8],
    ) -> HResult<()> {
        let result = match self.objects.get_mut(resource).map(|object| &mut object.child) {
            Some(DeviceChild::Buffer { desc, memory }) => {
                let (left, right) = match dst_box {
                    Some(_) if desc.bind_flags & d3d11::BIND_CONSTANT_BUFFER != 0 => {
                        Err(E_INVALIDARG)
                    }
                    Some(region) => Ok((region.left, region.right)),
                    None => Ok((0, desc.byte_width)),
                }?;
                if right < left || (right - left) as usize != data.len() {
                    Err(E_INVALIDARG)
                } else {
                    memory.write(left as u64, data).map_err(|_| E_INVALIDARG)
                }
            }
            Some(DeviceChild::Texture2D { desc, memory }) => {
                let mip = subresource % desc.mip_levels;
                let layer = subresource / desc.mip_levels;
                let (x, y, w, h) = match dst_box {
                    Some(region) => (
                        region.left,
                        region.top,
                        region.right.saturating_sub(region.left),
                        region.bottom.saturating_sub(region.top),
                    ),
                    None => {
                        let (w, h) = crate::types::mip_extent(desc.width, desc.height, mip);
                        (0, 0, w, h)
                    }
                };
                memory
                    .write_region(mip, layer, x, y, w, h, data)
                    .map_err(|_| E_INVALIDARG)
            }
            _ => Err(E_INVALIDARG),
        };
        if result.is_err() {
            self.message(
                MessageSeverity::Error,
                format!("UpdateSubresource: invalid arguments for resource {resource}"),
            );
        }
        result
    }

    /// `CopySubresourceRegion` between buffers.
    pub fn copy_buffer_region(
        &mut self,
        dst: u64,
        dst_offset: u32,
        src: u64,
        src_box: D3dBox,
    ) -> HResult<()> {
        let bytes = match self.child(src) {
            Some(DeviceChild::Buffer { memory, .. }) => memory
                .read(src_box.left as u64, (src_box.right - src_box.left) as u64)
                .map_err(|_| E_INVALIDARG)?
                .to_vec(),
            _ => return Err(E_INVALIDARG),
        };
        match self.objects.get_mut(dst).map(|object| &mut object.child) {
            Some(DeviceChild::Buffer { memory, .. }) => memory
                .write(dst_offset as u64, &bytes)
                .map_err(|_| E_INVALIDARG),
            _ => Err(E_INVALIDARG),
        }
    }

    fn draw_state_error(&self, indexed: bool) -> Option<&'static str> {
        if self.bound(BindPoint::Shader(ShaderKind::Vertex)).is_none() {
            return Some("no vertex shader bound");
        }
        if self.values.topology == 0 {
            return Some("primitive topology undefined");
        }
        if indexed && self.bound(BindPoint::IndexBuffer).is_none() {
            return Some("no index buffer bound");
        }
        None
    }

    fn record_draw(&mut self, draw: DrawCall, indexed: bool) -> HResult<()> {
        if let Some(reason) = self.draw_state_error(indexed) {
            return self.fail(E_INVALIDARG, format!("Draw: {reason}"));
        }
        let topology = topology_from_native(self.values.topology).unwrap_or_default();
        self.log.record_draw(draw.with_topology(topology));
        Ok(())
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) -> HResult<()> {
        let draw = DrawCall::non_indexed(vertex_count, instance_count, start_vertex, start_instance);
        self.record_draw(draw, false)
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) -> HResult<()> {
        let draw = DrawCall::indexed(
            index_count,
            instance_count,
            start_index,
            base_vertex,
            start_instance,
        );
        self.record_draw(draw, true)
    }

    // ========================================================================
    // Inspection (staging copy + Map)
    // ========================================================================

    pub fn read_buffer(&self, buffer: u64) -> HResult<Vec<u8>> {
        match self.child(buffer) {
            Some(DeviceChild::Buffer { memory, .. }) => Ok(memory.as_bytes().to_vec()),
            _ => Err(E_INVALIDARG),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn read_texture(
        &self,
        texture: u64,
        mip: u32,
        layer: u32,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> HResult<Vec<u8>> {
        match self.child(texture) {
            Some(DeviceChild::Texture2D { memory, .. }) => memory
                .read_region(mip, layer, x, y, w, h)
                .map_err(|_| E_INVALIDARG),
            _ => Err(E_INVALIDARG),
        }
    }

    // ========================================================================
    // IDXGISwapChain
    // ========================================================================

    pub fn create_swap_chain(
        &mut self,
        width: u32,
        height: u32,
        format: u32,
        buffer_count: u32,
    ) -> HResult<()> {
        if self.swapchain.is_some() {
            return Err(DXGI_ERROR_INVALID_CALL);
        }
        let buffers = self.create_back_buffers(width, height, format, buffer_count)?;
        self.swapchain = Some(SwapChain {
            buffers,
            current: 0,
            format,
        });
        Ok(())
    }

    fn create_back_buffers(
        &mut self,
        width: u32,
        height: u32,
        format: u32,
        count: u32,
    ) -> HResult<Vec<u64>> {
        (0..count)
            .map(|_| {
                self.create_texture_2d(Texture2dDesc {
                    width,
                    height,
                    mip_levels: 1,
                    array_size: 1,
                    format,
                    bind_flags: d3d11::BIND_RENDER_TARGET,
                    misc_flags: 0,
                })
            })
            .collect()
    }

    /// `GetBuffer`; the caller owns the returned reference.
    pub fn get_buffer(&mut self, index: u32) -> HResult<u64> {
        let handle = self
            .swapchain
            .as_ref()
            .and_then(|swapchain| swapchain.buffers.get(index as usize).copied())
            .ok_or(DXGI_ERROR_INVALID_CALL)?;
        self.add_ref(handle);
        Ok(handle)
    }

    pub fn current_back_buffer_index(&self) -> u32 {
        self.swapchain.as_ref().map_or(0, |swapchain| swapchain.current)
    }

    pub fn present(&mut self) -> HResult<u32> {
        let swapchain = self.swapchain.as_mut().ok_or(DXGI_ERROR_INVALID_CALL)?;
        swapchain.current = (swapchain.current + 1) % swapchain.buffers.len() as u32;
        self.log.presents += 1;
        Ok(swapchain.current)
    }

    /// `ResizeBuffers`. Fails while any back buffer is referenced outside
    /// the swapchain.
    pub fn resize_buffers(&mut self, width: u32, height: u32) -> HResult<()> {
        let Some(swapchain) = self.swapchain.take() else {
            return Err(DXGI_ERROR_INVALID_CALL);
        };
        let held = swapchain
            .buffers
            .iter()
            .copied()
            .find(|buffer| self.ref_count(*buffer) > 1);
        if let Some(held) = held {
            self.swapchain = Some(swapchain);
            return self.fail(
                DXGI_ERROR_INVALID_CALL,
                format!("ResizeBuffers: back buffer {held} still referenced"),
            );
        }
        let count = swapchain.buffers.len() as u32;
        for buffer in &swapchain.buffers {
            self.release(*buffer);
        }
        let buffers = self.create_back_buffers(width, height, swapchain.format, count)?;
        self.swapchain = Some(SwapChain {
            buffers,
            current: 0,
            format: swapchain.format,
        });
        Ok(())
    }

    /// Release the swapchain and everything the context still binds.
    pub fn shutdown(&mut self) {
        self.clear_state();
        if let Some(swapchain) = self.swapchain.take() {
            for buffer in swapchain.buffers {
                self.release(buffer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::d3d11::conversion::dxgi;

    fn texture_desc(bind_flags: u32) -> Texture2dDesc {
        Texture2dDesc {
            width: 4,
            height: 4,
            mip_levels: 1,
            array_size: 1,
            format: dxgi::FORMAT_R8G8B8A8_UNORM,
            bind_flags,
            misc_flags: 0,
        }
    }

    #[test]
    fn test_constant_buffer_rules() {
        let mut device = NativeDevice::new(true, Vec::new());
        let odd = BufferDesc {
            byte_width: 20,
            bind_flags: d3d11::BIND_CONSTANT_BUFFER,
        };
        assert_eq!(device.create_buffer(odd, None), Err(E_INVALIDARG));
        let mixed = BufferDesc {
            byte_width: 32,
            bind_flags: d3d11::BIND_CONSTANT_BUFFER | d3d11::BIND_VERTEX_BUFFER,
        };
        assert_eq!(device.create_buffer(mixed, None), Err(E_INVALIDARG));
        assert_eq!(device.take_messages().len(), 2);
    }

    #[test]
    fn test_views_keep_resources_alive() {
        let mut device = NativeDevice::new(false, Vec::new());
        let texture = device
            .create_texture_2d(texture_desc(d3d11::BIND_RENDER_TARGET))
            .unwrap();
        let rtv = device.create_render_target_view(texture, 0, 0).unwrap();
        assert_eq!(device.release(texture), 1);
        assert_eq!(device.counts().live, 2);

        device.clear_render_target_view(rtv, [1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(device.release(rtv), 0);
        assert_eq!(device.counts().live, 0);
        assert_eq!(device.counts().destroyed, 2);
    }

    #[test]
    fn test_resize_buffers_fails_while_views_exist() {
        let mut device = NativeDevice::new(false, Vec::new());
        device
            .create_swap_chain(8, 8, dxgi::FORMAT_B8G8R8A8_UNORM, 2)
            .unwrap();
        let back_buffer = device.get_buffer(0).unwrap();
        let rtv = device.create_render_target_view(back_buffer, 0, 0).unwrap();
        device.release(back_buffer);

        assert_eq!(device.resize_buffers(16, 16), Err(DXGI_ERROR_INVALID_CALL));
        device.release(rtv);
        assert_eq!(device.resize_buffers(16, 16), Ok(()));
    }

    #[test]
    fn test_context_bindings_hold_references() {
        let mut device = NativeDevice::new(false, Vec::new());
        let buffer = device
            .create_buffer(
                BufferDesc {
                    byte_width: 16,
                    bind_flags: d3d11::BIND_VERTEX_BUFFER,
                },
                None,
            )
            .unwrap();
        device.ia_set_vertex_buffer(0, buffer, 16, 0);
        assert_eq!(device.release(buffer), 1);
        device.clear_state();
        assert_eq!(device.counts().live, 0);
    }
}
