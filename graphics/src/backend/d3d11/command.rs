//! D3D11 command recording against the immediate context.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GraphicsError;
use crate::resources::{BindingResource, Buffer, Framebuffer, Pipeline, ResourceSet, Texture};
use crate::types::{IndexFormat, RgbaFloat, ScissorRect, TextureRegion, Viewport};

use super::conversion::{convert_index_format, d3d11};
use super::native::{BindPoint, BufferDesc, D3dBox, ShaderKind};
use super::{D3D11Framebuffer, D3D11Shared};

/// Registers reserved per resource set slot.
const REGISTERS_PER_SET: u32 = 16;

/// A command list recording straight into the immediate context.
///
/// Bindings made while recording hold references on the native objects, so
/// disposing a handle after binding it does not destroy the object before
/// the list executes. Executing or resetting the list clears the context
/// state, releasing those references.
pub(crate) struct D3D11CommandList {
    shared: Arc<D3D11Shared>,
    /// Framebuffer currently bound, kept for clears.
    framebuffer: Option<Arc<D3D11Framebuffer>>,
    framebuffer_image: u32,
    /// Vertex buffers per slot, re-applied when the pipeline changes strides.
    vertex_buffers: HashMap<u32, u64>,
    strides: Vec<u32>,
    issued: usize,
}

impl D3D11CommandList {
    pub(super) fn new(shared: Arc<D3D11Shared>) -> Self {
        Self {
            shared,
            framebuffer: None,
            framebuffer_image: 0,
            vertex_buffers: HashMap::new(),
            strides: Vec::new(),
            issued: 0,
        }
    }

    fn context<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut super::native::NativeDevice) -> super::native::HResult<T>,
    ) -> Result<T, GraphicsError> {
        self.shared.check_owner(operation)?;
        let result = self.shared.call(operation, f)?;
        self.issued += 1;
        Ok(result)
    }

    pub(crate) fn begin(&mut self) -> Result<(), GraphicsError> {
        self.shared.check_owner("ID3D11DeviceContext::Begin")
    }

    pub(crate) fn end(&mut self) -> Result<(), GraphicsError> {
        Ok(())
    }

    pub(crate) fn reset(&mut self) -> Result<(), GraphicsError> {
        self.release_state();
        Ok(())
    }

    /// Release everything the context binds on behalf of this list.
    pub(super) fn finish_execution(&mut self) -> Result<(), GraphicsError> {
        log::trace!("D3D11CommandList: executed {} context calls", self.issued);
        self.release_state();
        Ok(())
    }

    fn release_state(&mut self) {
        // Drop the framebuffer reference after the device lock is released.
        let framebuffer = self.framebuffer.take();
        self.shared.device.lock().clear_state();
        drop(framebuffer);
        self.vertex_buffers.clear();
        self.strides.clear();
        self.issued = 0;
    }

    pub(crate) fn set_framebuffer(&mut self, framebuffer: &Framebuffer) -> Result<(), GraphicsError> {
        let native = framebuffer.native()?;
        let native = Arc::clone(native.d3d11()?);
        let image_index = framebuffer.image_index();
        let views = native.views(image_index).to_vec();
        let depth_view = native.depth_view;
        self.context("ID3D11DeviceContext::OMSetRenderTargets", |device| {
            device.om_set_render_targets(&views, depth_view);
            Ok(())
        })?;
        let previous = self.framebuffer.replace(native);
        self.framebuffer_image = image_index;
        drop(previous);
        Ok(())
    }

    pub(crate) fn set_viewport(&mut self, viewport: &Viewport) -> Result<(), GraphicsError> {
        let Viewport {
            x,
            y,
            width,
            height,
            min_depth,
            max_depth,
        } = *viewport;
        self.context("ID3D11DeviceContext::RSSetViewports", |device| {
            device.rs_set_viewport(x, y, width, height, min_depth, max_depth);
            Ok(())
        })
    }

    pub(crate) fn set_scissor_rect(&mut self, rect: &ScissorRect) -> Result<(), GraphicsError> {
        let right = rect.x.saturating_add(rect.width as i32);
        let bottom = rect.y.saturating_add(rect.height as i32);
        let (left, top) = (rect.x, rect.y);
        self.context("ID3D11DeviceContext::RSSetScissorRects", |device| {
            device.rs_set_scissor_rect(left, top, right, bottom);
            Ok(())
        })
    }

    pub(crate) fn set_vertex_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<(), GraphicsError> {
        let native = buffer.native()?;
        let handle = native.d3d11()?.handle;
        let stride = self.strides.get(slot as usize).copied().unwrap_or(0);
        self.context("ID3D11DeviceContext::IASetVertexBuffers", |device| {
            device.ia_set_vertex_buffer(slot, handle, stride, 0);
            Ok(())
        })?;
        self.vertex_buffers.insert(slot, handle);
        Ok(())
    }

    pub(crate) fn set_index_buffer(
        &mut self,
        buffer: &Buffer,
        format: IndexFormat,
    ) -> Result<(), GraphicsError> {
        let native = buffer.native()?;
        let handle = native.d3d11()?.handle;
        let format = convert_index_format(format);
        self.context("ID3D11DeviceContext::IASetIndexBuffer", |device| {
            device.ia_set_index_buffer(handle, format, 0);
            Ok(())
        })
    }

    pub(crate) fn set_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), GraphicsError> {
        let native = pipeline.native()?;
        let pipeline = native.d3d11()?;
        let vertex_buffers: Vec<(u32, u64)> =
            self.vertex_buffers.iter().map(|(slot, handle)| (*slot, *handle)).collect();
        self.context("ID3D11DeviceContext::SetPipelineState", |device| {
            for kind in ShaderKind::ALL {
                let shader = pipeline
                    .shaders
                    .iter()
                    .find(|(shader_kind, _)| *shader_kind == kind)
                    .map(|(_, handle)| *handle);
                device.bind(BindPoint::Shader(kind), shader);
            }
            device.bind(BindPoint::InputLayout, Some(pipeline.input_layout));
            device.om_set_blend_state(pipeline.blend_state, pipeline.blend_factor);
            device.bind(BindPoint::DepthStencilState, Some(pipeline.depth_stencil_state));
            device.bind(BindPoint::RasterizerState, Some(pipeline.rasterizer_state));
            device.ia_set_primitive_topology(pipeline.topology);
            for (slot, buffer) in vertex_buffers {
                let stride = pipeline.strides.get(slot as usize).copied().unwrap_or(0);
                device.ia_set_vertex_buffer(slot, buffer, stride, 0);
            }
            Ok(())
        })?;
        self.strides = pipeline.strides.clone();
        Ok(())
    }

    pub(crate) fn set_resource_set(&mut self, slot: u32, set: &ResourceSet) -> Result<(), GraphicsError> {
        let native = set.native()?;
        let layout = Arc::clone(&native.d3d11()?.layout);
        let resources = set.resolve()?;

        let first_register = slot.checked_mul(REGISTERS_PER_SET).ok_or_else(|| {
            GraphicsError::OutOfBounds(format!("resource set slot {slot} has no registers"))
        })?;
        let mut bindings = Vec::with_capacity(resources.len());
        for (index, (resource, (_, kinds))) in resources.iter().zip(&layout.elements).enumerate() {
            let register = first_register + index as u32;
            let handle = match resource {
                BindingResource::UniformBuffer(buffer) => {
                    let native = buffer.native()?;
                    let handle = native.d3d11()?.handle;
                    kinds
                        .iter()
                        .map(|kind| (BindPoint::ConstantBuffer(*kind, register), handle))
                        .collect::<Vec<_>>()
                }
                BindingResource::Texture(texture) => {
                    let native = texture.native()?;
                    let srv = native.d3d11()?.srv.ok_or_else(|| {
                        GraphicsError::state(format!(
                            "texture {} has no shader resource view",
                            texture.id()
                        ))
                    })?;
                    kinds
                        .iter()
                        .map(|kind| (BindPoint::ShaderResource(*kind, register), srv))
                        .collect()
                }
                BindingResource::Sampler(sampler) => {
                    let native = sampler.native()?;
                    let handle = native.d3d11()?.handle;
                    kinds
                        .iter()
                        .map(|kind| (BindPoint::Sampler(*kind, register), handle))
                        .collect()
                }
            };
            bindings.extend(handle);
        }

        // `resources` stays alive until the context holds its references.
        self.context("ID3D11DeviceContext::SetShaderResources", |device| {
            for (point, handle) in bindings {
                device.bind(point, Some(handle));
            }
            Ok(())
        })?;
        drop(resources);
        Ok(())
    }

    pub(crate) fn update_buffer(
        &mut self,
        buffer: &Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let native = buffer.native()?;
        let target = native.d3d11()?;
        let handle = target.handle;
        let offset = offset as u32;
        let whole = offset == 0 && data.len() as u64 == target.size;

        if target.constant && !whole {
            // Constant buffers cannot take a partial UpdateSubresource.
            return self.context("ID3D11DeviceContext::CopySubresourceRegion", |device| {
                let staging = device.create_buffer(
                    BufferDesc {
                        byte_width: data.len() as u32,
                        bind_flags: 0,
                    },
                    Some(data),
                )?;
                let result = device.copy_buffer_region(
                    handle,
                    offset,
                    staging,
                    D3dBox {
                        left: 0,
                        top: 0,
                        right: data.len() as u32,
                        bottom: 1,
                    },
                );
                device.release(staging);
                result
            });
        }

        let dst_box = (!whole).then(|| D3dBox {
            left: offset,
            top: 0,
            right: offset + data.len() as u32,
            bottom: 1,
        });
        self.context("ID3D11DeviceContext::UpdateSubresource", |device| {
            device.update_subresource(handle, 0, dst_box, data)
        })
    }

    pub(crate) fn update_texture(
        &mut self,
        texture: &Texture,
        region: &TextureRegion,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let native = texture.native()?;
        let target = native.d3d11()?;
        let handle = target.handle;
        let subresource = region.mip_level + region.array_layer * target.mip_levels;
        let dst_box = D3dBox {
            left: region.x,
            top: region.y,
            right: region.x + region.width,
            bottom: region.y + region.height,
        };
        self.context("ID3D11DeviceContext::UpdateSubresource", |device| {
            device.update_subresource(handle, subresource, Some(dst_box), data)
        })
    }

    pub(crate) fn clear_color_target(
        &mut self,
        index: u32,
        color: RgbaFloat,
    ) -> Result<(), GraphicsError> {
        let view = self
            .framebuffer
            .as_ref()
            .and_then(|framebuffer| {
                framebuffer
                    .views(self.framebuffer_image)
                    .get(index as usize)
                    .copied()
            })
            .ok_or_else(|| GraphicsError::state(format!("no color target {index} bound")))?;
        self.context("ID3D11DeviceContext::ClearRenderTargetView", |device| {
            device.clear_render_target_view(view, color.to_array())
        })
    }

    pub(crate) fn clear_depth_target(&mut self, depth: f32, stencil: u8) -> Result<(), GraphicsError> {
        let view = self
            .framebuffer
            .as_ref()
            .and_then(|framebuffer| framebuffer.depth_view)
            .ok_or_else(|| GraphicsError::state("no depth target bound"))?;
        self.context("ID3D11DeviceContext::ClearDepthStencilView", |device| {
            device.clear_depth_stencil_view(
                view,
                d3d11::CLEAR_DEPTH | d3d11::CLEAR_STENCIL,
                depth,
                stencil,
            )
        })
    }

    pub(crate) fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.context("ID3D11DeviceContext::DrawInstanced", |device| {
            device.draw_instanced(vertex_count, instance_count, first_vertex, first_instance)
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
        self.context("ID3D11DeviceContext::DrawIndexedInstanced", |device| {
            device.draw_indexed_instanced(
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        })
    }
}

impl Drop for D3D11CommandList {
    fn drop(&mut self) {
        if self.issued > 0 {
            log::debug!(
                "D3D11CommandList: dropped with {} unexecuted context calls",
                self.issued
            );
        }
    }
}
