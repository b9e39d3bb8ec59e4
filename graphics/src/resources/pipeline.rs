//! Graphics pipeline resource.

use std::sync::Arc;

use crate::backend::GpuPipeline;
use crate::error::GraphicsError;
use crate::types::{
    BlendState, DepthStencilState, OutputDescription, PrimitiveTopology, RasterizerState,
    ShaderStage, VertexLayout,
};

use super::{NativeSlot, ResourceId, ResourceLayout, Shader};

/// Vertex input layouts and the shader stages of a pipeline.
#[derive(Debug, Clone, Default)]
pub struct ShaderSet {
    /// One layout per vertex buffer slot.
    pub vertex_layouts: Vec<VertexLayout>,
    /// At most one shader per stage; exactly one vertex shader.
    pub shaders: Vec<Arc<Shader>>,
}

impl ShaderSet {
    /// Create a new shader set.
    pub fn new(vertex_layouts: Vec<VertexLayout>, shaders: Vec<Arc<Shader>>) -> Self {
        Self {
            vertex_layouts,
            shaders,
        }
    }

    /// The shader for `stage`, if present.
    pub fn shader(&self, stage: ShaderStage) -> Option<&Arc<Shader>> {
        self.shaders.iter().find(|shader| shader.stage() == stage)
    }
}

/// Descriptor for creating a graphics pipeline.
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Blend configuration; one attachment per color output.
    pub blend_state: BlendState,
    /// Depth test configuration.
    pub depth_stencil_state: DepthStencilState,
    /// Rasterizer configuration.
    pub rasterizer_state: RasterizerState,
    /// Primitive assembly.
    pub primitive_topology: PrimitiveTopology,
    /// Vertex layouts and shaders.
    pub shader_set: ShaderSet,
    /// Resource layout expected at each resource set slot.
    pub resource_layouts: Vec<Arc<ResourceLayout>>,
    /// Attachment formats the pipeline renders into.
    pub outputs: OutputDescription,
}

impl PipelineDescriptor {
    /// A pipeline with default fixed-function state.
    pub fn new(shader_set: ShaderSet, outputs: OutputDescription) -> Self {
        let blend_state = BlendState {
            attachments: vec![Default::default(); outputs.color_formats.len()],
            ..Default::default()
        };
        let depth_stencil_state = if outputs.depth_format.is_some() {
            DepthStencilState::LESS_EQUAL
        } else {
            DepthStencilState::DISABLED
        };
        Self {
            label: None,
            blend_state,
            depth_stencil_state,
            rasterizer_state: RasterizerState::default(),
            primitive_topology: PrimitiveTopology::TriangleList,
            shader_set,
            resource_layouts: Vec::new(),
            outputs,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the blend state.
    pub fn with_blend_state(mut self, blend_state: BlendState) -> Self {
        self.blend_state = blend_state;
        self
    }

    /// Set the depth state.
    pub fn with_depth_stencil_state(mut self, state: DepthStencilState) -> Self {
        self.depth_stencil_state = state;
        self
    }

    /// Set the rasterizer state.
    pub fn with_rasterizer_state(mut self, state: RasterizerState) -> Self {
        self.rasterizer_state = state;
        self
    }

    /// Set the primitive topology.
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.primitive_topology = topology;
        self
    }

    /// Set the resource layouts, one per resource set slot.
    pub fn with_resource_layouts(mut self, layouts: Vec<Arc<ResourceLayout>>) -> Self {
        self.resource_layouts = layouts;
        self
    }
}

/// An immutable, fully validated graphics pipeline.
///
/// Pipelines are compatible with every framebuffer whose
/// [`OutputDescription`] equals theirs.
pub struct Pipeline {
    id: ResourceId,
    descriptor: PipelineDescriptor,
    native: NativeSlot<GpuPipeline>,
}

impl Pipeline {
    pub(crate) fn new(descriptor: PipelineDescriptor, native: GpuPipeline) -> Self {
        Self {
            id: ResourceId::next(),
            descriptor,
            native: NativeSlot::new("pipeline", native),
        }
    }

    /// Unique identifier of this pipeline.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Get the pipeline descriptor.
    pub fn descriptor(&self) -> &PipelineDescriptor {
        &self.descriptor
    }

    /// Attachment formats the pipeline renders into.
    pub fn outputs(&self) -> &OutputDescription {
        &self.descriptor.outputs
    }

    /// Vertex buffer layouts, one per slot.
    pub fn vertex_layouts(&self) -> &[VertexLayout] {
        &self.descriptor.shader_set.vertex_layouts
    }

    /// Resource layouts, one per resource set slot.
    pub fn resource_layouts(&self) -> &[Arc<ResourceLayout>] {
        &self.descriptor.resource_layouts
    }

    /// Primitive assembly.
    pub fn topology(&self) -> PrimitiveTopology {
        self.descriptor.primitive_topology
    }

    /// Get the pipeline label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Release this handle's claim on the native pipeline.
    pub fn dispose(&self) {
        if self.native.release() {
            log::trace!("Pipeline: disposed {} ({:?})", self.id, self.label());
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.native.is_released()
    }

    pub(crate) fn native(&self) -> Result<GpuPipeline, GraphicsError> {
        self.native.get()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("topology", &self.descriptor.primitive_topology)
            .field("outputs", &self.descriptor.outputs)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);
