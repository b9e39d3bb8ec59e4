//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, and the value-type
//! descriptors used to create resources. Descriptors that reference other
//! resources (pipelines, resource sets, framebuffers) live next to their
//! handles in [`crate::resources`].

mod binding;
mod buffer;
mod common;
mod pipeline;
mod sampler;
mod shader;
mod texture;

pub use binding::{ResourceKind, ResourceLayoutDescriptor, ResourceLayoutElement};
pub use buffer::{BufferDescriptor, BufferUsage, IndexFormat};
pub use common::{RgbaFloat, ScissorRect, Viewport};
pub use pipeline::{
    BlendAttachment, BlendFactor, BlendFunction, BlendState, ComparisonKind, DepthStencilState,
    FaceCullMode, FrontFace, OutputDescription, PolygonFillMode, PrimitiveTopology,
    RasterizerState, VertexElement, VertexElementFormat, VertexElementSemantic, VertexLayout,
};
pub use sampler::{AddressMode, FilterMode, MAX_ANISOTROPY, SamplerDescriptor};
pub use shader::{ShaderDescriptor, ShaderStage, ShaderStages};
pub use texture::{
    CubeFace, PixelFormat, TextureDescriptor, TextureKind, TextureRegion, TextureUsage,
    max_mip_levels, mip_extent,
};
