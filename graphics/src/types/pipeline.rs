//! Fixed-function pipeline state descriptions.

use super::{PixelFormat, RgbaFloat};

// ============================================================================
// Blending
// ============================================================================

/// Source or destination factor of a blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// `0`
    Zero,
    /// `1`
    One,
    /// Source alpha.
    SourceAlpha,
    /// `1 - source alpha`
    InverseSourceAlpha,
    /// Destination alpha.
    DestinationAlpha,
    /// `1 - destination alpha`
    InverseDestinationAlpha,
    /// Source color.
    SourceColor,
    /// `1 - source color`
    InverseSourceColor,
    /// Destination color.
    DestinationColor,
    /// `1 - destination color`
    InverseDestinationColor,
    /// The constant blend factor of the [`BlendState`].
    BlendFactor,
    /// `1 - constant blend factor`
    InverseBlendFactor,
}

/// Operator combining the weighted source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFunction {
    /// `src + dst`
    #[default]
    Add,
    /// `src - dst`
    Subtract,
    /// `dst - src`
    ReverseSubtract,
    /// `min(src, dst)`
    Minimum,
    /// `max(src, dst)`
    Maximum,
}

/// Blend configuration of one color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendAttachment {
    /// Whether blending is enabled.
    pub enabled: bool,
    /// Source color factor.
    pub source_color: BlendFactor,
    /// Destination color factor.
    pub destination_color: BlendFactor,
    /// Color operator.
    pub color_function: BlendFunction,
    /// Source alpha factor.
    pub source_alpha: BlendFactor,
    /// Destination alpha factor.
    pub destination_alpha: BlendFactor,
    /// Alpha operator.
    pub alpha_function: BlendFunction,
}

impl BlendAttachment {
    /// Blending disabled; the source overwrites the destination.
    pub const OVERRIDE: Self = Self {
        enabled: false,
        source_color: BlendFactor::One,
        destination_color: BlendFactor::Zero,
        color_function: BlendFunction::Add,
        source_alpha: BlendFactor::One,
        destination_alpha: BlendFactor::Zero,
        alpha_function: BlendFunction::Add,
    };

    /// Classic non-premultiplied alpha blending.
    pub const ALPHA_BLEND: Self = Self {
        enabled: true,
        source_color: BlendFactor::SourceAlpha,
        destination_color: BlendFactor::InverseSourceAlpha,
        color_function: BlendFunction::Add,
        source_alpha: BlendFactor::SourceAlpha,
        destination_alpha: BlendFactor::InverseSourceAlpha,
        alpha_function: BlendFunction::Add,
    };

    /// Additive blending.
    pub const ADDITIVE: Self = Self {
        enabled: true,
        source_color: BlendFactor::SourceAlpha,
        destination_color: BlendFactor::One,
        color_function: BlendFunction::Add,
        source_alpha: BlendFactor::SourceAlpha,
        destination_alpha: BlendFactor::One,
        alpha_function: BlendFunction::Add,
    };
}

impl Default for BlendAttachment {
    fn default() -> Self {
        Self::OVERRIDE
    }
}

/// Blend state of a pipeline: one attachment entry per color output.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendState {
    /// Constant used by [`BlendFactor::BlendFactor`].
    pub blend_factor: RgbaFloat,
    /// Per color attachment configuration.
    pub attachments: Vec<BlendAttachment>,
}

impl BlendState {
    /// One attachment with blending disabled.
    pub fn single_override() -> Self {
        Self::single(BlendAttachment::OVERRIDE)
    }

    /// One attachment with alpha blending.
    pub fn single_alpha_blend() -> Self {
        Self::single(BlendAttachment::ALPHA_BLEND)
    }

    /// One attachment with the given configuration.
    pub fn single(attachment: BlendAttachment) -> Self {
        Self {
            blend_factor: RgbaFloat::BLACK,
            attachments: vec![attachment],
        }
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::single_override()
    }
}

// ============================================================================
// Depth / Stencil
// ============================================================================

/// Comparison used by depth testing and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonKind {
    /// Never pass.
    Never,
    /// Pass if less than.
    Less,
    /// Pass if equal.
    Equal,
    /// Pass if less than or equal.
    LessEqual,
    /// Pass if greater than.
    Greater,
    /// Pass if not equal.
    NotEqual,
    /// Pass if greater than or equal.
    GreaterEqual,
    /// Always pass.
    Always,
}

/// Depth testing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    /// Whether fragments are tested against the depth buffer.
    pub depth_test_enabled: bool,
    /// Whether passing fragments write depth.
    pub depth_write_enabled: bool,
    /// Depth comparison.
    pub comparison: ComparisonKind,
}

impl DepthStencilState {
    /// Depth test and write with `LessEqual`.
    pub const LESS_EQUAL: Self = Self {
        depth_test_enabled: true,
        depth_write_enabled: true,
        comparison: ComparisonKind::LessEqual,
    };

    /// Depth test and write disabled.
    pub const DISABLED: Self = Self {
        depth_test_enabled: false,
        depth_write_enabled: false,
        comparison: ComparisonKind::Always,
    };
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self::LESS_EQUAL
    }
}

// ============================================================================
// Rasterizer
// ============================================================================

/// Which faces are culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FaceCullMode {
    /// Cull back faces.
    #[default]
    Back,
    /// Cull front faces.
    Front,
    /// Cull nothing.
    None,
}

/// How polygons are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonFillMode {
    /// Filled triangles.
    #[default]
    Solid,
    /// Edges only.
    Wireframe,
}

/// Winding order of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Clockwise triangles face the viewer.
    #[default]
    Clockwise,
    /// Counter-clockwise triangles face the viewer.
    CounterClockwise,
}

/// Rasterizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizerState {
    /// Face culling.
    pub cull_mode: FaceCullMode,
    /// Fill mode.
    pub fill_mode: PolygonFillMode,
    /// Front face winding.
    pub front_face: FrontFace,
    /// Clip fragments outside the depth range instead of clamping them.
    pub depth_clip_enabled: bool,
    /// Discard fragments outside the scissor rectangle.
    pub scissor_test_enabled: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull_mode: FaceCullMode::Back,
            fill_mode: PolygonFillMode::Solid,
            front_face: FrontFace::Clockwise,
            depth_clip_enabled: true,
            scissor_test_enabled: false,
        }
    }
}

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent triangles.
    #[default]
    TriangleList,
    /// Triangle strip.
    TriangleStrip,
    /// Independent lines.
    LineList,
    /// Line strip.
    LineStrip,
    /// Points.
    PointList,
}

// ============================================================================
// Vertex input
// ============================================================================

/// Meaning of a vertex element, used by backends with semantic-based input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementSemantic {
    /// Vertex position.
    Position,
    /// Vertex normal.
    Normal,
    /// Texture coordinate.
    TextureCoordinate,
    /// Vertex color.
    Color,
}

/// Data format of one vertex element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementFormat {
    /// One `f32`.
    Float1,
    /// Two `f32`.
    Float2,
    /// Three `f32`.
    Float3,
    /// Four `f32`.
    Float4,
    /// Two `u8` normalized to `[0, 1]`.
    Byte2Norm,
    /// Four `u8` normalized to `[0, 1]`.
    Byte4Norm,
    /// One `u32`.
    UInt1,
    /// Two `u32`.
    UInt2,
    /// Four `u32`.
    UInt4,
    /// One `i32`.
    Int1,
}

impl VertexElementFormat {
    /// Size of the element in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Byte2Norm => 2,
            Self::Float1 | Self::Byte4Norm | Self::UInt1 | Self::Int1 => 4,
            Self::Float2 | Self::UInt2 => 8,
            Self::Float3 => 12,
            Self::Float4 | Self::UInt4 => 16,
        }
    }
}

/// One element of a vertex layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexElement {
    /// Attribute name in the shader.
    pub name: String,
    /// Semantic of the element.
    pub semantic: VertexElementSemantic,
    /// Data format.
    pub format: VertexElementFormat,
}

impl VertexElement {
    /// Create a new vertex element.
    pub fn new(
        name: impl Into<String>,
        semantic: VertexElementSemantic,
        format: VertexElementFormat,
    ) -> Self {
        Self {
            name: name.into(),
            semantic,
            format,
        }
    }
}

/// Layout of one vertex buffer slot. Elements are tightly packed in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Distance in bytes between consecutive vertices.
    pub stride: u32,
    /// Elements in offset order.
    pub elements: Vec<VertexElement>,
    /// 0 for per-vertex data, otherwise the number of instances per element.
    pub instance_step_rate: u32,
}

impl VertexLayout {
    /// A per-vertex layout whose stride is the sum of its element sizes.
    pub fn new(elements: Vec<VertexElement>) -> Self {
        let stride = elements.iter().map(|element| element.format.size()).sum();
        Self {
            stride,
            elements,
            instance_step_rate: 0,
        }
    }

    /// Advance this layout once per `rate` instances instead of per vertex.
    pub fn with_instance_step_rate(mut self, rate: u32) -> Self {
        self.instance_step_rate = rate;
        self
    }

    /// Byte offset of each element.
    pub fn offsets(&self) -> impl Iterator<Item = u32> + '_ {
        self.elements.iter().scan(0u32, |offset, element| {
            let current = *offset;
            *offset += element.format.size();
            Some(current)
        })
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// The attachment formats a pipeline renders into.
///
/// Pipelines are compatible with any framebuffer whose output description is
/// equal, regardless of framebuffer identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct OutputDescription {
    /// Formats of the color attachments in order.
    pub color_formats: Vec<PixelFormat>,
    /// Format of the depth attachment, if any.
    pub depth_format: Option<PixelFormat>,
}

impl OutputDescription {
    /// Create a new output description.
    pub fn new(color_formats: Vec<PixelFormat>, depth_format: Option<PixelFormat>) -> Self {
        Self {
            color_formats,
            depth_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_offsets() {
        let layout = VertexLayout::new(vec![
            VertexElement::new(
                "position",
                VertexElementSemantic::Position,
                VertexElementFormat::Float3,
            ),
            VertexElement::new(
                "color",
                VertexElementSemantic::Color,
                VertexElementFormat::Byte4Norm,
            ),
            VertexElement::new(
                "uv",
                VertexElementSemantic::TextureCoordinate,
                VertexElementFormat::Float2,
            ),
        ]);
        assert_eq!(layout.stride, 24);
        assert_eq!(layout.offsets().collect::<Vec<_>>(), vec![0, 12, 16]);
    }
}
