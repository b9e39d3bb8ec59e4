//! Shader stage types and descriptors.

use bitflags::bitflags;

/// A single programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment (pixel) shader.
    Fragment,
    /// Geometry shader.
    Geometry,
    /// Tessellation control (hull) shader.
    TessellationControl,
    /// Tessellation evaluation (domain) shader.
    TessellationEvaluation,
}

impl ShaderStage {
    /// All stages in pipeline order.
    pub const ALL: [ShaderStage; 5] = [
        Self::Vertex,
        Self::TessellationControl,
        Self::TessellationEvaluation,
        Self::Geometry,
        Self::Fragment,
    ];
}

bitflags! {
    /// A set of shader stages, used for resource visibility.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex stage.
        const VERTEX = 1 << 0;
        /// Fragment stage.
        const FRAGMENT = 1 << 1;
        /// Geometry stage.
        const GEOMETRY = 1 << 2;
        /// Tessellation control stage.
        const TESSELLATION_CONTROL = 1 << 3;
        /// Tessellation evaluation stage.
        const TESSELLATION_EVALUATION = 1 << 4;
    }
}

impl From<ShaderStage> for ShaderStages {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::VERTEX,
            ShaderStage::Fragment => Self::FRAGMENT,
            ShaderStage::Geometry => Self::GEOMETRY,
            ShaderStage::TessellationControl => Self::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => Self::TESSELLATION_EVALUATION,
        }
    }
}

/// Descriptor for creating a shader.
///
/// The bytecode is opaque and backend-defined: SPIR-V words for Vulkan,
/// a `DXBC` container for Direct3D 11 and GLSL source text for OpenGL. It is
/// passed to the native layer unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDescriptor {
    /// Debug label for the shader.
    pub label: Option<String>,
    /// Stage the shader runs in.
    pub stage: ShaderStage,
    /// Native bytecode.
    pub bytecode: Vec<u8>,
    /// Entry point name.
    pub entry_point: String,
}

impl ShaderDescriptor {
    /// Create a descriptor with the conventional `main` entry point.
    pub fn new(stage: ShaderStage, bytecode: impl Into<Vec<u8>>) -> Self {
        Self {
            label: None,
            stage,
            bytecode: bytecode.into(),
            entry_point: "main".to_string(),
        }
    }

    /// Set the entry point name.
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
