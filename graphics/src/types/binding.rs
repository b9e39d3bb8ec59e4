//! Resource layout descriptions.

use super::ShaderStages;

/// Kind of resource a layout slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A buffer created with [`BufferUsage::UNIFORM`](super::BufferUsage::UNIFORM).
    UniformBuffer,
    /// A texture created with [`TextureUsage::SAMPLED`](super::TextureUsage::SAMPLED).
    Texture,
    /// A sampler.
    Sampler,
}

/// One binding slot of a resource layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLayoutElement {
    /// Name of the binding in the shader.
    pub name: String,
    /// Kind of resource accepted by the slot.
    pub kind: ResourceKind,
    /// Stages the resource is visible to.
    pub stages: ShaderStages,
}

impl ResourceLayoutElement {
    /// Create a new layout element.
    pub fn new(name: impl Into<String>, kind: ResourceKind, stages: ShaderStages) -> Self {
        Self {
            name: name.into(),
            kind,
            stages,
        }
    }
}

/// Descriptor for creating a resource layout.
///
/// Slots are matched positionally: element `i` of a resource set binds to
/// element `i` of its layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceLayoutDescriptor {
    /// Debug label for the layout.
    pub label: Option<String>,
    /// Binding slots in order.
    pub elements: Vec<ResourceLayoutElement>,
}

impl ResourceLayoutDescriptor {
    /// Create a layout descriptor from its slots.
    pub fn new(elements: Vec<ResourceLayoutElement>) -> Self {
        Self {
            label: None,
            elements,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The slot kinds in order.
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.elements.iter().map(|element| element.kind)
    }
}
