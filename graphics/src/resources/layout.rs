//! Resource layouts and resource sets.

use std::sync::{Arc, Weak};

use crate::backend::{GpuResourceLayout, GpuResourceSet};
use crate::error::GraphicsError;
use crate::types::{ResourceKind, ResourceLayoutDescriptor, ResourceLayoutElement};

use super::{Buffer, NativeSlot, ResourceId, Sampler, Texture};

/// The binding schema a [`ResourceSet`] must satisfy.
pub struct ResourceLayout {
    id: ResourceId,
    descriptor: ResourceLayoutDescriptor,
    native: NativeSlot<GpuResourceLayout>,
}

impl ResourceLayout {
    pub(crate) fn new(descriptor: ResourceLayoutDescriptor, native: GpuResourceLayout) -> Self {
        Self {
            id: ResourceId::next(),
            descriptor,
            native: NativeSlot::new("resource layout", native),
        }
    }

    /// Unique identifier of this layout.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Get the layout descriptor.
    pub fn descriptor(&self) -> &ResourceLayoutDescriptor {
        &self.descriptor
    }

    /// Binding slots in order.
    pub fn elements(&self) -> &[ResourceLayoutElement] {
        &self.descriptor.elements
    }

    /// Whether two layouts declare the same slots in the same order.
    ///
    /// Pipelines accept any set whose layout is compatible with the layout
    /// they were created with, not only the identical object.
    pub fn is_compatible(&self, other: &ResourceLayout) -> bool {
        self.id == other.id || self.descriptor.elements == other.descriptor.elements
    }

    /// Release this handle's claim on the native layout.
    pub fn dispose(&self) {
        if self.native.release() {
            log::trace!("ResourceLayout: disposed {}", self.id);
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.native.is_released()
    }

    pub(crate) fn native(&self) -> Result<GpuResourceLayout, GraphicsError> {
        self.native.get()
    }
}

impl std::fmt::Debug for ResourceLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLayout")
            .field("id", &self.id)
            .field("elements", &self.descriptor.elements)
            .finish()
    }
}

/// A resource bound to one slot of a resource set.
#[derive(Debug, Clone)]
pub enum BindingResource {
    /// A uniform buffer.
    UniformBuffer(Arc<Buffer>),
    /// A sampled texture.
    Texture(Arc<Texture>),
    /// A sampler.
    Sampler(Arc<Sampler>),
}

impl BindingResource {
    /// The slot kind this resource fills.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::UniformBuffer(_) => ResourceKind::UniformBuffer,
            Self::Texture(_) => ResourceKind::Texture,
            Self::Sampler(_) => ResourceKind::Sampler,
        }
    }

    fn downgrade(&self) -> BoundResource {
        match self {
            Self::UniformBuffer(buffer) => BoundResource::UniformBuffer(Arc::downgrade(buffer)),
            Self::Texture(texture) => BoundResource::Texture(Arc::downgrade(texture)),
            Self::Sampler(sampler) => BoundResource::Sampler(Arc::downgrade(sampler)),
        }
    }
}

impl From<Arc<Buffer>> for BindingResource {
    fn from(buffer: Arc<Buffer>) -> Self {
        Self::UniformBuffer(buffer)
    }
}

impl From<Arc<Texture>> for BindingResource {
    fn from(texture: Arc<Texture>) -> Self {
        Self::Texture(texture)
    }
}

impl From<Arc<Sampler>> for BindingResource {
    fn from(sampler: Arc<Sampler>) -> Self {
        Self::Sampler(sampler)
    }
}

/// Descriptor for creating a resource set.
#[derive(Debug, Clone)]
pub struct ResourceSetDescriptor {
    /// Layout the resources must match.
    pub layout: Arc<ResourceLayout>,
    /// One resource per layout slot, in slot order.
    pub resources: Vec<BindingResource>,
}

impl ResourceSetDescriptor {
    /// Create a new resource set descriptor.
    pub fn new(layout: Arc<ResourceLayout>, resources: Vec<BindingResource>) -> Self {
        Self { layout, resources }
    }
}

/// A non-owning reference to a bound resource.
#[derive(Debug, Clone)]
pub(crate) enum BoundResource {
    UniformBuffer(Weak<Buffer>),
    Texture(Weak<Texture>),
    Sampler(Weak<Sampler>),
}

impl BoundResource {
    fn upgrade(&self) -> Result<BindingResource, GraphicsError> {
        let resource = match self {
            Self::UniformBuffer(buffer) => buffer
                .upgrade()
                .filter(|buffer| !buffer.is_disposed())
                .map(BindingResource::UniformBuffer)
                .ok_or(GraphicsError::ResourceDisposed("buffer"))?,
            Self::Texture(texture) => texture
                .upgrade()
                .filter(|texture| !texture.is_disposed())
                .map(BindingResource::Texture)
                .ok_or(GraphicsError::ResourceDisposed("texture"))?,
            Self::Sampler(sampler) => sampler
                .upgrade()
                .filter(|sampler| !sampler.is_disposed())
                .map(BindingResource::Sampler)
                .ok_or(GraphicsError::ResourceDisposed("sampler"))?,
        };
        Ok(resource)
    }
}

/// A concrete binding of resources to the slots of a [`ResourceLayout`].
///
/// The set does not own its resources. Binding a set after one of its
/// resources was disposed or dropped fails with
/// [`GraphicsError::ResourceDisposed`].
pub struct ResourceSet {
    id: ResourceId,
    layout: Arc<ResourceLayout>,
    resources: Vec<BoundResource>,
    native: NativeSlot<GpuResourceSet>,
}

impl ResourceSet {
    pub(crate) fn new(
        layout: Arc<ResourceLayout>,
        resources: &[BindingResource],
        native: GpuResourceSet,
    ) -> Self {
        Self {
            id: ResourceId::next(),
            layout,
            resources: resources.iter().map(BindingResource::downgrade).collect(),
            native: NativeSlot::new("resource set", native),
        }
    }

    /// Unique identifier of this set.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The layout this set satisfies.
    pub fn layout(&self) -> &Arc<ResourceLayout> {
        &self.layout
    }

    /// Number of bound resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the set binds nothing.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Strong references to every bound resource, or `ResourceDisposed` if
    /// any of them is gone.
    pub(crate) fn resolve(&self) -> Result<Vec<BindingResource>, GraphicsError> {
        self.resources.iter().map(BoundResource::upgrade).collect()
    }

    /// Release this handle's claim on the native set.
    pub fn dispose(&self) {
        if self.native.release() {
            log::trace!("ResourceSet: disposed {}", self.id);
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.native.is_released()
    }

    pub(crate) fn native(&self) -> Result<GpuResourceSet, GraphicsError> {
        self.native.get()
    }
}

impl std::fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSet")
            .field("id", &self.id)
            .field("layout", &self.layout.id())
            .field("len", &self.resources.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(ResourceLayout: Send, Sync);
static_assertions::assert_impl_all!(ResourceSet: Send, Sync);
