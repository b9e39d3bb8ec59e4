//! GPU sampler resource.

use crate::backend::GpuSampler;
use crate::error::GraphicsError;
use crate::types::SamplerDescriptor;

use super::{NativeSlot, ResourceId};

/// A GPU texture sampler.
///
/// # Example
///
/// ```ignore
/// let sampler = factory.create_sampler(&SamplerDescriptor::linear())?;
/// ```
pub struct Sampler {
    id: ResourceId,
    descriptor: SamplerDescriptor,
    native: NativeSlot<GpuSampler>,
}

impl Sampler {
    pub(crate) fn new(descriptor: SamplerDescriptor, native: GpuSampler) -> Self {
        Self {
            id: ResourceId::next(),
            descriptor,
            native: NativeSlot::new("sampler", native),
        }
    }

    /// Unique identifier of this sampler.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Get the sampler descriptor.
    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }

    /// Get the sampler label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Release this handle's claim on the native sampler. Idempotent.
    pub fn dispose(&self) {
        if self.native.release() {
            log::trace!("Sampler: disposed {}", self.id);
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.native.is_released()
    }

    pub(crate) fn native(&self) -> Result<GpuSampler, GraphicsError> {
        self.native.get()
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("id", &self.id)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Sampler: Send, Sync);
