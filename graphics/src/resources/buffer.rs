//! GPU buffer resource.

use crate::backend::GpuBuffer;
use crate::config::BackendType;
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferUsage};

use super::{NativeSlot, ResourceId};

/// A GPU buffer resource.
///
/// Buffers are created by [`ResourceFactory::create_buffer`]. Contents change
/// only through [`CommandList::update_buffer`].
///
/// # Example
///
/// ```ignore
/// let buffer = factory.create_buffer(&BufferDescriptor::vertex(1024))?;
/// println!("Buffer size: {}", buffer.size());
/// ```
///
/// [`ResourceFactory::create_buffer`]: crate::ResourceFactory::create_buffer
/// [`CommandList::update_buffer`]: crate::CommandList::update_buffer
pub struct Buffer {
    id: ResourceId,
    backend: BackendType,
    descriptor: BufferDescriptor,
    native: NativeSlot<GpuBuffer>,
}

impl Buffer {
    pub(crate) fn new(descriptor: BufferDescriptor, native: GpuBuffer) -> Self {
        Self {
            id: ResourceId::next(),
            backend: native.backend(),
            descriptor,
            native: NativeSlot::new("buffer", native),
        }
    }

    /// Unique identifier of this buffer.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Backend that created the buffer.
    pub fn backend(&self) -> BackendType {
        self.backend
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Release this handle's claim on the native buffer. Idempotent.
    pub fn dispose(&self) {
        if self.native.release() {
            log::trace!("Buffer: disposed {} ({:?})", self.id, self.label());
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.native.is_released()
    }

    pub(crate) fn native(&self) -> Result<GpuBuffer, GraphicsError> {
        self.native.get()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("backend", &self.backend)
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);
