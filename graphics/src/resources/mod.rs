//! GPU resources.
//!
//! This module contains the resource handles produced by a
//! [`ResourceFactory`](crate::ResourceFactory):
//! - [`Buffer`] - vertex, index or uniform memory
//! - [`Texture`] - 2D or cube texture
//! - [`Sampler`] - texture sampler
//! - [`Shader`] - one compiled shader stage
//! - [`ResourceLayout`] / [`ResourceSet`] - binding schema and its concrete binding
//! - [`Pipeline`] - immutable fixed-function and shader state
//! - [`Framebuffer`] - color/depth attachments, or the swapchain
//!
//! Handles are shared with [`Arc`] and can be sent across threads. Each one
//! stores its immutable description and the backend's native part.
//! [`dispose`](Buffer::dispose) gives up the handle's claim on the native
//! object; the native object itself is destroyed once, when no handle and no
//! command stream still references it, following the backend's destruction
//! policy.
//!
//! [`Arc`]: std::sync::Arc

mod buffer;
mod framebuffer;
mod layout;
mod pipeline;
mod sampler;
mod shader;
mod texture;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

pub use buffer::Buffer;
pub use framebuffer::{Framebuffer, FramebufferAttachment, FramebufferDescriptor, FramebufferKind};
pub use layout::{BindingResource, ResourceLayout, ResourceSet, ResourceSetDescriptor};
pub use pipeline::{Pipeline, PipelineDescriptor, ShaderSet};
pub use sampler::Sampler;
pub use shader::Shader;
pub use texture::Texture;

use crate::error::GraphicsError;

/// Process-unique identifier of a resource handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw identifier value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The native part of a handle, present until the handle is disposed.
pub(crate) struct NativeSlot<T> {
    kind: &'static str,
    native: Mutex<Option<T>>,
}

impl<T: Clone> NativeSlot<T> {
    pub(crate) fn new(kind: &'static str, native: T) -> Self {
        Self {
            kind,
            native: Mutex::new(Some(native)),
        }
    }

    /// A clone of the native part, or `ResourceDisposed`.
    pub(crate) fn get(&self) -> Result<T, GraphicsError> {
        self.native
            .lock()
            .clone()
            .ok_or(GraphicsError::ResourceDisposed(self.kind))
    }

    /// Release the native part. Returns false if it was already released.
    pub(crate) fn release(&self) -> bool {
        // Drop outside the lock: native destructors may take driver locks.
        let native = self.native.lock().take();
        native.is_some()
    }

    pub(crate) fn is_released(&self) -> bool {
        self.native.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_ids_are_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_native_slot_release_once() {
        let slot = NativeSlot::new("buffer", 7u32);
        assert_eq!(slot.get().unwrap(), 7);
        assert!(slot.release());
        assert!(!slot.release());
        assert!(slot.is_released());
        assert_eq!(slot.get(), Err(GraphicsError::ResourceDisposed("buffer")));
    }
}
