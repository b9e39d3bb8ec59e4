//! GPU texture resource.

use crate::backend::GpuTexture;
use crate::config::BackendType;
use crate::error::GraphicsError;
use crate::types::{PixelFormat, TextureDescriptor, TextureKind, TextureUsage};

use super::{NativeSlot, ResourceId};

/// A GPU texture resource, 2D or cube.
///
/// Textures are created by [`ResourceFactory::create_texture_2d`] and
/// [`ResourceFactory::create_texture_cube`]. Dimensions, mip count, layer
/// count, format and usage never change; pixel data changes only through
/// [`CommandList::update_texture`].
///
/// # Example
///
/// ```ignore
/// let texture = factory.create_texture_2d(&TextureDescriptor::new_2d(
///     1920, 1080,
///     PixelFormat::Rgba8Unorm,
///     TextureUsage::RENDER_TARGET,
/// ))?;
/// println!("Texture size: {}x{}", texture.width(), texture.height());
/// ```
///
/// [`ResourceFactory::create_texture_2d`]: crate::ResourceFactory::create_texture_2d
/// [`ResourceFactory::create_texture_cube`]: crate::ResourceFactory::create_texture_cube
/// [`CommandList::update_texture`]: crate::CommandList::update_texture
pub struct Texture {
    id: ResourceId,
    backend: BackendType,
    kind: TextureKind,
    descriptor: TextureDescriptor,
    native: NativeSlot<GpuTexture>,
}

impl Texture {
    pub(crate) fn new(descriptor: TextureDescriptor, kind: TextureKind, native: GpuTexture) -> Self {
        Self {
            id: ResourceId::next(),
            backend: native.backend(),
            kind,
            descriptor,
            native: NativeSlot::new("texture", native),
        }
    }

    /// Unique identifier of this texture.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Backend that created the texture.
    pub fn backend(&self) -> BackendType {
        self.backend
    }

    /// Whether this is a 2D or cube texture.
    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    /// Get the mip level count.
    pub fn mip_levels(&self) -> u32 {
        self.descriptor.mip_levels
    }

    /// Get the array layer count as declared (cubes for cube textures).
    pub fn array_layers(&self) -> u32 {
        self.descriptor.array_layers
    }

    /// Number of native layers: six per cube for cube textures.
    pub fn native_layers(&self) -> u32 {
        match self.kind {
            TextureKind::Texture2D => self.descriptor.array_layers,
            TextureKind::Cube => self.descriptor.array_layers * 6,
        }
    }

    /// Get the texture format.
    pub fn format(&self) -> PixelFormat {
        self.descriptor.format
    }

    /// Get the texture usage flags.
    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Release this handle's claim on the native texture. Idempotent.
    pub fn dispose(&self) {
        if self.native.release() {
            log::trace!("Texture: disposed {} ({:?})", self.id, self.label());
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.native.is_released()
    }

    pub(crate) fn native(&self) -> Result<GpuTexture, GraphicsError> {
        self.native.get()
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("width", &self.descriptor.width)
            .field("height", &self.descriptor.height)
            .field("mip_levels", &self.descriptor.mip_levels)
            .field("array_layers", &self.descriptor.array_layers)
            .field("format", &self.descriptor.format)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Texture is Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);
