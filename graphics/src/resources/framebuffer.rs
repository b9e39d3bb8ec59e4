//! Framebuffers: offscreen attachment sets and the swapchain framebuffer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::backend::GpuFramebuffer;
use crate::error::GraphicsError;
use crate::types::OutputDescription;

use super::{NativeSlot, ResourceId, Texture};

/// One attachment of a framebuffer: a texture subresource.
#[derive(Debug, Clone)]
pub struct FramebufferAttachment {
    /// The attached texture.
    pub texture: Arc<Texture>,
    /// Mip level rendered into.
    pub mip_level: u32,
    /// Array layer rendered into (`cube * 6 + face` for cube textures).
    pub array_layer: u32,
}

impl FramebufferAttachment {
    /// Attach mip 0, layer 0 of `texture`.
    pub fn new(texture: Arc<Texture>) -> Self {
        Self {
            texture,
            mip_level: 0,
            array_layer: 0,
        }
    }

    /// Attach a different mip level.
    pub fn with_mip_level(mut self, level: u32) -> Self {
        self.mip_level = level;
        self
    }

    /// Attach a different array layer.
    pub fn with_array_layer(mut self, layer: u32) -> Self {
        self.array_layer = layer;
        self
    }

    /// Extent of the attached mip level.
    pub fn extent(&self) -> (u32, u32) {
        self.texture.descriptor().mip_extent(self.mip_level)
    }
}

/// Descriptor for creating an offscreen framebuffer.
#[derive(Debug, Clone, Default)]
pub struct FramebufferDescriptor {
    /// Color attachments in output order.
    pub color_targets: Vec<FramebufferAttachment>,
    /// Depth attachment, if any.
    pub depth_target: Option<FramebufferAttachment>,
}

impl FramebufferDescriptor {
    /// Create a framebuffer descriptor from textures at mip 0, layer 0.
    pub fn new(color_targets: Vec<Arc<Texture>>, depth_target: Option<Arc<Texture>>) -> Self {
        Self {
            color_targets: color_targets.into_iter().map(FramebufferAttachment::new).collect(),
            depth_target: depth_target.map(FramebufferAttachment::new),
        }
    }

    /// The output description implied by the attachments.
    pub fn outputs(&self) -> OutputDescription {
        OutputDescription {
            color_formats: self
                .color_targets
                .iter()
                .map(|target| target.texture.format())
                .collect(),
            depth_format: self.depth_target.as_ref().map(|target| target.texture.format()),
        }
    }
}

/// Whether a framebuffer renders offscreen or to the swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferKind {
    /// Client-created; renders into its attachment textures.
    Offscreen,
    /// Device-owned; renders into the current presentable image.
    Swapchain,
}

/// A set of color and depth attachments.
///
/// The swapchain framebuffer is owned by the device. After
/// [`GraphicsDevice::resize_swapchain`] the previous swapchain framebuffer is
/// retired: recording against it fails and lists captured before the resize
/// cannot be replayed.
///
/// [`GraphicsDevice::resize_swapchain`]: crate::GraphicsDevice::resize_swapchain
pub struct Framebuffer {
    id: ResourceId,
    kind: FramebufferKind,
    descriptor: FramebufferDescriptor,
    outputs: OutputDescription,
    width: u32,
    height: u32,
    retired: AtomicBool,
    image_index: AtomicU32,
    native: NativeSlot<GpuFramebuffer>,
}

impl Framebuffer {
    pub(crate) fn offscreen(
        descriptor: FramebufferDescriptor,
        width: u32,
        height: u32,
        native: GpuFramebuffer,
    ) -> Self {
        let outputs = descriptor.outputs();
        Self {
            id: ResourceId::next(),
            kind: FramebufferKind::Offscreen,
            descriptor,
            outputs,
            width,
            height,
            retired: AtomicBool::new(false),
            image_index: AtomicU32::new(0),
            native: NativeSlot::new("framebuffer", native),
        }
    }

    pub(crate) fn swapchain(
        outputs: OutputDescription,
        width: u32,
        height: u32,
        image_index: u32,
        native: GpuFramebuffer,
    ) -> Self {
        Self {
            id: ResourceId::next(),
            kind: FramebufferKind::Swapchain,
            descriptor: FramebufferDescriptor::default(),
            outputs,
            width,
            height,
            retired: AtomicBool::new(false),
            image_index: AtomicU32::new(image_index),
            native: NativeSlot::new("framebuffer", native),
        }
    }

    /// Unique identifier of this framebuffer.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Offscreen or swapchain.
    pub fn kind(&self) -> FramebufferKind {
        self.kind
    }

    /// Width of every attachment.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of every attachment.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Attachment formats.
    pub fn outputs(&self) -> &OutputDescription {
        &self.outputs
    }

    /// Offscreen color attachments. Empty for the swapchain framebuffer.
    pub fn color_targets(&self) -> &[FramebufferAttachment] {
        &self.descriptor.color_targets
    }

    /// Offscreen depth attachment.
    pub fn depth_target(&self) -> Option<&FramebufferAttachment> {
        self.descriptor.depth_target.as_ref()
    }

    /// Number of color outputs.
    pub fn color_count(&self) -> usize {
        self.outputs.color_formats.len()
    }

    /// Whether the framebuffer has a depth output.
    pub fn has_depth(&self) -> bool {
        self.outputs.depth_format.is_some()
    }

    /// Index of the presentable image currently targeted. Always 0 for
    /// offscreen framebuffers.
    pub fn image_index(&self) -> u32 {
        self.image_index.load(Ordering::Acquire)
    }

    pub(crate) fn set_image_index(&self, index: u32) {
        self.image_index.store(index, Ordering::Release);
    }

    /// Whether a swapchain resize replaced this framebuffer.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.native.release();
    }

    /// Release this handle's claim on the native framebuffer. The swapchain
    /// framebuffer is device-owned and ignores this.
    pub fn dispose(&self) {
        if self.kind == FramebufferKind::Swapchain {
            log::debug!("Framebuffer: ignoring dispose of swapchain framebuffer {}", self.id);
            return;
        }
        if self.native.release() {
            log::trace!("Framebuffer: disposed {}", self.id);
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.native.is_released()
    }

    pub(crate) fn native(&self) -> Result<GpuFramebuffer, GraphicsError> {
        if self.is_retired() {
            return Err(GraphicsError::state(format!(
                "framebuffer {} was retired by a swapchain resize",
                self.id
            )));
        }
        self.native.get()
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("outputs", &self.outputs)
            .field("retired", &self.is_retired())
            .finish()
    }
}

static_assertions::assert_impl_all!(Framebuffer: Send, Sync);
