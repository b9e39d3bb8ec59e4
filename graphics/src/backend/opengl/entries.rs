//! Pooled command entries recorded by an OpenGL command list.

use std::sync::Arc;

use crate::types::{IndexFormat, RgbaFloat, ScissorRect, TextureRegion, Viewport};

use super::{OpenGlBuffer, OpenGlFramebuffer, OpenGlPipeline, OpenGlSampler, OpenGlTexture};

/// A resource referenced by a `SetResourceSet` entry, in slot order.
#[derive(Clone)]
pub(crate) enum GlBinding {
    UniformBuffer(Arc<OpenGlBuffer>),
    Texture(Arc<OpenGlTexture>),
    Sampler(Arc<OpenGlSampler>),
}

/// One recorded command.
///
/// Resource references are `Option`s so they can be released after replay
/// while the entry, and any byte buffer it owns, stays in the pool.
#[derive(Default)]
pub(crate) enum CommandEntry {
    #[default]
    Empty,
    SetFramebuffer {
        framebuffer: Option<Arc<OpenGlFramebuffer>>,
        height: u32,
    },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    SetVertexBuffer {
        slot: u32,
        buffer: Option<Arc<OpenGlBuffer>>,
    },
    SetIndexBuffer {
        buffer: Option<Arc<OpenGlBuffer>>,
        format: IndexFormat,
    },
    SetPipeline(Option<Arc<OpenGlPipeline>>),
    SetResourceSet {
        slot: u32,
        resources: Vec<GlBinding>,
    },
    UpdateBuffer {
        buffer: Option<Arc<OpenGlBuffer>>,
        offset: u64,
        data: Vec<u8>,
    },
    UpdateTexture {
        texture: Option<Arc<OpenGlTexture>>,
        region: TextureRegion,
        data: Vec<u8>,
    },
    ClearColorTarget {
        index: u32,
        color: RgbaFloat,
    },
    ClearDepthTarget {
        depth: f32,
        stencil: u8,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
}

impl CommandEntry {
    /// Name used in error and log messages.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::SetFramebuffer { .. } => "SetFramebuffer",
            Self::SetViewport(_) => "SetViewport",
            Self::SetScissorRect(_) => "SetScissorRect",
            Self::SetVertexBuffer { .. } => "SetVertexBuffer",
            Self::SetIndexBuffer { .. } => "SetIndexBuffer",
            Self::SetPipeline(_) => "SetPipeline",
            Self::SetResourceSet { .. } => "SetResourceSet",
            Self::UpdateBuffer { .. } => "UpdateBuffer",
            Self::UpdateTexture { .. } => "UpdateTexture",
            Self::ClearColorTarget { .. } => "ClearColorTarget",
            Self::ClearDepthTarget { .. } => "ClearDepthTarget",
            Self::Draw { .. } => "Draw",
            Self::DrawIndexed { .. } => "DrawIndexed",
        }
    }

    /// Drop every resource reference, keeping owned byte buffers.
    fn clear_references(&mut self) {
        match self {
            Self::SetFramebuffer { framebuffer, .. } => *framebuffer = None,
            Self::SetVertexBuffer { buffer, .. }
            | Self::SetIndexBuffer { buffer, .. }
            | Self::UpdateBuffer { buffer, .. } => *buffer = None,
            Self::SetPipeline(pipeline) => *pipeline = None,
            Self::SetResourceSet { resources, .. } => resources.clear(),
            Self::UpdateTexture { texture, .. } => *texture = None,
            Self::Empty
            | Self::SetViewport(_)
            | Self::SetScissorRect(_)
            | Self::ClearColorTarget { .. }
            | Self::ClearDepthTarget { .. }
            | Self::Draw { .. }
            | Self::DrawIndexed { .. } => {}
        }
    }

    fn take_bytes(&mut self) -> Vec<u8> {
        let mut bytes = match self {
            Self::UpdateBuffer { data, .. } | Self::UpdateTexture { data, .. } => {
                std::mem::take(data)
            }
            _ => Vec::new(),
        };
        bytes.clear();
        bytes
    }

    fn take_bindings(&mut self) -> Vec<GlBinding> {
        let mut bindings = match self {
            Self::SetResourceSet { resources, .. } => std::mem::take(resources),
            _ => Vec::new(),
        };
        bindings.clear();
        bindings
    }
}

/// The arena of entries plus the recording cursor.
///
/// Slots past the cursor keep their allocations for the next recording.
#[derive(Default)]
pub(crate) struct CommandEntryList {
    entries: Vec<CommandEntry>,
    len: usize,
}

impl CommandEntryList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of pooled slots, used or not.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Recorded entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandEntry> + '_ {
        self.entries[..self.len].iter()
    }

    fn next_slot(&mut self) -> &mut CommandEntry {
        if self.len == self.entries.len() {
            self.entries.push(CommandEntry::Empty);
        }
        let slot = &mut self.entries[self.len];
        self.len += 1;
        slot
    }

    pub fn push(&mut self, entry: CommandEntry) {
        *self.next_slot() = entry;
    }

    pub fn push_update_buffer(&mut self, buffer: Arc<OpenGlBuffer>, offset: u64, data: &[u8]) {
        let slot = self.next_slot();
        let mut bytes = slot.take_bytes();
        bytes.extend_from_slice(data);
        *slot = CommandEntry::UpdateBuffer {
            buffer: Some(buffer),
            offset,
            data: bytes,
        };
    }

    pub fn push_update_texture(
        &mut self,
        texture: Arc<OpenGlTexture>,
        region: TextureRegion,
        data: &[u8],
    ) {
        let slot = self.next_slot();
        let mut bytes = slot.take_bytes();
        bytes.extend_from_slice(data);
        *slot = CommandEntry::UpdateTexture {
            texture: Some(texture),
            region,
            data: bytes,
        };
    }

    pub fn push_resource_set(&mut self, slot: u32, bindings: impl IntoIterator<Item = GlBinding>) {
        let entry = self.next_slot();
        let mut resources = entry.take_bindings();
        resources.extend(bindings);
        *entry = CommandEntry::SetResourceSet { slot, resources };
    }

    /// Release every reference held by the recorded entries and rewind the
    /// cursor.
    pub fn clear_references(&mut self) {
        for entry in &mut self.entries[..self.len] {
            entry.clear_references();
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_reused() {
        let mut list = CommandEntryList::new();
        list.push(CommandEntry::SetViewport(Viewport::from_dimensions(4, 4)));
        list.push(CommandEntry::ClearDepthTarget {
            depth: 1.0,
            stencil: 0,
        });
        assert_eq!(list.len(), 2);

        list.clear_references();
        assert!(list.is_empty());
        assert_eq!(list.capacity(), 2);

        list.push(CommandEntry::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        });
        assert_eq!(list.capacity(), 2);
        assert_eq!(list.iter().map(CommandEntry::name).collect::<Vec<_>>(), ["Draw"]);
    }

    #[test]
    fn test_byte_buffers_keep_capacity() {
        let mut slot = CommandEntry::UpdateBuffer {
            buffer: None,
            offset: 0,
            data: vec![1; 64],
        };
        let bytes = slot.take_bytes();
        assert!(bytes.is_empty());
        assert!(bytes.capacity() >= 64);
    }
}
