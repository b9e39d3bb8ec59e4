//! Record of the work that reached a native layer.

use crate::types::PrimitiveTopology;

/// One draw call as received by the native layer.
///
/// For indexed draws `count` is the index count and `first` the first index;
/// otherwise they are the vertex count and first vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawCall {
    /// Whether the draw read an index buffer.
    pub indexed: bool,
    /// Index or vertex count.
    pub count: u32,
    /// Number of instances.
    pub instance_count: u32,
    /// First index or first vertex.
    pub first: u32,
    /// Value added to each index before fetching vertices (0 when not indexed).
    pub vertex_offset: i32,
    /// First instance ID.
    pub first_instance: u32,
    /// Topology of the bound pipeline.
    pub topology: PrimitiveTopology,
}

impl DrawCall {
    pub(crate) fn non_indexed(
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Self {
        Self {
            indexed: false,
            count: vertex_count,
            instance_count,
            first: first_vertex,
            vertex_offset: 0,
            first_instance,
            topology: PrimitiveTopology::TriangleList,
        }
    }

    pub(crate) fn indexed(
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Self {
        Self {
            indexed: true,
            count: index_count,
            instance_count,
            first: first_index,
            vertex_offset,
            first_instance,
            topology: PrimitiveTopology::TriangleList,
        }
    }

    pub(crate) fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }
}

/// Counters and draw log kept by every native layer.
#[derive(Debug, Default)]
pub(crate) struct DriverLog {
    draws: Vec<DrawCall>,
    pub draw_count: u64,
    pub clears: u64,
    pub submissions: u64,
    pub presents: u64,
}

impl DriverLog {
    pub fn record_draw(&mut self, draw: DrawCall) {
        self.draw_count += 1;
        self.draws.push(draw);
    }

    /// Hand out the draws recorded since the last call.
    pub fn take_draws(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draws)
    }
}
