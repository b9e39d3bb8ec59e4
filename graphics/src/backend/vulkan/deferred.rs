//! Deferred destruction of Vulkan objects.
//!
//! Queue submissions run behind the host, so a native object cannot be
//! destroyed when its last handle goes away: an in-flight command buffer may
//! still reference it. Releasing an object instead queues it here, tagged
//! with the submission serial current at release time. Once every
//! submission up to that serial is proven complete, the object is destroyed.
//!
//! ```text
//! Drop(native)                         maintain()
//!   serial = last submitted serial       completed = highest serial whose
//!   pending.push((serial, resource))     fence was observed signaled
//!                                        destroy all with serial <= completed
//! ```

use std::collections::VecDeque;

use ash::vk;
use parking_lot::Mutex;

use super::driver::VkDriver;

/// A Vulkan object pending destruction.
#[derive(Debug)]
pub(super) enum DeferredResource {
    Buffer(vk::Buffer),
    /// An image together with its full view.
    Texture {
        image: vk::Image,
        view: vk::ImageView,
    },
    Sampler(vk::Sampler),
    ShaderModule(vk::ShaderModule),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorSet(vk::DescriptorSet),
    Pipeline {
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    },
    /// Per-image framebuffers with the views they own.
    Framebuffer {
        framebuffers: Vec<vk::Framebuffer>,
        render_pass: vk::RenderPass,
        views: Vec<vk::ImageView>,
        depth_image: Option<vk::Image>,
    },
    CommandPool(vk::CommandPool),
}

impl DeferredResource {
    /// Destroy the object. The caller must have proven that no pending
    /// submission references it.
    pub fn destroy(self, driver: &VkDriver) {
        match self {
            Self::Buffer(buffer) => driver.destroy_buffer(buffer),
            Self::Texture { image, view } => {
                driver.destroy_image_view(view);
                driver.destroy_image(image);
            }
            Self::Sampler(sampler) => driver.destroy_sampler(sampler),
            Self::ShaderModule(module) => driver.destroy_shader_module(module),
            Self::DescriptorSetLayout(layout) => driver.destroy_descriptor_set_layout(layout),
            Self::DescriptorSet(set) => driver.free_descriptor_set(set),
            Self::Pipeline {
                pipeline,
                layout,
                render_pass,
            } => {
                driver.destroy_pipeline(pipeline);
                driver.destroy_pipeline_layout(layout);
                driver.destroy_render_pass(render_pass);
            }
            Self::Framebuffer {
                framebuffers,
                render_pass,
                views,
                depth_image,
            } => {
                for framebuffer in framebuffers {
                    driver.destroy_framebuffer(framebuffer);
                }
                driver.destroy_render_pass(render_pass);
                for view in views {
                    driver.destroy_image_view(view);
                }
                if let Some(image) = depth_image {
                    driver.destroy_image(image);
                }
            }
            Self::CommandPool(pool) => driver.destroy_command_pool(pool),
        }
    }
}

/// Manages deferred destruction of Vulkan objects.
#[derive(Debug, Default)]
pub(super) struct DeferredDestructor {
    /// Pending objects in release order, so serials are non-decreasing.
    pending: Mutex<VecDeque<(u64, DeferredResource)>>,
}

impl DeferredDestructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an object released while `serial` was the last submission.
    pub fn queue(&self, serial: u64, resource: DeferredResource) {
        log::trace!("DeferredDestructor: queued {resource:?} at serial {serial}");
        self.pending.lock().push_back((serial, resource));
    }

    /// Remove every object whose serial is complete.
    ///
    /// The returned objects are destroyed by the caller, after this lock is
    /// released.
    pub fn collect(&self, completed: u64) -> Vec<DeferredResource> {
        let mut pending = self.pending.lock();
        let ready = pending
            .iter()
            .position(|(serial, _)| *serial > completed)
            .unwrap_or(pending.len());
        pending.drain(..ready).map(|(_, resource)| resource).collect()
    }

    /// Remove everything, regardless of serial. Only valid once the queue is
    /// idle.
    pub fn drain_all(&self) -> Vec<DeferredResource> {
        self.pending
            .lock()
            .drain(..)
            .map(|(_, resource)| resource)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn buffer(raw: u64) -> DeferredResource {
        DeferredResource::Buffer(vk::Buffer::from_raw(raw))
    }

    #[test]
    fn test_collect_stops_at_incomplete_serial() {
        let destructor = DeferredDestructor::new();
        destructor.queue(0, buffer(1));
        destructor.queue(2, buffer(2));
        destructor.queue(3, buffer(3));
        assert_eq!(destructor.pending_count(), 3);

        assert_eq!(destructor.collect(2).len(), 2);
        assert_eq!(destructor.pending_count(), 1);
        assert!(destructor.collect(2).is_empty());

        assert_eq!(destructor.drain_all().len(), 1);
        assert_eq!(destructor.pending_count(), 0);
    }
}
