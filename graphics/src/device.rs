//! Graphics device.
//!
//! The [`GraphicsDevice`] owns the native device and the swapchain. It
//! executes command lists, presents, and hands out [`ResourceFactory`]
//! instances for resource creation.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{
    DeviceFeatures, GpuCommandList, GpuDevice, GpuFactory, GpuFramebuffer, dispatch, mismatch,
};
use crate::command_list::CommandList;
use crate::config::{BackendType, DeviceOptions};
use crate::driver::{DrawCall, DriverLog, ObjectCounts};
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::{Buffer, Framebuffer, Texture};
use crate::types::{OutputDescription, TextureRegion};
use crate::validation;

/// Counters reported by the native layer behind a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStatistics {
    /// Command lists that reached the native queue or context.
    pub submissions: u64,
    /// Completed presents.
    pub presents: u64,
    /// Draw calls issued to the native layer.
    pub draw_calls: u64,
    /// Color and depth clears issued to the native layer.
    pub clears: u64,
    /// Native objects currently alive.
    pub objects_live: usize,
    /// Native objects created since the device was opened.
    pub objects_created: u64,
    /// Native objects destroyed since the device was opened.
    pub objects_destroyed: u64,
    /// Native objects released by their handles but not yet destroyed.
    pub pending_destructions: usize,
}

impl DeviceStatistics {
    pub(crate) fn from_driver(log: &DriverLog, counts: ObjectCounts, pending: usize) -> Self {
        Self {
            submissions: log.submissions,
            presents: log.presents,
            draw_calls: log.draw_count,
            clears: log.clears,
            objects_live: counts.live,
            objects_created: counts.created,
            objects_destroyed: counts.destroyed,
            pending_destructions: pending,
        }
    }
}

/// A graphics device bound to one backend and one swapchain.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync`. Backends with a thread-bound context
/// (OpenGL, Direct3D 11) reject native work issued from any thread other than
/// the one that created the device with [`GraphicsError::InvalidState`].
///
/// # Example
///
/// ```ignore
/// let device = GraphicsDevice::new(DeviceOptions::new(BackendType::Vulkan))?;
/// let factory = device.create_factory();
///
/// let mut commands = factory.create_command_list()?;
/// commands.set_framebuffer(&device.swapchain_framebuffer())?;
/// commands.clear_color_target(0, RgbaFloat::BLACK)?;
/// device.execute_commands(&mut commands)?;
/// device.swap_buffers()?;
/// ```
pub struct GraphicsDevice {
    inner: GpuDevice,
    factory: ResourceFactory,
    swapchain_outputs: OutputDescription,
    swapchain: RwLock<Arc<Framebuffer>>,
}

impl GraphicsDevice {
    /// Open a device on the backend named by `options`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::BackendUnavailable`] when the backend was not
    /// compiled in, [`GraphicsError::MissingExtension`] when the native layer
    /// lacks something the backend requires, and
    /// [`GraphicsError::InitializationFailed`] for invalid options.
    pub fn new(options: DeviceOptions) -> Result<Self, GraphicsError> {
        options.validate()?;
        if !options.backend.is_compiled() {
            return Err(GraphicsError::BackendUnavailable(options.backend));
        }

        let inner = match options.backend {
            #[cfg(feature = "vulkan-backend")]
            BackendType::Vulkan => GpuDevice::Vulkan(crate::backend::vulkan::VulkanDevice::new(&options)?),
            #[cfg(feature = "opengl-backend")]
            BackendType::OpenGl => GpuDevice::OpenGl(crate::backend::opengl::OpenGlDevice::new(&options)?),
            #[cfg(feature = "d3d11-backend")]
            BackendType::D3D11 => GpuDevice::D3D11(crate::backend::d3d11::D3D11Device::new(&options)?),
            #[allow(unreachable_patterns)]
            other => return Err(GraphicsError::BackendUnavailable(other)),
        };

        let factory = ResourceFactory::new(match &inner {
            #[cfg(feature = "vulkan-backend")]
            GpuDevice::Vulkan(device) => GpuFactory::Vulkan(Arc::clone(device.shared())),
            #[cfg(feature = "opengl-backend")]
            GpuDevice::OpenGl(device) => GpuFactory::OpenGl(Arc::clone(device.shared())),
            #[cfg(feature = "d3d11-backend")]
            GpuDevice::D3D11(device) => GpuFactory::D3D11(Arc::clone(device.shared())),
        });

        let swapchain_outputs = OutputDescription::new(
            vec![options.swapchain_format],
            options.swapchain_depth_format,
        );
        let (native, image_index) = dispatch!(GpuDevice, &inner, device => {
            device.create_swapchain_framebuffer(options.width, options.height)
        })?;
        let swapchain = Framebuffer::swapchain(
            swapchain_outputs.clone(),
            options.width,
            options.height,
            image_index,
            native,
        );

        log::info!(
            "GraphicsDevice: created {} device {}x{} ({:?}, depth {:?}), debug={}",
            options.backend,
            options.width,
            options.height,
            options.swapchain_format,
            options.swapchain_depth_format,
            factory.features().debug_output
        );

        Ok(Self {
            inner,
            factory,
            swapchain_outputs,
            swapchain: RwLock::new(Arc::new(swapchain)),
        })
    }

    /// The backend this device runs on.
    pub fn backend_type(&self) -> BackendType {
        self.inner.backend()
    }

    /// Capabilities probed when the device was opened.
    pub fn features(&self) -> DeviceFeatures {
        self.factory.features()
    }

    /// A factory creating resources against this device.
    pub fn create_factory(&self) -> ResourceFactory {
        self.factory.clone()
    }

    /// Execute a command list.
    ///
    /// A list still recording is ended first. Executing it again requires
    /// [`CommandList::begin`] or [`CommandList::reset`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::BackendMismatch`] for a list created by
    /// another backend and [`GraphicsError::InvalidState`] for a list already
    /// executed.
    pub fn execute_commands(&self, list: &mut CommandList) -> Result<(), GraphicsError> {
        validation::check_backend(self.backend_type(), list.backend_type())?;
        let native = list.prepare_execution()?;
        #[allow(unreachable_patterns)]
        let result = match (&self.inner, native) {
            #[cfg(feature = "vulkan-backend")]
            (GpuDevice::Vulkan(device), GpuCommandList::Vulkan(list)) => device.execute_commands(list),
            #[cfg(feature = "opengl-backend")]
            (GpuDevice::OpenGl(device), GpuCommandList::OpenGl(list)) => device.execute_commands(list),
            #[cfg(feature = "d3d11-backend")]
            (GpuDevice::D3D11(device), GpuCommandList::D3D11(list)) => device.execute_commands(list),
            (device, list) => Err(mismatch(device.backend(), list.backend())),
        };
        list.mark_executed();
        result
    }

    /// Present the current swapchain image and advance to the next one.
    pub fn swap_buffers(&self) -> Result<(), GraphicsError> {
        let image_index = dispatch!(GpuDevice, &self.inner, device => device.swap_buffers())?;
        self.swapchain.read().set_image_index(image_index);
        log::trace!("GraphicsDevice: presented, next image {image_index}");
        Ok(())
    }

    /// Block until all submitted work has completed.
    pub fn wait_for_idle(&self) -> Result<(), GraphicsError> {
        dispatch!(GpuDevice, &self.inner, device => device.wait_for_idle())
    }

    /// Resize the swapchain.
    ///
    /// The previous swapchain framebuffer is retired: using it afterwards
    /// fails with [`GraphicsError::InvalidState`]. Fetch the replacement with
    /// [`swapchain_framebuffer`](Self::swapchain_framebuffer).
    ///
    /// If the native resize fails the error is returned and a live swapchain
    /// framebuffer at the previous size is published in its place.
    pub fn resize_swapchain(&self, width: u32, height: u32) -> Result<(), GraphicsError> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::invalid(format!(
                "swapchain size must be non-zero, got {width}x{height}"
            )));
        }
        dispatch!(GpuDevice, &self.inner, device => device.check_resize())?;

        let mut swapchain = self.swapchain.write();
        let (previous_width, previous_height) = (swapchain.width(), swapchain.height());
        swapchain.retire();
        match dispatch!(GpuDevice, &self.inner, device => device.resize_swapchain(width, height)) {
            Ok((native, image_index)) => {
                *swapchain = self.new_swapchain(native, width, height, image_index);
                log::debug!("GraphicsDevice: swapchain resized to {width}x{height}");
                Ok(())
            }
            Err(error) => {
                log::warn!("GraphicsDevice: swapchain resize to {width}x{height} failed: {error}");
                let restored = dispatch!(GpuDevice, &self.inner, device => {
                    device.create_swapchain_framebuffer(previous_width, previous_height)
                });
                match restored {
                    Ok((native, image_index)) => {
                        *swapchain =
                            self.new_swapchain(native, previous_width, previous_height, image_index);
                    }
                    Err(restore_error) => log::error!(
                        "GraphicsDevice: could not restore the {previous_width}x{previous_height} swapchain: {restore_error}"
                    ),
                }
                Err(error)
            }
        }
    }

    fn new_swapchain(
        &self,
        native: GpuFramebuffer,
        width: u32,
        height: u32,
        image_index: u32,
    ) -> Arc<Framebuffer> {
        Arc::new(Framebuffer::swapchain(
            self.swapchain_outputs.clone(),
            width,
            height,
            image_index,
            native,
        ))
    }

    /// The framebuffer targeting the current swapchain image.
    pub fn swapchain_framebuffer(&self) -> Arc<Framebuffer> {
        Arc::clone(&self.swapchain.read())
    }

    /// Read the whole contents of a buffer, after all executed work.
    pub fn read_buffer(&self, buffer: &Buffer) -> Result<Vec<u8>, GraphicsError> {
        validation::check_backend(self.backend_type(), buffer.backend())?;
        dispatch!(GpuDevice, &self.inner, device => device.read_buffer(buffer))
    }

    /// Read a region of one mip level and layer of a texture.
    ///
    /// Rows are tightly packed, in the same layout
    /// [`CommandList::update_texture`] expects.
    pub fn read_texture(
        &self,
        texture: &Texture,
        region: &TextureRegion,
    ) -> Result<Vec<u8>, GraphicsError> {
        validation::check_backend(self.backend_type(), texture.backend())?;
        let len = texture.format().region_size(region.width, region.height);
        validation::texture_update(texture, region, len as usize)?;
        dispatch!(GpuDevice, &self.inner, device => device.read_texture(texture, region))
    }

    /// Draw calls that reached the native layer since the last call.
    pub fn take_draw_calls(&self) -> Vec<DrawCall> {
        dispatch!(GpuDevice, &self.inner, device => device.take_draw_calls())
    }

    pub fn statistics(&self) -> DeviceStatistics {
        dispatch!(GpuDevice, &self.inner, device => device.statistics())
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        self.swapchain.read().retire();
        if let Err(e) = self.wait_for_idle() {
            log::warn!("GraphicsDevice: wait for idle failed during drop: {e}");
        }
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let swapchain = self.swapchain.read();
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend_type())
            .field("swapchain_width", &swapchain.width())
            .field("swapchain_height", &swapchain.height())
            .field("image_index", &swapchain.image_index())
            .finish()
    }
}

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    #[test]
    fn test_statistics_from_driver() {
        let mut log = DriverLog::default();
        log.draw_count = 3;
        log.clears = 2;
        log.submissions = 1;
        let counts = ObjectCounts {
            live: 4,
            created: 6,
            destroyed: 2,
        };
        let stats = DeviceStatistics::from_driver(&log, counts, 1);
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.clears, 2);
        assert_eq!(stats.submissions, 1);
        assert_eq!(stats.presents, 0);
        assert_eq!(stats.objects_live, 4);
        assert_eq!(stats.objects_created, 6);
        assert_eq!(stats.objects_destroyed, 2);
        assert_eq!(stats.pending_destructions, 1);
    }

    #[test]
    fn test_zero_size_rejected_before_backend() {
        for backend in BackendType::ALL {
            let options = DeviceOptions::new(backend).with_size(0, 600);
            assert!(matches!(
                GraphicsDevice::new(options),
                Err(GraphicsError::InitializationFailed(_))
            ));
        }
    }

    #[test]
    fn test_depth_swapchain_format_rejected() {
        let options = DeviceOptions::new(BackendType::preferred())
            .with_swapchain_format(PixelFormat::Depth32Float);
        assert!(matches!(
            GraphicsDevice::new(options),
            Err(GraphicsError::InitializationFailed(_))
        ));
    }

    #[cfg(feature = "d3d11-backend")]
    #[test]
    fn test_resize_retires_previous_framebuffer() {
        let device = GraphicsDevice::new(DeviceOptions::new(BackendType::D3D11)).unwrap();
        let old = device.swapchain_framebuffer();
        device.resize_swapchain(320, 240).unwrap();
        let new = device.swapchain_framebuffer();

        assert!(old.is_retired());
        assert!(!new.is_retired());
        assert_eq!((new.width(), new.height()), (320, 240));
        assert_eq!(new.outputs(), old.outputs());
        assert!(device.resize_swapchain(0, 240).is_err());
    }
}
