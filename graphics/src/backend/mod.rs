//! GPU backend layer.
//!
//! Each backend lives in its own module and supplies the same set of
//! inherent operations (resource creation, command recording, execution,
//! presentation). The rest of the crate reaches them through backend-tagged
//! enums selected once at device creation:
//!
//! - [`GpuDevice`], [`GpuFactory`] and [`GpuCommandList`] wrap the
//!   per-backend device, factory state and command list;
//! - `GpuBuffer`, `GpuTexture`, ... wrap the native part of each resource
//!   handle. Asking a handle for the wrong backend's native part yields
//!   [`GraphicsError::BackendMismatch`].
//!
//! # Available Backends
//!
//! - `vulkan-backend`: native command buffers, fences, deferred destruction
//! - `opengl-backend`: deferred replay of pooled command entries on the
//!   context thread
//! - `d3d11-backend`: immediate context, work issued while recording

#[cfg(not(any(
    feature = "vulkan-backend",
    feature = "opengl-backend",
    feature = "d3d11-backend"
)))]
compile_error!("at least one of the vulkan-backend, opengl-backend or d3d11-backend features must be enabled");

#[cfg(feature = "vulkan-backend")]
pub(crate) mod vulkan;

#[cfg(feature = "opengl-backend")]
pub(crate) mod opengl;

#[cfg(feature = "d3d11-backend")]
pub(crate) mod d3d11;

use std::sync::Arc;

use crate::config::BackendType;
use crate::error::GraphicsError;

/// Capabilities probed once at device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFeatures {
    /// Geometry shaders can be created.
    pub geometry_shader: bool,
    /// Tessellation control and evaluation shaders can be created.
    pub tessellation_shaders: bool,
    /// BC1/BC3 compressed textures can be created.
    pub texture_compression_bc: bool,
    /// Draws may use a non-zero first instance.
    pub base_instance: bool,
    /// Native debug output is installed.
    pub debug_output: bool,
    /// Samplers may use anisotropic filtering.
    pub sampler_anisotropy: bool,
}

pub(crate) fn mismatch(expected: BackendType, found: BackendType) -> GraphicsError {
    GraphicsError::BackendMismatch { expected, found }
}

/// Match on a backend-tagged enum, binding the inner value to `$inner` in
/// every compiled arm.
macro_rules! dispatch {
    ($enum:ident, $value:expr, $inner:ident => $body:expr) => {
        match $value {
            #[cfg(feature = "vulkan-backend")]
            $crate::backend::$enum::Vulkan($inner) => $body,
            #[cfg(feature = "opengl-backend")]
            $crate::backend::$enum::OpenGl($inner) => $body,
            #[cfg(feature = "d3d11-backend")]
            $crate::backend::$enum::D3D11($inner) => $body,
        }
    };
}

pub(crate) use dispatch;

/// Declare the backend-tagged native part of a resource handle.
macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident => $vk:ident, $gl:ident, $dx:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub(crate) enum $name {
            #[cfg(feature = "vulkan-backend")]
            Vulkan(Arc<vulkan::$vk>),
            #[cfg(feature = "opengl-backend")]
            OpenGl(Arc<opengl::$gl>),
            #[cfg(feature = "d3d11-backend")]
            D3D11(Arc<d3d11::$dx>),
        }

        #[allow(dead_code)]
        impl $name {
            pub(crate) fn backend(&self) -> BackendType {
                match self {
                    #[cfg(feature = "vulkan-backend")]
                    Self::Vulkan(_) => BackendType::Vulkan,
                    #[cfg(feature = "opengl-backend")]
                    Self::OpenGl(_) => BackendType::OpenGl,
                    #[cfg(feature = "d3d11-backend")]
                    Self::D3D11(_) => BackendType::D3D11,
                }
            }

            #[cfg(feature = "vulkan-backend")]
            pub(crate) fn vulkan(&self) -> Result<&Arc<vulkan::$vk>, GraphicsError> {
                match self {
                    Self::Vulkan(inner) => Ok(inner),
                    #[allow(unreachable_patterns)]
                    other => Err(mismatch(BackendType::Vulkan, other.backend())),
                }
            }

            #[cfg(feature = "opengl-backend")]
            pub(crate) fn opengl(&self) -> Result<&Arc<opengl::$gl>, GraphicsError> {
                match self {
                    Self::OpenGl(inner) => Ok(inner),
                    #[allow(unreachable_patterns)]
                    other => Err(mismatch(BackendType::OpenGl, other.backend())),
                }
            }

            #[cfg(feature = "d3d11-backend")]
            pub(crate) fn d3d11(&self) -> Result<&Arc<d3d11::$dx>, GraphicsError> {
                match self {
                    Self::D3D11(inner) => Ok(inner),
                    #[allow(unreachable_patterns)]
                    other => Err(mismatch(BackendType::D3D11, other.backend())),
                }
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.backend())
            }
        }
    };
}

gpu_handle! {
    /// Native part of a [`Buffer`](crate::Buffer).
    GpuBuffer => VulkanBuffer, OpenGlBuffer, D3D11Buffer
}

gpu_handle! {
    /// Native part of a [`Texture`](crate::Texture).
    GpuTexture => VulkanTexture, OpenGlTexture, D3D11Texture
}

gpu_handle! {
    /// Native part of a [`Sampler`](crate::Sampler).
    GpuSampler => VulkanSampler, OpenGlSampler, D3D11Sampler
}

gpu_handle! {
    /// Native part of a [`Shader`](crate::Shader).
    GpuShader => VulkanShader, OpenGlShader, D3D11Shader
}

gpu_handle! {
    /// Native part of a [`ResourceLayout`](crate::ResourceLayout).
    GpuResourceLayout => VulkanResourceLayout, OpenGlResourceLayout, D3D11ResourceLayout
}

gpu_handle! {
    /// Native part of a [`ResourceSet`](crate::ResourceSet).
    GpuResourceSet => VulkanResourceSet, OpenGlResourceSet, D3D11ResourceSet
}

gpu_handle! {
    /// Native part of a [`Pipeline`](crate::Pipeline).
    GpuPipeline => VulkanPipeline, OpenGlPipeline, D3D11Pipeline
}

gpu_handle! {
    /// Native part of a [`Framebuffer`](crate::Framebuffer).
    GpuFramebuffer => VulkanFramebuffer, OpenGlFramebuffer, D3D11Framebuffer
}

/// The per-backend device.
pub(crate) enum GpuDevice {
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanDevice),
    #[cfg(feature = "opengl-backend")]
    OpenGl(opengl::OpenGlDevice),
    #[cfg(feature = "d3d11-backend")]
    D3D11(d3d11::D3D11Device),
}

impl GpuDevice {
    pub(crate) fn backend(&self) -> BackendType {
        match self {
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(_) => BackendType::Vulkan,
            #[cfg(feature = "opengl-backend")]
            Self::OpenGl(_) => BackendType::OpenGl,
            #[cfg(feature = "d3d11-backend")]
            Self::D3D11(_) => BackendType::D3D11,
        }
    }
}

/// The shared state a [`ResourceFactory`](crate::ResourceFactory) creates
/// resources against.
#[derive(Clone)]
pub(crate) enum GpuFactory {
    #[cfg(feature = "vulkan-backend")]
    Vulkan(Arc<vulkan::VulkanShared>),
    #[cfg(feature = "opengl-backend")]
    OpenGl(Arc<opengl::OpenGlShared>),
    #[cfg(feature = "d3d11-backend")]
    D3D11(Arc<d3d11::D3D11Shared>),
}

impl GpuFactory {
    pub(crate) fn backend(&self) -> BackendType {
        match self {
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(_) => BackendType::Vulkan,
            #[cfg(feature = "opengl-backend")]
            Self::OpenGl(_) => BackendType::OpenGl,
            #[cfg(feature = "d3d11-backend")]
            Self::D3D11(_) => BackendType::D3D11,
        }
    }
}

/// The per-backend command recorder.
pub(crate) enum GpuCommandList {
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanCommandList),
    #[cfg(feature = "opengl-backend")]
    OpenGl(opengl::OpenGlCommandList),
    #[cfg(feature = "d3d11-backend")]
    D3D11(d3d11::D3D11CommandList),
}

impl GpuCommandList {
    pub(crate) fn backend(&self) -> BackendType {
        match self {
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(_) => BackendType::Vulkan,
            #[cfg(feature = "opengl-backend")]
            Self::OpenGl(_) => BackendType::OpenGl,
            #[cfg(feature = "d3d11-backend")]
            Self::D3D11(_) => BackendType::D3D11,
        }
    }
}
