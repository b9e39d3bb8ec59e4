//! Device construction parameters.
//!
//! [`DeviceOptions`] carries everything fixed at device creation: the
//! backend, the initial swapchain size, the debug-validation toggle and a
//! list of native extensions to hide from capability probing.
//!
//! Options can be overlaid from the environment with
//! [`DeviceOptions::from_env`]:
//!
//! | Variable | Values |
//! |----------|--------|
//! | `LATTICE_BACKEND` | `vulkan`, `opengl` / `gl`, `d3d11` / `dx11` |
//! | `LATTICE_DEBUG` | `1` / `true` enables native debug output |

use std::fmt;
use std::str::FromStr;

use crate::error::GraphicsError;
use crate::types::PixelFormat;

/// Environment variable selecting the backend.
pub const BACKEND_ENV_VAR: &str = "LATTICE_BACKEND";
/// Environment variable enabling native debug output.
pub const DEBUG_ENV_VAR: &str = "LATTICE_DEBUG";

/// The native API family a device runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// Native command buffers submitted to a queue.
    Vulkan,
    /// Commands recorded as entries and replayed on the single context thread.
    OpenGl,
    /// Commands issued on the immediate context while recording.
    D3D11,
}

impl BackendType {
    /// All backend types, in preference order.
    pub const ALL: [BackendType; 3] = [Self::Vulkan, Self::D3D11, Self::OpenGl];

    /// Returns true when this backend was compiled into the crate.
    pub fn is_compiled(self) -> bool {
        match self {
            Self::Vulkan => cfg!(feature = "vulkan-backend"),
            Self::OpenGl => cfg!(feature = "opengl-backend"),
            Self::D3D11 => cfg!(feature = "d3d11-backend"),
        }
    }

    /// The first compiled backend in preference order.
    pub fn preferred() -> Self {
        Self::ALL
            .into_iter()
            .find(|backend| backend.is_compiled())
            .unwrap_or(Self::Vulkan)
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vulkan => f.write_str("Vulkan"),
            Self::OpenGl => f.write_str("OpenGL"),
            Self::D3D11 => f.write_str("Direct3D 11"),
        }
    }
}

impl FromStr for BackendType {
    type Err = GraphicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vulkan" | "vk" => Ok(Self::Vulkan),
            "opengl" | "gl" => Ok(Self::OpenGl),
            "d3d11" | "dx11" | "direct3d11" => Ok(Self::D3D11),
            other => Err(GraphicsError::InitializationFailed(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

/// Parameters used to create a [`GraphicsDevice`](crate::GraphicsDevice).
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceOptions {
    /// Backend to create the device on.
    pub backend: BackendType,
    /// Initial swapchain width in pixels.
    pub width: u32,
    /// Initial swapchain height in pixels.
    pub height: u32,
    /// Enable native validation and debug output.
    pub debug: bool,
    /// Color format of the swapchain images.
    pub swapchain_format: PixelFormat,
    /// Depth attachment of the swapchain framebuffer, if any.
    pub swapchain_depth_format: Option<PixelFormat>,
    /// Native extension or feature names hidden from capability probing.
    pub masked_extensions: Vec<String>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            backend: BackendType::preferred(),
            width: 1280,
            height: 720,
            debug: false,
            swapchain_format: PixelFormat::Bgra8Unorm,
            swapchain_depth_format: Some(PixelFormat::Depth32Float),
            masked_extensions: Vec::new(),
        }
    }
}

impl DeviceOptions {
    /// Create options for the given backend with default size and settings.
    pub fn new(backend: BackendType) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Default options overlaid with `LATTICE_BACKEND` and `LATTICE_DEBUG`.
    ///
    /// # Errors
    ///
    /// Returns an error if `LATTICE_BACKEND` names an unknown backend.
    pub fn from_env() -> Result<Self, GraphicsError> {
        let mut options = Self::default();
        if let Ok(value) = std::env::var(BACKEND_ENV_VAR) {
            options.backend = value.parse()?;
        }
        if let Ok(value) = std::env::var(DEBUG_ENV_VAR) {
            options.debug = matches!(value.trim(), "1" | "true" | "TRUE" | "on");
        }
        Ok(options)
    }

    /// Set the initial swapchain size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable native debug output.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the swapchain color format.
    pub fn with_swapchain_format(mut self, format: PixelFormat) -> Self {
        self.swapchain_format = format;
        self
    }

    /// Set the swapchain depth format (`None` for no depth attachment).
    pub fn with_swapchain_depth(mut self, format: Option<PixelFormat>) -> Self {
        self.swapchain_depth_format = format;
        self
    }

    /// Hide a native extension or feature name from capability probing.
    pub fn with_masked_extension(mut self, name: impl Into<String>) -> Self {
        self.masked_extensions.push(name.into());
        self
    }

    pub(crate) fn is_masked(&self, name: &str) -> bool {
        self.masked_extensions.iter().any(|masked| masked == name)
    }

    pub(crate) fn validate(&self) -> Result<(), GraphicsError> {
        if self.width == 0 || self.height == 0 {
            return Err(GraphicsError::InitializationFailed(format!(
                "swapchain size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.swapchain_format.is_depth_stencil() || self.swapchain_format.is_compressed() {
            return Err(GraphicsError::InitializationFailed(format!(
                "{:?} cannot be used as a swapchain color format",
                self.swapchain_format
            )));
        }
        if let Some(depth) = self.swapchain_depth_format
            && !depth.is_depth_stencil()
        {
            return Err(GraphicsError::InitializationFailed(format!(
                "{depth:?} is not a depth format"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("vulkan".parse::<BackendType>().unwrap(), BackendType::Vulkan);
        assert_eq!(" GL ".parse::<BackendType>().unwrap(), BackendType::OpenGl);
        assert_eq!("dx11".parse::<BackendType>().unwrap(), BackendType::D3D11);
        assert!("metal".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_options_validation() {
        assert!(DeviceOptions::default().validate().is_ok());
        assert!(DeviceOptions::default().with_size(0, 10).validate().is_err());
        assert!(
            DeviceOptions::default()
                .with_swapchain_format(PixelFormat::Depth32Float)
                .validate()
                .is_err()
        );
        assert!(
            DeviceOptions::default()
                .with_swapchain_depth(Some(PixelFormat::Rgba8Unorm))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_masked_extensions() {
        let options = DeviceOptions::new(BackendType::OpenGl)
            .with_masked_extension("GL_EXT_texture_compression_s3tc");
        assert!(options.is_masked("GL_EXT_texture_compression_s3tc"));
        assert!(!options.is_masked("GL_KHR_debug"));
    }
}
