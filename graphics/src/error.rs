//! Graphics error types.
//!
//! Every fallible operation in the crate reports a [`GraphicsError`]. The
//! variants follow four families:
//!
//! - **configuration**: the device could not be created for the requested
//!   backend ([`BackendUnavailable`](GraphicsError::BackendUnavailable),
//!   [`MissingExtension`](GraphicsError::MissingExtension),
//!   [`InitializationFailed`](GraphicsError::InitializationFailed));
//! - **validation**: a description or command argument is invalid for the
//!   active backend;
//! - **type mismatch**: a handle created by one backend was passed to another
//!   ([`BackendMismatch`](GraphicsError::BackendMismatch));
//! - **native**: the native layer returned a failure code
//!   ([`Native`](GraphicsError::Native)).
//!
//! Nothing in this crate retries an operation on error.

use std::fmt;

use crate::config::BackendType;
use crate::types::{PixelFormat, ResourceKind};

/// A failure code reported by a native graphics API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeError {
    /// A `VkResult` value.
    Vulkan(i32),
    /// A value returned by `glGetError`.
    OpenGl(u32),
    /// An `HRESULT` returned by a D3D11 or DXGI call.
    Direct3D(u32),
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(code) => write!(f, "{:?}", ash::vk::Result::from_raw(*code)),
            #[cfg(not(feature = "vulkan-backend"))]
            Self::Vulkan(code) => write!(f, "VkResult({code})"),
            Self::OpenGl(code) => {
                let name = match *code {
                    0x0500 => "GL_INVALID_ENUM",
                    0x0501 => "GL_INVALID_VALUE",
                    0x0502 => "GL_INVALID_OPERATION",
                    0x0505 => "GL_OUT_OF_MEMORY",
                    0x0506 => "GL_INVALID_FRAMEBUFFER_OPERATION",
                    _ => return write!(f, "GL error 0x{code:04X}"),
                };
                f.write_str(name)
            }
            Self::Direct3D(hresult) => {
                let name = match *hresult {
                    0x8007_0057 => "E_INVALIDARG",
                    0x8007_000E => "E_OUTOFMEMORY",
                    0x887A_0001 => "DXGI_ERROR_INVALID_CALL",
                    0x887A_0005 => "DXGI_ERROR_DEVICE_REMOVED",
                    _ => return write!(f, "HRESULT 0x{hresult:08X}"),
                };
                f.write_str(name)
            }
        }
    }
}

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicsError {
    /// The requested backend is not compiled in or not usable on this platform.
    BackendUnavailable(BackendType),
    /// A native extension or layer the backend requires is not available.
    MissingExtension(String),
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// A requested feature is not supported by the device.
    FeatureNotSupported(String),
    /// A pixel format has no native equivalent on the active backend.
    UnsupportedFormat {
        /// The requested format.
        format: PixelFormat,
        /// The backend that rejected it.
        backend: BackendType,
    },
    /// A resource description is invalid.
    InvalidDescriptor(String),
    /// A resource set element does not match the layout slot at its position.
    ResourceSetMismatch {
        /// Slot index in the layout.
        slot: usize,
        /// Kind declared by the layout.
        expected: ResourceKind,
        /// Kind supplied by the caller.
        found: ResourceKind,
    },
    /// A resource set does not supply exactly one resource per layout slot.
    ResourceCountMismatch {
        /// Number of slots declared by the layout.
        expected: usize,
        /// Number of resources supplied.
        found: usize,
    },
    /// A region or offset falls outside the resource.
    OutOfBounds(String),
    /// A handle created by one backend was used with another.
    BackendMismatch {
        /// The backend of the device performing the operation.
        expected: BackendType,
        /// The backend that created the handle.
        found: BackendType,
    },
    /// A handle was used after being disposed.
    ResourceDisposed(&'static str),
    /// The operation is not valid in the current state.
    InvalidState(String),
    /// The operation was attempted from a thread that does not own the native context.
    WrongThread(&'static str),
    /// A native API call failed.
    Native {
        /// Name of the native operation that failed.
        operation: &'static str,
        /// The native failure code.
        error: NativeError,
    },
}

impl GraphicsError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidDescriptor(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub(crate) fn native(operation: &'static str, error: NativeError) -> Self {
        Self::Native { operation, error }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendUnavailable(backend) => {
                write!(f, "backend {backend} is not available in this build")
            }
            Self::MissingExtension(name) => write!(f, "required extension missing: {name}"),
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::UnsupportedFormat { format, backend } => {
                write!(f, "format {format:?} is not supported by the {backend} backend")
            }
            Self::InvalidDescriptor(msg) => write!(f, "invalid descriptor: {msg}"),
            Self::ResourceSetMismatch {
                slot,
                expected,
                found,
            } => write!(
                f,
                "resource set slot {slot} expects {expected:?} but {found:?} was supplied"
            ),
            Self::ResourceCountMismatch { expected, found } => write!(
                f,
                "resource set supplies {found} resources for a layout with {expected} slots"
            ),
            Self::OutOfBounds(msg) => write!(f, "out of bounds: {msg}"),
            Self::BackendMismatch { expected, found } => write!(
                f,
                "handle created by the {found} backend used with a {expected} device"
            ),
            Self::ResourceDisposed(kind) => write!(f, "{kind} has already been disposed"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::WrongThread(operation) => write!(
                f,
                "{operation} called from a thread that does not own the native context"
            ),
            Self::Native { operation, error } => write!(f, "{operation} failed: {error}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::ResourceDisposed("buffer");
        assert_eq!(err.to_string(), "buffer has already been disposed");

        let err = GraphicsError::InitializationFailed("no adapter".to_string());
        assert_eq!(err.to_string(), "initialization failed: no adapter");
    }

    #[test]
    fn test_native_error_names() {
        let err = GraphicsError::native("glBufferSubData", NativeError::OpenGl(0x0501));
        assert_eq!(err.to_string(), "glBufferSubData failed: GL_INVALID_VALUE");

        let err = GraphicsError::native("ResizeBuffers", NativeError::Direct3D(0x887A_0001));
        assert_eq!(err.to_string(), "ResizeBuffers failed: DXGI_ERROR_INVALID_CALL");

        let err = GraphicsError::native("glDrawArrays", NativeError::OpenGl(0x1234));
        assert_eq!(err.to_string(), "glDrawArrays failed: GL error 0x1234");
    }

    #[test]
    fn test_mismatch_display() {
        let err = GraphicsError::BackendMismatch {
            expected: BackendType::Vulkan,
            found: BackendType::OpenGl,
        };
        assert_eq!(
            err.to_string(),
            "handle created by the OpenGL backend used with a Vulkan device"
        );
    }
}
