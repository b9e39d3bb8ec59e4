//! GL enums for the headless context.
//!
//! Core enums and types come from the `gl` crate; no function pointers are
//! loaded. Only the extensions the context advertises are declared here.

pub use ::gl::types::{GLenum, GLuint};
pub use ::gl::*;

// EXT_texture_compression_s3tc
pub const COMPRESSED_RGBA_S3TC_DXT1_EXT: GLenum = 0x83F1;
pub const COMPRESSED_RGBA_S3TC_DXT5_EXT: GLenum = 0x83F3;

// EXT_texture_filter_anisotropic
pub const TEXTURE_MAX_ANISOTROPY_EXT: GLenum = 0x84FE;

pub const ARB_DEBUG_OUTPUT: &str = "GL_ARB_debug_output";
pub const KHR_DEBUG: &str = "GL_KHR_debug";
pub const ARB_BASE_INSTANCE: &str = "GL_ARB_base_instance";
pub const ARB_TEXTURE_STORAGE: &str = "GL_ARB_texture_storage";
pub const ARB_TESSELLATION_SHADER: &str = "GL_ARB_tessellation_shader";
pub const EXT_TEXTURE_COMPRESSION_S3TC: &str = "GL_EXT_texture_compression_s3tc";
pub const EXT_TEXTURE_FILTER_ANISOTROPIC: &str = "GL_EXT_texture_filter_anisotropic";
