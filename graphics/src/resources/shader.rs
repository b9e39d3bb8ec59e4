//! Shader resource.

use crate::backend::GpuShader;
use crate::error::GraphicsError;
use crate::types::ShaderStage;

use super::{NativeSlot, ResourceId};

/// One compiled shader stage. Immutable once created.
pub struct Shader {
    id: ResourceId,
    stage: ShaderStage,
    entry_point: String,
    label: Option<String>,
    native: NativeSlot<GpuShader>,
}

impl Shader {
    pub(crate) fn new(
        stage: ShaderStage,
        entry_point: String,
        label: Option<String>,
        native: GpuShader,
    ) -> Self {
        Self {
            id: ResourceId::next(),
            stage,
            entry_point,
            label,
            native: NativeSlot::new("shader", native),
        }
    }

    /// Unique identifier of this shader.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Stage the shader runs in.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Entry point name.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Get the shader label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Release this handle's claim on the native shader. Pipelines already
    /// created from it keep working.
    pub fn dispose(&self) {
        if self.native.release() {
            log::trace!("Shader: disposed {} ({:?})", self.id, self.stage);
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.native.is_released()
    }

    pub(crate) fn native(&self) -> Result<GpuShader, GraphicsError> {
        self.native.get()
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .field("entry_point", &self.entry_point)
            .finish()
    }
}

static_assertions::assert_impl_all!(Shader: Send, Sync);
