//! Sampler state.

use super::ComparisonKind;

/// Largest anisotropy level any backend accepts.
pub const MAX_ANISOTROPY: u16 = 16;

/// Filter applied when sampling between texels or mip levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

/// Behavior for texture coordinates outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// Full sampler state, translated per backend at creation.
///
/// `max_anisotropy > 1` needs [`DeviceFeatures::sampler_anisotropy`] and
/// overrides the min/mag/mip filters on every backend.
///
/// [`DeviceFeatures::sampler_anisotropy`]: crate::DeviceFeatures::sampler_anisotropy
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    /// Turns the sampler into a comparison sampler (shadow lookups).
    pub compare: Option<ComparisonKind>,
    /// 1 disables anisotropic filtering.
    pub max_anisotropy: u16,
}

impl SamplerDescriptor {
    /// Point sampling with wrapping coordinates.
    pub fn point() -> Self {
        Self::default().with_address_mode(AddressMode::Repeat)
    }

    /// Trilinear sampling with wrapping coordinates.
    pub fn linear() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            ..Self::point()
        }
    }

    /// Anisotropic sampling at `level`, clamped to [`MAX_ANISOTROPY`].
    pub fn anisotropic(level: u16) -> Self {
        Self::linear().with_anisotropy(level.min(MAX_ANISOTROPY))
    }

    /// Clamped point sampler with a depth comparison, for shadow maps.
    pub fn shadow(compare: ComparisonKind) -> Self {
        Self::default().with_compare(compare)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_mode_u = mode;
        self.address_mode_v = mode;
        self.address_mode_w = mode;
        self
    }

    pub fn with_compare(mut self, compare: ComparisonKind) -> Self {
        self.compare = Some(compare);
        self
    }

    pub fn with_anisotropy(mut self, level: u16) -> Self {
        self.max_anisotropy = level;
        self
    }

    pub fn with_lod_clamp(mut self, min: f32, max: f32) -> Self {
        self.lod_min_clamp = min;
        self.lod_max_clamp = max;
        self
    }

    /// Whether anisotropic filtering is requested.
    pub fn is_anisotropic(&self) -> bool {
        self.max_anisotropy > 1
    }
}

/// Clamped point sampling over the whole mip chain.
impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: f32::MAX,
            compare: None,
            max_anisotropy: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let point = SamplerDescriptor::point();
        assert_eq!(point.address_mode_w, AddressMode::Repeat);
        assert_eq!(point.min_filter, FilterMode::Nearest);

        let linear = SamplerDescriptor::linear();
        assert_eq!(linear.mipmap_filter, FilterMode::Linear);
        assert_eq!(linear.address_mode_u, AddressMode::Repeat);
        assert!(!linear.is_anisotropic());

        let shadow = SamplerDescriptor::shadow(ComparisonKind::LessEqual);
        assert_eq!(shadow.compare, Some(ComparisonKind::LessEqual));
        assert_eq!(shadow.address_mode_u, AddressMode::ClampToEdge);
    }

    #[test]
    fn anisotropy_is_clamped() {
        assert_eq!(SamplerDescriptor::anisotropic(64).max_anisotropy, MAX_ANISOTROPY);
        assert!(SamplerDescriptor::anisotropic(4).is_anisotropic());
    }
}
