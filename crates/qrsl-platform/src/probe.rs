//! Capability probe backed by values the host application supplies.

use crate::traits::{CapabilityProbe, PlatformVersion, NATIVE_PQC_MIN_VERSION};
use serde::Deserialize;

/// Capability facts known at startup.
///
/// Deserializable so the embedding application can pass them through its
/// own configuration:
///
/// ```
/// use qrsl_platform::{CapabilityProbe, StaticCapabilityProbe};
///
/// let probe: StaticCapabilityProbe =
///     serde_json::from_str(r#"{"platform_version": "26.1", "legacy_bridge_linked": true}"#).unwrap();
/// assert!(probe.native_pqc_available());
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct StaticCapabilityProbe {
    platform_version: PlatformVersion,
    #[serde(default)]
    legacy_bridge_linked: bool,
    #[serde(default = "default_min_version")]
    native_pqc_min_version: PlatformVersion,
}

fn default_min_version() -> PlatformVersion {
    NATIVE_PQC_MIN_VERSION
}

impl StaticCapabilityProbe {
    /// Construct with the default native-PQC threshold.
    pub fn new(platform_version: PlatformVersion, legacy_bridge_linked: bool) -> Self {
        Self {
            platform_version,
            legacy_bridge_linked,
            native_pqc_min_version: NATIVE_PQC_MIN_VERSION,
        }
    }

    /// Override the native-PQC threshold.
    pub fn with_native_min_version(mut self, version: PlatformVersion) -> Self {
        self.native_pqc_min_version = version;
        self
    }
}

impl CapabilityProbe for StaticCapabilityProbe {
    fn platform_version(&self) -> PlatformVersion {
        self.platform_version
    }

    fn native_pqc_min_version(&self) -> PlatformVersion {
        self.native_pqc_min_version
    }

    fn legacy_bridge_linked(&self) -> bool {
        self.legacy_bridge_linked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_override() {
        let probe = StaticCapabilityProbe::new(PlatformVersion::new(18, 0), false)
            .with_native_min_version(PlatformVersion::new(18, 0));
        assert!(probe.native_pqc_available());
        assert!(!probe.legacy_bridge_linked());
    }

    #[test]
    fn test_old_platform_has_no_native_pqc() {
        let probe = StaticCapabilityProbe::new(PlatformVersion::new(17, 5), true);
        assert!(!probe.native_pqc_available());
        assert!(probe.legacy_bridge_linked());
    }
}
