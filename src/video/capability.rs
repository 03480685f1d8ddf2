/*!
 * Device Capability Probe
 *
 * Resolves the encoder limits for a codec by walking an ordered chain of
 * strategies (device descriptor, then platform quality profiles) and falling
 * back to a minimal hard-coded profile when every strategy fails.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::media_profiles::find_encoder_cap;
use super::{Codec, QualityTier};
use crate::error::ProbeError;

/// Platform location of the encoder limits descriptor.
pub const DEFAULT_DESCRIPTOR_PATH: &str = "/system/etc/media_profiles.xml";

/// Where a capability came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilitySource {
    Descriptor,
    Profile(QualityTier),
    Default,
}

/// Maximum encode limits the device supports for one codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapability {
    pub codec: Codec,
    pub max_width: u32,
    pub max_height: u32,
    /// Bits per second
    pub max_bitrate: u32,
    pub source: CapabilitySource,
}

impl DeviceCapability {
    /// The last-resort profile used when nothing else resolves: 640x480 @ 2 Mbps.
    pub fn minimal(codec: Codec) -> Self {
        Self {
            codec,
            max_width: 640,
            max_height: 480,
            max_bitrate: 2_000_000,
            source: CapabilitySource::Default,
        }
    }

    /// Longer of the two limits; device limits are orientation-agnostic.
    pub fn long_edge(&self) -> u32 {
        self.max_width.max(self.max_height)
    }

    pub fn short_edge(&self) -> u32 {
        self.max_width.min(self.max_height)
    }

    fn validated(self) -> Result<Self, ProbeError> {
        if self.max_width == 0 || self.max_height == 0 || self.max_bitrate == 0 {
            return Err(ProbeError::ZeroLimits {
                width: self.max_width,
                height: self.max_height,
                bitrate: self.max_bitrate,
            });
        }
        Ok(self)
    }
}

/// One row of the platform quality-profile table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub tier: QualityTier,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
}

impl QualityProfile {
    /// Reference profile for a tier.
    pub fn reference(tier: QualityTier) -> Self {
        let (width, height, bitrate) = tier.reference_limits();
        Self {
            tier,
            width,
            height,
            bitrate,
        }
    }
}

/// Supplies the raw capability descriptor text.
pub trait DescriptorSource: Send + Sync {
    fn read_descriptor(&self) -> std::io::Result<String>;
}

/// Descriptor read from a file; the file is opened and closed on every read.
#[derive(Debug, Clone)]
pub struct DescriptorFile {
    path: PathBuf,
}

impl DescriptorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for DescriptorFile {
    fn default() -> Self {
        Self::new(DEFAULT_DESCRIPTOR_PATH)
    }
}

impl DescriptorSource for DescriptorFile {
    fn read_descriptor(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.path)
    }
}

/// Platform-provided quality profiles, queried tier by tier.
pub trait ProfileSource: Send + Sync {
    /// Returns the profile for `tier`, or `None` when the device does not support it.
    fn profile(&self, codec: Codec, tier: QualityTier) -> Option<QualityProfile>;
}

/// Profile source backed by the reference table, limited to a set of supported tiers.
#[derive(Debug, Clone, Default)]
pub struct StaticProfiles {
    supported: Vec<QualityTier>,
}

impl StaticProfiles {
    pub fn new(supported: impl IntoIterator<Item = QualityTier>) -> Self {
        Self {
            supported: supported.into_iter().collect(),
        }
    }
}

impl ProfileSource for StaticProfiles {
    fn profile(&self, _codec: Codec, tier: QualityTier) -> Option<QualityProfile> {
        self.supported
            .contains(&tier)
            .then(|| QualityProfile::reference(tier))
    }
}

/// One fallible step in the probe chain.
pub trait CapabilityStrategy: Send + Sync {
    fn name(&self) -> String;
    fn resolve(&self, codec: Codec) -> Result<DeviceCapability, ProbeError>;
}

/// Reads limits from the device descriptor.
pub struct DescriptorStrategy<S> {
    source: S,
}

impl<S: DescriptorSource> DescriptorStrategy<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: DescriptorSource> CapabilityStrategy for DescriptorStrategy<S> {
    fn name(&self) -> String {
        "descriptor".to_string()
    }

    fn resolve(&self, codec: Codec) -> Result<DeviceCapability, ProbeError> {
        let xml = self.source.read_descriptor()?;
        let cap = find_encoder_cap(&xml, codec.descriptor_name())?;
        DeviceCapability {
            codec,
            max_width: cap.max_frame_width,
            max_height: cap.max_frame_height,
            max_bitrate: cap.max_bit_rate,
            source: CapabilitySource::Descriptor,
        }
        .validated()
    }
}

/// Reads limits from a single platform quality-profile tier.
pub struct ProfileTierStrategy {
    profiles: Arc<dyn ProfileSource>,
    tier: QualityTier,
}

impl ProfileTierStrategy {
    pub fn new(profiles: Arc<dyn ProfileSource>, tier: QualityTier) -> Self {
        Self { profiles, tier }
    }
}

impl CapabilityStrategy for ProfileTierStrategy {
    fn name(&self) -> String {
        format!("profile {:?}", self.tier)
    }

    fn resolve(&self, codec: Codec) -> Result<DeviceCapability, ProbeError> {
        let profile = self
            .profiles
            .profile(codec, self.tier)
            .ok_or(ProbeError::ProfileUnsupported(self.tier))?;
        DeviceCapability {
            codec,
            max_width: profile.width,
            max_height: profile.height,
            max_bitrate: profile.bitrate,
            source: CapabilitySource::Profile(self.tier),
        }
        .validated()
    }
}

/// Ordered chain of capability strategies; the first success wins.
#[derive(Default)]
pub struct CapabilityProbe {
    strategies: Vec<Box<dyn CapabilityStrategy>>,
}

impl CapabilityProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy to the end of the chain.
    pub fn with_strategy(mut self, strategy: impl CapabilityStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn with_descriptor(self, source: impl DescriptorSource + 'static) -> Self {
        self.with_strategy(DescriptorStrategy::new(source))
    }

    /// Append one profile strategy per tier, in the order given.
    pub fn with_profile_tiers(
        mut self,
        profiles: Arc<dyn ProfileSource>,
        tiers: impl IntoIterator<Item = QualityTier>,
    ) -> Self {
        for tier in tiers {
            self = self.with_strategy(ProfileTierStrategy::new(profiles.clone(), tier));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Resolve the device limits for `codec`. Never fails.
    pub fn probe(&self, codec: Codec) -> DeviceCapability {
        for strategy in &self.strategies {
            match strategy.resolve(codec) {
                Ok(capability) => {
                    info!(
                        "Encoder limits for {:?} from {}: {}x{} @ {} bps",
                        codec,
                        strategy.name(),
                        capability.max_width,
                        capability.max_height,
                        capability.max_bitrate
                    );
                    return capability;
                }
                Err(e) => {
                    warn!("Capability strategy '{}' failed: {}", strategy.name(), e);
                }
            }
        }

        let fallback = DeviceCapability::minimal(codec);
        info!(
            "No capability strategy resolved for {:?}, using {}x{} @ {} bps",
            codec, fallback.max_width, fallback.max_height, fallback.max_bitrate
        );
        fallback
    }
}

impl std::fmt::Debug for CapabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("CapabilityProbe")
            .field("strategies", &names)
            .finish()
    }
}
