//! Screencast configuration.
//!
//! Loaded from JSON, by default from the platform config directory:
//! - Linux: `~/.config/screencast/config.json`
//! - macOS: `~/Library/Application Support/screencast/config.json`
//!
//! Both snake_case and camelCase keys are accepted. Missing keys take their
//! default value.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::video::capability::DEFAULT_DESCRIPTOR_PATH;
use crate::video::{
    CapabilityProbe, Codec, DescriptorFile, EncoderTuning, ProfileSource, QualityTier,
    StaticProfiles,
};

const CONFIG_DIR_NAME: &str = "screencast";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreencastConfig {
    pub codec: Codec,

    /// Encoder limits descriptor consulted first by the probe
    #[serde(alias = "descriptorPath")]
    pub descriptor_path: PathBuf,

    /// Quality tiers tried after the descriptor, in order
    #[serde(alias = "profileTiers")]
    pub profile_tiers: Vec<QualityTier>,

    /// Tiers the static profile source reports as available
    #[serde(alias = "supportedProfiles")]
    pub supported_profiles: Vec<QualityTier>,

    pub tuning: EncoderTuning,

    #[serde(alias = "displayName")]
    pub display_name: String,

    #[serde(alias = "densityDpi")]
    pub density_dpi: u32,
}

impl Default for ScreencastConfig {
    fn default() -> Self {
        Self {
            codec: Codec::H264,
            descriptor_path: PathBuf::from(DEFAULT_DESCRIPTOR_PATH),
            profile_tiers: QualityTier::ALL.to_vec(),
            supported_profiles: vec![QualityTier::Fhd1080, QualityTier::Hd720],
            tuning: EncoderTuning::default(),
            display_name: "hidden:screen-recording".to_string(),
            density_dpi: 1,
        }
    }
}

impl ScreencastConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Default config location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `default_path()`; a missing or unreadable file yields the defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("[Config] Could not determine config directory, using defaults");
            return Self::default();
        };

        if !path.exists() {
            info!("[Config] No config file at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                info!("[Config] Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("[Config] {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn static_profiles(&self) -> StaticProfiles {
        StaticProfiles::new(self.supported_profiles.iter().copied())
    }

    /// Capability chain: the descriptor file, then each configured profile tier.
    pub fn probe(&self, profiles: Arc<dyn ProfileSource>) -> CapabilityProbe {
        CapabilityProbe::new()
            .with_descriptor(DescriptorFile::new(&self.descriptor_path))
            .with_profile_tiers(profiles, self.profile_tiers.iter().copied())
    }
}
