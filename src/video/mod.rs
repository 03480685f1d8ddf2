/*!
 * Video Encoding Module
 *
 * Negotiates device encoder limits, plans the encode resolution and wraps the
 * hardware codec runtime used by the screen-capture session.
 */

pub mod capability;
pub mod encoder;
pub mod media_profiles;
pub mod planner;

pub use capability::{
    CapabilityProbe, CapabilitySource, CapabilityStrategy, DescriptorFile, DescriptorSource,
    DescriptorStrategy, DeviceCapability, ProfileSource, ProfileTierStrategy, QualityProfile,
    StaticProfiles,
};
pub use encoder::{
    CodecHandle, CodecRuntime, ColorFormat, EncodeFormat, EncodedChunk, EncoderTuning,
    OutputEvent, Surface, VideoCodec,
};
pub use planner::{plan, PlannedResolution};

use serde::{Deserialize, Serialize};

/// Video codec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264/AVC codec (widely supported)
    #[default]
    #[serde(alias = "avc")]
    H264,
    /// H.265/HEVC codec (better compression, less support)
    #[serde(alias = "hevc")]
    H265,
}

impl Codec {
    /// MIME type handed to the codec runtime when creating an encoder.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Codec::H264 => "video/avc",
            Codec::H265 => "video/hevc",
        }
    }

    /// `name` attribute of the matching `VideoEncoderCap` entry in media_profiles.xml.
    pub fn descriptor_name(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "hevc",
        }
    }
}

/// Platform quality profile tiers, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityTier {
    #[serde(rename = "2160p")]
    Uhd2160,
    #[serde(rename = "1080p")]
    Fhd1080,
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "480p")]
    Sd480,
}

impl QualityTier {
    /// Every tier in descending quality order.
    pub const ALL: [QualityTier; 4] = [
        QualityTier::Uhd2160,
        QualityTier::Fhd1080,
        QualityTier::Hd720,
        QualityTier::Sd480,
    ];

    /// Reference (width, height, bitrate in bps) for this tier.
    pub fn reference_limits(&self) -> (u32, u32, u32) {
        match self {
            QualityTier::Uhd2160 => (3840, 2160, 42_000_000),
            QualityTier::Fhd1080 => (1920, 1080, 17_000_000),
            QualityTier::Hd720 => (1280, 720, 12_000_000),
            QualityTier::Sd480 => (720, 480, 3_000_000),
        }
    }
}
