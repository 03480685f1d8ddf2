//! Aspect-preserving encode resolution planning.
//!
//! The requested size is clamped in two sequential steps: the long edge
//! against the device's larger limit, then the short edge against the smaller
//! one. Each step scales both edges so the aspect ratio is kept.

use serde::{Deserialize, Serialize};

use super::capability::DeviceCapability;

/// Encode resolution and bitrate derived from a request and device limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedResolution {
    pub width: u32,
    pub height: u32,
    /// Bits per second, taken from the capability as-is
    pub bitrate: u32,
}

/// Plan the encode resolution for a `requested_width` x `requested_height` capture.
pub fn plan(
    requested_width: u32,
    requested_height: u32,
    capability: &DeviceCapability,
) -> PlannedResolution {
    let max = capability.long_edge();
    let min = capability.short_edge();

    let (width, height) = if requested_width > requested_height {
        let (long, short) = clamp_edges(requested_width, requested_height, max, min);
        (long, short)
    } else {
        let (long, short) = clamp_edges(requested_height, requested_width, max, min);
        (short, long)
    };

    PlannedResolution {
        width,
        height,
        bitrate: capability.max_bitrate,
    }
}

/// Clamp `long` to `max`, then `short` to `min`, scaling the other edge each time.
fn clamp_edges(mut long: u32, mut short: u32, max: u32, min: u32) -> (u32, u32) {
    if long > max {
        short = scale(short, max, long);
        long = max;
    }
    if short > min {
        long = scale(long, min, short);
        short = min;
    }
    (long, short)
}

/// `edge * num / den`, truncated.
fn scale(edge: u32, num: u32, den: u32) -> u32 {
    (u64::from(edge) * u64::from(num) / u64::from(den)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{CapabilitySource, Codec};

    fn capability(max_width: u32, max_height: u32) -> DeviceCapability {
        DeviceCapability {
            codec: Codec::H264,
            max_width,
            max_height,
            max_bitrate: 8_000_000,
            source: CapabilitySource::Descriptor,
        }
    }

    #[test]
    fn test_landscape_1080p_into_720p_device() {
        let planned = plan(1920, 1080, &capability(1280, 720));
        assert_eq!((planned.width, planned.height), (1280, 720));
        assert_eq!(planned.bitrate, 8_000_000);
    }

    #[test]
    fn test_portrait_1080p_into_720p_device() {
        let planned = plan(1080, 1920, &capability(1280, 720));
        assert_eq!((planned.width, planned.height), (720, 1280));
    }

    #[test]
    fn test_device_orientation_does_not_matter() {
        assert_eq!(
            plan(1920, 1080, &capability(720, 1280)),
            plan(1920, 1080, &capability(1280, 720))
        );
    }

    #[test]
    fn test_within_bounds_unchanged() {
        let planned = plan(800, 600, &capability(1920, 1080));
        assert_eq!((planned.width, planned.height), (800, 600));
    }

    #[test]
    fn test_short_edge_clamp_after_long_edge() {
        // 4:3 fits the long edge but not the short edge of a 16:9 device.
        let planned = plan(1280, 960, &capability(1280, 720));
        assert_eq!((planned.width, planned.height), (960, 720));
    }

    #[test]
    fn test_extreme_ratio_can_truncate_to_zero() {
        // 10000:1 collapses the short edge once the long edge is clamped.
        let planned = plan(10000, 1, &capability(1280, 720));
        assert_eq!((planned.width, planned.height), (1280, 0));

        let planned = plan(1, 10000, &capability(1280, 720));
        assert_eq!((planned.width, planned.height), (0, 1280));
    }

    #[test]
    fn test_bitrate_comes_from_capability() {
        let mut cap = capability(1280, 720);
        cap.max_bitrate = 2_000_000;
        assert_eq!(plan(320, 240, &cap).bitrate, 2_000_000);
    }

    #[test]
    fn test_bounds_aspect_and_idempotence() {
        let caps = [
            capability(1280, 720),
            capability(1920, 1080),
            capability(640, 480),
            capability(1080, 1920),
        ];
        let requests = [
            (1920, 1080),
            (1080, 1920),
            (2560, 1600),
            (1440, 3200),
            (1000, 1000),
            (720, 1280),
            (3840, 2160),
            (1366, 768),
        ];

        for cap in &caps {
            let max = cap.long_edge();
            let min = cap.short_edge();
            for &(w, h) in &requests {
                let planned = plan(w, h, cap);
                let long = planned.width.max(planned.height);
                let short = planned.width.min(planned.height);
                assert!(long <= max, "{}x{} -> {:?} exceeds {}", w, h, planned, max);
                assert!(short <= min, "{}x{} -> {:?} exceeds {}", w, h, planned, min);

                let requested_ratio = f64::from(w) / f64::from(h);
                let planned_ratio = f64::from(planned.width) / f64::from(planned.height);
                assert!(
                    (requested_ratio - planned_ratio).abs() / requested_ratio < 0.01,
                    "{}x{} -> {:?} lost aspect ratio",
                    w,
                    h,
                    planned
                );

                assert_eq!(plan(planned.width, planned.height, cap), planned);
            }
        }
    }
}
