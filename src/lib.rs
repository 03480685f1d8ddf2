/*!
 * Screencast Encoder Library
 *
 * Hardware screen-capture encode session: device capability probing,
 * resolution planning, codec lifecycle and virtual display binding.
 */

pub mod config;
pub mod display;
pub mod error;
pub mod session;
pub mod video;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::ScreencastConfig;
pub use display::{DisplayRuntime, VirtualDisplay, VirtualDisplayBinding};
pub use error::{CodecError, DisplayError, ProbeError, SessionError};
pub use session::{
    CaptureSurface, DrainFactory, DrainRoutine, EncodeRequest, EncodeSession, SessionInfo,
    SessionState,
};
pub use video::{
    plan, CapabilityProbe, Codec, CodecHandle, CodecRuntime, DeviceCapability, EncodeFormat,
    PlannedResolution, VideoCodec,
};
