/*!
 * Video Encoder Module
 *
 * Describes the hardware codec runtime the capture session drives and wraps
 * each created codec in a shareable, identity-comparable handle.
 */

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::planner::PlannedResolution;
use super::Codec;
use crate::error::{panic_message, CodecError};

/// Fixed encoder tuning applied to every session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderTuning {
    /// Target framerate (frames per second)
    #[serde(alias = "frameRate")]
    pub frame_rate: u32,
    /// Seconds between keyframes
    #[serde(alias = "iFrameIntervalSecs")]
    pub i_frame_interval_secs: u32,
}

impl Default for EncoderTuning {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            i_frame_interval_secs: 3,
        }
    }
}

/// Input color format requested from the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFormat {
    /// Frames arrive through the codec's input surface
    Surface,
}

/// Format descriptor handed to `VideoCodec::configure`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeFormat {
    pub codec: Codec,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// Bits per second
    pub bitrate: u32,
    pub frame_rate: u32,
    pub color_format: ColorFormat,
    pub i_frame_interval_secs: u32,
}

impl EncodeFormat {
    pub fn new(codec: Codec, planned: &PlannedResolution, tuning: &EncoderTuning) -> Self {
        Self {
            codec,
            mime_type: codec.mime_type().to_string(),
            width: planned.width,
            height: planned.height,
            bitrate: planned.bitrate,
            frame_rate: tuning.frame_rate,
            color_format: ColorFormat::Surface,
            i_frame_interval_secs: tuning.i_frame_interval_secs,
        }
    }
}

/// Opaque drawable surface produced by a configured codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Surface {
    raw: u64,
}

impl Surface {
    pub fn from_raw(raw: u64) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }
}

/// Encoded output chunk pulled from the codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Encoded bitstream data
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds
    pub pts_us: i64,
    /// Whether this is a keyframe (I-frame)
    pub is_keyframe: bool,
    /// Codec configuration data (SPS/PPS) rather than a frame
    pub is_config: bool,
}

/// Result of one `dequeue_output` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Buffer(EncodedChunk),
    /// Output format became known; muxers start their track here
    FormatChanged,
    /// Nothing available before the timeout
    TryAgainLater,
    EndOfStream,
}

/// A hardware encoder instance created by the codec runtime.
///
/// Methods take `&self`: the session and its drain worker use the same
/// instance from different threads.
pub trait VideoCodec: Send + Sync {
    fn configure(&self, format: &EncodeFormat) -> Result<(), CodecError>;

    /// Request the input surface; only valid between configure and start.
    fn create_input_surface(&self) -> Result<Surface, CodecError>;

    fn start(&self) -> Result<(), CodecError>;

    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent, CodecError>;

    fn signal_end_of_stream(&self) -> Result<(), CodecError>;

    fn stop(&self) -> Result<(), CodecError>;

    fn release(&self) -> Result<(), CodecError>;
}

/// Creates hardware encoders by codec type.
pub trait CodecRuntime: Send + Sync {
    fn create_encoder(&self, codec: Codec) -> Result<Box<dyn VideoCodec>, CodecError>;
}

struct CodecInner {
    id: Uuid,
    codec: Box<dyn VideoCodec>,
    shut_down: AtomicBool,
    drain_claimed: AtomicBool,
}

/// Shared handle to one codec instance.
///
/// Clones refer to the same instance; `same_instance` compares identity, not
/// configuration.
#[derive(Clone)]
pub struct CodecHandle {
    inner: Arc<CodecInner>,
}

impl CodecHandle {
    pub fn new(codec: Box<dyn VideoCodec>) -> Self {
        Self {
            inner: Arc::new(CodecInner {
                id: Uuid::new_v4(),
                codec,
                shut_down: AtomicBool::new(false),
                drain_claimed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn same_instance(&self, other: &CodecHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub(crate) fn configure(&self, format: &EncodeFormat) -> Result<(), CodecError> {
        self.inner.codec.configure(format)
    }

    pub(crate) fn create_input_surface(&self) -> Result<Surface, CodecError> {
        self.inner.codec.create_input_surface()
    }

    pub(crate) fn start(&self) -> Result<(), CodecError> {
        self.inner.codec.start()
    }

    pub fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent, CodecError> {
        if self.is_shut_down() {
            return Err(CodecError::InvalidState("codec already released".to_string()));
        }
        self.inner.codec.dequeue_output(timeout)
    }

    /// Ask the codec to finish; failures and panics are logged and swallowed.
    pub fn signal_end_of_stream(&self) {
        if self.is_shut_down() {
            debug!("Codec {} already released, skipping end-of-stream", self.id());
            return;
        }
        self.teardown_call("signal end-of-stream to", || {
            self.inner.codec.signal_end_of_stream()
        });
    }

    /// Stop and release the codec. Runs at most once per instance; later calls are no-ops.
    ///
    /// `release` is attempted even when `stop` fails or panics.
    pub(crate) fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Codec {} already shut down", self.id());
            return;
        }
        self.teardown_call("stop", || self.inner.codec.stop());
        self.teardown_call("release", || self.inner.codec.release());
        info!("Codec {} released", self.id());
    }

    fn teardown_call<F>(&self, action: &str, call: F)
    where
        F: FnOnce() -> Result<(), CodecError>,
    {
        match panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to {} codec {}: {}", action, self.id(), e),
            Err(payload) => warn!(
                "Codec {} panicked during {}: {}",
                self.id(),
                action,
                panic_message(payload.as_ref())
            ),
        }
    }

    /// Returns true for the first caller only.
    pub(crate) fn claim_drain(&self) -> bool {
        !self.inner.drain_claimed.swap(true, Ordering::SeqCst)
    }
}

impl fmt::Debug for CodecHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecHandle")
            .field("id", &self.inner.id)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
