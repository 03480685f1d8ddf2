//! Error types for probing, codec/display collaborators and session creation.

use std::any::Any;

use thiserror::Error;
use uuid::Uuid;

use crate::video::QualityTier;

/// Why a capability strategy could not produce a usable capability.
///
/// Never surfaced past `CapabilityProbe::probe`; the probe logs it and moves on
/// to the next strategy in the chain.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("capability descriptor unavailable: {0}")]
    DescriptorUnavailable(#[from] std::io::Error),

    #[error("malformed capability descriptor: {reason}")]
    Malformed { reason: String },

    #[error("unexpected descriptor root <{found}>, expected <MediaSettings>")]
    UnexpectedRoot { found: String },

    #[error("encoder entry is missing attribute {attribute}")]
    MissingAttribute { attribute: &'static str },

    #[error("encoder entry has invalid {attribute}={value:?}")]
    InvalidAttribute { attribute: &'static str, value: String },

    #[error("no encoder entry for codec {codec}")]
    NoMatch { codec: String },

    #[error("{count} encoder entries for codec {codec}, expected exactly one")]
    Ambiguous { codec: String, count: usize },

    #[error("capability limits must be non-zero ({width}x{height} @ {bitrate} bps)")]
    ZeroLimits { width: u32, height: u32, bitrate: u32 },

    #[error("quality profile {0:?} is not supported on this device")]
    ProfileUnsupported(QualityTier),
}

/// Failure reported by the codec runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("codec rejected format: {0}")]
    Rejected(String),

    #[error("codec in invalid state: {0}")]
    InvalidState(String),

    #[error("codec unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by the virtual display runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("virtual display {name:?} rejected: {reason}")]
pub struct DisplayError {
    pub name: String,
    pub reason: String,
}

/// Failures that keep a session from reaching Running.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid encode request: {reason}")]
    InvalidRequest { reason: String },

    #[error("encoder configuration failed while {stage}: {source}")]
    Configuration {
        stage: &'static str,
        #[source]
        source: CodecError,
    },

    #[error("virtual display {name:?} could not be bound")]
    Binding { name: String },

    #[error("failed to spawn drain worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("session {session} is no longer live")]
    Stale { session: Uuid },

    #[error("session {session} already has a virtual display")]
    AlreadyBound { session: Uuid },
}

impl SessionError {
    pub(crate) fn configuration(stage: &'static str) -> impl FnOnce(CodecError) -> Self {
        move |source| SessionError::Configuration { stage, source }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
