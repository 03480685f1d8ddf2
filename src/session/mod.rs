/*!
 * Encode Session
 *
 * Owns the live codec and virtual display for a screen capture and manages
 * their lifecycle: create, bind, stop and the drain worker's final teardown.
 *
 * There is a single "current session" slot per `EncodeSession`, guarded by one
 * mutex. A drain worker that finishes only tears down the display if its codec
 * is still the one in the slot; a session that was replaced in the meantime is
 * left to its new owner.
 */

pub mod worker;

pub use worker::{drain_until_end_of_stream, DrainFactory, DrainRoutine, DrainWorker};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ScreencastConfig;
use crate::display::{DisplayHandle, DisplayRuntime, VirtualDisplayBinding};
use crate::error::SessionError;
use crate::video::{
    plan, CapabilityProbe, Codec, CodecHandle, CodecRuntime, DeviceCapability, EncodeFormat,
    EncoderTuning, PlannedResolution, Surface,
};

/// Lifecycle of one session instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uncreated,
    Configuring,
    Running,
    Draining,
    Released,
}

/// Caller-supplied capture target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeRequest {
    pub requested_width: u32,
    pub requested_height: u32,
    pub density_dpi: u32,
    pub display_name: String,
}

impl EncodeRequest {
    pub fn new(requested_width: u32, requested_height: u32) -> Self {
        let defaults = ScreencastConfig::default();
        Self {
            requested_width,
            requested_height,
            density_dpi: defaults.density_dpi,
            display_name: defaults.display_name,
        }
    }

    fn validate(&self) -> Result<(), SessionError> {
        if self.requested_width == 0 || self.requested_height == 0 {
            return Err(SessionError::InvalidRequest {
                reason: format!(
                    "requested size {}x{} has a zero edge",
                    self.requested_width, self.requested_height
                ),
            });
        }
        if self.display_name.trim().is_empty() {
            return Err(SessionError::InvalidRequest {
                reason: "display name cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// A started codec surface, returned by `create_capture_surface`
#[derive(Debug)]
pub struct CaptureSurface {
    pub session_id: Uuid,
    pub surface: Surface,
    pub capability: DeviceCapability,
    pub planned: PlannedResolution,
    state: watch::Receiver<SessionState>,
}

impl CaptureSurface {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Resolves once this session instance has released its resources.
    pub async fn wait_released(&self) {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|state| *state == SessionState::Released)
            .await;
    }
}

/// Snapshot of the live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub state: SessionState,
    pub planned: PlannedResolution,
    pub started_at: DateTime<Utc>,
    pub display_bound: bool,
    pub worker_running: bool,
}

struct LiveSession {
    id: Uuid,
    codec: CodecHandle,
    display: Option<DisplayHandle>,
    planned: PlannedResolution,
    started_at: DateTime<Utc>,
    state: Arc<watch::Sender<SessionState>>,
    worker: DrainWorker,
}

struct Shared {
    codec: Codec,
    tuning: EncoderTuning,
    probe: CapabilityProbe,
    codecs: Arc<dyn CodecRuntime>,
    displays: VirtualDisplayBinding,
    drains: Arc<dyn DrainFactory>,
    current: Mutex<Option<LiveSession>>,
}

impl Shared {
    fn lock_current(&self) -> MutexGuard<'_, Option<LiveSession>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Signal end-of-stream and release the display of a session leaving the slot.
    ///
    /// The codec itself is released by the session's drain worker.
    fn retire(&self, live: LiveSession, reason: &str) {
        info!("Stopping session {} ({})", live.id, reason);
        live.codec.signal_end_of_stream();
        VirtualDisplayBinding::release(live.display.as_ref());
        live.state.send_replace(SessionState::Draining);
    }

    fn on_worker_exit(&self, codec: &CodecHandle) -> bool {
        codec.shutdown();

        let mut current = self.lock_current();
        let owns_slot = current
            .as_ref()
            .map_or(false, |live| live.codec.same_instance(codec));
        if !owns_slot {
            debug!(
                "Codec {} is no longer live, leaving the current display alone",
                codec.id()
            );
            return false;
        }

        if let Some(live) = current.take() {
            live.state.send_replace(SessionState::Draining);
            VirtualDisplayBinding::release(live.display.as_ref());
            live.state.send_replace(SessionState::Released);
            info!("Session {} released", live.id);
        }
        true
    }

    fn create_locked(
        self: &Arc<Self>,
        current: &mut Option<LiveSession>,
        request: &EncodeRequest,
    ) -> Result<CaptureSurface, SessionError> {
        request.validate()?;

        if let Some(stale) = current.take() {
            self.retire(stale, "replaced by a new session");
        }

        let capability = self.probe.probe(self.codec);
        let planned = plan(request.requested_width, request.requested_height, &capability);
        let format = EncodeFormat::new(self.codec, &planned, &self.tuning);

        info!(
            "Starting encoder: {} {}x{} @ {} bps, {} fps",
            format.mime_type, format.width, format.height, format.bitrate, format.frame_rate
        );

        let codec = CodecHandle::new(
            self.codecs
                .create_encoder(self.codec)
                .map_err(SessionError::configuration("creating the encoder"))?,
        );
        let surface = match configure_and_start(&codec, &format) {
            Ok(surface) => surface,
            Err(e) => {
                codec.shutdown();
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(SessionState::Configuring);
        let state_tx = Arc::new(state_tx);

        let routine = self.drains.on_surface_created(&codec, &planned);
        let shared = Arc::clone(self);
        let exit_state = Arc::clone(&state_tx);
        let worker = DrainWorker::spawn(codec.clone(), routine, move |codec| {
            if !shared.on_worker_exit(codec) {
                exit_state.send_replace(SessionState::Released);
            }
        });
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                codec.shutdown();
                state_tx.send_replace(SessionState::Released);
                return Err(SessionError::WorkerSpawn(e));
            }
        };

        *current = Some(LiveSession {
            id,
            codec,
            display: None,
            planned,
            started_at: Utc::now(),
            state: state_tx,
            worker,
        });

        Ok(CaptureSurface {
            session_id: id,
            surface,
            capability,
            planned,
            state: state_rx,
        })
    }
}

fn configure_and_start(codec: &CodecHandle, format: &EncodeFormat) -> Result<Surface, SessionError> {
    codec
        .configure(format)
        .map_err(SessionError::configuration("configuring the encoder"))?;
    let surface = codec
        .create_input_surface()
        .map_err(SessionError::configuration("creating the input surface"))?;
    codec
        .start()
        .map_err(SessionError::configuration("starting the encoder"))?;
    Ok(surface)
}

/// Screen-capture encode session owner
pub struct EncodeSession {
    shared: Arc<Shared>,
}

impl EncodeSession {
    pub fn builder(
        codecs: Arc<dyn CodecRuntime>,
        displays: Arc<dyn DisplayRuntime>,
        drains: Arc<dyn DrainFactory>,
    ) -> EncodeSessionBuilder {
        let defaults = ScreencastConfig::default();
        EncodeSessionBuilder {
            codec: defaults.codec,
            tuning: defaults.tuning,
            probe: defaults.probe(Arc::new(defaults.static_profiles())),
            codecs,
            displays,
            drains,
        }
    }

    /// Configure and start a codec for `request` and return its input surface.
    ///
    /// Any session still live in this owner is signalled to finish and its
    /// display released first. The new session stays in `Configuring` until a
    /// virtual display is attached with `attach_display`.
    pub fn create_capture_surface(
        &self,
        request: &EncodeRequest,
    ) -> Result<CaptureSurface, SessionError> {
        let mut current = self.shared.lock_current();
        self.shared.create_locked(&mut current, request)
    }

    /// Create a capture surface and bind it to a virtual display.
    ///
    /// The display mirrors the requested (native) size; the platform scales it
    /// into the planned encoder surface. If the display cannot be created the
    /// just-created codec is torn down and nothing is left running.
    pub fn register_virtual_display(
        &self,
        request: &EncodeRequest,
    ) -> Result<CaptureSurface, SessionError> {
        let mut current = self.shared.lock_current();
        let capture = self.shared.create_locked(&mut current, request)?;

        let display = self.shared.displays.bind(
            capture.surface,
            &request.display_name,
            request.requested_width,
            request.requested_height,
            request.density_dpi,
        );

        let Some(display) = display else {
            if let Some(live) = current.take() {
                warn!("Rolling back session {}: no virtual display", live.id);
                live.codec.signal_end_of_stream();
                live.codec.shutdown();
                live.state.send_replace(SessionState::Released);
            }
            return Err(SessionError::Binding {
                name: request.display_name.clone(),
            });
        };

        if let Some(live) = current.as_mut() {
            live.display = Some(display);
            live.state.send_replace(SessionState::Running);
            info!("Session {} running", live.id);
        }
        Ok(capture)
    }

    /// Hand a display bound to `session_id`'s surface over to the session.
    ///
    /// The session releases it on stop or when its worker exits. If
    /// `session_id` is no longer live, or already has a display, `display` is
    /// released here and an error returned.
    pub fn attach_display(
        &self,
        session_id: Uuid,
        display: DisplayHandle,
    ) -> Result<(), SessionError> {
        let mut current = self.shared.lock_current();
        match current.as_mut() {
            Some(live) if live.id == session_id && live.display.is_none() => {
                live.display = Some(display);
                live.state.send_replace(SessionState::Running);
                info!("Session {} running", live.id);
                Ok(())
            }
            Some(live) if live.id == session_id => {
                warn!("Session {} already has a virtual display", session_id);
                display.release();
                Err(SessionError::AlreadyBound {
                    session: session_id,
                })
            }
            _ => {
                let display_name = display.name();
                warn!(
                    "Session {} is no longer live, releasing display {:?}",
                    session_id,
                    display_name
                );
                display.release();
                Err(SessionError::Stale {
                    session: session_id,
                })
            }
        }
    }

    /// Display binding backed by this session's display runtime.
    pub fn display_binding(&self) -> &VirtualDisplayBinding {
        &self.shared.displays
    }

    /// Stop the live session, if any. Calling it again is a no-op.
    pub fn stop(&self) {
        let mut current = self.shared.lock_current();
        match current.take() {
            Some(live) => self.shared.retire(live, "stop requested"),
            None => debug!("No live session to stop"),
        }
    }

    /// Final teardown after a drain worker's routine has ended.
    ///
    /// Always stops and releases `codec`. Returns true if `codec` was still the
    /// live one, in which case its display was released and the slot cleared.
    pub fn on_worker_exit(&self, codec: &CodecHandle) -> bool {
        self.shared.on_worker_exit(codec)
    }

    pub fn current(&self) -> Option<SessionInfo> {
        let current = self.shared.lock_current();
        current.as_ref().map(|live| SessionInfo {
            id: live.id,
            state: *live.state.borrow(),
            planned: live.planned,
            started_at: live.started_at,
            display_bound: live.display.is_some(),
            worker_running: !live.worker.is_finished(),
        })
    }

    pub fn is_live(&self) -> bool {
        self.shared.lock_current().is_some()
    }
}

impl Drop for EncodeSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for `EncodeSession`
pub struct EncodeSessionBuilder {
    codec: Codec,
    tuning: EncoderTuning,
    probe: CapabilityProbe,
    codecs: Arc<dyn CodecRuntime>,
    displays: Arc<dyn DisplayRuntime>,
    drains: Arc<dyn DrainFactory>,
}

impl EncodeSessionBuilder {
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn tuning(mut self, tuning: EncoderTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn probe(mut self, probe: CapabilityProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Codec, tuning and probe chain from a loaded config.
    pub fn config(self, config: &ScreencastConfig) -> Self {
        self.codec(config.codec)
            .tuning(config.tuning)
            .probe(config.probe(Arc::new(config.static_profiles())))
    }

    pub fn build(self) -> EncodeSession {
        EncodeSession {
            shared: Arc::new(Shared {
                codec: self.codec,
                tuning: self.tuning,
                probe: self.probe,
                codecs: self.codecs,
                displays: VirtualDisplayBinding::new(self.displays),
                drains: self.drains,
                current: Mutex::new(None),
            }),
        }
    }
}
