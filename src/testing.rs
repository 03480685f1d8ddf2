//! In-memory codec and display runtimes for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::Result;

use crate::display::{DisplayRuntime, VirtualDisplay, VirtualDisplayRequest};
use crate::error::{CodecError, DisplayError};
use crate::session::{drain_until_end_of_stream, DrainFactory, DrainRoutine};
use crate::video::{
    Codec, CodecHandle, CodecRuntime, EncodeFormat, OutputEvent, PlannedResolution, Surface,
    VideoCodec,
};

static NEXT_SURFACE: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct StreamFlags {
    eos_signaled: bool,
    finished: bool,
}

/// Observable state of a `FakeCodec`, shared with the test.
#[derive(Default)]
pub struct FakeCodecState {
    format: Mutex<Option<EncodeFormat>>,
    surface: Mutex<Option<Surface>>,
    started: AtomicBool,
    flags: Mutex<StreamFlags>,
    wake: Condvar,
    pending: Mutex<VecDeque<OutputEvent>>,
    fail_eos: AtomicBool,
    fail_configure: AtomicBool,
    panic_on_stop: AtomicBool,
    stop_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl FakeCodecState {
    pub fn format(&self) -> Option<EncodeFormat> {
        self.format.lock().unwrap().clone()
    }

    pub fn surface(&self) -> Surface {
        self.surface.lock().unwrap().expect("no input surface created")
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn end_of_stream_signaled(&self) -> bool {
        self.flags.lock().unwrap().eos_signaled
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    pub fn fail_end_of_stream(&self) {
        self.fail_eos.store(true, Ordering::SeqCst);
    }

    pub fn fail_configure(&self) {
        self.fail_configure.store(true, Ordering::SeqCst);
    }

    /// Make `stop` panic, as a codec whose hardware was reclaimed might.
    pub fn panic_on_stop(&self) {
        self.panic_on_stop.store(true, Ordering::SeqCst);
    }

    pub fn push_output(&self, event: OutputEvent) {
        self.pending.lock().unwrap().push_back(event);
    }

    /// Make the codec report end-of-stream without being asked to.
    pub fn end_stream(&self) {
        self.flags.lock().unwrap().finished = true;
        self.wake.notify_all();
    }
}

/// Codec that emits queued events, then waits for end-of-stream or stop.
pub struct FakeCodec {
    state: Arc<FakeCodecState>,
}

impl FakeCodec {
    pub fn new() -> (FakeCodec, Arc<FakeCodecState>) {
        let state = Arc::new(FakeCodecState::default());
        (
            FakeCodec {
                state: state.clone(),
            },
            state,
        )
    }
}

impl VideoCodec for FakeCodec {
    fn configure(&self, format: &EncodeFormat) -> Result<(), CodecError> {
        if self.state.fail_configure.load(Ordering::SeqCst) {
            return Err(CodecError::Rejected(format!(
                "{}x{} unsupported",
                format.width, format.height
            )));
        }
        *self.state.format.lock().unwrap() = Some(format.clone());
        Ok(())
    }

    fn create_input_surface(&self) -> Result<Surface, CodecError> {
        let surface = Surface::from_raw(NEXT_SURFACE.fetch_add(1, Ordering::SeqCst));
        *self.state.surface.lock().unwrap() = Some(surface);
        Ok(surface)
    }

    fn start(&self) -> Result<(), CodecError> {
        self.state.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent, CodecError> {
        if let Some(event) = self.state.pending.lock().unwrap().pop_front() {
            return Ok(event);
        }
        let flags = self.state.flags.lock().unwrap();
        let (flags, _) = self
            .state
            .wake
            .wait_timeout_while(flags, timeout, |f| !f.eos_signaled && !f.finished)
            .unwrap();
        if flags.eos_signaled || flags.finished {
            Ok(OutputEvent::EndOfStream)
        } else {
            Ok(OutputEvent::TryAgainLater)
        }
    }

    fn signal_end_of_stream(&self) -> Result<(), CodecError> {
        if self.state.fail_eos.load(Ordering::SeqCst) {
            return Err(CodecError::InvalidState("not started".to_string()));
        }
        self.state.flags.lock().unwrap().eos_signaled = true;
        self.state.wake.notify_all();
        Ok(())
    }

    fn stop(&self) -> Result<(), CodecError> {
        self.state.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.panic_on_stop.load(Ordering::SeqCst) {
            panic!("codec hardware reclaimed");
        }
        self.state.end_stream();
        Ok(())
    }

    fn release(&self) -> Result<(), CodecError> {
        self.state.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out `FakeCodec`s and keeps their state for inspection.
#[derive(Default)]
pub struct FakeCodecRuntime {
    codecs: Mutex<Vec<Arc<FakeCodecState>>>,
    fail_next_configure: AtomicBool,
    panic_next_stop: AtomicBool,
    fail_create: AtomicBool,
}

impl FakeCodecRuntime {
    pub fn fail_next_configure(&self) {
        self.fail_next_configure.store(true, Ordering::SeqCst);
    }

    pub fn panic_next_stop(&self) {
        self.panic_next_stop.store(true, Ordering::SeqCst);
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.codecs.lock().unwrap().len()
    }

    pub fn codec(&self, index: usize) -> Arc<FakeCodecState> {
        self.codecs.lock().unwrap()[index].clone()
    }
}

impl CodecRuntime for FakeCodecRuntime {
    fn create_encoder(&self, codec: Codec) -> Result<Box<dyn VideoCodec>, CodecError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(CodecError::Unavailable(format!("no {} encoder", codec.mime_type())));
        }
        let (fake, state) = FakeCodec::new();
        if self.fail_next_configure.swap(false, Ordering::SeqCst) {
            state.fail_configure();
        }
        if self.panic_next_stop.swap(false, Ordering::SeqCst) {
            state.panic_on_stop();
        }
        self.codecs.lock().unwrap().push(state);
        Ok(Box::new(fake))
    }
}

#[derive(Default)]
pub struct FakeDisplayState {
    release_calls: AtomicUsize,
}

impl FakeDisplayState {
    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }
}

struct FakeDisplay {
    state: Arc<FakeDisplayState>,
}

impl VirtualDisplay for FakeDisplay {
    fn release(&self) -> Result<(), DisplayError> {
        self.state.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every display request; `fail_next` makes the next one fail.
#[derive(Default)]
pub struct FakeDisplayRuntime {
    requests: Mutex<Vec<VirtualDisplayRequest>>,
    displays: Mutex<Vec<Arc<FakeDisplayState>>>,
    fail_next: AtomicBool,
}

impl FakeDisplayRuntime {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn last_request(&self) -> Option<VirtualDisplayRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.displays.lock().unwrap().len()
    }

    pub fn display(&self, index: usize) -> Arc<FakeDisplayState> {
        self.displays.lock().unwrap()[index].clone()
    }
}

impl DisplayRuntime for FakeDisplayRuntime {
    fn create_virtual_display(
        &self,
        request: &VirtualDisplayRequest,
    ) -> Result<Box<dyn VirtualDisplay>, DisplayError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(DisplayError {
                name: request.name.clone(),
                reason: "permission denied".to_string(),
            });
        }
        let state = Arc::new(FakeDisplayState::default());
        self.displays.lock().unwrap().push(state.clone());
        Ok(Box::new(FakeDisplay { state }))
    }
}

/// Drains until the codec reports end-of-stream.
pub fn eos_drains() -> Arc<dyn DrainFactory> {
    Arc::new(
        |_: &CodecHandle, _: &PlannedResolution| -> Box<dyn DrainRoutine> {
            let routine = |codec: &CodecHandle| -> Result<()> {
                drain_until_end_of_stream(codec, Duration::from_millis(10), |_| Ok(()))?;
                Ok(())
            };
            Box::new(routine)
        },
    )
}

/// Returns immediately, as if the muxer closed right away.
pub fn closing_drains() -> Arc<dyn DrainFactory> {
    Arc::new(
        |_: &CodecHandle, _: &PlannedResolution| -> Box<dyn DrainRoutine> {
            let routine = |_: &CodecHandle| -> Result<()> { Ok(()) };
            Box::new(routine)
        },
    )
}

pub fn failing_drains() -> Arc<dyn DrainFactory> {
    Arc::new(
        |_: &CodecHandle, _: &PlannedResolution| -> Box<dyn DrainRoutine> {
            let routine = |_: &CodecHandle| -> Result<()> { anyhow::bail!("muxer write failed") };
            Box::new(routine)
        },
    )
}

pub fn panicking_drains() -> Arc<dyn DrainFactory> {
    Arc::new(
        |_: &CodecHandle, _: &PlannedResolution| -> Box<dyn DrainRoutine> {
            let routine = |_: &CodecHandle| -> Result<()> { panic!("drain routine panicked") };
            Box::new(routine)
        },
    )
}
