/*!
 * Drain Worker
 *
 * Runs a collaborator-supplied drain routine on a dedicated thread and
 * unconditionally hands the codec back for teardown when the routine ends,
 * whether it finished, returned an error or panicked.
 */

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::panic_message;
use crate::video::{CodecHandle, OutputEvent, PlannedResolution};

const WORKER_THREAD_NAME: &str = "encoder-drain";

/// Pulls encoded output from a codec until the stream ends.
pub trait DrainRoutine: Send {
    fn drain(&mut self, codec: &CodecHandle) -> Result<()>;
}

impl<F> DrainRoutine for F
where
    F: FnMut(&CodecHandle) -> Result<()> + Send,
{
    fn drain(&mut self, codec: &CodecHandle) -> Result<()> {
        self(codec)
    }
}

/// Builds the drain routine for a freshly started codec.
///
/// Called while the owning `EncodeSession` holds its session lock: an
/// implementation must not call back into that session. Do any session work
/// from the returned routine, which runs on the drain thread.
pub trait DrainFactory: Send + Sync {
    fn on_surface_created(
        &self,
        codec: &CodecHandle,
        planned: &PlannedResolution,
    ) -> Box<dyn DrainRoutine>;
}

impl<F> DrainFactory for F
where
    F: Fn(&CodecHandle, &PlannedResolution) -> Box<dyn DrainRoutine> + Send + Sync,
{
    fn on_surface_created(
        &self,
        codec: &CodecHandle,
        planned: &PlannedResolution,
    ) -> Box<dyn DrainRoutine> {
        self(codec, planned)
    }
}

/// Background drain thread bound to one codec instance
pub struct DrainWorker {
    codec_id: Uuid,
    handle: JoinHandle<()>,
}

impl DrainWorker {
    /// Spawn the drain thread. `on_exit` runs exactly once after the routine ends.
    ///
    /// A codec can only ever be drained by one worker; a second spawn for the
    /// same instance fails with `AlreadyExists`.
    pub fn spawn<F>(
        codec: CodecHandle,
        mut routine: Box<dyn DrainRoutine>,
        on_exit: F,
    ) -> io::Result<Self>
    where
        F: FnOnce(&CodecHandle) + Send + 'static,
    {
        if !codec.claim_drain() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("codec {} already has a drain worker", codec.id()),
            ));
        }

        let codec_id = codec.id();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                run_guarded(&codec, routine.as_mut());
                on_exit(&codec);
                info!("=== Encoding complete for codec {} ===", codec.id());
            })?;

        debug!("Drain worker started for codec {}", codec_id);
        Ok(Self { codec_id, handle })
    }

    pub fn codec_id(&self) -> Uuid {
        self.codec_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker thread, including its teardown step.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

impl std::fmt::Debug for DrainWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainWorker")
            .field("codec_id", &self.codec_id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn run_guarded(codec: &CodecHandle, routine: &mut dyn DrainRoutine) {
    match panic::catch_unwind(AssertUnwindSafe(|| routine.drain(codec))) {
        Ok(Ok(())) => debug!("Drain routine for codec {} returned", codec.id()),
        Ok(Err(e)) => error!("Encoder error on codec {}: {:#}", codec.id(), e),
        Err(payload) => error!(
            "Drain routine for codec {} panicked: {}",
            codec.id(),
            panic_message(payload.as_ref())
        ),
    }
}

/// Dequeue output until end-of-stream, passing every other event to `on_event`.
///
/// `TryAgainLater` polls are not forwarded. Returns the number of buffers seen.
pub fn drain_until_end_of_stream<F>(
    codec: &CodecHandle,
    poll_timeout: Duration,
    mut on_event: F,
) -> Result<u64>
where
    F: FnMut(&OutputEvent) -> Result<()>,
{
    let mut buffers = 0u64;
    loop {
        let event = codec
            .dequeue_output(poll_timeout)
            .with_context(|| format!("Failed to dequeue output from codec {}", codec.id()))?;

        match event {
            OutputEvent::EndOfStream => {
                debug!("Codec {} reached end of stream after {} buffers", codec.id(), buffers);
                return Ok(buffers);
            }
            OutputEvent::TryAgainLater => continue,
            OutputEvent::Buffer(_) => {
                buffers += 1;
                on_event(&event)?;
            }
            OutputEvent::FormatChanged => on_event(&event)?,
        }
    }
}
