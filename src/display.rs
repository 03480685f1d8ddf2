//! Virtual display binding for the capture surface.
//!
//! The platform renders the mirrored screen into whatever surface a virtual
//! display is bound to; binding the encoder's input surface is what feeds the
//! codec.

use std::fmt;
use std::ops::BitOr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{panic_message, DisplayError};
use crate::video::Surface;

/// Virtual display visibility flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayFlags(u32);

impl DisplayFlags {
    pub const PUBLIC: DisplayFlags = DisplayFlags(1 << 0);
    pub const PRESENTATION: DisplayFlags = DisplayFlags(1 << 1);
    pub const SECURE: DisplayFlags = DisplayFlags(1 << 2);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: DisplayFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DisplayFlags {
    type Output = DisplayFlags;

    fn bitor(self, rhs: DisplayFlags) -> DisplayFlags {
        DisplayFlags(self.0 | rhs.0)
    }
}

/// Parameters for a platform virtual display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDisplayRequest {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
    pub surface: Surface,
    pub flags: DisplayFlags,
}

/// A live platform virtual display.
pub trait VirtualDisplay: Send + Sync {
    fn release(&self) -> Result<(), DisplayError>;
}

/// Creates platform virtual displays.
pub trait DisplayRuntime: Send + Sync {
    fn create_virtual_display(
        &self,
        request: &VirtualDisplayRequest,
    ) -> Result<Box<dyn VirtualDisplay>, DisplayError>;
}

/// Owned virtual display; releasing it more than once is a no-op.
pub struct DisplayHandle {
    name: String,
    display: Box<dyn VirtualDisplay>,
    released: AtomicBool,
}

impl DisplayHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            debug!("Virtual display {:?} already released", self.name);
            return;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.display.release())) {
            Ok(Ok(())) => info!("Virtual display {:?} released", self.name),
            Ok(Err(e)) => warn!("Failed to release virtual display {:?}: {}", self.name, e),
            Err(payload) => warn!(
                "Virtual display {:?} panicked on release: {}",
                self.name,
                panic_message(payload.as_ref())
            ),
        }
    }
}

impl fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayHandle")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Binds capture surfaces to public, secure virtual displays.
#[derive(Clone)]
pub struct VirtualDisplayBinding {
    runtime: Arc<dyn DisplayRuntime>,
}

impl VirtualDisplayBinding {
    pub fn new(runtime: Arc<dyn DisplayRuntime>) -> Self {
        Self { runtime }
    }

    /// Returns `None` when the platform refuses the display.
    pub fn bind(
        &self,
        surface: Surface,
        name: &str,
        width: u32,
        height: u32,
        density_dpi: u32,
    ) -> Option<DisplayHandle> {
        let request = VirtualDisplayRequest {
            name: name.to_string(),
            width,
            height,
            density_dpi,
            surface,
            flags: DisplayFlags::PUBLIC | DisplayFlags::SECURE,
        };

        match self.runtime.create_virtual_display(&request) {
            Ok(display) => {
                info!(
                    "Virtual display {:?} bound: {}x{} @ {} dpi",
                    name, width, height, density_dpi
                );
                Some(DisplayHandle {
                    name: request.name,
                    display,
                    released: AtomicBool::new(false),
                })
            }
            Err(e) => {
                warn!("Failed to create virtual display: {}", e);
                None
            }
        }
    }

    pub fn release(handle: Option<&DisplayHandle>) {
        if let Some(handle) = handle {
            handle.release();
        }
    }
}
