//! Run state and operator commands
//!
//! The stop flag is monotone: once set it is never cleared. Command flags are
//! set from any thread and drained by the detection loop once per iteration.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sentinel_capture::Key;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal,
    QuitKey,
    EndOfStream,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Signal => write!(f, "signal"),
            StopReason::QuitKey => write!(f, "quit key"),
            StopReason::EndOfStream => write!(f, "end of stream"),
        }
    }
}

/// Commands collected since the previous iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCommands {
    pub save_snapshot: bool,
    pub reset_reference: bool,
}

/// Shared handle over the run and command flags
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    stop: Arc<AtomicBool>,
    save_snapshot: Arc<AtomicBool>,
    reset_reference: Arc<AtomicBool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        if self.stop.load(Ordering::SeqCst) {
            RunState::Stopping
        } else {
            RunState::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    pub fn request_stop(&self, reason: StopReason) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            info!("stopping: {}", reason);
        }
    }

    pub fn request_snapshot(&self) {
        self.save_snapshot.store(true, Ordering::SeqCst);
    }

    pub fn request_reset(&self) {
        self.reset_reference.store(true, Ordering::SeqCst);
    }

    /// Map a hotkey onto a command
    pub fn apply_key(&self, key: Key) {
        match key {
            Key::Quit => self.request_stop(StopReason::QuitKey),
            Key::Snapshot => self.request_snapshot(),
            Key::ResetReference => self.request_reset(),
            Key::Other(c) => debug!("ignoring key {:?}", c),
        }
    }

    /// Read and clear the command flags
    pub fn drain(&self) -> PendingCommands {
        PendingCommands {
            save_snapshot: self.save_snapshot.swap(false, Ordering::SeqCst),
            reset_reference: self.reset_reference.swap(false, Ordering::SeqCst),
        }
    }

    /// Route SIGINT, SIGTERM and SIGHUP to a graceful stop
    ///
    /// Can only be installed once per process.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let stop = Arc::clone(&self.stop);
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            stop.store(true, Ordering::SeqCst);
        })
    }
}
