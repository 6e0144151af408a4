//! Display surface and hotkey input

use crossbeam_channel::{Receiver, TryRecvError};
use image::RgbImage;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Hotkeys understood by the detection loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Quit,
    Snapshot,
    ResetReference,
    Other(char),
}

impl Key {
    pub fn from_char(c: char) -> Self {
        match c {
            'q' | 'Q' | '\x1b' => Key::Quit,
            's' | 'S' => Key::Snapshot,
            'r' | 'R' => Key::ResetReference,
            other => Key::Other(other),
        }
    }
}

/// An on-screen (or stand-in) surface polled once per loop iteration
pub trait Display {
    fn show(&mut self, image: &RgbImage);
    fn poll_key(&mut self) -> Option<Key>;
}

const PREVIEW_INTERVAL: Duration = Duration::from_secs(1);

/// Terminal display: hotkeys typed on stdin, optional JPEG preview on disk
pub struct ConsoleDisplay {
    keys: Receiver<Key>,
    preview_path: Option<PathBuf>,
    last_preview: Option<Instant>,
    frames_shown: u64,
}

impl ConsoleDisplay {
    /// Start reading hotkeys from stdin
    ///
    /// The reader thread is detached. It ends when stdin closes or the
    /// display is dropped and the next key fails to send.
    pub fn new(preview_path: Option<PathBuf>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();

        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        debug!("stdin closed: {}", e);
                        break;
                    }
                };
                for c in line.chars().filter(|c| !c.is_whitespace()) {
                    if tx.send(Key::from_char(c)).is_err() {
                        return;
                    }
                }
            }
        });

        Self::with_receiver(rx, preview_path)
    }

    /// Build a display fed by an existing key channel
    pub fn with_receiver(keys: Receiver<Key>, preview_path: Option<PathBuf>) -> Self {
        Self {
            keys,
            preview_path,
            last_preview: None,
            frames_shown: 0,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl Display for ConsoleDisplay {
    fn show(&mut self, image: &RgbImage) {
        self.frames_shown += 1;

        let path = match &self.preview_path {
            Some(p) => p,
            None => return,
        };
        let due = self
            .last_preview
            .map_or(true, |t| t.elapsed() >= PREVIEW_INTERVAL);
        if !due {
            return;
        }

        if let Err(e) = image.save(path) {
            warn!("failed to write preview {:?}: {}", path, e);
        }
        self.last_preview = Some(Instant::now());
    }

    fn poll_key(&mut self) -> Option<Key> {
        match self.keys.try_recv() {
            Ok(key) => Some(key),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
