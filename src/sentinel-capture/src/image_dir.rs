//! Replay of a directory of still images as a video source

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::CaptureError;
use crate::frame::Frame;
use crate::source::FrameSource;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "ppm", "pgm", "tif", "tiff"];

/// Frame source yielding the images of a directory in file-name order
pub struct ImageDirSource {
    label: String,
    pending: VecDeque<PathBuf>,
    frame_index: u64,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| {
            CaptureError::SourceUnavailable(format!("cannot read {:?}: {}", dir, e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::SourceUnavailable(format!(
                "no images found in {:?}",
                dir
            )));
        }

        info!("found {} image(s) in {:?}", files.len(), dir);

        Ok(Self {
            label: dir.display().to_string(),
            pending: files.into(),
            frame_index: 0,
        })
    }

    /// Number of frames not yet read
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for ImageDirSource {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let path = match self.pending.pop_front() {
            Some(p) => p,
            None => return Ok(None),
        };

        debug!("loading frame {:?}", path);
        let image = image::open(&path)?.to_rgb8();
        let frame = Frame::new(image, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.pending.clear();
    }

    fn describe(&self) -> &str {
        &self.label
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
