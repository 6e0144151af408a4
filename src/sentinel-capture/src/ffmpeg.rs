//! Video decoding through an FFmpeg rawvideo pipe
//!
//! FFmpeg decodes the input (file, network stream or V4L2 camera) and writes
//! packed RGB24 frames to stdout. Frame dimensions are read up front with
//! ffprobe so each frame can be read with a fixed-size read.

use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::frame::Frame;
use crate::source::FrameSource;

/// How an input identifier is handed to FFmpeg
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// Local camera index, opened as /dev/video<N>
    Camera(u32),
    /// rtsp://, rtsps://, http(s):// and similar
    Stream(String),
    /// Anything else is treated as a file path
    File(String),
}

impl InputKind {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = input.parse() {
                return InputKind::Camera(index);
            }
        }
        if input.contains("://") {
            InputKind::Stream(input.to_string())
        } else {
            InputKind::File(input.to_string())
        }
    }

    /// Input arguments shared by ffprobe and ffmpeg
    fn input_args(&self) -> Vec<String> {
        match self {
            InputKind::Camera(index) => vec![
                "-f".into(),
                "v4l2".into(),
                "-i".into(),
                format!("/dev/video{}", index),
            ],
            InputKind::Stream(url) if url.starts_with("rtsp") => vec![
                "-rtsp_transport".into(),
                "tcp".into(),
                "-i".into(),
                url.clone(),
            ],
            InputKind::Stream(url) => vec!["-i".into(), url.clone()],
            InputKind::File(path) => vec!["-i".into(), path.clone()],
        }
    }
}

/// Frame source backed by an FFmpeg child process
pub struct FfmpegSource {
    input: String,
    width: u32,
    height: u32,
    process: Option<Child>,
    stdout: Option<ChildStdout>,
    frame_index: u64,
}

impl FfmpegSource {
    /// Probe the input and start decoding
    pub fn open(input: &str) -> Result<Self, CaptureError> {
        if !check_ffmpeg() {
            return Err(CaptureError::SourceUnavailable(
                "ffmpeg not found in PATH".to_string(),
            ));
        }

        let kind = InputKind::parse(input);
        let (width, height) = probe_dimensions(&kind)?;
        info!("video source {} is {}x{}", input, width, height);

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner")
            .arg("-loglevel").arg("error")
            .arg("-nostdin")
            .args(kind.input_args())
            .arg("-an")
            .arg("-f").arg("rawvideo")
            .arg("-pix_fmt").arg("rgb24")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        debug!("spawning ffmpeg decoder: {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| CaptureError::SourceUnavailable(format!("failed to spawn ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::SourceUnavailable("failed to open ffmpeg stdout".to_string()))?;

        Ok(Self {
            input: input.to_string(),
            width,
            height,
            process: Some(child),
            stdout: Some(stdout),
            frame_index: 0,
        })
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl FrameSource for FfmpegSource {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let frame_size = self.frame_size();
        let stdout = match self.stdout.as_mut() {
            Some(s) => s,
            None => return Ok(None),
        };

        let mut data = vec![0u8; frame_size];
        let mut filled = 0;
        while filled < frame_size {
            match stdout.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CaptureError::Read(e.to_string())),
            }
        }

        if filled == 0 {
            debug!("ffmpeg stream ended after {} frames", self.frame_index);
            return Ok(None);
        }
        if filled < frame_size {
            warn!(
                "discarding truncated final frame ({} of {} bytes)",
                filled, frame_size
            );
            return Ok(None);
        }

        let frame = Frame::from_rgb24(data, self.width, self.height, self.frame_index)?;
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.stdout.take();
        if let Some(mut child) = self.process.take() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("ffmpeg decoder for {} stopped", self.input);
        }
    }

    fn describe(&self) -> &str {
        &self.input
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read the first video stream's dimensions with ffprobe
fn probe_dimensions(kind: &InputKind) -> Result<(u32, u32), CaptureError> {
    let mut cmd = Command::new("ffprobe");
    cmd.arg("-v").arg("error")
        .arg("-select_streams").arg("v:0")
        .arg("-show_entries").arg("stream=width,height")
        .arg("-of").arg("csv=s=x:p=0");
    // ffprobe takes the input as a bare trailing argument
    let mut args = kind.input_args();
    if let Some(pos) = args.iter().position(|a| a == "-i") {
        args.remove(pos);
    }
    cmd.args(args);

    let output = cmd
        .output()
        .map_err(|e| CaptureError::SourceUnavailable(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CaptureError::SourceUnavailable(format!(
            "ffprobe failed: {}",
            stderr.chars().take(500).collect::<String>().trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_dimensions(&stdout).ok_or_else(|| {
        CaptureError::SourceUnavailable(format!("no video stream found ({})", stdout.trim()))
    })
}

/// Parse ffprobe's `WIDTHxHEIGHT` output
pub fn parse_dimensions(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (w, h) = line.split_once('x')?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().trim_end_matches('x').parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Check if FFmpeg is available
pub fn check_ffmpeg() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
