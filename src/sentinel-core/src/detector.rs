//! Main detection loop

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info};

use sentinel_capture::{Display, Frame, FrameSource};
use sentinel_delivery::ShutdownReport;
use sentinel_processing::{annotated, Analysis, MotionAnalyzer};

use crate::dispatcher::{DetectionEvent, EventDispatcher};
use crate::lifecycle::{Lifecycle, StopReason};

const STATS_INTERVAL: u64 = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u64,
    pub events: u64,
    pub snapshots: u64,
    pub resets: u64,
}

/// Pulls frames, classifies them and hands detections to the dispatcher
///
/// Everything runs on the calling thread. The loop checks the lifecycle
/// before every read, so a stop request never costs another frame.
pub struct Detector {
    source: Box<dyn FrameSource>,
    display: Option<Box<dyn Display>>,
    analyzer: MotionAnalyzer,
    dispatcher: EventDispatcher,
    lifecycle: Lifecycle,
    stats: RunStats,
}

impl Detector {
    pub fn new(
        source: Box<dyn FrameSource>,
        display: Option<Box<dyn Display>>,
        analyzer: MotionAnalyzer,
        dispatcher: EventDispatcher,
        lifecycle: Lifecycle,
    ) -> Self {
        Self {
            source,
            display,
            analyzer,
            dispatcher,
            lifecycle,
            stats: RunStats::default(),
        }
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Run until stopped, end of stream or a fatal error
    pub fn run(&mut self) -> Result<RunStats> {
        info!(
            "starting detection on {} ({})",
            self.source.describe(),
            if self.display.is_some() { "interactive" } else { "headless" }
        );

        while self.lifecycle.is_running() {
            let frame = match self.source.read().context("failed to read frame")? {
                Some(frame) => frame,
                None => {
                    self.lifecycle.request_stop(StopReason::EndOfStream);
                    break;
                }
            };

            self.process(frame)?;

            if self.stats.frames % STATS_INTERVAL == 0 {
                debug!(
                    "{} frames processed, {} motion events, {} jobs queued",
                    self.stats.frames,
                    self.stats.events,
                    self.dispatcher.pool().queued()
                );
            }
        }

        Ok(self.stats)
    }

    fn process(&mut self, frame: Frame) -> Result<()> {
        let Frame {
            image,
            index,
            timestamp,
        } = frame;
        self.stats.frames += 1;

        let analysis = self
            .analyzer
            .analyze(&image)
            .with_context(|| format!("failed to analyze frame {}", index))?;

        let shown = match &analysis {
            Analysis::ReferenceUpdated => {
                info!("reference frame updated at frame {}", index);
                image
            }
            Analysis::Compared(c) if c.motion => {
                self.stats.events += 1;
                let event = DetectionEvent {
                    image: annotated(&image, &c.boxes),
                    timestamp,
                    boxes: c.boxes.clone(),
                };
                self.dispatcher.dispatch(&event);
                event.image
            }
            Analysis::Compared(_) => image,
        };

        if let Some(display) = self.display.as_mut() {
            display.show(&shown);
            while let Some(key) = display.poll_key() {
                self.lifecycle.apply_key(key);
            }
        }

        let commands = self.lifecycle.drain();
        if commands.save_snapshot && self.dispatcher.save_snapshot(&shown, timestamp).is_some() {
            self.stats.snapshots += 1;
        }
        if commands.reset_reference {
            self.analyzer.reset_reference();
            self.stats.resets += 1;
            info!("reference frame reset requested");
        }

        Ok(())
    }

    /// Release the source and let in-flight jobs finish within `grace`
    pub fn finish(mut self, grace: Duration) -> ShutdownReport {
        self.source.close();
        drop(self.display.take());

        let report = self.dispatcher.shutdown(grace);
        info!(
            "detector stopped after {} frames, {} motion events",
            self.stats.frames, self.stats.events
        );
        report
    }
}
