use crate::zoom::Progress;
use std::fmt;
use std::time::{Duration, Instant};

/// Throughput and ETA over a stream of [`Progress`] events.
pub struct ProgressMeter {
    started: Instant,
    last: Instant,
    frames_seen: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressLine {
    pub frame_index: u32,
    pub total_frames: u32,
    /// Rate of the most recent frame.
    pub fps: f64,
    /// Mean rate since the meter started.
    pub avg_fps: f64,
    pub eta: Duration,
    pub width: f64,
}

impl ProgressMeter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            started: now,
            last: now,
            frames_seen: 0,
        }
    }

    pub fn observe(&mut self, progress: &Progress) -> ProgressLine {
        self.observe_at(progress, Instant::now())
    }

    pub fn observe_at(&mut self, progress: &Progress, now: Instant) -> ProgressLine {
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.frames_seen += 1;

        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let avg_fps = if elapsed > 0.0 {
            self.frames_seen as f64 / elapsed
        } else {
            0.0
        };
        let remaining = progress.total_frames.saturating_sub(progress.frame_index);
        let eta = if avg_fps > 0.0 {
            Duration::from_secs_f64(remaining as f64 / avg_fps)
        } else {
            Duration::ZERO
        };
        ProgressLine {
            frame_index: progress.frame_index,
            total_frames: progress.total_frames,
            fps: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            avg_fps,
            eta,
            width: progress.viewport.width,
        }
    }
}

impl Default for ProgressMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let eta = self.eta.as_secs();
        write!(
            f,
            "frame {:>5}/{:<5} {:>6.1} fps (avg {:.1})  eta {:02}:{:02}  width {:.3e}",
            self.frame_index,
            self.total_frames,
            self.fps,
            self.avg_fps,
            eta / 60,
            eta % 60,
            self.width
        )
    }
}
