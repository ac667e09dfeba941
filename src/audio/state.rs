//! Lifecycle flags and counters shared between the controller and the tasks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

/// `recording` and `playing` are independent; both may be set at once.
#[derive(Debug, Default)]
pub struct PipelineState {
    recording: AtomicBool,
    playing: AtomicBool,
}

impl PipelineState {
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub bytes_captured: AtomicU64,
    pub capture_blocks_dropped: AtomicU64,
    pub frames_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_played: AtomicU64,
    pub feed_blocks_dropped: AtomicU64,
    pub driver_errors: AtomicU64,
}

impl PipelineCounters {
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            bytes_captured: self.bytes_captured.load(Ordering::Relaxed),
            capture_blocks_dropped: self.capture_blocks_dropped.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_played: self.bytes_played.load(Ordering::Relaxed),
            feed_blocks_dropped: self.feed_blocks_dropped.load(Ordering::Relaxed),
            driver_errors: self.driver_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the pipeline counters.
///
/// `bytes_sent` counts PCM payload only, not the frame tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub bytes_captured: u64,
    pub capture_blocks_dropped: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub bytes_played: u64,
    pub feed_blocks_dropped: u64,
    pub driver_errors: u64,
}
