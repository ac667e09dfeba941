//! Playback task: play channel -> speaker driver.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::channel::BoundedByteChannel;
use super::driver::PlaybackSink;
use super::state::{PipelineCounters, PipelineState};
use super::task::{Checkpoint, TaskGate};

pub struct PlaybackTask<P> {
    sink: Arc<Mutex<P>>,
    channel: BoundedByteChannel,
    state: Arc<PipelineState>,
    gate: Arc<TaskGate>,
    counters: Arc<PipelineCounters>,
    pop_timeout: Duration,
}

impl<P: PlaybackSink> PlaybackTask<P> {
    pub fn new(
        sink: Arc<Mutex<P>>,
        channel: BoundedByteChannel,
        state: Arc<PipelineState>,
        gate: Arc<TaskGate>,
        counters: Arc<PipelineCounters>,
        pop_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            channel,
            state,
            gate,
            counters,
            pop_timeout,
        }
    }

    pub fn run(self) {
        log::info!("Playback task ready");
        loop {
            if self.gate.checkpoint(|| {}) == Checkpoint::Shutdown {
                break;
            }
            self.step();
        }
        log::info!("Playback task exiting");
    }

    /// Play one block if one arrives within the pop timeout. An empty
    /// channel just means silence.
    pub fn step(&self) {
        let Some(item) = self.channel.pop(self.pop_timeout) else {
            return;
        };
        if !self.state.is_playing() {
            log::debug!("Discarding {}-byte block popped after stop", item.len());
            return;
        }

        let result = self.sink.lock().write(&item, None);
        match result {
            Ok(written) => {
                PipelineCounters::add(&self.counters.bytes_played, written);
                if written < item.len() {
                    log::warn!(
                        "Short playback write: {} of {} bytes",
                        written,
                        item.len()
                    );
                }
            }
            Err(e) => {
                PipelineCounters::add(&self.counters.driver_errors, 1);
                log::warn!("Playback driver error: {}", e);
            }
        }
        item.release();
    }
}
