//! Capture task: microphone driver -> record channel.

use std::sync::Arc;
use std::time::Duration;

use super::channel::BoundedByteChannel;
use super::driver::CaptureSource;
use super::state::{PipelineCounters, PipelineState};
use super::task::{Checkpoint, IdlePolicy, TaskGate};

pub struct CaptureTask<S> {
    source: S,
    channel: BoundedByteChannel,
    state: Arc<PipelineState>,
    gate: Arc<TaskGate>,
    counters: Arc<PipelineCounters>,
    block: Vec<u8>,
    push_timeout: Duration,
    idle: IdlePolicy,
}

impl<S: CaptureSource> CaptureTask<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        channel: BoundedByteChannel,
        state: Arc<PipelineState>,
        gate: Arc<TaskGate>,
        counters: Arc<PipelineCounters>,
        block_size: usize,
        push_timeout: Duration,
        idle: IdlePolicy,
    ) -> Self {
        Self {
            source,
            channel,
            state,
            gate,
            counters,
            block: vec![0u8; block_size],
            push_timeout,
            idle,
        }
    }

    pub fn run(mut self) {
        log::info!("Capture task ready: block={} bytes", self.block.len());
        loop {
            if self.gate.checkpoint(|| {}) == Checkpoint::Shutdown {
                break;
            }
            self.step();
            self.idle.pause();
        }
        log::info!("Capture task exiting");
    }

    /// One read from the driver and, if recording, one push into the channel.
    pub fn step(&mut self) {
        // Only unbounded wait in the pipeline: the driver delivers a DMA buffer
        // every period while the device is running.
        let read = match self.source.read(&mut self.block, None) {
            Ok(n) => n,
            Err(e) => {
                PipelineCounters::add(&self.counters.driver_errors, 1);
                log::warn!("Capture driver error: {}", e);
                return;
            }
        };
        if read == 0 {
            return;
        }

        // The read may finish after a stop request.
        if !self.state.is_recording() {
            log::debug!("Discarding {} bytes captured after stop", read);
            return;
        }

        PipelineCounters::add(&self.counters.bytes_captured, read);
        if !self.channel.push(&self.block[..read], self.push_timeout) {
            PipelineCounters::add(&self.counters.capture_blocks_dropped, 1);
            log::warn!("Record channel full, dropping {}-byte block", read);
        }
    }
}
