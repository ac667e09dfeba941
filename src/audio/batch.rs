//! Batch aggregator: record channel -> tagged network frames.
//!
//! Hardware blocks are small and arrive at the capture cadence; the network
//! prefers fewer, larger sends. Blocks are accumulated into a [`BatchFrame`]
//! and flushed when it fills up or when `batch_timeout` has passed since the
//! last flush, whichever comes first. The timeout keeps latency bounded on
//! quiet input that would otherwise take a long time to fill a frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use super::channel::BoundedByteChannel;
use super::state::{PipelineCounters, PipelineState};
use super::task::{Checkpoint, IdlePolicy, TaskGate};
use super::transport::{FRAME_TAG, TransportSink};

/// Accumulator for one outbound frame: the tag followed by up to
/// `capacity` payload bytes.
pub struct BatchFrame {
    buf: BytesMut,
    capacity: usize,
    last_flush: Instant,
}

impl BatchFrame {
    pub fn new(capacity: usize, now: Instant) -> Self {
        let mut buf = BytesMut::with_capacity(FRAME_TAG.len() + capacity);
        buf.extend_from_slice(FRAME_TAG);
        Self {
            buf,
            capacity,
            last_flush: now,
        }
    }

    /// Payload bytes accumulated, excluding the tag.
    pub fn len(&self) -> usize {
        self.buf.len() - FRAME_TAG.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.len()
    }

    /// Copy as much of `data` as fits. Returns the number of bytes taken.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        self.buf.extend_from_slice(&data[..n]);
        n
    }

    pub fn since_flush(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_flush)
    }

    /// Hand out the tagged frame and start a fresh one.
    pub fn take(&mut self, now: Instant) -> Bytes {
        let frame = self.buf.split().freeze();
        self.buf.reserve(FRAME_TAG.len() + self.capacity);
        self.buf.extend_from_slice(FRAME_TAG);
        self.last_flush = now;
        frame
    }

    /// Discard the payload without sending it.
    pub fn reset(&mut self, now: Instant) {
        self.buf.truncate(FRAME_TAG.len());
        self.last_flush = now;
    }
}

pub struct BatchAggregator<T> {
    channel: BoundedByteChannel,
    transport: T,
    frame: BatchFrame,
    batch_timeout: Duration,
    pop_timeout: Duration,
    idle: IdlePolicy,
    state: Arc<PipelineState>,
    gate: Arc<TaskGate>,
    counters: Arc<PipelineCounters>,
}

impl<T: TransportSink> BatchAggregator<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel: BoundedByteChannel,
        transport: T,
        batch_capacity: usize,
        batch_timeout: Duration,
        pop_timeout: Duration,
        idle: IdlePolicy,
        state: Arc<PipelineState>,
        gate: Arc<TaskGate>,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            channel,
            transport,
            frame: BatchFrame::new(batch_capacity, Instant::now()),
            batch_timeout,
            pop_timeout,
            idle,
            state,
            gate,
            counters,
        }
    }

    pub fn run(mut self) {
        log::info!(
            "Batch task ready: capacity={} bytes, timeout={:?}",
            self.frame.capacity,
            self.batch_timeout
        );
        let gate = Arc::clone(&self.gate);
        loop {
            match gate.checkpoint(|| self.flush_tail()) {
                Checkpoint::Shutdown => break,
                Checkpoint::Resumed => self.frame.reset(Instant::now()),
                Checkpoint::Continue => {}
            }
            let recording = self.state.is_recording();
            self.step(recording);
        }
        log::info!("Batch task exiting");
    }

    /// One iteration of the aggregation loop.
    ///
    /// While not recording the accumulator is reset every iteration,
    /// nothing is sent, and the task yields for the idle delay.
    pub fn step(&mut self, recording: bool) {
        if !recording {
            self.frame.reset(Instant::now());
            self.idle.pause();
            return;
        }

        if let Some(item) = self.channel.pop(self.pop_timeout) {
            self.absorb(&item);
            item.release();
        }

        let now = Instant::now();
        if self.frame.since_flush(now) >= self.batch_timeout {
            if self.frame.is_empty() {
                self.frame.reset(now);
            } else {
                self.flush(now);
            }
        }
    }

    /// Drain whatever is still queued and send the partial frame, then
    /// leave the accumulator empty. Runs when the task is about to park.
    pub fn flush_tail(&mut self) {
        while let Some(item) = self.channel.pop(Duration::ZERO) {
            self.absorb(&item);
            item.release();
        }
        let now = Instant::now();
        if !self.frame.is_empty() {
            log::debug!("Flushing {}-byte recording tail", self.frame.len());
            self.flush(now);
        }
        self.frame.reset(now);
    }

    pub fn pending(&self) -> usize {
        self.frame.len()
    }

    /// Append a block, flushing each time the frame fills up so a block
    /// larger than the free space spills into the next frame.
    fn absorb(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let taken = self.frame.append(data);
            data = &data[taken..];
            if self.frame.is_full() {
                self.flush(Instant::now());
            }
        }
    }

    fn flush(&mut self, now: Instant) {
        let payload = self.frame.len();
        let frame = self.frame.take(now);
        log::debug!("Sending audio frame: {} bytes", frame.len());
        self.transport.send(frame);
        PipelineCounters::add(&self.counters.frames_sent, 1);
        PipelineCounters::add(&self.counters.bytes_sent, payload);
    }
}
