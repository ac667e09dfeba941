//! The pipeline facade: owns both channels and the three task threads.
//!
//! Uses std::thread (NOT tokio tasks) for the real-time tasks so network
//! work on the async runtime can never delay a DMA read or write.
//!
//! - Capture path: driver → `CaptureTask` → record channel → `BatchAggregator` → transport
//! - Playback path: `feed_playback_data` → play channel → `PlaybackTask` → driver

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::batch::BatchAggregator;
use super::capture::CaptureTask;
use super::channel::{BoundedByteChannel, OverflowPolicy};
use super::driver::{AudioHardware, PlaybackSink};
use super::error::PipelineError;
use super::events::{EventNotifier, PipelineEvent};
use super::playback::PlaybackTask;
use super::state::{PipelineCounters, PipelineState, PipelineStats};
use super::task::{IdlePolicy, TaskGate};
use super::transport::TransportSink;

/// Pipeline configuration. Fixed for the lifetime of a controller.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    /// Bytes delivered by one driver read (one DMA transfer).
    pub block_size: usize,
    /// Capacity of each channel, in bytes.
    pub channel_capacity: usize,
    /// PCM payload bytes per outbound frame, excluding the tag.
    pub batch_capacity: usize,
    pub batch_timeout: Duration,
    /// How long capture waits for room in the record channel before dropping a block.
    pub push_timeout: Duration,
    pub pop_timeout: Duration,
    /// Yield between capture iterations, and between batch iterations while
    /// not recording.
    pub idle_delay: Duration,
    /// How long `stop_recording` waits for the last in-flight block.
    pub drain_delay: Duration,
    /// How long `feed_playback_data` may block the network receive path.
    pub feed_timeout: Duration,
    /// Upper bound on waiting for a task to park during a stop.
    pub stop_timeout: Duration,
    pub overflow_policy: OverflowPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            bits_per_sample: 16,
            channels: 1,
            block_size: 1024,
            channel_capacity: 64 * 1024,
            batch_capacity: 4096,
            batch_timeout: Duration::from_millis(100),
            push_timeout: Duration::from_millis(100),
            pop_timeout: Duration::from_millis(10),
            idle_delay: Duration::from_millis(10),
            drain_delay: Duration::from_millis(100),
            feed_timeout: Duration::from_millis(50),
            stop_timeout: Duration::from_millis(500),
            overflow_policy: OverflowPolicy::DropIncoming,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));
        if self.sample_rate == 0 || self.channels == 0 {
            return invalid("sample_rate and channels must be non-zero");
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return invalid("bits_per_sample must be 8, 16, 24 or 32");
        }
        if self.block_size == 0 || self.batch_capacity == 0 {
            return invalid("block_size and batch_capacity must be non-zero");
        }
        if self.channel_capacity < self.block_size {
            return invalid("channel_capacity must hold at least one block");
        }
        Ok(())
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Audio time covered by one block.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.bytes_per_second() as f64)
    }
}

struct Running {
    state: Arc<PipelineState>,
    counters: Arc<PipelineCounters>,
    record_channel: BoundedByteChannel,
    play_channel: BoundedByteChannel,
    capture_gate: Arc<TaskGate>,
    batch_gate: Arc<TaskGate>,
    playback_gate: Arc<TaskGate>,
    playback_sink: Arc<Mutex<Box<dyn PlaybackSink>>>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    /// `bytes_captured` when the current recording started.
    session_start: AtomicU64,
}

impl Running {
    fn shutdown(&mut self) {
        self.state.set_recording(false);
        self.state.set_playing(false);
        self.capture_gate.shutdown();
        self.batch_gate.shutdown();
        self.playback_gate.shutdown();
        for (name, handle) in self.handles.drain(..) {
            // The capture thread may sit in a driver read with no deadline.
            if name == CAPTURE_THREAD {
                continue;
            }
            if handle.join().is_err() {
                log::error!("{} thread panicked", name);
            }
        }
    }
}

const CAPTURE_THREAD: &str = "audio-capture";
const BATCH_THREAD: &str = "audio-batch";
const PLAYBACK_THREAD: &str = "audio-play";

/// Public entry point of the audio subsystem.
///
/// Constructed once at startup. Until [`begin`](Self::begin) succeeds every
/// operation is a logged no-op, so a failed audio init never takes the rest
/// of the device down.
pub struct PipelineController {
    config: PipelineConfig,
    notifier: Arc<dyn EventNotifier>,
    control: Mutex<()>,
    running: Option<Running>,
}

impl PipelineController {
    pub fn new(config: PipelineConfig, notifier: Arc<dyn EventNotifier>) -> Self {
        Self {
            config,
            notifier,
            control: Mutex::new(()),
            running: None,
        }
    }

    /// Allocate the channels, open both drivers and spawn the three tasks in
    /// the suspended state.
    ///
    /// On failure the pipeline stays disabled and the error is returned for
    /// the caller to report.
    pub fn begin(
        &mut self,
        hardware: &dyn AudioHardware,
        transport: Box<dyn TransportSink>,
    ) -> Result<(), PipelineError> {
        if self.running.is_some() {
            log::warn!("Audio pipeline already started");
            return Ok(());
        }
        match self.try_begin(hardware, transport) {
            Ok(running) => {
                self.running = Some(running);
                Ok(())
            }
            Err(e) => {
                log::error!("Audio pipeline disabled: {}", e);
                Err(e)
            }
        }
    }

    fn try_begin(
        &self,
        hardware: &dyn AudioHardware,
        transport: Box<dyn TransportSink>,
    ) -> Result<Running, PipelineError> {
        let config = &self.config;
        config.validate()?;

        let capture = hardware
            .open_capture(config)
            .map_err(|e| PipelineError::Driver {
                device: "capture",
                reason: format!("{:#}", e),
            })?;
        let playback = hardware
            .open_playback(config)
            .map_err(|e| PipelineError::Driver {
                device: "playback",
                reason: format!("{:#}", e),
            })?;

        let record_channel =
            BoundedByteChannel::with_policy(config.channel_capacity, config.overflow_policy);
        let play_channel =
            BoundedByteChannel::with_policy(config.channel_capacity, config.overflow_policy);

        let state = Arc::new(PipelineState::default());
        let counters = Arc::new(PipelineCounters::default());
        let capture_gate = Arc::new(TaskGate::new());
        let batch_gate = Arc::new(TaskGate::new());
        let playback_gate = Arc::new(TaskGate::new());
        let playback_sink: Arc<Mutex<Box<dyn PlaybackSink>>> = Arc::new(Mutex::new(playback));

        let mut running = Running {
            state: state.clone(),
            counters: counters.clone(),
            record_channel: record_channel.clone(),
            play_channel: play_channel.clone(),
            capture_gate: capture_gate.clone(),
            batch_gate: batch_gate.clone(),
            playback_gate: playback_gate.clone(),
            playback_sink: playback_sink.clone(),
            handles: Vec::with_capacity(3),
            session_start: AtomicU64::new(0),
        };

        let capture_task = CaptureTask::new(
            capture,
            record_channel.clone(),
            state.clone(),
            capture_gate,
            counters.clone(),
            config.block_size,
            config.push_timeout,
            IdlePolicy::new(config.idle_delay),
        );
        let batch_task = BatchAggregator::new(
            record_channel,
            transport,
            config.batch_capacity,
            config.batch_timeout,
            config.pop_timeout,
            IdlePolicy::new(config.idle_delay),
            state.clone(),
            batch_gate,
            counters.clone(),
        );
        let playback_task = PlaybackTask::new(
            playback_sink,
            play_channel,
            state,
            playback_gate,
            counters,
            config.pop_timeout,
        );

        let spawned = spawn_task(&mut running, CAPTURE_THREAD, move || capture_task.run())
            .and_then(|_| spawn_task(&mut running, BATCH_THREAD, move || batch_task.run()))
            .and_then(|_| spawn_task(&mut running, PLAYBACK_THREAD, move || playback_task.run()));
        if let Err(e) = spawned {
            running.shutdown();
            return Err(e);
        }

        log::info!(
            "Audio pipeline ready: rate={}Hz, bits={}, ch={}, block={} bytes ({:?}), channel={} bytes, batch={} bytes/{:?}",
            config.sample_rate,
            config.bits_per_sample,
            config.channels,
            config.block_size,
            config.block_duration(),
            config.channel_capacity,
            config.batch_capacity,
            config.batch_timeout,
        );
        Ok(running)
    }

    pub fn start_recording(&self) -> Result<(), PipelineError> {
        let running = self.running()?;
        let _control = self.control.lock();
        if running.state.is_recording() {
            log::debug!("Recording already active");
            return Ok(());
        }

        let stale = running.record_channel.drain();
        if stale > 0 {
            log::debug!("Discarded {} stale bytes from record channel", stale);
        }
        running.session_start.store(
            running.counters.snapshot().bytes_captured,
            Ordering::Relaxed,
        );
        running.state.set_recording(true);
        running.batch_gate.resume();
        running.capture_gate.resume();

        log::info!("Recording started");
        self.notifier.notify(PipelineEvent::RecordingStarted);
        Ok(())
    }

    /// Stop capturing. The blocks already read are still batched and sent,
    /// including a final partial frame, after which
    /// [`PipelineEvent::RecordingSent`] is emitted.
    pub fn stop_recording(&self) -> Result<(), PipelineError> {
        let running = self.running()?;
        let _control = self.control.lock();
        if !running.state.is_recording() {
            log::debug!("Recording not active");
            return Ok(());
        }

        running.capture_gate.suspend();
        if !running.capture_gate.wait_parked(self.config.drain_delay) {
            log::debug!("Capture still inside a driver read; its block will be discarded");
        }

        running.batch_gate.suspend();
        let sent = running.batch_gate.wait_parked(self.config.stop_timeout);
        if !sent {
            log::warn!(
                "Batch task did not park within {:?}",
                self.config.stop_timeout
            );
        }
        running.state.set_recording(false);
        if sent {
            self.notifier.notify(PipelineEvent::RecordingSent);
        }

        let recorded = running
            .counters
            .snapshot()
            .bytes_captured
            .saturating_sub(running.session_start.load(Ordering::Relaxed));
        log::info!("Recording stopped. Recorded {} bytes", recorded);
        self.notifier.notify(PipelineEvent::RecordingStopped);
        Ok(())
    }

    /// Start playing what has been fed so far. With nothing queued, playback
    /// stays off and a [`PipelineEvent::NoAudioData`] advisory is emitted.
    pub fn start_playback(&self) -> Result<(), PipelineError> {
        let running = self.running()?;
        let _control = self.control.lock();
        if running.state.is_playing() {
            log::debug!("Playback already active");
            return Ok(());
        }
        if running.play_channel.is_empty() {
            log::warn!("Playback not started. No audio data available.");
            self.notifier.notify(PipelineEvent::NoAudioData);
            return Ok(());
        }

        running.state.set_playing(true);
        running.playback_gate.resume();

        log::info!(
            "Playback started with {} bytes queued",
            running.play_channel.occupied()
        );
        self.notifier.notify(PipelineEvent::PlaybackStarted);
        Ok(())
    }

    /// Stop playback, clear the hardware output buffer and discard every
    /// block still waiting in the play channel.
    pub fn stop_playback(&self) -> Result<(), PipelineError> {
        let running = self.running()?;
        let _control = self.control.lock();
        let was_playing = running.state.is_playing();

        running.state.set_playing(false);
        running.playback_gate.suspend();
        if was_playing && !running.playback_gate.wait_parked(self.config.stop_timeout) {
            log::warn!(
                "Playback task did not park within {:?}",
                self.config.stop_timeout
            );
        }

        if let Err(e) = running.playback_sink.lock().zero_output_buffer() {
            PipelineCounters::add(&running.counters.driver_errors, 1);
            log::warn!("Failed to clear playback buffer: {}", e);
        }
        let discarded = running.play_channel.drain();

        log::info!("Playback stopped, discarded {} queued bytes", discarded);
        if was_playing {
            self.notifier.notify(PipelineEvent::PlaybackStopped);
        }
        Ok(())
    }

    /// Queue audio received from the network for playback.
    ///
    /// The message is queued in blocks of at most `block_size` bytes, so a
    /// message larger than the play channel still plays as the channel
    /// drains. All blocks together wait at most `feed_timeout` for room; a
    /// block that does not fit in time is dropped and `false` is returned so
    /// the receive path never stalls.
    pub fn feed_playback_data(&self, data: &[u8]) -> bool {
        let Some(running) = self.running.as_ref() else {
            log::warn!("Dropping {} bytes of playback data: pipeline not started", data.len());
            return false;
        };
        if data.len() > self.config.block_size {
            log::debug!(
                "Oversized playback message: {} bytes, queueing in {}-byte blocks",
                data.len(),
                self.config.block_size
            );
        }

        let deadline = Instant::now() + self.config.feed_timeout;
        let mut dropped = 0usize;
        for block in data.chunks(self.config.block_size) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !running.play_channel.push(block, remaining) {
                PipelineCounters::add(&running.counters.feed_blocks_dropped, 1);
                dropped += block.len();
            }
        }
        if dropped > 0 {
            log::warn!(
                "Play channel full, dropped {} of {} bytes",
                dropped,
                data.len()
            );
        }
        dropped == 0
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.state.is_recording())
    }

    pub fn is_playing(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.state.is_playing())
    }

    pub fn stats(&self) -> PipelineStats {
        self.running
            .as_ref()
            .map(|running| running.counters.snapshot())
            .unwrap_or_default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The play channel, for inspection. Writes must go through
    /// [`feed_playback_data`](Self::feed_playback_data).
    pub fn play_channel(&self) -> Option<&BoundedByteChannel> {
        self.running.as_ref().map(|running| &running.play_channel)
    }

    /// Stop both directions and release the task threads.
    pub fn shutdown(&mut self) {
        if let Some(mut running) = self.running.take() {
            log::info!("Audio pipeline shutting down");
            running.shutdown();
        }
    }

    fn running(&self) -> Result<&Running, PipelineError> {
        self.running.as_ref().ok_or_else(|| {
            log::warn!("Audio pipeline not started");
            PipelineError::NotStarted
        })
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_task(
    running: &mut Running,
    name: &'static str,
    body: impl FnOnce() + Send + 'static,
) -> Result<(), PipelineError> {
    let handle = thread::Builder::new()
        .name(name.into())
        .spawn(body)
        .map_err(|source| PipelineError::Spawn { task: name, source })?;
    running.handles.push((name, handle));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bytes_per_second(), 96_000);
    }

    #[test]
    fn rejects_channel_smaller_than_block() {
        let config = PipelineConfig {
            block_size: 2048,
            channel_capacity: 1024,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_odd_sample_width() {
        let config = PipelineConfig {
            bits_per_sample: 12,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
