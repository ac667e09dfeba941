//! End-to-end pipeline scenarios over simulated drivers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use reception_audio::audio::{
    AudioHardware, CaptureSource, DriverError, EventNotifier, NoopNotifier, OverflowPolicy,
    PipelineConfig, PipelineController, PipelineError, PipelineEvent, PlaybackSink, TransportSink,
};

/// Microphone fed from a queue. An empty queue behaves like a quiet period.
struct QueueSource(Arc<Mutex<VecDeque<Vec<u8>>>>);

impl CaptureSource for QueueSource {
    fn read(&mut self, buf: &mut [u8], _timeout: Option<Duration>) -> Result<usize, DriverError> {
        let next = self.0.lock().pop_front();
        match next {
            Some(block) => {
                let n = block.len().min(buf.len());
                buf[..n].copy_from_slice(&block[..n]);
                Ok(n)
            }
            None => {
                thread::sleep(Duration::from_millis(5));
                Ok(0)
            }
        }
    }
}

#[derive(Default)]
struct Speaker {
    written: Vec<u8>,
    zeroed: usize,
    /// Time one write takes, to keep playback busy in tests.
    write_delay: Duration,
}

struct SpeakerSink(Arc<Mutex<Speaker>>);

impl PlaybackSink for SpeakerSink {
    fn write(&mut self, data: &[u8], _timeout: Option<Duration>) -> Result<usize, DriverError> {
        let delay = self.0.lock().write_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.0.lock().written.extend_from_slice(data);
        Ok(data.len())
    }

    fn zero_output_buffer(&mut self) -> Result<(), DriverError> {
        self.0.lock().zeroed += 1;
        Ok(())
    }
}

#[derive(Default)]
struct SimHardware {
    mic: Arc<Mutex<VecDeque<Vec<u8>>>>,
    speaker: Arc<Mutex<Speaker>>,
    fail_capture: bool,
}

impl AudioHardware for SimHardware {
    fn open_capture(&self, _config: &PipelineConfig) -> anyhow::Result<Box<dyn CaptureSource>> {
        if self.fail_capture {
            anyhow::bail!("no such device");
        }
        Ok(Box::new(QueueSource(self.mic.clone())))
    }

    fn open_playback(&self, _config: &PipelineConfig) -> anyhow::Result<Box<dyn PlaybackSink>> {
        Ok(Box::new(SpeakerSink(self.speaker.clone())))
    }
}

#[derive(Clone, Default)]
struct Network(Arc<Mutex<Vec<Bytes>>>);

impl TransportSink for Network {
    fn send(&mut self, frame: Bytes) {
        self.0.lock().push(frame);
    }
}

#[derive(Default)]
struct Events(Mutex<Vec<PipelineEvent>>);

impl EventNotifier for Events {
    fn notify(&self, event: PipelineEvent) {
        self.0.lock().push(event);
    }
}

impl Events {
    fn seen(&self) -> Vec<PipelineEvent> {
        self.0.lock().clone()
    }
}

struct Rig {
    controller: PipelineController,
    hardware: SimHardware,
    network: Network,
    events: Arc<Events>,
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        block_size: 2048,
        batch_timeout: Duration::from_secs(10),
        ..PipelineConfig::default()
    }
}

fn rig(config: PipelineConfig) -> Rig {
    let hardware = SimHardware::default();
    let network = Network::default();
    let events = Arc::new(Events::default());
    let mut controller = PipelineController::new(config, events.clone());
    controller
        .begin(&hardware, Box::new(network.clone()))
        .unwrap();
    Rig {
        controller,
        hardware,
        network,
        events,
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Record three 2000-byte blocks filled with 1, 2 and 3 and return what
/// reached the network.
fn record_three_blocks(rig: &Rig) -> Vec<Bytes> {
    rig.controller.start_recording().unwrap();
    {
        let mut mic = rig.hardware.mic.lock();
        for value in 1..=3u8 {
            mic.push_back(vec![value; 2000]);
        }
    }
    assert!(wait_until(Duration::from_secs(2), || rig
        .hardware
        .mic
        .lock()
        .is_empty()));
    rig.controller.stop_recording().unwrap();
    rig.network.0.lock().clone()
}

fn expected_payload() -> Vec<u8> {
    let mut payload = Vec::new();
    for value in 1..=3u8 {
        payload.extend(std::iter::repeat_n(value, 2000));
    }
    payload
}

#[test]
fn recording_round_trip_splits_at_batch_capacity() {
    let rig = rig(test_config());
    let frames = record_three_blocks(&rig);

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].len(), 4096 + 6);
    assert_eq!(frames[1].len(), 1904 + 6);
    for frame in &frames {
        assert_eq!(&frame[..6], b"AUDIO:");
    }

    let payload: Vec<u8> = frames.iter().flat_map(|f| f[6..].to_vec()).collect();
    assert_eq!(payload, expected_payload());

    let stats = rig.controller.stats();
    assert_eq!(stats.bytes_captured, 6000);
    assert_eq!(stats.bytes_sent, 6000);
    assert_eq!(stats.frames_sent, 2);
    assert_eq!(
        rig.events.seen(),
        vec![
            PipelineEvent::RecordingStarted,
            PipelineEvent::RecordingSent,
            PipelineEvent::RecordingStopped
        ]
    );
    assert!(!rig.controller.is_recording());
}

#[test]
fn recording_fits_in_one_frame_with_large_batch() {
    let rig = rig(PipelineConfig {
        batch_capacity: 8192,
        ..test_config()
    });
    let frames = record_three_blocks(&rig);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].len(), 6000 + 6);
    assert_eq!(&frames[0][6..], &expected_payload()[..]);
}

#[test]
fn second_recording_starts_with_an_empty_frame() {
    let rig = rig(test_config());
    record_three_blocks(&rig);
    rig.network.0.lock().clear();

    rig.controller.start_recording().unwrap();
    rig.hardware.mic.lock().push_back(vec![9u8; 100]);
    assert!(wait_until(Duration::from_secs(2), || rig
        .hardware
        .mic
        .lock()
        .is_empty()));
    rig.controller.stop_recording().unwrap();

    let frames = rig.network.0.lock().clone();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][..], &[b"AUDIO:".as_slice(), &[9u8; 100]].concat()[..]);
}

#[test]
fn nothing_is_sent_while_idle() {
    let rig = rig(PipelineConfig {
        batch_timeout: Duration::from_millis(20),
        ..test_config()
    });
    rig.hardware.mic.lock().push_back(vec![1u8; 500]);
    thread::sleep(Duration::from_millis(100));

    assert!(rig.network.0.lock().is_empty());
    assert_eq!(rig.controller.stats().bytes_captured, 0);
}

#[test]
fn playback_without_data_reports_no_audio() {
    let rig = rig(test_config());
    rig.controller.start_playback().unwrap();

    assert!(!rig.controller.is_playing());
    assert_eq!(rig.events.seen(), vec![PipelineEvent::NoAudioData]);
    thread::sleep(Duration::from_millis(50));
    assert!(rig.hardware.speaker.lock().written.is_empty());
}

#[test]
fn fed_audio_plays_in_order() {
    let rig = rig(test_config());
    assert!(rig.controller.feed_playback_data(&[1u8; 1000]));
    assert!(rig.controller.feed_playback_data(&[2u8; 1000]));
    rig.controller.start_playback().unwrap();
    assert!(rig.controller.is_playing());

    assert!(wait_until(Duration::from_secs(2), || rig
        .hardware
        .speaker
        .lock()
        .written
        .len()
        == 2000));
    let written = rig.hardware.speaker.lock().written.clone();
    assert!(written[..1000].iter().all(|&b| b == 1));
    assert!(written[1000..].iter().all(|&b| b == 2));

    rig.controller.stop_playback().unwrap();
    assert_eq!(
        rig.events.seen(),
        vec![PipelineEvent::PlaybackStarted, PipelineEvent::PlaybackStopped]
    );
    assert_eq!(rig.controller.stats().bytes_played, 2000);
}

#[test]
fn stop_playback_discards_queued_audio() {
    let rig = rig(test_config());
    for _ in 0..4 {
        assert!(rig.controller.feed_playback_data(&[7u8; 512]));
    }
    let play_channel = rig.controller.play_channel().unwrap();
    assert_eq!(play_channel.occupied(), 2048);

    rig.controller.stop_playback().unwrap();

    assert!(play_channel.is_empty());
    assert_eq!(play_channel.occupied(), 0);
    assert_eq!(rig.hardware.speaker.lock().zeroed, 1);
    assert!(rig.hardware.speaker.lock().written.is_empty());
    // Playback was never active, so there is nothing to announce.
    assert!(rig.events.seen().is_empty());
}

#[test]
fn stop_playback_while_playing_drains_channel() {
    let rig = rig(test_config());
    rig.hardware.speaker.lock().write_delay = Duration::from_millis(10);
    for _ in 0..20 {
        assert!(rig.controller.feed_playback_data(&[4u8; 2048]));
    }
    rig.controller.start_playback().unwrap();
    assert!(wait_until(Duration::from_secs(2), || !rig
        .hardware
        .speaker
        .lock()
        .written
        .is_empty()));

    rig.controller.stop_playback().unwrap();

    let play_channel = rig.controller.play_channel().unwrap();
    assert!(play_channel.pop(Duration::ZERO).is_none());
    assert_eq!(play_channel.occupied(), 0);
    assert!(!rig.controller.is_playing());
    assert_eq!(rig.hardware.speaker.lock().zeroed, 1);
    assert_eq!(
        rig.events.seen(),
        vec![PipelineEvent::PlaybackStarted, PipelineEvent::PlaybackStopped]
    );

    let played = rig.hardware.speaker.lock().written.len();
    assert!(played < 20 * 2048);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(rig.hardware.speaker.lock().written.len(), played);
}

#[test]
fn message_larger_than_play_channel_plays_in_full() {
    let config = PipelineConfig {
        channel_capacity: 4096,
        feed_timeout: Duration::from_secs(2),
        ..test_config()
    };
    let rig = rig(config);
    assert!(rig.controller.feed_playback_data(&[1u8; 100]));
    rig.controller.start_playback().unwrap();

    assert!(rig.controller.feed_playback_data(&vec![5u8; 4096 + 1]));

    assert!(wait_until(Duration::from_secs(2), || rig
        .hardware
        .speaker
        .lock()
        .written
        .len()
        == 100 + 4097));
    let written = rig.hardware.speaker.lock().written.clone();
    assert!(written[..100].iter().all(|&b| b == 1));
    assert!(written[100..].iter().all(|&b| b == 5));
    assert_eq!(rig.controller.stats().feed_blocks_dropped, 0);
}

#[test]
fn oversized_message_is_queued_in_blocks() {
    let rig = rig(PipelineConfig {
        channel_capacity: 4096,
        feed_timeout: Duration::from_millis(10),
        ..test_config()
    });
    // Nothing drains the channel, so only the tail block misses the deadline.
    assert!(!rig.controller.feed_playback_data(&vec![5u8; 4096 + 1]));

    let play_channel = rig.controller.play_channel().unwrap();
    assert_eq!(play_channel.queued(), 2);
    assert_eq!(play_channel.occupied(), 4096);
    assert_eq!(rig.controller.stats().feed_blocks_dropped, 1);
}

#[test]
fn evict_oldest_keeps_the_newest_audio() {
    let rig = rig(PipelineConfig {
        channel_capacity: 4096,
        feed_timeout: Duration::from_millis(10),
        overflow_policy: OverflowPolicy::EvictOldest,
        ..test_config()
    });
    for value in 1..=3u8 {
        assert!(rig.controller.feed_playback_data(&[value; 2048]));
    }
    rig.controller.start_playback().unwrap();

    assert!(wait_until(Duration::from_secs(2), || rig
        .hardware
        .speaker
        .lock()
        .written
        .len()
        == 4096));
    let written = rig.hardware.speaker.lock().written.clone();
    assert!(written[..2048].iter().all(|&b| b == 2));
    assert!(written[2048..].iter().all(|&b| b == 3));
    assert_eq!(rig.controller.stats().feed_blocks_dropped, 0);
}

#[test]
fn feed_drops_when_play_channel_is_full() {
    let rig = rig(PipelineConfig {
        channel_capacity: 4096,
        feed_timeout: Duration::from_millis(10),
        ..test_config()
    });
    assert!(rig.controller.feed_playback_data(&[0u8; 4096]));
    assert!(!rig.controller.feed_playback_data(&[0u8; 16]));
    assert_eq!(rig.controller.stats().feed_blocks_dropped, 1);
}

#[test]
fn failed_driver_leaves_pipeline_disabled() {
    let hardware = SimHardware {
        fail_capture: true,
        ..SimHardware::default()
    };
    let events = Arc::new(Events::default());
    let mut controller = PipelineController::new(test_config(), events.clone());

    let err = controller
        .begin(&hardware, Box::new(Network::default()))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Driver { device: "capture", .. }));
    assert!(!controller.is_started());

    assert!(matches!(
        controller.start_recording(),
        Err(PipelineError::NotStarted)
    ));
    assert!(matches!(
        controller.stop_playback(),
        Err(PipelineError::NotStarted)
    ));
    assert!(!controller.feed_playback_data(&[1, 2, 3]));
    assert!(events.seen().is_empty());
}

#[test]
fn invalid_config_is_rejected_at_begin() {
    let mut controller = PipelineController::new(
        PipelineConfig {
            batch_capacity: 0,
            ..test_config()
        },
        Arc::new(NoopNotifier),
    );
    let result = controller.begin(&SimHardware::default(), Box::new(Network::default()));
    assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
}
