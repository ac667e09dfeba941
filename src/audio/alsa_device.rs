//! ALSA PCM device wrappers for audio capture and playback.

use std::time::Duration;

use alsa::pcm::{Access, Format, Frames, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

use super::driver::{AudioHardware, CaptureSource, PlaybackSink};
use super::error::DriverError;
use super::pipeline::PipelineConfig;

/// Opens ALSA devices by name for the pipeline.
#[derive(Debug, Clone)]
pub struct AlsaHardware {
    /// ALSA capture device name (e.g. "default", "plughw:0,0")
    pub capture_device: String,
    /// ALSA playback device name
    pub playback_device: String,
}

impl AudioHardware for AlsaHardware {
    fn open_capture(&self, config: &PipelineConfig) -> Result<Box<dyn CaptureSource>> {
        let period = period_frames(config);
        let pcm = open_pcm(&self.capture_device, Direction::Capture, config, period)?;
        Ok(Box::new(AlsaCapture { pcm }))
    }

    fn open_playback(&self, config: &PipelineConfig) -> Result<Box<dyn PlaybackSink>> {
        let period = period_frames(config);
        let pcm = open_pcm(&self.playback_device, Direction::Playback, config, period)?;
        Ok(Box::new(AlsaPlayback { pcm }))
    }
}

struct AlsaCapture {
    pcm: PCM,
}

impl CaptureSource for AlsaCapture {
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, DriverError> {
        if !wait_ready(&self.pcm, timeout)? {
            return Ok(0);
        }
        let io = self.pcm.io_bytes();
        match io.readi(buf) {
            Ok(frames) => Ok(self.pcm.frames_to_bytes(frames as Frames) as usize),
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                recover(&self.pcm, "capture");
                Err(DriverError::new(e.errno()))
            }
        }
    }
}

struct AlsaPlayback {
    pcm: PCM,
}

impl PlaybackSink for AlsaPlayback {
    fn write(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, DriverError> {
        if !wait_ready(&self.pcm, timeout)? {
            return Ok(0);
        }
        let io = self.pcm.io_bytes();
        match io.writei(data) {
            Ok(frames) => Ok(self.pcm.frames_to_bytes(frames as Frames) as usize),
            Err(e) => {
                log::warn!("ALSA XRUN or error: {}, recovering...", e);
                recover(&self.pcm, "playback");
                Err(DriverError::new(e.errno()))
            }
        }
    }

    fn zero_output_buffer(&mut self) -> Result<(), DriverError> {
        // Drop discards pending frames; prepare makes the device writable again.
        self.pcm
            .drop()
            .and_then(|_| self.pcm.prepare())
            .map_err(|e| DriverError::new(e.errno()))
    }
}

/// `None` means block until the device is ready.
fn wait_ready(pcm: &PCM, timeout: Option<Duration>) -> Result<bool, DriverError> {
    let Some(timeout) = timeout else {
        return Ok(true);
    };
    let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
    pcm.wait(Some(ms)).map_err(|e| DriverError::new(e.errno()))
}

fn recover(pcm: &PCM, dir_name: &str) {
    if let Err(e) = pcm.prepare() {
        log::error!("Failed to recover PCM {}: {}", dir_name, e);
    }
}

/// Ask ALSA for a period that matches one pipeline block.
fn period_frames(config: &PipelineConfig) -> usize {
    let frame_bytes = config.channels as usize * (config.bits_per_sample as usize / 8);
    (config.block_size / frame_bytes.max(1)).max(1)
}

fn sample_format(bits_per_sample: u16) -> Result<Format> {
    match bits_per_sample {
        8 => Ok(Format::U8),
        16 => Ok(Format::S16LE),
        24 => Ok(Format::S24LE),
        32 => Ok(Format::S32LE),
        other => anyhow::bail!("Unsupported sample width: {} bits", other),
    }
}

fn open_pcm(
    device: &str,
    direction: Direction,
    config: &PipelineConfig,
    period_size: usize,
) -> Result<PCM> {
    let dir_name = match direction {
        Direction::Capture => "Capture",
        Direction::Playback => "Playback",
    };
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    // Configure hardware parameters
    {
        let hwp =
            HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(sample_format(config.bits_per_sample)?)?;
        hwp.set_channels(config.channels as u32)?;
        hwp.set_rate_near(config.sample_rate, ValueOr::Nearest)?;
        hwp.set_period_size_near(period_size as Frames, ValueOr::Nearest)?;
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, actual_channels, period_size) = {
        let hwp = pcm.hw_params_current()?;
        let rate = hwp.get_rate()?;
        let ch = hwp.get_channels()?;
        let ps = hwp.get_period_size()? as usize;
        (rate, ch, ps)
    };

    if actual_rate != config.sample_rate {
        log::warn!(
            "ALSA {}: requested {}Hz, hardware negotiated {}Hz",
            dir_name,
            config.sample_rate,
            actual_rate
        );
    }

    if actual_channels != config.channels as u32 {
        anyhow::bail!(
            "ALSA {}: requested {} channels, hardware negotiated {}",
            dir_name,
            config.channels,
            actual_channels
        );
    }

    log::info!(
        "ALSA {}: device={}, rate={}, channels={}, period_size={}",
        dir_name,
        device,
        actual_rate,
        actual_channels,
        period_size,
    );

    Ok(pcm)
}
