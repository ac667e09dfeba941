//! Hardware driver seams for capture and playback.

use std::time::Duration;

use super::error::DriverError;
use super::pipeline::PipelineConfig;

/// A microphone driver that delivers raw PCM bytes.
pub trait CaptureSource: Send {
    /// Read up to `buf.len()` bytes into `buf`.
    ///
    /// `None` waits until the hardware delivers the next buffer. Returns the
    /// number of bytes written into `buf`.
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, DriverError>;
}

/// A speaker driver that consumes raw PCM bytes.
pub trait PlaybackSink: Send {
    /// Write `data` to the output, returning how many bytes were accepted.
    fn write(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, DriverError>;

    /// Discard everything queued in the hardware output buffer so no stale
    /// audio plays on the next start.
    fn zero_output_buffer(&mut self) -> Result<(), DriverError>;
}

impl<T: CaptureSource + ?Sized> CaptureSource for Box<T> {
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, DriverError> {
        (**self).read(buf, timeout)
    }
}

impl<T: PlaybackSink + ?Sized> PlaybackSink for Box<T> {
    fn write(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, DriverError> {
        (**self).write(data, timeout)
    }

    fn zero_output_buffer(&mut self) -> Result<(), DriverError> {
        (**self).zero_output_buffer()
    }
}

/// Opens the capture and playback drivers when the pipeline begins.
pub trait AudioHardware {
    fn open_capture(&self, config: &PipelineConfig) -> anyhow::Result<Box<dyn CaptureSource>>;
    fn open_playback(&self, config: &PipelineConfig) -> anyhow::Result<Box<dyn PlaybackSink>>;
}
