//! audio - Real-time capture and playback pipeline
//!
//! Microphone blocks flow through a bounded record channel into a batch
//! aggregator that emits tagged frames for the network. Audio received from
//! the network flows through a bounded play channel to the speaker. Each
//! stage runs on its own OS thread and is suspended while its direction is
//! idle.

mod alsa_device;
pub mod batch;
pub mod capture;
pub mod channel;
pub mod driver;
pub mod error;
pub mod events;
mod pipeline;
pub mod playback;
pub mod state;
pub mod task;
pub mod transport;

pub use alsa_device::AlsaHardware;
pub use channel::{BoundedByteChannel, ChannelItem, OverflowPolicy};
pub use driver::{AudioHardware, CaptureSource, PlaybackSink};
pub use error::{DriverError, PipelineError};
pub use events::{EventNotifier, NoopNotifier, PipelineEvent};
pub use pipeline::{PipelineConfig, PipelineController};
pub use state::PipelineStats;
pub use transport::{FRAME_TAG, TransportSink};
