//! Error types for the audio pipeline.
//!
//! Only `begin()` surfaces errors to the caller. Everything that happens
//! inside the running tasks is logged and handled locally.

/// Non-OK status reported by a capture or playback driver.
///
/// The pipeline treats every driver error as transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("driver error (code {code})")]
pub struct DriverError {
    pub code: i32,
}

impl DriverError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Failures that leave the audio subsystem disabled.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to initialize {device} driver: {reason}")]
    Driver {
        device: &'static str,
        reason: String,
    },

    #[error("failed to spawn {task} task: {source}")]
    Spawn {
        task: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("audio pipeline has not been started")]
    NotStarted,
}
