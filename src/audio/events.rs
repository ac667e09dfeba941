//! Advisory lifecycle notifications emitted by the pipeline.

use tokio::sync::mpsc;

/// Events consumed by the UI and network layers. None of them is required
/// for the pipeline itself to work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    RecordingStarted,
    /// The recording tail has been handed to the transport.
    RecordingSent,
    RecordingStopped,
    PlaybackStarted,
    PlaybackStopped,
    /// Playback was requested while the play channel was empty.
    NoAudioData,
}

/// Receiver of [`PipelineEvent`]s. Implementations must not block.
pub trait EventNotifier: Send + Sync {
    fn notify(&self, event: PipelineEvent);
}

impl EventNotifier for mpsc::Sender<PipelineEvent> {
    fn notify(&self, event: PipelineEvent) {
        if let Err(e) = self.try_send(event) {
            log::warn!("Dropping pipeline event {:?}: {}", event, e);
        }
    }
}

/// Notifier that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
    fn notify(&self, _event: PipelineEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_forwards_events_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.notify(PipelineEvent::RecordingStarted);
        tx.notify(PipelineEvent::RecordingStopped);

        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::RecordingStarted);
        assert!(rx.try_recv().is_err());
    }
}
