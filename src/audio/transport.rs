//! Outbound network seam for aggregated audio frames.

use bytes::Bytes;
use tokio::sync::mpsc;

/// Tag that prefixes every outbound frame so the server can tell audio
/// payloads from other binary messages.
pub const FRAME_TAG: &[u8; 6] = b"AUDIO:";

/// Best-effort sender for tagged audio frames.
///
/// `send` must return promptly; a frame that cannot be delivered is
/// dropped by the implementation.
pub trait TransportSink: Send {
    fn send(&mut self, frame: Bytes);
}

impl TransportSink for mpsc::Sender<Bytes> {
    fn send(&mut self, frame: Bytes) {
        let len = frame.len();
        if let Err(e) = self.try_send(frame) {
            log::warn!("Dropping {}-byte audio frame: {}", len, e);
        }
    }
}

impl<T: TransportSink + ?Sized> TransportSink for Box<T> {
    fn send(&mut self, frame: Bytes) {
        (**self).send(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_sender_drops_instead_of_blocking() {
        let (mut tx, mut rx) = mpsc::channel::<Bytes>(1);
        TransportSink::send(&mut tx, Bytes::from_static(b"AUDIO:first"));
        TransportSink::send(&mut tx, Bytes::from_static(b"AUDIO:second"));

        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"AUDIO:first"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_sender_is_silent() {
        let (tx, rx) = mpsc::channel::<Bytes>(1);
        drop(rx);
        let mut sink: Box<dyn TransportSink> = Box::new(tx);
        sink.send(Bytes::from_static(b"AUDIO:"));
    }
}
