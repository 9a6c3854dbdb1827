//! Local audio buffer
//!
//! Captured microphone frames are held here between flushes. The uplink
//! task drains the buffer on a fixed cadence and forwards each combined
//! payload to the session's outbound path.

use crate::protocol::OutboundPayload;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

/// Cadence at which buffered frames are combined and transmitted.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// Shared view of the session link, consulted before transmitting audio.
#[derive(Debug, Default)]
pub struct LinkStatus {
    connected: AtomicBool,
    audio_mode: AtomicBool,
}

impl LinkStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, up: bool) {
        self.connected.store(up, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_audio_mode(&self, on: bool) {
        self.audio_mode.store(on, Ordering::Relaxed);
    }

    pub fn audio_mode(&self) -> bool {
        self.audio_mode.load(Ordering::Relaxed)
    }
}

/// Ordered accumulator for captured audio frames.
#[derive(Debug, Default)]
pub struct LocalAudioBuffer {
    frames: Vec<Vec<u8>>,
}

impl LocalAudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_frame(&mut self, frame: Vec<u8>) {
        self.frames.push(frame);
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Combine all buffered frames in arrival order and clear the buffer.
    ///
    /// Returns `None` when there is nothing to send, when audio mode is
    /// off (frames stay put), or when the inbound stream is down. In the
    /// last case the frames are discarded: audio captured across a
    /// teardown must not be replayed into a later stream.
    pub fn flush(&mut self, link: &LinkStatus) -> Option<Vec<u8>> {
        if self.frames.is_empty() {
            return None;
        }
        if !link.audio_mode() {
            return None;
        }
        if !link.is_connected() {
            debug!("dropping {} buffered frames, stream is down", self.frames.len());
            self.frames.clear();
            return None;
        }
        let total = self.frames.iter().map(Vec::len).sum();
        let mut combined = Vec::with_capacity(total);
        for frame in self.frames.drain(..) {
            combined.extend_from_slice(&frame);
        }
        Some(combined)
    }
}

/// Drive a [`LocalAudioBuffer`]: frames arrive over `frames_rx`, a 200 ms
/// ticker flushes them toward `outbound_tx`. Exactly one uplink may run at
/// a time; the caller holds the handle and must let the previous one finish
/// (by dropping its frame sender) before spawning another.
///
/// When the frame channel closes, one final guarded flush runs; frames
/// still failing the guards at that point are lost, which is accepted on
/// teardown.
pub fn spawn_uplink(
    mut frames_rx: mpsc::Receiver<Vec<u8>>,
    link: Arc<LinkStatus>,
    outbound_tx: mpsc::Sender<OutboundPayload>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = LocalAudioBuffer::new();
        let mut ticker = interval(FLUSH_INTERVAL);
        info!("audio uplink started");
        loop {
            tokio::select! {
                frame = frames_rx.recv() => match frame {
                    Some(frame) => buffer.add_frame(frame),
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Some(payload) = buffer.flush(&link) {
                        debug!("flushing {} buffered bytes", payload.len());
                        if outbound_tx.send(OutboundPayload::Audio(payload)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
        if let Some(payload) = buffer.flush(&link) {
            let _ = outbound_tx.send(OutboundPayload::Audio(payload)).await;
        }
        info!("audio uplink stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_link() -> LinkStatus {
        let link = LinkStatus::new();
        link.set_connected(true);
        link.set_audio_mode(true);
        link
    }

    #[test]
    fn test_flush_preserves_arrival_order() {
        let link = live_link();
        let mut buffer = LocalAudioBuffer::new();
        buffer.add_frame(vec![1, 2]);
        buffer.add_frame(vec![3, 4, 5]);

        assert_eq!(buffer.flush(&link), Some(vec![1, 2, 3, 4, 5]));
        // idempotent: nothing buffered, nothing returned
        assert_eq!(buffer.flush(&link), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_flush_is_noop_without_audio_mode() {
        let link = live_link();
        link.set_audio_mode(false);
        let mut buffer = LocalAudioBuffer::new();
        buffer.add_frame(vec![9]);

        assert_eq!(buffer.flush(&link), None);
        // the buffer is left as-is
        assert!(!buffer.is_empty());

        link.set_audio_mode(true);
        assert_eq!(buffer.flush(&link), Some(vec![9]));
    }

    #[test]
    fn test_flush_discards_when_stream_is_down() {
        let link = live_link();
        link.set_connected(false);
        let mut buffer = LocalAudioBuffer::new();
        buffer.add_frame(vec![7, 7]);

        assert_eq!(buffer.flush(&link), None);
        assert!(buffer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uplink_flushes_on_cadence() {
        let link = Arc::new(live_link());
        let (frames_tx, frames_rx) = mpsc::channel(8);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let uplink = spawn_uplink(frames_rx, link, outbound_tx);

        frames_tx.send(vec![1, 2]).await.unwrap();
        frames_tx.send(vec![3]).await.unwrap();

        // virtual time advances to the next tick as soon as tasks go idle
        let payload = outbound_rx.recv().await.unwrap();
        assert_eq!(payload, OutboundPayload::Audio(vec![1, 2, 3]));

        // closing the frame channel drains whatever is left, then stops
        frames_tx.send(vec![4]).await.unwrap();
        drop(frames_tx);
        let payload = outbound_rx.recv().await.unwrap();
        assert_eq!(payload, OutboundPayload::Audio(vec![4]));
        uplink.await.unwrap();
        assert!(outbound_rx.recv().await.is_none());
    }
}
