//! Microphone capture and assistant playback
//!
//! Both sides go through PulseAudio's simple API on dedicated OS threads,
//! talking to the async side over channels. Capture produces 16-bit
//! little-endian PCM at 16 kHz mono, the format the assistant service
//! expects on its audio send path; playback consumes the 24 kHz mono PCM
//! the assistant streams down.

use libpulse_binding::sample::{Format, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Capture format expected by the service.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
pub const CAPTURE_CHANNELS: u16 = 1;
/// Playback format of assistant speech.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// 100 ms of 16 kHz mono S16LE.
const FRAME_BYTES: usize = 3200;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("failed to open audio device: {0}")]
    DeviceOpen(String),

    #[error("audio thread exited before the device was ready")]
    ThreadGone,
}

/// Exclusive handle on the microphone. The device is held by the capture
/// thread from `start` until `stop`; a new recording must go through
/// `stop` on the old handle first.
pub struct Recorder {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<Vec<u8>>,
}

impl Recorder {
    /// Start capturing. Each 100 ms frame is pushed into `frames_tx` for
    /// the uplink, and the full take is retained for transcription after
    /// `stop`.
    pub fn start(
        app_name: &str,
        frames_tx: mpsc::Sender<Vec<u8>>,
    ) -> std::result::Result<Self, AudioError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let app_name = app_name.to_string();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread = std::thread::spawn(move || {
            let spec = Spec {
                format: Format::S16le,
                channels: CAPTURE_CHANNELS as u8,
                rate: CAPTURE_SAMPLE_RATE,
            };
            let mut simple = match Simple::new(
                None,      // default server
                &app_name, // application name
                Direction::Record,
                None,     // default device
                "record", // stream description
                &spec,
                None, // default channel map
                None, // default buffering
            ) {
                Ok(simple) => {
                    let _ = ready_tx.send(Ok(()));
                    simple
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::DeviceOpen(format!("{e}"))));
                    return Vec::new();
                }
            };

            let mut take = Vec::new();
            let mut frame = [0u8; FRAME_BYTES];
            while !stop_flag.load(Ordering::Relaxed) {
                if let Err(e) = simple.read(&mut frame) {
                    error!("microphone read failed: {e}");
                    break;
                }
                take.extend_from_slice(&frame);
                // the uplink may already be gone; keep recording locally
                // until stopped so the take can still be transcribed
                let _ = frames_tx.blocking_send(frame.to_vec());
            }
            take
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("microphone capture started");
                Ok(Self { stop, thread })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::ThreadGone),
        }
    }

    /// Stop capturing, release the device and return the full recording.
    pub fn stop(self) -> Vec<u8> {
        self.stop.store(true, Ordering::Relaxed);
        let pcm = self.thread.join().unwrap_or_default();
        info!("microphone capture stopped ({} bytes)", pcm.len());
        pcm
    }
}

/// Playback sink for assistant speech.
///
/// Chunks are tagged with the interrupt epoch current when they were
/// queued; `interrupt` bumps the epoch, so everything already queued is
/// discarded as soon as the in-flight write completes.
pub struct AudioPlayer {
    chunk_tx: mpsc::UnboundedSender<(u64, Vec<u8>)>,
    epoch: Arc<AtomicU64>,
    _thread: JoinHandle<()>,
}

impl AudioPlayer {
    pub fn spawn(app_name: &str) -> std::result::Result<Self, AudioError> {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<(u64, Vec<u8>)>();
        let epoch = Arc::new(AtomicU64::new(0));
        let epoch_ref = epoch.clone();
        let app_name = app_name.to_string();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread = std::thread::spawn(move || {
            let spec = Spec {
                format: Format::S16le,
                channels: 1,
                rate: PLAYBACK_SAMPLE_RATE,
            };
            let mut simple = match Simple::new(
                None,
                &app_name,
                Direction::Playback,
                None,
                "playback",
                &spec,
                None,
                None,
            ) {
                Ok(simple) => {
                    let _ = ready_tx.send(Ok(()));
                    simple
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::DeviceOpen(format!("{e}"))));
                    return;
                }
            };

            while let Some((tag, pcm)) = chunk_rx.blocking_recv() {
                if tag != epoch_ref.load(Ordering::Acquire) {
                    // queued before an interrupt, drop it
                    continue;
                }
                if let Err(e) = simple.write(&pcm) {
                    error!("playback write failed: {e}");
                    break;
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("audio playback ready");
                Ok(Self {
                    chunk_tx,
                    epoch,
                    _thread: thread,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::ThreadGone),
        }
    }

    /// Queue one PCM chunk for playback.
    pub fn play(&self, pcm: Vec<u8>) {
        let tag = self.epoch.load(Ordering::Acquire);
        let _ = self.chunk_tx.send((tag, pcm));
    }

    /// Discard all queued audio; playback stops once the chunk currently
    /// being written finishes.
    pub fn interrupt(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}
