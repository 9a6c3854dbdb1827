//! Saathi live client
//!
//! Terminal client for the Saathi digital FIR filing assistant. The client
//! keeps one streaming session against the assistant service: server-pushed
//! text and audio arrive over a push stream, user text and buffered
//! microphone audio go out over the send path, and document uploads,
//! transcription and the structured case record ride plain HTTP.

#![forbid(unsafe_code)]

/// Microphone capture and assistant playback
pub mod audio;
/// Local audio buffer and uplink
pub mod audio_buffer;
/// Structured case record endpoints
pub mod case;
/// Audio frame codec
pub mod codec;
/// Session state machine
pub mod fsm;
/// Wire protocol and error taxonomy
pub mod protocol;
/// Client driver loop
pub mod runner;
/// Session channel
pub mod session;
/// File and audio uploads
pub mod uploads;

use audio::{AudioPlayer, Recorder, CAPTURE_CHANNELS, CAPTURE_SAMPLE_RATE};
use audio_buffer::{spawn_uplink, LinkStatus};
use case::CaseApi;
use fsm::{Action, SessionFsm};
use protocol::ClientConfig;
use runner::ClientCommand;
use session::SessionClient;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uploads::UploadClient;

const APP_NAME: &str = "saathi-live";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = config_from_env();
    info!("starting {APP_NAME} against {}", config.base_url);

    let link = Arc::new(LinkStatus::new());
    let (stream_tx, stream_rx) = mpsc::channel(100);
    let (command_tx, command_rx) = mpsc::channel(16);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let session = SessionClient::new(config.clone(), link.clone(), stream_tx);
    let fsm = SessionFsm::new(&config);

    let player = match AudioPlayer::spawn(APP_NAME) {
        Ok(player) => Some(player),
        Err(e) => {
            warn!("audio playback unavailable: {e}");
            let _ = ui_tx.send(Action::Notice(
                "Audio playback is unavailable on this machine; replies will be text only."
                    .to_string(),
            ));
            None
        }
    };

    spawn_renderer(ui_rx);
    spawn_control(
        config,
        link,
        command_tx,
        outbound_tx,
        ui_tx.clone(),
    );

    runner::run(
        session,
        fsm,
        stream_rx,
        command_rx,
        outbound_rx,
        ui_tx,
        player,
    )
    .await;

    info!("{APP_NAME} stopped");
    Ok(())
}

fn config_from_env() -> ClientConfig {
    let mut config = ClientConfig::default();
    if let Ok(url) = std::env::var("SAATHI_SERVER_URL") {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    config.seal_turn_on_interrupt = std::env::var("SAATHI_SEAL_TURN_ON_INTERRUPT")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    config
}

/// Render state-machine actions as a scrolling conversation log.
fn spawn_renderer(mut ui_rx: mpsc::UnboundedReceiver<Action>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut in_bubble = false;
        while let Some(action) = ui_rx.recv().await {
            match action {
                Action::NewBubble { .. } => {
                    print!("\nSaathi: ");
                    in_bubble = true;
                }
                Action::AppendText { text, .. } => {
                    print!("{text}");
                }
                Action::Notice(text) => {
                    if in_bubble {
                        println!();
                        in_bubble = false;
                    }
                    println!("[notice] {text}");
                }
                Action::SetSendEnabled(enabled) => {
                    if in_bubble {
                        println!();
                        in_bubble = false;
                    }
                    println!(
                        "[status] {}",
                        if enabled { "connected" } else { "disconnected" }
                    );
                }
                _ => {}
            }
            let _ = std::io::stdout().flush();
        }
    })
}

/// Everything the recording control owns: the microphone handle and the
/// uplink feeding captured frames to the session.
struct RecordingControl {
    recorder: Option<Recorder>,
    uplink: Option<JoinHandle<()>>,
    frames_tx: Option<mpsc::Sender<Vec<u8>>>,
}

/// Read stdin lines and turn them into commands. Plain lines become chat
/// messages; `/` lines drive audio mode, uploads and the case record.
fn spawn_control(
    config: ClientConfig,
    link: Arc<LinkStatus>,
    command_tx: mpsc::Sender<ClientCommand>,
    outbound_tx: mpsc::Sender<protocol::OutboundPayload>,
    ui_tx: mpsc::UnboundedSender<Action>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let uploads = UploadClient::new(&config.base_url);
        let cases = CaseApi::new(&config.base_url);
        let mut recording = RecordingControl {
            recorder: None,
            uplink: None,
            frames_tx: None,
        };
        let notice = |text: String| {
            let _ = ui_tx.send(Action::Notice(text));
        };

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some(command) = line.strip_prefix('/') else {
                if !link.is_connected() {
                    notice("Not connected; the message was not sent.".to_string());
                    continue;
                }
                let _ = command_tx
                    .send(ClientCommand::SendText(line.to_string()))
                    .await;
                continue;
            };

            match command.split_once(' ').unwrap_or((command, "")) {
                ("audio", "on") => {
                    if recording.recorder.is_some() {
                        notice("Already recording.".to_string());
                        continue;
                    }
                    // single flush timer: never two uplinks at once
                    let frames_tx = match recording.frames_tx.clone() {
                        Some(frames_tx) => frames_tx,
                        None => {
                            let (frames_tx, frames_rx) = mpsc::channel(32);
                            recording.uplink =
                                Some(spawn_uplink(frames_rx, link.clone(), outbound_tx.clone()));
                            recording.frames_tx = Some(frames_tx.clone());
                            frames_tx
                        }
                    };
                    match Recorder::start(APP_NAME, frames_tx) {
                        Ok(recorder) => {
                            recording.recorder = Some(recorder);
                            link.set_audio_mode(true);
                            let _ = command_tx.send(ClientCommand::SetAudioMode(true)).await;
                            notice("Recording; say what you want to report.".to_string());
                        }
                        Err(e) => {
                            notice(format!("Could not open the microphone: {e}"));
                        }
                    }
                }
                ("audio", "off") => {
                    let Some(recorder) = recording.recorder.take() else {
                        notice("Not recording.".to_string());
                        continue;
                    };
                    let pcm = recorder.stop();
                    // dropping the frame sender lets the uplink run its
                    // final flush while the audio stream is still up
                    recording.frames_tx = None;
                    if let Some(uplink) = recording.uplink.take() {
                        let _ = uplink.await;
                    }
                    link.set_audio_mode(false);
                    let _ = command_tx.send(ClientCommand::SetAudioMode(false)).await;
                    notice("Transcribing audio...".to_string());
                    let uploads = uploads.clone();
                    let ui = ui_tx.clone();
                    tokio::spawn(async move {
                        match uploads
                            .transcribe_recording(&pcm, CAPTURE_SAMPLE_RATE, CAPTURE_CHANNELS)
                            .await
                        {
                            Ok(resp) if resp.success => {
                                let text = resp
                                    .transcription
                                    .unwrap_or_else(|| "(empty transcription)".to_string());
                                let _ = ui.send(Action::Notice(format!("You said: {text}")));
                            }
                            Ok(resp) => {
                                let _ = ui.send(Action::Notice(format!(
                                    "Transcription failed: {}",
                                    resp.message.unwrap_or_else(|| "unknown error".to_string())
                                )));
                            }
                            Err(e) => {
                                let _ = ui.send(Action::Notice(format!(
                                    "Transcription failed: {e}. Please try again."
                                )));
                            }
                        }
                    });
                }
                ("upload", path) if !path.is_empty() => {
                    let uploads = uploads.clone();
                    let ui = ui_tx.clone();
                    let path = std::path::PathBuf::from(path);
                    tokio::spawn(async move {
                        match uploads.upload_file(&path).await {
                            Ok(resp) if resp.success => {
                                let _ = ui.send(Action::Notice(format!(
                                    "Uploaded: {}",
                                    path.display()
                                )));
                            }
                            Ok(resp) => {
                                let _ = ui.send(Action::Notice(format!(
                                    "Upload rejected: {}",
                                    resp.message.unwrap_or_else(|| "unknown error".to_string())
                                )));
                            }
                            Err(e) => {
                                let _ = ui.send(Action::Notice(format!(
                                    "Upload failed: {e}. Please try again."
                                )));
                            }
                        }
                    });
                }
                ("case", _) => match cases.fetch_case_record().await {
                    Ok(record) => notice(record.summary()),
                    Err(e) => notice(format!("Could not fetch the case record: {e}")),
                },
                ("submit", _) => {
                    match cases.fetch_case_record().await {
                        Ok(record) => match cases.submit_case_record(&record).await {
                            Ok(()) => notice("FIR submitted.".to_string()),
                            Err(e) => notice(format!("Submission failed: {e}")),
                        },
                        Err(e) => notice(format!("Could not fetch the case record: {e}")),
                    }
                }
                ("quit", _) | ("exit", _) => {
                    if let Some(recorder) = recording.recorder.take() {
                        recorder.stop();
                    }
                    let _ = command_tx.send(ClientCommand::Shutdown).await;
                    break;
                }
                ("help", _) => {
                    notice(
                        "Commands: /audio on|off, /upload <path>, /case, /submit, /quit"
                            .to_string(),
                    );
                }
                _ => {
                    notice(format!("Unknown command: /{command} (try /help)"));
                }
            }
        }
    })
}
