//! Client driver
//!
//! Connects the session channel, the state machine, the audio uplink and
//! the terminal view. All inbound events funnel through the state machine
//! strictly in arrival order; the actions it queues are applied after
//! every event, so the close-before-open and reconnect ordering the state
//! machine decides on is exactly what happens on the wire.

use crate::audio::AudioPlayer;
use crate::audio_buffer::LinkStatus;
use crate::fsm::{Action, ConnectionState, FsmEvent, SessionFsm};
use crate::protocol::OutboundPayload;
use crate::session::{SessionClient, StreamEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

/// Commands from the terminal control task.
#[derive(Debug)]
pub enum ClientCommand {
    SendText(String),
    SetAudioMode(bool),
    Shutdown,
}

pub async fn run(
    mut session: SessionClient,
    mut fsm: SessionFsm,
    mut stream_rx: mpsc::Receiver<StreamEvent>,
    mut command_rx: mpsc::Receiver<ClientCommand>,
    mut outbound_rx: mpsc::Receiver<OutboundPayload>,
    ui_tx: mpsc::UnboundedSender<Action>,
    player: Option<AudioPlayer>,
) {
    let link: Arc<LinkStatus> = session.link().clone();
    let mut reconnect_at: Option<Instant> = None;

    // initial connection, text mode
    session.open(false);

    loop {
        tokio::select! {
            event = stream_rx.recv() => {
                let Some(event) = event else { break };
                if !session.is_current(event.generation) {
                    debug!(
                        "dropping event from superseded stream (generation {})",
                        event.generation
                    );
                } else {
                    fsm.on_event(event.event);
                }
            }
            command = command_rx.recv() => {
                let Some(command) = command else { break };
                match command {
                    ClientCommand::SendText(text) => {
                        let sender = session.sender();
                        let ui = ui_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = sender.send(&OutboundPayload::Text(text)).await {
                                error!("text send failed: {e}");
                                let _ = ui.send(Action::Notice(format!(
                                    "Could not send the message: {e}. Please try again."
                                )));
                            }
                        });
                    }
                    ClientCommand::SetAudioMode(enabled) => {
                        fsm.on_event(FsmEvent::AudioModeSwitch(enabled));
                    }
                    ClientCommand::Shutdown => {
                        info!("shutting down");
                        session.close();
                        break;
                    }
                }
            }
            payload = outbound_rx.recv() => {
                let Some(payload) = payload else { break };
                let sender = session.sender();
                let ui = ui_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = sender.send(&payload).await {
                        error!("audio send failed: {e}");
                        let _ = ui.send(Action::Notice(format!("Could not send audio: {e}.")));
                    }
                });
            }
            _ = wait_until(reconnect_at) => {
                reconnect_at = None;
                fsm.on_event(FsmEvent::ReconnectDue);
            }
        }

        for action in fsm.drain_actions() {
            match action {
                Action::OpenStream { audio_mode } => session.open(audio_mode),
                Action::CloseStream => session.close(),
                Action::ScheduleReconnect(delay) => {
                    reconnect_at = Some(Instant::now() + delay);
                }
                Action::PlayAudio(pcm) => {
                    if let Some(player) = &player {
                        player.play(pcm);
                    }
                }
                Action::StopPlayback => {
                    if let Some(player) = &player {
                        player.interrupt();
                    }
                }
                // rendering actions go to the terminal view
                other => {
                    let _ = ui_tx.send(other);
                }
            }
        }
        link.set_connected(fsm.state() == ConnectionState::Connected);
    }
}

/// Sleeps until the deadline, or forever when none is set.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
