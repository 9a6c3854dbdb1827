//! Session state machine
//!
//! Tracks the connection lifecycle (connecting, connected, disconnected)
//! and the turn lifecycle (open bubble, sealed bubble) for one session.
//! Every inbound event and lifecycle trigger goes through
//! [`SessionFsm::on_event`]; side effects are queued as [`Action`]s and
//! drained by the driver after each event, which keeps ordering auditable
//! and the transitions testable without a live stream.

use crate::protocol::{ClientConfig, ServerEvent};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum FsmEvent {
    /// The inbound stream answered and is delivering events.
    StreamOpened,
    /// The inbound stream ended, failed to open, or errored mid-flight.
    StreamClosed { reason: Option<String> },
    /// One event from the server push stream.
    Server(ServerEvent),
    /// A stream line that could not be mapped to an event.
    ProtocolFault(String),
    /// The reconnect delay elapsed.
    ReconnectDue,
    /// The user toggled audio mode; the stream must be recycled.
    AudioModeSwitch(bool),
}

/// Side effects requested by the state machine, applied by the driver in
/// queue order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    OpenStream { audio_mode: bool },
    CloseStream,
    ScheduleReconnect(Duration),
    SetSendEnabled(bool),
    NewBubble { turn: String },
    AppendText { turn: String, text: String },
    PlayAudio(Vec<u8>),
    StopPlayback,
    Notice(String),
}

pub struct SessionFsm {
    state: ConnectionState,
    audio_mode: bool,
    current_turn: Option<String>,
    reconnect_pending: bool,
    reconnect_delay: Duration,
    seal_turn_on_interrupt: bool,
    actions: Vec<Action>,
}

impl SessionFsm {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            state: ConnectionState::Connecting,
            audio_mode: false,
            current_turn: None,
            reconnect_pending: false,
            reconnect_delay: config.reconnect_delay,
            seal_turn_on_interrupt: config.seal_turn_on_interrupt,
            actions: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn audio_mode(&self) -> bool {
        self.audio_mode
    }

    pub fn current_turn(&self) -> Option<&str> {
        self.current_turn.as_deref()
    }

    /// Process one event and queue the resulting actions.
    pub fn on_event(&mut self, event: FsmEvent) {
        match event {
            FsmEvent::StreamOpened => {
                info!("event stream open");
                self.state = ConnectionState::Connected;
                self.reconnect_pending = false;
                self.actions.push(Action::SetSendEnabled(true));
            }
            FsmEvent::StreamClosed { reason } => {
                match &reason {
                    Some(reason) => warn!("event stream closed: {reason}"),
                    None => info!("event stream closed"),
                }
                self.state = ConnectionState::Disconnected;
                self.actions.push(Action::SetSendEnabled(false));
                // one reopen per failure, fixed delay, retried forever
                if !self.reconnect_pending {
                    self.reconnect_pending = true;
                    self.actions
                        .push(Action::ScheduleReconnect(self.reconnect_delay));
                }
            }
            FsmEvent::ReconnectDue => {
                self.reconnect_pending = false;
                if self.state == ConnectionState::Disconnected {
                    info!("reconnecting");
                    self.state = ConnectionState::Connecting;
                    self.actions.push(Action::OpenStream {
                        audio_mode: self.audio_mode,
                    });
                }
            }
            FsmEvent::AudioModeSwitch(enabled) => {
                info!("audio mode {}, recycling stream", if enabled { "on" } else { "off" });
                self.audio_mode = enabled;
                // the old stream always goes down before the new one opens
                self.actions.push(Action::CloseStream);
                self.state = ConnectionState::Connecting;
                self.actions.push(Action::OpenStream {
                    audio_mode: enabled,
                });
            }
            FsmEvent::ProtocolFault(detail) => {
                warn!("unusable event from server: {detail}");
                self.actions
                    .push(Action::Notice(format!("Ignoring a malformed server event: {detail}")));
            }
            FsmEvent::Server(event) => self.on_server_event(event),
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Error {
                message,
                suggestion,
            } => {
                // app-level failure: surface it and mark the link down, but
                // leave reconnection to the transport-level close
                self.state = ConnectionState::Disconnected;
                let notice = match suggestion {
                    Some(suggestion) => format!("{message} ({suggestion})"),
                    None => message,
                };
                self.actions.push(Action::Notice(notice));
            }
            ServerEvent::TurnComplete => {
                self.current_turn = None;
            }
            ServerEvent::Interrupted => {
                self.actions.push(Action::StopPlayback);
                if self.seal_turn_on_interrupt {
                    self.current_turn = None;
                }
            }
            ServerEvent::AudioChunk(pcm) => {
                self.actions.push(Action::PlayAudio(pcm));
            }
            ServerEvent::TextChunk(text) => {
                let turn = match &self.current_turn {
                    Some(token) => token.clone(),
                    None => {
                        let token = new_turn_token();
                        self.current_turn = Some(token.clone());
                        self.actions.push(Action::NewBubble {
                            turn: token.clone(),
                        });
                        token
                    }
                };
                self.actions.push(Action::AppendText { turn, text });
            }
        }
    }

    /// Drain all queued actions in the order they were produced.
    pub fn drain_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }
}

/// Random token identifying one assistant turn.
fn new_turn_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect()
}
