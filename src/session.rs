//! Session channel
//!
//! Owns the inbound push stream and the outbound request path for one
//! session identifier. The inbound side is a streaming GET whose body is
//! read line by line on a background task; the outbound side is a plain
//! POST that can run concurrently with inbound delivery.
//!
//! Streams carry a generation number. Recycling the stream bumps the
//! generation, so events still in flight from a superseded stream can be
//! recognized and dropped by the driver.

use crate::audio_buffer::LinkStatus;
use crate::fsm::FsmEvent;
use crate::protocol::{
    payload_of_line, ClientConfig, ClientError, OutboundPayload, Result, ServerEvent,
};
use futures_util::StreamExt;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// An inbound event tagged with the generation of the stream that
/// produced it.
#[derive(Debug)]
pub struct StreamEvent {
    pub generation: u64,
    pub event: FsmEvent,
}

pub struct SessionClient {
    config: ClientConfig,
    session_id: String,
    http: reqwest::Client,
    link: Arc<LinkStatus>,
    generation: Arc<AtomicU64>,
    inbound_task: Option<JoinHandle<()>>,
    event_tx: mpsc::Sender<StreamEvent>,
}

impl SessionClient {
    /// Create a client with a fresh session identifier. The identifier is
    /// fixed for the client's lifetime; only constructing a new client
    /// yields a new one.
    pub fn new(
        config: ClientConfig,
        link: Arc<LinkStatus>,
        event_tx: mpsc::Sender<StreamEvent>,
    ) -> Self {
        let session_id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();
        info!("session id: {session_id}");
        Self {
            config,
            session_id,
            http: reqwest::Client::new(),
            link,
            generation: Arc::new(AtomicU64::new(0)),
            inbound_task: None,
            event_tx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn link(&self) -> &Arc<LinkStatus> {
        &self.link
    }

    /// Whether `generation` identifies the currently open stream.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation.load(Ordering::Acquire)
    }

    /// Establish the inbound stream with the requested audio mode. An
    /// already-open stream is torn down first; only one stream may exist
    /// per session identifier.
    ///
    /// Connection failures are not returned here: the stream task reports
    /// them as a `StreamClosed` event so they travel the same path as a
    /// mid-flight loss.
    pub fn open(&mut self, audio_mode: bool) {
        self.close();
        let generation = self.generation.load(Ordering::Acquire);
        let url = format!(
            "{}/events/{}?is_audio={}",
            self.config.base_url, self.session_id, audio_mode
        );
        info!("opening event stream (generation {generation}, audio mode {audio_mode})");

        let http = self.http.clone();
        let event_tx = self.event_tx.clone();
        self.inbound_task = Some(tokio::spawn(async move {
            let closed = |reason: Option<String>| StreamEvent {
                generation,
                event: FsmEvent::StreamClosed { reason },
            };

            let resp = match http.get(&url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let _ = event_tx.send(closed(Some(e.to_string()))).await;
                    return;
                }
            };
            if !resp.status().is_success() {
                let reason = format!("server returned {}", resp.status());
                let _ = event_tx.send(closed(Some(reason))).await;
                return;
            }
            if event_tx
                .send(StreamEvent {
                    generation,
                    event: FsmEvent::StreamOpened,
                })
                .await
                .is_err()
            {
                return;
            }

            let mut body = resp.bytes_stream();
            let mut pending: Vec<u8> = Vec::new();
            loop {
                match body.next().await {
                    Some(Ok(chunk)) => {
                        pending.extend_from_slice(&chunk);
                        // events are newline-delimited; a partial line is
                        // carried over to the next chunk
                        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                            let raw: Vec<u8> = pending.drain(..=pos).collect();
                            let line = String::from_utf8_lossy(&raw);
                            let Some(payload) = payload_of_line(&line) else {
                                continue;
                            };
                            debug!("server event: {payload}");
                            let event = match ServerEvent::from_wire(payload) {
                                Ok(event) => FsmEvent::Server(event),
                                Err(e) => {
                                    error!("unusable event from server: {e}");
                                    FsmEvent::ProtocolFault(e.to_string())
                                }
                            };
                            if event_tx
                                .send(StreamEvent { generation, event })
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let _ = event_tx.send(closed(Some(e.to_string()))).await;
                        return;
                    }
                    None => {
                        let _ = event_tx.send(closed(None)).await;
                        return;
                    }
                }
            }
        }));
    }

    /// Tear down the inbound stream. Bumps the stream generation so
    /// trailing events from the old stream are dropped by the driver.
    /// In-flight outbound sends are not cancelled.
    pub fn close(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.inbound_task.take() {
            task.abort();
            debug!("inbound stream task aborted");
        }
    }

    /// Cheap handle for issuing outbound sends independently of the
    /// inbound stream.
    pub fn sender(&self) -> SessionSender {
        SessionSender {
            http: self.http.clone(),
            url: format!("{}/send/{}", self.config.base_url, self.session_id),
        }
    }
}

/// Outbound request path for one session. Failures come back as
/// [`ClientError::Transmission`]; nothing escapes past the returned
/// result.
#[derive(Clone)]
pub struct SessionSender {
    http: reqwest::Client,
    url: String,
}

impl SessionSender {
    pub async fn send(&self, payload: &OutboundPayload) -> Result<()> {
        debug!("sending {} payload", payload.mime_type());
        let resp = self
            .http
            .post(&self.url)
            .json(&payload.to_wire())
            .send()
            .await
            .map_err(|e| ClientError::Transmission(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::Transmission(format!(
                "server returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generation_guard() {
        let (event_tx, _event_rx) = mpsc::channel(8);
        let mut client = SessionClient::new(
            ClientConfig::default(),
            Arc::new(LinkStatus::new()),
            event_tx,
        );

        assert!(client.is_current(0));
        client.close();
        // events tagged with the old generation are no longer current
        assert!(!client.is_current(0));
        assert!(client.is_current(1));
    }

    #[tokio::test]
    async fn test_session_id_is_stable() {
        let (event_tx, _event_rx) = mpsc::channel(8);
        let mut client = SessionClient::new(
            ClientConfig::default(),
            Arc::new(LinkStatus::new()),
            event_tx,
        );
        let id = client.session_id().to_string();
        assert_eq!(id.len(), 10);
        client.close();
        assert_eq!(client.session_id(), id);
    }
}
