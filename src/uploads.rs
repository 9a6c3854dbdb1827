//! File and audio uploads
//!
//! Documents go up as multipart form posts; recorded audio is packaged
//! into a WAV container first and posted to the transcription endpoint.
//! Both are one-shot operations: a failure is surfaced to the user and
//! retried only by asking again.

use crate::codec;
use crate::protocol::{ClientError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub parsed_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionResponse {
    pub success: bool,
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    base_url: String,
}

impl UploadClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Upload a document for the assistant to parse into the conversation.
    pub async fn upload_file(&self, path: &Path) -> Result<UploadResponse> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::Upload(format!("cannot read {}: {e}", path.display())))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        info!("uploading {name} ({} bytes)", bytes.len());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(name);
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .http
            .post(format!("{}/upload_file", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Upload(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::Upload(format!(
                "server returned {}",
                resp.status()
            )));
        }
        resp.json::<UploadResponse>()
            .await
            .map_err(|e| ClientError::Upload(e.to_string()))
    }

    /// Package recorded PCM as WAV and post it for transcription.
    pub async fn transcribe_recording(
        &self,
        pcm: &[u8],
        sample_rate: u32,
        channels: u16,
    ) -> Result<TranscriptionResponse> {
        let wav = codec::synthesize_wav(pcm, sample_rate, channels);
        info!("transcribing recording ({} bytes of WAV)", wav.len());

        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| ClientError::Upload(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("audio_file", part);
        let resp = self
            .http
            .post(format!("{}/transcribe", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Upload(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::Upload(format!(
                "server returned {}",
                resp.status()
            )));
        }
        resp.json::<TranscriptionResponse>()
            .await
            .map_err(|e| ClientError::Upload(e.to_string()))
    }
}
