//! Structured case record
//!
//! The assistant extracts FIR fields from the conversation as it goes.
//! These endpoints fetch the current extraction, submit the finished
//! report, and offer a non-streaming chat fallback that returns the
//! extraction inline.

use crate::protocol::{ClientError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One applicable act with its sections, as extracted by the assistant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActSections {
    pub act: String,
    pub sections: String,
}

/// Flat case fields plus the repeated act/sections group. Fields the
/// assistant has not extracted yet stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complainant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complainant_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complainant_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complaint_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acts: Vec<ActSections>,
}

impl CaseRecord {
    /// Multi-line rendering for the terminal view.
    pub fn summary(&self) -> String {
        fn line(label: &str, value: &Option<String>) -> String {
            format!("  {label}: {}\n", value.as_deref().unwrap_or("(pending)"))
        }
        let mut out = String::from("Case record so far:\n");
        out.push_str(&line("Complainant", &self.complainant_name));
        out.push_str(&line("Address", &self.complainant_address));
        out.push_str(&line("Phone", &self.complainant_phone));
        out.push_str(&line("Incident date/time", &self.incident_date_time));
        out.push_str(&line("Incident location", &self.incident_location));
        out.push_str(&line("Complaint type", &self.complaint_type));
        out.push_str(&line("Description", &self.incident_description));
        for entry in &self.acts {
            out.push_str(&format!("  {}: sections {}\n", entry.act, entry.sections));
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct ChatTurnRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatTurnResponse {
    pub text: String,
    #[serde(default)]
    pub extracted_info: Option<CaseRecord>,
}

#[derive(Clone)]
pub struct CaseApi {
    http: reqwest::Client,
    base_url: String,
}

impl CaseApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Fetch whatever the assistant has extracted so far.
    pub async fn fetch_case_record(&self) -> Result<CaseRecord> {
        let resp = self
            .http
            .get(format!("{}/get_extracted_info", self.base_url))
            .send()
            .await
            .map_err(|e| ClientError::Transmission(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::Transmission(format!(
                "server returned {}",
                resp.status()
            )));
        }
        resp.json::<CaseRecord>()
            .await
            .map_err(|e| ClientError::Transmission(e.to_string()))
    }

    /// Submit the case record as the final FIR.
    pub async fn submit_case_record(&self, record: &CaseRecord) -> Result<()> {
        info!("submitting case record");
        let resp = self
            .http
            .post(format!("{}/submit_fir", self.base_url))
            .json(record)
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

    /// Non-streaming chat fallback, used when the push stream is not
    /// available.
    pub async fn chat_turn(&self, message: &str) -> Result<ChatTurnResponse> {
        let resp = self
            .http
            .post(format!("{}/chat", self.base_url))
            .json(&ChatTurnRequest {
                message: message.to_string(),
            })
            .send()
            .await
            .map_err(|e| ClientError::Transmission(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::Transmission(format!(
                "server returned {}",
                resp.status()
            )));
        }
        resp.json::<ChatTurnResponse>()
            .await
            .map_err(|e| ClientError::Transmission(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_record_round_trip() {
        let record: CaseRecord = serde_json::from_str(
            r#"{
                "complainant_name": "A. Kumar",
                "incident_location": "MG Road",
                "acts": [{"act": "IPC", "sections": "378, 380"}]
            }"#,
        )
        .unwrap();
        assert_eq!(record.complainant_name.as_deref(), Some("A. Kumar"));
        assert_eq!(record.acts.len(), 1);
        assert_eq!(record.acts[0].sections, "378, 380");

        // unset fields are omitted on the way back out
        let wire = serde_json::to_value(&record).unwrap();
        assert!(wire.get("complainant_phone").is_none());
        assert_eq!(wire["acts"][0]["act"], "IPC");
    }

    #[test]
    fn test_chat_turn_response_without_extraction() {
        let resp: ChatTurnResponse =
            serde_json::from_str(r#"{"text": "Tell me more about the incident."}"#).unwrap();
        assert!(resp.extracted_info.is_none());
    }

    #[test]
    fn test_summary_marks_pending_fields() {
        let record = CaseRecord {
            complainant_name: Some("A. Kumar".to_string()),
            ..CaseRecord::default()
        };
        let summary = record.summary();
        assert!(summary.contains("Complainant: A. Kumar"));
        assert!(summary.contains("Phone: (pending)"));
    }
}
