use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateTranscriptionRequest {
    pub url: String,
    pub service: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateTranscriptionResponse {
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportRequest {
    pub export_type: String,
    pub include_speaker_names: bool,
    pub include_timestamps: bool,
    pub merge_same_speaker_segments: bool,
    pub is_single_paragraph: bool,
    pub paragraph_size: u32,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            export_type: "txt".to_string(),
            include_speaker_names: true,
            include_timestamps: true,
            merge_same_speaker_segments: false,
            is_single_paragraph: false,
            paragraph_size: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExportPayload {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub presigned_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportStatus {
    Ready(ExportPayload),
    Processing,
    Failed(u16),
}

impl ExportStatus {
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        match status {
            200 => {
                let payload = if body.is_empty() {
                    ExportPayload::default()
                } else {
                    serde_json::from_slice(body).unwrap_or_default()
                };
                ExportStatus::Ready(payload)
            }
            202 => ExportStatus::Processing,
            other => ExportStatus::Failed(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_status_from_codes() {
        assert_eq!(
            ExportStatus::from_response(200, br#"{"content":"hello"}"#),
            ExportStatus::Ready(ExportPayload {
                content: Some("hello".to_string()),
                presigned_url: None,
            })
        );
        assert_eq!(
            ExportStatus::from_response(200, b""),
            ExportStatus::Ready(ExportPayload::default())
        );
        assert_eq!(ExportStatus::from_response(202, b"{}"), ExportStatus::Processing);
        assert_eq!(ExportStatus::from_response(404, b"nope"), ExportStatus::Failed(404));
    }

    #[test]
    fn export_request_defaults_match_txt_export() {
        let body = serde_json::to_value(ExportRequest::default()).unwrap();
        assert_eq!(body["export_type"], "txt");
        assert_eq!(body["paragraph_size"], 4);
        assert_eq!(body["merge_same_speaker_segments"], false);
    }
}
