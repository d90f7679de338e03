//! Whisper-compatible speech-to-text over `/audio/transcriptions`.

use async_trait::async_trait;
use serde::Deserialize;
use threadbot_core::error::ProviderError;
use threadbot_core::provider::Transcriber;
use tracing::{debug, warn};

/// Transcribes audio attachments through an OpenAI-compatible endpoint.
pub struct WhisperTranscriber {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl WhisperTranscriber {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
    ) -> std::result::Result<String, ProviderError> {
        debug!(model = %self.model, filename, bytes = audio.len(), "Transcribing audio");

        let part = reqwest::multipart::Part::bytes(audio).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid transcription API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Transcription failed");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let parsed: TranscriptionResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse transcription: {e}"),
            })?;

        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_url() {
        let t = WhisperTranscriber::new("http://localhost:9000/v1/", "k", "whisper-1");
        assert_eq!(t.endpoint(), "http://localhost:9000/v1/audio/transcriptions");
    }

    #[test]
    fn parse_transcription_response() {
        let parsed: TranscriptionResponse =
            serde_json::from_str(r#"{"text":"turn on the lights"}"#).unwrap();
        assert_eq!(parsed.text, "turn on the lights");
    }
}
