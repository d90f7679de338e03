//! Completion and transcription providers for threadbot.
//!
//! All providers implement the `threadbot_core::Provider` or
//! `threadbot_core::Transcriber` traits.

pub mod openai_compat;
pub mod whisper;

pub use openai_compat::OpenAiCompatProvider;
pub use whisper::WhisperTranscriber;

use std::sync::Arc;
use threadbot_config::AppConfig;
use threadbot_core::provider::{Provider, Transcriber};

/// Build the completion provider described by `config`.
///
/// A missing key is not an error here; requests fail with an
/// authentication error until `/set-openai-key` supplies one.
pub fn provider_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    if config.provider.api_key.is_none() {
        tracing::warn!("No provider API key configured");
    }
    Arc::new(OpenAiCompatProvider::new(
        "openai",
        &config.provider.api_url,
        config.provider.api_key.clone().unwrap_or_default(),
    ))
}

/// Build the audio transcriber, if a key is available for it.
pub fn transcriber_from_config(config: &AppConfig) -> Option<Arc<dyn Transcriber>> {
    let key = config.transcription_api_key()?;
    Some(Arc::new(WhisperTranscriber::new(
        config.transcription_api_url(),
        key,
        &config.transcription.model,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcriber_requires_a_key() {
        let mut config = AppConfig::default();
        assert!(transcriber_from_config(&config).is_none());

        config.provider.api_key = Some("sk-test".into());
        assert!(transcriber_from_config(&config).is_some());
        assert_eq!(provider_from_config(&config).name(), "openai");
    }
}
