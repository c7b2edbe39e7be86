//! services/api/src/adapters/tts.rs
//!
//! Text-to-speech adapters: the primary OpenAI voice, the external
//! voice-synthesis server for cloned speakers, and the fallback wrapper that
//! routes between them per the diary's speaker setting.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use momentbox_core::domain::{AudioFormat, SpeechAudio};
use momentbox_core::ports::{PortError, PortResult, TextToSpeechService};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// The speaker value that always takes the primary path.
pub const DEFAULT_SPEAKER: &str = "default";

//=========================================================================================
// Primary: OpenAI TTS
//=========================================================================================

/// An adapter that implements the `TextToSpeechService` port using the OpenAI TTS API.
#[derive(Clone)]
pub struct OpenAiTtsAdapter {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
}

impl OpenAiTtsAdapter {
    /// Creates a new `OpenAiTtsAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: SpeechModel, voice: Voice) -> Self {
        Self {
            client,
            model,
            voice,
        }
    }
}

#[async_trait]
impl TextToSpeechService for OpenAiTtsAdapter {
    /// Synthesizes MP3 audio for the given text. The speaker argument is
    /// ignored here; the configured voice is used for everyone.
    async fn synthesize(&self, text: &str, _speaker: &str) -> PortResult<SpeechAudio> {
        let request = CreateSpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice: self.voice.clone(),
            ..Default::default()
        };

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .audio()
            .speech()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Upstream(e.to_string()))?;

        Ok(SpeechAudio {
            bytes: response.bytes.to_vec(),
            format: AudioFormat::Mp3,
        })
    }
}

//=========================================================================================
// Secondary: external voice-synthesis server
//=========================================================================================

#[derive(Serialize)]
struct VoiceServerRequest<'a> {
    text: &'a str,
    speaker: &'a str,
}

/// Client for the external voice server that holds the cloned speaker
/// voices. Returns WAV audio; slow synthesis is cut off by the timeout.
#[derive(Clone)]
pub struct VoiceServerTtsAdapter {
    http: reqwest::Client,
    url: String,
}

impl VoiceServerTtsAdapter {
    pub fn new(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl TextToSpeechService for VoiceServerTtsAdapter {
    async fn synthesize(&self, text: &str, speaker: &str) -> PortResult<SpeechAudio> {
        let response = self
            .http
            .post(&self.url)
            .json(&VoiceServerRequest { text, speaker })
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Upstream(format!(
                "voice server returned {status}: {body}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;
        Ok(SpeechAudio {
            bytes: bytes.to_vec(),
            format: AudioFormat::Wav,
        })
    }
}

//=========================================================================================
// Fallback wrapper
//=========================================================================================

/// Routes synthesis by speaker: the default speaker goes straight to the
/// primary voice, custom speakers try the voice server first and fall back
/// to the primary on any failure.
pub struct FallbackTtsAdapter {
    primary: Arc<dyn TextToSpeechService>,
    voice_server: Option<Arc<dyn TextToSpeechService>>,
}

impl FallbackTtsAdapter {
    pub fn new(
        primary: Arc<dyn TextToSpeechService>,
        voice_server: Option<Arc<dyn TextToSpeechService>>,
    ) -> Self {
        Self {
            primary,
            voice_server,
        }
    }
}

#[async_trait]
impl TextToSpeechService for FallbackTtsAdapter {
    async fn synthesize(&self, text: &str, speaker: &str) -> PortResult<SpeechAudio> {
        if speaker != DEFAULT_SPEAKER {
            if let Some(voice_server) = &self.voice_server {
                match voice_server.synthesize(text, speaker).await {
                    Ok(audio) => return Ok(audio),
                    Err(e) => {
                        warn!(%speaker, error = %e, "voice server failed, using primary voice");
                    }
                }
            }
        }
        self.primary.synthesize(text, speaker).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubTts {
        format: AudioFormat,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubTts {
        fn new(format: AudioFormat, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                format,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextToSpeechService for StubTts {
        async fn synthesize(&self, _text: &str, _speaker: &str) -> PortResult<SpeechAudio> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PortError::Upstream("down".to_string()));
            }
            Ok(SpeechAudio {
                bytes: vec![1, 2, 3],
                format: self.format,
            })
        }
    }

    #[tokio::test]
    async fn default_speaker_skips_the_voice_server() {
        let primary = StubTts::new(AudioFormat::Mp3, false);
        let server = StubTts::new(AudioFormat::Wav, false);
        let tts = FallbackTtsAdapter::new(primary.clone(), Some(server.clone()));

        let audio = tts.synthesize("hi", DEFAULT_SPEAKER).await.unwrap();
        assert_eq!(audio.format, AudioFormat::Mp3);
        assert_eq!(server.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn custom_speaker_uses_the_voice_server() {
        let primary = StubTts::new(AudioFormat::Mp3, false);
        let server = StubTts::new(AudioFormat::Wav, false);
        let tts = FallbackTtsAdapter::new(primary.clone(), Some(server.clone()));

        let audio = tts.synthesize("hi", "mom").await.unwrap();
        assert_eq!(audio.format, AudioFormat::Wav);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn voice_server_failure_falls_back_to_primary() {
        let primary = StubTts::new(AudioFormat::Mp3, false);
        let server = StubTts::new(AudioFormat::Wav, true);
        let tts = FallbackTtsAdapter::new(primary.clone(), Some(server.clone()));

        let audio = tts.synthesize("hi", "mom").await.unwrap();
        assert_eq!(audio.format, AudioFormat::Mp3);
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_speaker_without_server_uses_primary() {
        let primary = StubTts::new(AudioFormat::Mp3, false);
        let tts = FallbackTtsAdapter::new(primary.clone(), None);

        let audio = tts.synthesize("hi", "mom").await.unwrap();
        assert_eq!(audio.format, AudioFormat::Mp3);
    }
}
