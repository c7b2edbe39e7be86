//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub stt_model: String,
    pub tts_voice: String,
    pub chat_model: String,
    /// Base URL of the external voice-synthesis server for custom speakers.
    /// When unset, every speaker falls back to the primary TTS path.
    pub voice_server_url: Option<String>,
    /// Per-request timeout for the voice server; cloned-voice synthesis is
    /// slow, so the default is generous.
    pub voice_server_timeout: Duration,
    pub media_root: PathBuf,
    pub media_base_url: String,
    pub allowed_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let stt_model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let voice_server_url = std::env::var("VOICE_SERVER_URL").ok();
        let voice_server_timeout = parse_timeout_secs(
            "VOICE_SERVER_TIMEOUT_SECS",
            std::env::var("VOICE_SERVER_TIMEOUT_SECS").ok(),
        )?;

        // --- Load Media Storage Settings ---
        let media_root = std::env::var("MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./media"));
        let media_base_url = std::env::var("MEDIA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/api/media/files".to_string());

        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            stt_model,
            tts_voice,
            chat_model,
            voice_server_url,
            voice_server_timeout,
            media_root,
            media_base_url,
            allowed_origin,
        })
    }
}

const DEFAULT_VOICE_SERVER_TIMEOUT_SECS: u64 = 60;

fn parse_timeout_secs(var: &str, value: Option<String>) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(Duration::from_secs(DEFAULT_VOICE_SERVER_TIMEOUT_SECS)),
        Some(raw) => {
            let secs = raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(
                    var.to_string(),
                    format!("'{raw}' is not a number of seconds"),
                )
            })?;
            Ok(Duration::from_secs(secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_server_timeout_defaults_to_60s() {
        let timeout = parse_timeout_secs("VOICE_SERVER_TIMEOUT_SECS", None).unwrap();
        assert_eq!(timeout, Duration::from_secs(60));
    }

    #[test]
    fn voice_server_timeout_reads_seconds() {
        let timeout =
            parse_timeout_secs("VOICE_SERVER_TIMEOUT_SECS", Some("120".to_string())).unwrap();
        assert_eq!(timeout, Duration::from_secs(120));

        let err =
            parse_timeout_secs("VOICE_SERVER_TIMEOUT_SECS", Some("soon".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_, _)));
    }
}
