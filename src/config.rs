use crate::audio::frame::AudioFormat;
use crate::defaults;
use crate::error::{Result, SigoError};
use crate::pipeline::capture::CaptureConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
    pub remote: RemoteConfig,
}

/// Microphone capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub frame_size: usize,
}

/// Speaker output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub device: Option<String>,
    /// Rate assumed for response audio that carries no MIME type.
    pub sample_rate: u32,
    pub channels: u16,
    /// How often finished segments are reaped.
    pub tick_ms: u64,
}

/// Realtime endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::CAPTURE_SAMPLE_RATE,
            frame_size: defaults::FRAME_SIZE,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::PLAYBACK_SAMPLE_RATE,
            channels: defaults::CHANNELS,
            tick_ms: defaults::PLAYBACK_TICK_MS,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: defaults::REMOTE_URL.to_string(),
            api_key: None,
            model: defaults::REMOTE_MODEL.to_string(),
            voice: defaults::REMOTE_VOICE.to_string(),
            system_instruction: defaults::SYSTEM_INSTRUCTION.to_string(),
            input_transcription: true,
            output_transcription: true,
        }
    }
}

impl AudioConfig {
    pub fn format(&self) -> AudioFormat {
        AudioFormat::mono(self.sample_rate)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            frame_size: self.frame_size,
            format: self.format(),
            ..CaptureConfig::default()
        }
    }
}

impl PlaybackConfig {
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SigoError::ConfigFileNotFound {
                path: path.display().to_string(),
            },
            _ => SigoError::Io(e),
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(SigoError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SIGO_REMOTE_URL → remote.url
    /// - SIGO_API_KEY → remote.api_key
    /// - SIGO_MODEL → remote.model
    /// - SIGO_VOICE → remote.voice
    /// - SIGO_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = non_empty_env("SIGO_REMOTE_URL") {
            self.remote.url = url;
        }
        if let Some(key) = non_empty_env("SIGO_API_KEY") {
            self.remote.api_key = Some(key);
        }
        if let Some(model) = non_empty_env("SIGO_MODEL") {
            self.remote.model = model;
        }
        if let Some(voice) = non_empty_env("SIGO_VOICE") {
            self.remote.voice = voice;
        }
        if let Some(device) = non_empty_env("SIGO_AUDIO_DEVICE") {
            self.audio.device = Some(device);
        }
        self
    }

    /// Check values a session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be greater than zero"));
        }
        if self.audio.frame_size == 0 {
            return Err(invalid("audio.frame_size", "must be greater than zero"));
        }
        if self.playback.sample_rate == 0 {
            return Err(invalid("playback.sample_rate", "must be greater than zero"));
        }
        if self.playback.channels == 0 {
            return Err(invalid("playback.channels", "must be greater than zero"));
        }
        if self.playback.tick_ms == 0 {
            return Err(invalid("playback.tick_ms", "must be greater than zero"));
        }
        let url = self.remote.url.to_ascii_lowercase();
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(invalid(
                "remote.url",
                &format!("'{}' is not a ws:// or wss:// URL", self.remote.url),
            ));
        }
        Ok(())
    }

    /// Copy of this config with the API key masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.remote.api_key.is_some() {
            config.remote.api_key = Some("********".to_string());
        }
        config
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SigoError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/sigo-voice/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("sigo-voice").join("config.toml"))
            .ok_or_else(|| SigoError::Other("Could not determine config directory".to_string()))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn invalid(key: &str, message: &str) -> SigoError {
    SigoError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_sigo_env() {
        for key in [
            "SIGO_REMOTE_URL",
            "SIGO_API_KEY",
            "SIGO_MODEL",
            "SIGO_VOICE",
            "SIGO_AUDIO_DEVICE",
        ] {
            remove_env(key);
        }
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.frame_size, 4096);

        assert_eq!(config.playback.sample_rate, 24000);
        assert_eq!(config.playback.channels, 1);
        assert_eq!(config.playback.tick_ms, 20);

        assert_eq!(config.remote.voice, "Puck");
        assert_eq!(config.remote.api_key, None);
        assert!(config.remote.input_transcription);
        assert!(config.remote.output_transcription);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_temp(
            r#"
            [audio]
            device = "hw:0,0"
            frame_size = 2048

            [playback]
            sample_rate = 16000
            tick_ms = 50

            [remote]
            url = "wss://voice.example.com/live"
            api_key = "secret"
            voice = "Kore"
            output_transcription = false
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.device, Some("hw:0,0".to_string()));
        assert_eq!(config.audio.frame_size, 2048);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.playback.format(), AudioFormat::mono(16000));
        assert_eq!(config.playback.tick(), Duration::from_millis(50));
        assert_eq!(config.remote.url, "wss://voice.example.com/live");
        assert_eq!(config.remote.api_key.as_deref(), Some("secret"));
        assert_eq!(config.remote.voice, "Kore");
        assert!(config.remote.input_transcription);
        assert!(!config.remote.output_transcription);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let temp_file = write_temp(
            r#"
            [remote]
            model = "other-model"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.remote.model, "other-model");
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.playback, PlaybackConfig::default());
        assert_eq!(config.remote.voice, "Puck");
    }

    #[test]
    fn test_capture_config_follows_audio_section() {
        let mut config = Config::default();
        config.audio.frame_size = 1024;
        config.audio.sample_rate = 8000;

        let capture = config.audio.capture_config();
        assert_eq!(capture.frame_size, 1024);
        assert_eq!(capture.format, AudioFormat::mono(8000));
    }

    #[test]
    fn test_env_override_remote() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_sigo_env();

        set_env("SIGO_REMOTE_URL", "wss://override.example/ws");
        set_env("SIGO_API_KEY", "k-123");
        set_env("SIGO_VOICE", "Charon");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.remote.url, "wss://override.example/ws");
        assert_eq!(config.remote.api_key.as_deref(), Some("k-123"));
        assert_eq!(config.remote.voice, "Charon");
        assert_eq!(config.remote.model, defaults::REMOTE_MODEL); // Not overridden

        clear_sigo_env();
    }

    #[test]
    fn test_env_override_device() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_sigo_env();

        set_env("SIGO_AUDIO_DEVICE", "pulse");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.audio.device, Some("pulse".to_string()));

        clear_sigo_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_sigo_env();

        set_env("SIGO_MODEL", "");
        set_env("SIGO_API_KEY", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.remote.model, defaults::REMOTE_MODEL);
        assert_eq!(config.remote.api_key, None);

        clear_sigo_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_temp(
            r#"
            [audio
            device = "broken
        "#,
        );

        let result = Config::load(temp_file.path());
        assert!(matches!(result, Err(SigoError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let missing = Path::new("/tmp/nonexistent_sigo_config_12345.toml");
        assert!(matches!(
            Config::load(missing),
            Err(SigoError::ConfigFileNotFound { .. })
        ));
        assert_eq!(Config::load_or_default(missing).unwrap(), Config::default());
    }

    #[test]
    fn test_load_or_default_rejects_invalid_toml() {
        let temp_file = write_temp("[audio\nframe_size = ");
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.audio.frame_size = 0;
        match config.validate() {
            Err(SigoError::ConfigInvalidValue { key, .. }) => assert_eq!(key, "audio.frame_size"),
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }

        let mut config = Config::default();
        config.playback.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_websocket_url() {
        let mut config = Config::default();
        config.remote.url = "https://voice.example.com".to_string();
        assert!(config.validate().is_err());

        config.remote.url = "WSS://voice.example.com".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redacted_masks_api_key() {
        let mut config = Config::default();
        assert_eq!(config.redacted().remote.api_key, None);

        config.remote.api_key = Some("secret".to_string());
        let shown = config.redacted().to_toml_string().unwrap();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("[remote]"));
    }

    #[test]
    fn test_toml_output_loads_back() {
        let mut config = Config::default();
        config.remote.voice = "Kore".to_string();
        let temp_file = write_temp(&config.to_toml_string().unwrap());
        assert_eq!(Config::load(temp_file.path()).unwrap(), config);
    }

    #[test]
    fn test_default_path_ends_with_app_dir() {
        if let Ok(path) = Config::default_path() {
            assert!(path.ends_with("sigo-voice/config.toml"));
        }
    }
}
