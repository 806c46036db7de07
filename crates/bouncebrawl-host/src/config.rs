use serde::Deserialize;

use bouncebrawl_core::config::MatchConfig;
use bouncebrawl_core::error::ConfigError;

use crate::session_loop::MatchSessionConfig;

/// Log output format of the host binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Host configuration, loaded from `bouncebrawl.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub tick_rate_hz: u32,
    pub log_format: LogFormat,
    /// Bound of the outbound frame channel. Frames are dropped when the
    /// consumer falls this far behind.
    pub broadcast_buffer: usize,
    /// Broadcast a full snapshot every N ticks. Zero disables it.
    pub snapshot_interval_ticks: u32,
    /// Path of the match config file. When unset the match config is found
    /// through `BOUNCEBRAWL_MATCH_CONFIG` or `config/match.toml`.
    pub match_config: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30,
            log_format: LogFormat::Text,
            broadcast_buffer: 256,
            snapshot_interval_ticks: 0,
            match_config: None,
        }
    }
}

impl HostConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `bouncebrawl.toml` and apply environment overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("bouncebrawl.toml") {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from bouncebrawl.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse bouncebrawl.toml: {e}, using defaults");
                    Self::default()
                },
            },
            Err(_) => {
                tracing::info!("No bouncebrawl.toml found, using defaults");
                Self::default()
            },
        };
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BOUNCEBRAWL_TICK_RATE")
            && let Ok(n) = val.parse::<u32>()
        {
            self.tick_rate_hz = n;
        }
        if let Ok(val) = std::env::var("BOUNCEBRAWL_LOG_FORMAT")
            && let Some(format) = LogFormat::from_name(&val)
        {
            self.log_format = format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > 240 {
            return Err(ConfigError::Invalid(format!(
                "tick_rate_hz must be within 1..=240, got {}",
                self.tick_rate_hz
            )));
        }
        if self.broadcast_buffer == 0 {
            return Err(ConfigError::Invalid("broadcast_buffer must be > 0".into()));
        }
        Ok(())
    }

    pub fn load_match_config(&self) -> MatchConfig {
        match self.match_config.as_deref() {
            Some(path) => MatchConfig::load_from(path),
            None => MatchConfig::load(),
        }
    }

    pub fn session_config(&self) -> MatchSessionConfig {
        MatchSessionConfig {
            tick_rate_hz: self.tick_rate_hz,
            broadcast_buffer: self.broadcast_buffer,
            snapshot_interval_ticks: self.snapshot_interval_ticks,
        }
    }
}
