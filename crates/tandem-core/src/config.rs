//! Configuration system for tandem.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TANDEM_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/tandem/config.toml
//!   3. ~/.config/tandem/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::profile::{Profile, ProfileSet};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub profiles: ProfilesConfig,
    pub session: SessionConfig,
    pub discovery: DiscoveryConfig,
    pub audio: AudioConfig,
    pub security: SecurityConfig,
    pub stack: StackConfig,
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
}

/// Locally enabled profiles. Seeds the persistent store on first run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    pub voice: bool,
    pub streaming: bool,
    pub control: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session pool capacity.
    pub max_sessions: usize,
    /// A profile connect with no answer inside this window counts as failed.
    pub connect_timeout_ms: u64,
    /// No media start is attempted this long after signaling connects.
    pub media_holdoff_ms: u64,
    /// Bound on close-then-reopen cycles of the media channel.
    pub max_reopen_attempts: u8,
    /// Delay before a fully disconnected session is released.
    pub destroy_delay_ms: u64,
    /// Length of the most-recently-used peer list.
    pub mru_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Length of one broadcast scan window.
    pub inquiry_secs: u64,
    /// Ranked candidate buffer size.
    pub candidate_capacity: usize,
    /// Per-profile capability search timeout.
    pub probe_timeout_ms: u64,
    /// Candidates with a higher path loss are dropped. 255 = no limit.
    pub max_path_loss: u8,
    /// TX power assumed when a peer does not advertise one (dBm).
    pub default_tx_power: i8,
    /// A failed probe for one of these profiles rules the peer out.
    pub blocking_profiles: Vec<Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Upper bitpool bound this encoder accepts.
    pub max_bitpool: u8,
    /// SBC capability bytes 0-1 the encoder supports.
    pub sbc_supported: u16,
    /// SBC capability bytes 0-1 preferred when the peer offers them.
    pub sbc_preferred: u16,
    pub aac_enabled: bool,
    /// AAC capability bytes 0-2 the encoder supports (low 24 bits).
    pub aac_supported: u32,
    /// AAC capability bytes 0-2 preferred (low 24 bits).
    pub aac_preferred: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// PIN candidates, tried in order on legacy pairing.
    pub pins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// TCP address of the radio stack bridge.
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// HTTP control/status port on 127.0.0.1.
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for store files. Empty = $XDG_DATA_HOME/tandem.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Fallback filter when RUST_LOG is unset.
    pub filter: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            voice: true,
            streaming: true,
            control: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 3,
            connect_timeout_ms: 8_000,
            media_holdoff_ms: 500,
            max_reopen_attempts: 2,
            destroy_delay_ms: 100,
            mru_capacity: 8,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            inquiry_secs: 10,
            candidate_capacity: 5,
            probe_timeout_ms: 5_000,
            max_path_loss: 90,
            default_tx_power: 4,
            blocking_profiles: vec![Profile::Streaming],
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_bitpool: 53,
            // all rates/modes | all blocks/subbands/allocations
            sbc_supported: 0xFFFF,
            // 44.1k+48k, joint+stereo | 16 blocks, 8 subbands, loudness
            sbc_preferred: 0x3315,
            aac_enabled: false,
            // MPEG-2/4 LC, 44.1k+48k, 1-2 channels
            aac_supported: 0xC0_018C,
            aac_preferred: 0xC0_0184,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            pins: ["0000", "1234", "8888", "1111"].map(String::from).to_vec(),
        }
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9010".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 9011 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl ProfilesConfig {
    pub fn enabled(&self) -> ProfileSet {
        let mut set = ProfileSet::EMPTY;
        if self.voice {
            set.insert(Profile::Voice);
        }
        if self.streaming {
            set.insert(Profile::Streaming);
        }
        if self.control {
            set.insert(Profile::Control);
        }
        set
    }
}

impl DiscoveryConfig {
    pub fn blocking(&self) -> ProfileSet {
        self.blocking_profiles.iter().copied().collect()
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("tandem")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("tandem")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GatewayConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            GatewayConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TANDEM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&GatewayConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Directory holding the persistent store.
    pub fn store_dir(&self) -> PathBuf {
        if self.store.dir.as_os_str().is_empty() {
            data_dir()
        } else {
            self.store.dir.clone()
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_sessions == 0 {
            return Err(ConfigError::Invalid("session.max_sessions", "must be at least 1".into()));
        }
        if self.session.max_sessions > u16::MAX as usize {
            return Err(ConfigError::Invalid("session.max_sessions", "too large".into()));
        }
        if self.discovery.candidate_capacity == 0 {
            return Err(ConfigError::Invalid("discovery.candidate_capacity", "must be at least 1".into()));
        }
        if self.profiles.enabled().is_empty() {
            return Err(ConfigError::Invalid("profiles", "no profile enabled".into()));
        }
        Ok(())
    }

    /// Apply TANDEM_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TANDEM_SESSION__MAX_SESSIONS") {
            if let Ok(n) = v.parse() {
                self.session.max_sessions = n;
            }
        }
        if let Ok(v) = std::env::var("TANDEM_STACK__ADDR") {
            self.stack.addr = v;
        }
        if let Ok(v) = std::env::var("TANDEM_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Ok(v) = std::env::var("TANDEM_PROFILES__VOICE") {
            self.profiles.voice = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("TANDEM_PROFILES__STREAMING") {
            self.profiles.streaming = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("TANDEM_PROFILES__CONTROL") {
            self.profiles.control = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("TANDEM_STORE__DIR") {
            self.store.dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TANDEM_LOG__FILTER") {
            self.log.filter = v;
        }
    }
}
