//! Application configuration
//!
//! Loading order:
//! 1. `brick_hospital.toml` (`BRICK_HOSPITAL_CONFIG`, else the working
//!    directory, else built-in defaults)
//! 2. Environment variables
//! 3. CLI flags, applied by the binary

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{
    Category, CategoryPolicy, InputMode, MissAttribution, SequenceEnd, SerialSettings, SessionConfig,
};
use crate::{
    DEFAULT_INTERVAL_SECS, DEFAULT_PRACTICE_MINUTES, DEFAULT_SLOT_COUNT, SERIAL_BAUD_RATE,
    SERIAL_READ_TIMEOUT_MS, STATUS_LOG_MAX_LINES,
};

pub const CONFIG_FILE_NAME: &str = "brick_hospital.toml";
pub const CONFIG_PATH_ENV: &str = "BRICK_HOSPITAL_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionSection,
    pub serial: SerialSection,
    pub server: ServerSection,
    pub storage: StorageSection,
    pub backend: BackendSection,
}

/// Which vocabulary the grid uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySet {
    #[default]
    Colors,
    Shapes,
}

impl CategorySet {
    pub fn categories(&self) -> Vec<Category> {
        match self {
            CategorySet::Colors => Category::colors(),
            CategorySet::Shapes => Category::shapes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub practice_minutes: u32,
    pub interval_seconds: u32,
    pub slot_count: usize,
    pub policy: CategoryPolicy,
    pub categories: CategorySet,
    pub sequence_end: SequenceEnd,
    pub miss_attribution: MissAttribution,
    pub input_mode: InputMode,
    pub seed: Option<u64>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            practice_minutes: DEFAULT_PRACTICE_MINUTES,
            interval_seconds: DEFAULT_INTERVAL_SECS,
            slot_count: DEFAULT_SLOT_COUNT,
            policy: CategoryPolicy::Sequence,
            categories: CategorySet::Colors,
            sequence_end: SequenceEnd::Wrap,
            miss_attribution: MissAttribution::Active,
            input_mode: InputMode::Direct,
            seed: None,
        }
    }
}

impl SessionSection {
    pub fn to_session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::from_minutes(self.practice_minutes, self.interval_seconds, self.policy)
            .with_categories(self.categories.categories())
            .with_slot_count(self.slot_count)
            .with_sequence_end(self.sequence_end)
            .with_miss_attribution(self.miss_attribution)
            .with_input_mode(self.input_mode);
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    /// Device name to use instead of auto-picking
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub assert_control_lines: bool,
    pub status_log_lines: usize,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: SERIAL_BAUD_RATE,
            read_timeout_ms: SERIAL_READ_TIMEOUT_MS,
            assert_control_lines: true,
            status_log_lines: STATUS_LOG_MAX_LINES,
        }
    }
}

impl SerialSection {
    pub fn settings(&self) -> SerialSettings {
        SerialSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            read_timeout_ms: self.read_timeout_ms,
            assert_control_lines: self.assert_control_lines,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub addr: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Local JSON store (last user id, finished games)
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("brick_hospital.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// User directory base URL; offline when unset
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl BackendSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    pub fn server_addr(&self) -> ConfigResult<SocketAddr> {
        self.server
            .addr
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.addr '{}' is not host:port", self.server.addr)))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.session.to_session_config().validate()?;
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must be positive".to_string()));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("serial.read_timeout_ms must be positive".to_string()));
        }
        if self.serial.status_log_lines == 0 {
            return Err(ConfigError::Invalid("serial.status_log_lines must be positive".to_string()));
        }
        self.server_addr()?;
        if self.backend.url.is_some() && self.backend.api_key.is_none() {
            return Err(ConfigError::Invalid("backend.url is set but backend.api_key is missing".to_string()));
        }
        Ok(())
    }
}

/// Config file to read, if any
///
/// `BRICK_HOSPITAL_CONFIG` must point at an existing file; otherwise the
/// working directory is checked and `None` means built-in defaults.
pub fn find_config_file() -> ConfigResult<Option<PathBuf>> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::FileNotFound(path));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    Ok(local.exists().then_some(local))
}

pub fn parse_config(content: &str) -> ConfigResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

/// Load, apply environment overrides and validate
///
/// An explicit `config_path` must exist.
pub fn load_config(config_path: Option<&Path>) -> ConfigResult<AppConfig> {
    let file = match config_path {
        Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file()?,
    };

    let mut config = match &file {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            parse_config(&fs::read_to_string(path)?)?
        }
        None => {
            debug!("no config file, using defaults");
            AppConfig::default()
        }
    };

    apply_environment_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

pub fn apply_environment_overrides(config: &mut AppConfig) {
    if let Ok(value) = env::var("BRICK_HOSPITAL_SERIAL_PORT") {
        config.serial.port = Some(value);
    }
    if let Ok(value) = env::var("BRICK_HOSPITAL_BACKEND_URL") {
        config.backend.url = Some(value);
    }
    if let Ok(value) = env::var("BRICK_HOSPITAL_API_KEY") {
        config.backend.api_key = Some(value);
    }
    if let Ok(value) = env::var("BRICK_HOSPITAL_ADDR") {
        config.server.addr = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(parse_config("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_config(
            r#"
            [session]
            practice_minutes = 3
            interval_seconds = 10
            policy = "random"
            categories = "shapes"
            sequence_end = "terminate"
            seed = 7

            [serial]
            port = "/dev/ttyACM0"
            "#,
        )
        .unwrap();

        let session = config.session.to_session_config();
        assert_eq!(session.practice_seconds, 180);
        assert_eq!(session.interval_seconds, 10);
        assert_eq!(session.policy, CategoryPolicy::Random);
        assert_eq!(session.categories, Category::shapes());
        assert_eq!(session.sequence_end, SequenceEnd::Terminate);
        assert_eq!(session.seed, Some(7));
        assert_eq!(session.slot_count, DEFAULT_SLOT_COUNT);

        let serial = config.serial.settings();
        assert_eq!(serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(serial.baud_rate, SERIAL_BAUD_RATE);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(parse_config("[session\n"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.session.interval_seconds = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Session(_))));
    }

    #[test]
    fn test_validate_requires_api_key_with_url() {
        let mut config = AppConfig::default();
        config.backend.url = Some("https://db.example".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[server]\naddr = \"0.0.0.0:9000\"\n").unwrap();

        env::set_var("BRICK_HOSPITAL_ADDR", "127.0.0.1:9100");
        env::set_var("BRICK_HOSPITAL_SERIAL_PORT", "COM7");
        let config = load_config(Some(&path));
        env::remove_var("BRICK_HOSPITAL_ADDR");
        env::remove_var("BRICK_HOSPITAL_SERIAL_PORT");

        let config = config.unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:9100");
        assert_eq!(config.serial.port.as_deref(), Some("COM7"));
    }
}
