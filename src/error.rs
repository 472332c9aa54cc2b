//! Error types
//!
//! Each concern owns one enum. Session configuration errors are fatal at
//! construction; device errors are folded into adapter state and never
//! reach the session.

use std::path::PathBuf;
use thiserror::Error;

/// Rejected `SessionConfig`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionConfigError {
    #[error("category set is empty")]
    EmptyCategories,

    #[error("category {0} is configured more than once")]
    DuplicateCategory(String),

    #[error("practice duration must be positive")]
    ZeroDuration,

    #[error("slot interval must be positive")]
    ZeroInterval,

    #[error("slot count must be positive")]
    ZeroSlots,
}

/// USB-serial failures
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no USB devices detected")]
    NoDevices,

    #[error("no USB serial driver matches the attached devices")]
    NoDriver,

    #[error("USB permission denied for {0}")]
    PermissionDenied(String),

    #[error("failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("read failed: {0}")]
    Read(String),

    #[error("device enumeration failed: {0}")]
    Enumerate(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serialport::Error> for DeviceError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => DeviceError::NoDevices,
            serialport::ErrorKind::Io(kind) => DeviceError::Io(std::io::Error::new(kind, err.description)),
            _ => DeviceError::Read(err.description),
        }
    }
}

/// Application configuration failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),

    #[error(transparent)]
    Session(#[from] SessionConfigError),
}

/// Local key-value store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Backend user lookup failures
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("unexpected response body: {0}")]
    Body(String),

    #[error("no user named {0}")]
    NotFound(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
