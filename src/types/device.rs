//! Device adapter value types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::Color;
use crate::{SERIAL_BAUD_RATE, SERIAL_READ_TIMEOUT_MS};

/// An attached device as seen during scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// OS device name (e.g. `/dev/ttyACM0`, `COM3`)
    pub name: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub product: Option<String>,
    /// A serial driver can talk to this device
    pub serial_capable: bool,
}

impl DeviceInfo {
    /// Status-log line for this device
    pub fn describe(&self) -> String {
        let hex = |v: Option<u16>| v.map(|v| format!("{:04X}", v)).unwrap_or_else(|| "----".to_string());
        format!("• {} (VID={}, PID={})", self.name, hex(self.vendor_id), hex(self.product_id))
    }
}

/// Adapter state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterState {
    /// Created, not started
    Idle,
    Scanning,
    AwaitingPermission,
    Connected,
    Reading,
    /// Stopped by the owner, or scanning found nothing usable
    Disconnected,
    Error,
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AdapterState::Idle => "IDLE",
            AdapterState::Scanning => "SCANNING",
            AdapterState::AwaitingPermission => "AWAITING_PERMISSION",
            AdapterState::Connected => "CONNECTED",
            AdapterState::Reading => "READING",
            AdapterState::Disconnected => "DISCONNECTED",
            AdapterState::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Asynchronous answer to a permission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionResult {
    pub device: String,
    pub granted: bool,
}

/// Event republished by the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    ColorChanged(Color),
}

/// Line settings for the serial link (8N1 is fixed by the firmware)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Use this device name instead of auto-picking
    #[serde(default)]
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// Assert DTR/RTS after opening
    pub assert_control_lines: bool,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: SERIAL_BAUD_RATE,
            read_timeout_ms: SERIAL_READ_TIMEOUT_MS,
            assert_control_lines: true,
        }
    }
}

impl SerialSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Observable adapter state for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub state: AdapterState,
    pub discovered: usize,
    pub device: Option<String>,
    pub permission_granted: bool,
    pub connection_open: bool,
    pub last_color: Option<Color>,
    /// Retained status lines, oldest first
    pub log: Vec<String>,
    /// Lines ever logged; retained lines are the newest `log.len()` of them
    pub lines_logged: u64,
}

impl DeviceStatus {
    /// Lines logged after `seen` lines had been observed (bounded by what is retained)
    pub fn lines_since(&self, seen: u64) -> &[String] {
        let fresh = self.lines_logged.saturating_sub(seen).min(self.log.len() as u64) as usize;
        &self.log[self.log.len() - fresh..]
    }

    pub fn last_line(&self) -> Option<&str> {
        self.log.last().map(String::as_str)
    }
}
