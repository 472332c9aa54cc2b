//! Seams between the adapter and the operating system

use tokio::sync::mpsc;

use crate::error::DeviceError;
use crate::types::{DeviceInfo, PermissionResult, SerialSettings};

/// Enumerates and opens serial devices
pub trait SerialBackend: Send + Sync {
    /// Every attached device, serial-capable or not
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    /// Open `device` at 8N1 with `settings`
    fn open(&self, device: &DeviceInfo, settings: &SerialSettings) -> Result<Box<dyn SerialLink>, DeviceError>;
}

/// An open port; dropping it closes the port
pub trait SerialLink: Send {
    /// Assert DTR/RTS (some boards only stream once these are set)
    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> Result<(), DeviceError>;

    /// Blocking read bounded by the configured timeout; `Ok(0)` on timeout
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;
}

/// OS-level access control for devices
///
/// A request is answered asynchronously through `reply`; the adapter drops
/// its receiver when it unregisters, so late answers go nowhere.
pub trait PermissionBroker: Send + Sync {
    fn has_permission(&self, device: &DeviceInfo) -> bool;

    fn request_permission(&self, device: &DeviceInfo, reply: mpsc::UnboundedSender<PermissionResult>);
}
