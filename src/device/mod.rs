//! USB-serial micro:bit input

mod adapter;
mod backend;
mod decode;
mod serial;
mod status_log;

pub use adapter::DeviceAdapter;
pub use backend::{PermissionBroker, SerialBackend, SerialLink};
pub use decode::TokenDecoder;
pub use serial::{SystemPermissions, SystemSerialBackend, SystemSerialLink};
pub use status_log::StatusLog;
