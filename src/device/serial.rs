//! `serialport`-backed implementations of the device seams

use std::io::{ErrorKind, Read};
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use tokio::sync::mpsc;
use tracing::debug;

use crate::device::{PermissionBroker, SerialBackend, SerialLink};
use crate::error::DeviceError;
use crate::types::{DeviceInfo, PermissionResult, SerialSettings};
use crate::SERIAL_BAUD_RATE;

/// Ports reported by the OS
#[derive(Debug, Default, Clone)]
pub struct SystemSerialBackend;

impl SystemSerialBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SerialBackend for SystemSerialBackend {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let ports = serialport::available_ports().map_err(|e| DeviceError::Enumerate(e.description))?;
        Ok(ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) => DeviceInfo {
                    name: port.port_name,
                    vendor_id: Some(usb.vid),
                    product_id: Some(usb.pid),
                    product: usb.product,
                    serial_capable: true,
                },
                _ => DeviceInfo {
                    name: port.port_name,
                    vendor_id: None,
                    product_id: None,
                    product: None,
                    serial_capable: false,
                },
            })
            .collect())
    }

    fn open(&self, device: &DeviceInfo, settings: &SerialSettings) -> Result<Box<dyn SerialLink>, DeviceError> {
        let port = serialport::new(&device.name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout())
            .open()
            .map_err(|e| DeviceError::Open {
                device: device.name.clone(),
                reason: e.description,
            })?;
        Ok(Box::new(SystemSerialLink { port }))
    }
}

/// Open OS port
pub struct SystemSerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink for SystemSerialLink {
    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> Result<(), DeviceError> {
        self.port.write_data_terminal_ready(dtr)?;
        self.port.write_request_to_send(rts)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(DeviceError::Read(e.to_string())),
        }
    }
}

/// Desktop permissions: access is whatever the OS lets us open
///
/// There is no prompt to show, so a request is answered immediately with
/// the result of the same access check.
#[derive(Debug, Default, Clone)]
pub struct SystemPermissions;

impl SystemPermissions {
    pub fn new() -> Self {
        Self
    }

    /// Only an explicit access refusal counts as "no permission"; any other
    /// failure is left for the real open to report.
    fn can_open(device: &DeviceInfo) -> bool {
        match serialport::new(&device.name, SERIAL_BAUD_RATE).open() {
            Ok(_) => true,
            Err(e) => !matches!(e.kind(), serialport::ErrorKind::Io(ErrorKind::PermissionDenied)),
        }
    }
}

impl PermissionBroker for SystemPermissions {
    fn has_permission(&self, device: &DeviceInfo) -> bool {
        Self::can_open(device)
    }

    fn request_permission(&self, device: &DeviceInfo, reply: mpsc::UnboundedSender<PermissionResult>) {
        let granted = Self::can_open(device);
        debug!(device = %device.name, granted, "permission check");
        let _ = reply.send(PermissionResult {
            device: device.name.clone(),
            granted,
        });
    }
}
