//! Fake serial backends shared by the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use brick_hospital::device::{DeviceAdapter, PermissionBroker, SerialBackend, SerialLink, StatusLog};
use brick_hospital::error::DeviceError;
use brick_hospital::types::{DeviceInfo, PermissionResult, SerialSettings};
use brick_hospital::MICROBIT_VENDOR_ID;

pub fn microbit() -> DeviceInfo {
    DeviceInfo {
        name: "/dev/ttyACM0".to_string(),
        vendor_id: Some(MICROBIT_VENDOR_ID),
        product_id: Some(0x0204),
        product: Some("BBC micro:bit CMSIS-DAP".to_string()),
        serial_capable: true,
    }
}

pub struct ScriptedLink {
    chunks: VecDeque<Vec<u8>>,
    closed: Arc<AtomicBool>,
    close_delay: Duration,
}

impl Drop for ScriptedLink {
    fn drop(&mut self) {
        std::thread::sleep(self.close_delay);
        self.closed.store(true, Ordering::Release);
    }
}

impl SerialLink for ScriptedLink {
    fn set_control_lines(&mut self, _dtr: bool, _rts: bool) -> Result<(), DeviceError> {
        Err(DeviceError::Read("control lines unsupported".to_string()))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        match self.chunks.pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => {
                std::thread::sleep(Duration::from_millis(5));
                Ok(0)
            }
        }
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub devices: Vec<DeviceInfo>,
    pub script: Mutex<Vec<Vec<u8>>>,
    pub fail_open: bool,
    pub opened: Mutex<u32>,
    /// Set once the last opened link is dropped
    pub closed: Arc<AtomicBool>,
    /// How long dropping a link takes
    pub close_delay: Duration,
}

impl FakeBackend {
    pub fn with(devices: Vec<DeviceInfo>, script: &[&[u8]]) -> Self {
        Self {
            devices,
            script: Mutex::new(script.iter().map(|c| c.to_vec()).collect()),
            ..Default::default()
        }
    }
}

impl SerialBackend for FakeBackend {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self.devices.clone())
    }

    fn open(&self, device: &DeviceInfo, _settings: &SerialSettings) -> Result<Box<dyn SerialLink>, DeviceError> {
        if self.fail_open {
            return Err(DeviceError::Open {
                device: device.name.clone(),
                reason: "busy".to_string(),
            });
        }
        *self.opened.lock().unwrap() += 1;
        let chunks = std::mem::take(&mut *self.script.lock().unwrap());
        self.closed.store(false, Ordering::Release);
        Ok(Box::new(ScriptedLink {
            chunks: chunks.into(),
            closed: self.closed.clone(),
            close_delay: self.close_delay,
        }))
    }
}

/// Holds requests until the test answers them
#[derive(Default)]
pub struct DeferredBroker {
    pub granted: bool,
    pub requests: Mutex<Vec<(String, mpsc::UnboundedSender<PermissionResult>)>>,
}

impl DeferredBroker {
    pub fn take_request(&self) -> (String, mpsc::UnboundedSender<PermissionResult>) {
        self.requests.lock().unwrap().pop().expect("permission was requested")
    }
}

impl PermissionBroker for DeferredBroker {
    fn has_permission(&self, _device: &DeviceInfo) -> bool {
        self.granted
    }

    fn request_permission(&self, device: &DeviceInfo, reply: mpsc::UnboundedSender<PermissionResult>) {
        self.requests.lock().unwrap().push((device.name.clone(), reply));
    }
}

pub fn adapter(backend: FakeBackend, broker: Arc<DeferredBroker>) -> (DeviceAdapter, Arc<FakeBackend>) {
    let backend = Arc::new(backend);
    let adapter = DeviceAdapter::new(backend.clone(), broker, SerialSettings::default(), StatusLog::default());
    (adapter, backend)
}

pub fn granted() -> Arc<DeferredBroker> {
    Arc::new(DeferredBroker {
        granted: true,
        ..Default::default()
    })
}
