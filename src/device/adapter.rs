//! micro:bit adapter state machine
//!
//! Scans for a serial-capable device, obtains permission, opens the link and
//! runs a blocking reader on the tokio blocking pool. Recognised colour
//! tokens come out of [`DeviceAdapter::next_event`]; everything else lands in
//! the status log. Failures never escape as errors: they become an
//! [`AdapterState`] plus status lines.

use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::device::{
    PermissionBroker, SerialBackend, SerialLink, StatusLog, SystemPermissions, SystemSerialBackend,
    TokenDecoder,
};
use crate::error::DeviceError;
use crate::types::{
    AdapterState, Color, DecodedToken, DeviceEvent, DeviceInfo, DeviceStatus, PermissionResult,
    SerialSettings,
};
use crate::{MICROBIT_VENDOR_ID, SERIAL_READ_BUFFER};

/// Message from the reader thread
#[derive(Debug)]
enum ReaderMessage {
    Token(DecodedToken),
    ReadFailed(String),
}

/// What the adapter woke up for
enum Incoming {
    Permission(PermissionResult),
    PermissionClosed,
    Reader(ReaderMessage),
    ReaderClosed,
}

/// A running blocking reader
struct ReaderTask {
    cancel: Arc<AtomicBool>,
    messages: mpsc::UnboundedReceiver<ReaderMessage>,
    join: JoinHandle<()>,
}

pub struct DeviceAdapter {
    backend: Arc<dyn SerialBackend>,
    permissions: Arc<dyn PermissionBroker>,
    settings: SerialSettings,
    state: AdapterState,
    discovered: Vec<DeviceInfo>,
    chosen: Option<DeviceInfo>,
    permission_granted: bool,
    connection_open: bool,
    last_color: Option<Color>,
    log: StatusLog,
    permission_listener: Option<mpsc::UnboundedReceiver<PermissionResult>>,
    reader: Option<ReaderTask>,
    /// Readers cancelled but not yet joined
    stopping: Vec<JoinHandle<()>>,
    /// Republished on every status line
    status_tx: watch::Sender<DeviceStatus>,
}

impl std::fmt::Debug for DeviceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceAdapter")
            .field("state", &self.state)
            .field("chosen", &self.chosen)
            .field("permission_granted", &self.permission_granted)
            .field("connection_open", &self.connection_open)
            .field("last_color", &self.last_color)
            .finish_non_exhaustive()
    }
}

impl DeviceAdapter {
    pub fn new(
        backend: Arc<dyn SerialBackend>,
        permissions: Arc<dyn PermissionBroker>,
        settings: SerialSettings,
        log: StatusLog,
    ) -> Self {
        let (status_tx, _) = watch::channel(DeviceStatus {
            state: AdapterState::Idle,
            discovered: 0,
            device: None,
            permission_granted: false,
            connection_open: false,
            last_color: None,
            log: log.lines().map(str::to_string).collect(),
            lines_logged: log.total(),
        });
        Self {
            backend,
            permissions,
            settings,
            state: AdapterState::Idle,
            discovered: Vec::new(),
            chosen: None,
            permission_granted: false,
            connection_open: false,
            last_color: None,
            log,
            permission_listener: None,
            reader: None,
            stopping: Vec::new(),
            status_tx,
        }
    }

    /// Adapter over the OS serial ports
    pub fn system(settings: SerialSettings, log_lines: usize) -> Self {
        Self::new(
            Arc::new(SystemSerialBackend::new()),
            Arc::new(SystemPermissions::new()),
            settings,
            StatusLog::new(log_lines),
        )
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn discovered(&self) -> &[DeviceInfo] {
        &self.discovered
    }

    pub fn chosen(&self) -> Option<&DeviceInfo> {
        self.chosen.as_ref()
    }

    pub fn permission_granted(&self) -> bool {
        self.permission_granted
    }

    pub fn connection_open(&self) -> bool {
        self.connection_open
    }

    pub fn last_color(&self) -> Option<Color> {
        self.last_color
    }

    pub fn log(&self) -> &StatusLog {
        &self.log
    }

    pub fn is_listening(&self) -> bool {
        self.reader.is_some()
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            state: self.state,
            discovered: self.discovered.len(),
            device: self.chosen.as_ref().map(|d| d.name.clone()),
            permission_granted: self.permission_granted,
            connection_open: self.connection_open,
            last_color: self.last_color,
            log: self.log.lines().map(str::to_string).collect(),
            lines_logged: self.log.total(),
        }
    }

    /// Receiver updated with a fresh [`DeviceStatus`] on every status line
    pub fn watch_status(&self) -> watch::Receiver<DeviceStatus> {
        self.status_tx.subscribe()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Scan, pick a device and connect (or wait for permission)
    ///
    /// Must run inside a tokio runtime: the reader lives on the blocking pool.
    pub fn start_listening(&mut self) {
        if self.reader.is_some() {
            self.status_line("Already listening");
            return;
        }
        if self.state == AdapterState::AwaitingPermission {
            self.status_line("Still waiting for USB permission");
            return;
        }

        self.state = AdapterState::Scanning;
        self.discovered = match self.backend.enumerate() {
            Ok(devices) => devices,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        self.status_line(format!("USB devices: {}", self.discovered.len()));
        let lines: Vec<String> = self.discovered.iter().map(DeviceInfo::describe).collect();
        for line in lines {
            self.status_line(line);
        }
        if self.discovered.is_empty() {
            self.stop_with(DeviceError::NoDevices);
            return;
        }

        let Some(device) = pick_device(&self.discovered, self.settings.port.as_deref()) else {
            self.stop_with(DeviceError::NoDriver);
            return;
        };
        self.status_line(format!("Using {}", device.name));
        self.chosen = Some(device.clone());

        if self.permissions.has_permission(&device) {
            self.permission_granted = true;
            self.connect(&device);
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            self.permission_listener = Some(rx);
            self.state = AdapterState::AwaitingPermission;
            self.status_line("Requesting USB permission...");
            self.permissions.request_permission(&device, tx);
        }
    }

    /// Stop reading, close the port and drop any pending permission request
    pub fn stop_listening(&mut self) {
        self.permission_listener = None;
        if let Some(reader) = self.reader.take() {
            reader.cancel.store(true, Ordering::Release);
            self.stopping.push(reader.join);
        }
        self.connection_open = false;
        if self.state != AdapterState::Idle {
            self.state = AdapterState::Disconnected;
        }
        self.status_line("Stopped (not connected)");
    }

    /// [`stop_listening`](Self::stop_listening) and wait until the port is released
    pub async fn shutdown(&mut self) {
        self.stop_listening();
        for join in self.stopping.drain(..) {
            if let Err(e) = join.await {
                warn!("serial reader ended abnormally: {}", e);
            }
        }
    }

    /// Tear down, then scan again
    pub async fn rescan(&mut self) {
        self.shutdown().await;
        self.start_listening();
    }

    /// Wait for the next recognised colour
    ///
    /// Permission answers and unrecognised tokens are handled along the way.
    /// Pends forever when nothing is listening. Cancel-safe.
    pub async fn next_event(&mut self) -> DeviceEvent {
        loop {
            let incoming = tokio::select! {
                result = recv_permission(&mut self.permission_listener) => match result {
                    Some(result) => Incoming::Permission(result),
                    None => Incoming::PermissionClosed,
                },
                message = recv_reader(&mut self.reader) => match message {
                    Some(message) => Incoming::Reader(message),
                    None => Incoming::ReaderClosed,
                },
            };

            match incoming {
                Incoming::Permission(result) => self.on_permission(result),
                Incoming::PermissionClosed => {
                    self.permission_listener = None;
                    if self.state == AdapterState::AwaitingPermission {
                        self.stop_with(DeviceError::PermissionDenied("request abandoned".to_string()));
                    }
                }
                Incoming::Reader(message) => {
                    if let Some(event) = self.on_reader_message(message) {
                        return event;
                    }
                }
                Incoming::ReaderClosed => {
                    if let Some(reader) = self.reader.take() {
                        self.stopping.push(reader.join);
                    }
                    self.connection_open = false;
                    self.state = AdapterState::Disconnected;
                    self.status_line("Reader stopped");
                }
            }
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Apply an answer from the permission broker
    pub fn on_permission(&mut self, result: PermissionResult) {
        let expected = self.chosen.as_ref().map(|d| d.name.as_str());
        if self.state != AdapterState::AwaitingPermission || expected != Some(result.device.as_str()) {
            debug!(device = %result.device, "ignoring stray permission result");
            return;
        }
        self.permission_listener = None;

        if result.granted {
            self.permission_granted = true;
            self.status_line("USB permission granted");
            if let Some(device) = self.chosen.clone() {
                self.connect(&device);
            }
        } else {
            self.fail(DeviceError::PermissionDenied(result.device));
        }
    }

    fn connect(&mut self, device: &DeviceInfo) {
        let mut link = match self.backend.open(device, &self.settings) {
            Ok(link) => link,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        if self.settings.assert_control_lines {
            if let Err(e) = link.set_control_lines(true, true) {
                debug!("DTR/RTS not set: {}", e);
            }
        }

        self.connection_open = true;
        self.state = AdapterState::Connected;
        info!(device = %device.name, baud = self.settings.baud_rate, "serial link open");

        self.spawn_reader(link);
        self.state = AdapterState::Reading;
        self.status_line(format!("Connected ({} baud), reading...", self.settings.baud_rate));
    }

    fn spawn_reader(&mut self, link: Box<dyn SerialLink>) {
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();
        let flag = cancel.clone();
        let backoff = self.settings.read_timeout();
        let join = tokio::task::spawn_blocking(move || read_loop(link, flag, tx, backoff));
        self.reader = Some(ReaderTask {
            cancel,
            messages: rx,
            join,
        });
    }

    fn on_reader_message(&mut self, message: ReaderMessage) -> Option<DeviceEvent> {
        match message {
            ReaderMessage::Token(DecodedToken::Color(color)) => {
                self.last_color = Some(color);
                self.status_line(format!("Received: {}", color.token()));
                Some(DeviceEvent::ColorChanged(color))
            }
            ReaderMessage::Token(DecodedToken::Unrecognized(raw)) => {
                self.status_line(format!("Ignored token: {}", raw));
                None
            }
            ReaderMessage::ReadFailed(reason) => {
                warn!("serial read failed: {}", reason);
                self.status_line(format!("Read failed: {}", reason));
                None
            }
        }
    }

    /// Nothing usable found: stop quietly
    fn stop_with(&mut self, reason: DeviceError) {
        self.state = AdapterState::Disconnected;
        self.status_line(reason.to_string());
        info!("device adapter stopped: {}", reason);
    }

    fn fail(&mut self, error: DeviceError) {
        self.state = AdapterState::Error;
        self.connection_open = false;
        self.status_line(format!("Error: {}", error));
        warn!("device adapter error: {}", error);
    }

    fn status_line(&mut self, line: impl AsRef<str>) {
        debug!(target: "brick_hospital::device", "{}", line.as_ref());
        self.log.push(line);
        self.status_tx.send_replace(self.status());
    }
}

impl Drop for DeviceAdapter {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.cancel.store(true, Ordering::Release);
        }
    }
}

/// The configured port, else a micro:bit, else the first serial-capable device
fn pick_device(devices: &[DeviceInfo], preferred: Option<&str>) -> Option<DeviceInfo> {
    let capable = || devices.iter().filter(|d| d.serial_capable);
    capable()
        .find(|d| preferred == Some(d.name.as_str()))
        .or_else(|| capable().find(|d| d.vendor_id == Some(MICROBIT_VENDOR_ID)))
        .or_else(|| capable().next())
        .cloned()
}

async fn recv_permission(
    listener: &mut Option<mpsc::UnboundedReceiver<PermissionResult>>,
) -> Option<PermissionResult> {
    match listener {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn recv_reader(reader: &mut Option<ReaderTask>) -> Option<ReaderMessage> {
    match reader {
        Some(task) => task.messages.recv().await,
        None => pending().await,
    }
}

/// Blocking loop; the link is dropped (port closed) when it returns
fn read_loop(
    mut link: Box<dyn SerialLink>,
    cancel: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<ReaderMessage>,
    backoff: std::time::Duration,
) {
    let mut decoder = TokenDecoder::new();
    let mut buf = [0u8; SERIAL_READ_BUFFER];

    while !cancel.load(Ordering::Acquire) {
        let messages: Vec<ReaderMessage> = match link.read(&mut buf) {
            Ok(0) => decoder.flush().map(ReaderMessage::Token).into_iter().collect(),
            Ok(n) => decoder.push(&buf[..n]).into_iter().map(ReaderMessage::Token).collect(),
            Err(e) => {
                std::thread::sleep(backoff);
                vec![ReaderMessage::ReadFailed(e.to_string())]
            }
        };
        for message in messages {
            if tx.send(message).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    fn usb(name: &str, vid: u16) -> DeviceInfo {
        DeviceInfo {
            name: name.to_string(),
            vendor_id: Some(vid),
            product_id: Some(0x0204),
            product: None,
            serial_capable: true,
        }
    }

    struct ScriptedLink {
        chunks: VecDeque<Vec<u8>>,
    }

    impl SerialLink for ScriptedLink {
        fn set_control_lines(&mut self, _dtr: bool, _rts: bool) -> Result<(), DeviceError> {
            Ok(())
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

    struct FakeBackend {
        devices: Vec<DeviceInfo>,
        script: Mutex<Vec<Vec<u8>>>,
    }

    impl SerialBackend for FakeBackend {
        fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
            Ok(self.devices.clone())
        }

        fn open(&self, _device: &DeviceInfo, _settings: &SerialSettings) -> Result<Box<dyn SerialLink>, DeviceError> {
            let chunks = std::mem::take(&mut *self.script.lock().unwrap());
            Ok(Box::new(ScriptedLink { chunks: chunks.into() }))
        }
    }

    struct Granted;

    impl PermissionBroker for Granted {
        fn has_permission(&self, _device: &DeviceInfo) -> bool {
            true
        }

        fn request_permission(&self, _device: &DeviceInfo, _reply: mpsc::UnboundedSender<PermissionResult>) {}
    }

    fn adapter(devices: Vec<DeviceInfo>, script: Vec<&[u8]>) -> DeviceAdapter {
        let backend = FakeBackend {
            devices,
            script: Mutex::new(script.into_iter().map(<[u8]>::to_vec).collect()),
        };
        DeviceAdapter::new(
            Arc::new(backend),
            Arc::new(Granted),
            SerialSettings::default(),
            StatusLog::default(),
        )
    }

    #[test]
    fn test_pick_prefers_microbit() {
        let devices = vec![usb("/dev/ttyUSB0", 0x1A86), usb("/dev/ttyACM0", MICROBIT_VENDOR_ID)];
        assert_eq!(pick_device(&devices, None).map(|d| d.name), Some("/dev/ttyACM0".to_string()));
        assert_eq!(
            pick_device(&devices, Some("/dev/ttyUSB0")).map(|d| d.name),
            Some("/dev/ttyUSB0".to_string())
        );
    }

    #[test]
    fn test_pick_skips_non_serial() {
        let mut plain = usb("/dev/ttyS0", 0);
        plain.serial_capable = false;
        assert_eq!(pick_device(&[plain.clone()], Some("/dev/ttyS0")), None);
        let devices = vec![plain, usb("/dev/ttyUSB0", 0x1A86)];
        assert_eq!(pick_device(&devices, None).map(|d| d.name), Some("/dev/ttyUSB0".to_string()));
    }

    #[tokio::test]
    async fn test_no_devices_stops() {
        let mut adapter = adapter(vec![], vec![]);
        adapter.start_listening();

        assert_eq!(adapter.state(), AdapterState::Disconnected);
        assert!(adapter.discovered().is_empty());
        assert!(!adapter.connection_open());
        assert!(adapter.log().lines().any(|l| l == "USB devices: 0"));
    }

    #[tokio::test]
    async fn test_reads_colours_and_skips_unknown() {
        let mut adapter = adapter(vec![usb("/dev/ttyACM0", MICROBIT_VENDOR_ID)], vec![b"PURPLE\nRED\n"]);
        adapter.start_listening();
        assert_eq!(adapter.state(), AdapterState::Reading);

        let event = tokio::time::timeout(Duration::from_secs(5), adapter.next_event())
            .await
            .expect("colour event");
        assert_eq!(event, DeviceEvent::ColorChanged(Color::Red));
        assert_eq!(adapter.last_color(), Some(Color::Red));
        assert!(adapter.log().lines().any(|l| l == "Ignored token: PURPLE"));

        adapter.shutdown().await;
        assert_eq!(adapter.state(), AdapterState::Disconnected);
        assert!(!adapter.is_listening());
    }

    #[tokio::test]
    async fn test_status_published_per_line() {
        let mut adapter = adapter(vec![], vec![]);
        let status = adapter.watch_status();
        assert_eq!(status.borrow().state, AdapterState::Idle);

        adapter.start_listening();
        let published = status.borrow().clone();
        assert_eq!(published, adapter.status());
        assert_eq!(published.state, AdapterState::Disconnected);
        assert_eq!(published.lines_since(0)[0], "USB devices: 0");
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let mut adapter = adapter(vec![usb("/dev/ttyACM0", MICROBIT_VENDOR_ID)], vec![]);
        adapter.start_listening();
        adapter.start_listening();
        assert_eq!(adapter.log().last(), Some("Already listening"));
        adapter.shutdown().await;
    }
}
