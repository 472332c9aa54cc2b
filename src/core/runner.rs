//! Async session driver
//!
//! One task owns the `GameSession`, its `TrialClock` and (optionally) the
//! device adapter. Player commands, clock events and device colours are
//! all applied by that task, one at a time. When the session ends the task
//! cancels the clock and shuts the adapter down *before* it summarises, so
//! no late event can reach the frozen ledger.
//!
//! Adapter status is republished on a separate `watch` channel; a rescan is
//! a command like any other, so it never races a colour being applied.

use std::future::pending;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::core::{GameSession, TrialClock};
use crate::device::DeviceAdapter;
use crate::types::{
    Category, ClockDirective, DeviceEvent, DeviceStatus, EndReason, EventOutcome, Phase, SessionEvent, SessionReport,
    SessionSnapshot, SessionUpdate,
};
use crate::TICK_PERIOD_MS;

/// Capacity of the live update channel
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Input queued for the session task
#[derive(Debug)]
enum Command {
    Event {
        event: SessionEvent,
        reply: Option<oneshot::Sender<EventOutcome>>,
    },
    /// Restart the device adapter; replies whether one is attached
    Rescan { reply: Option<oneshot::Sender<bool>> },
}

/// Cloneable fire-and-forget input sender (usable from blocking threads)
#[derive(Debug, Clone)]
pub struct EventSender {
    commands: mpsc::UnboundedSender<Command>,
}

impl EventSender {
    /// Queue an event; `false` once the session task is gone
    pub fn send(&self, event: SessionEvent) -> bool {
        self.commands.send(Command::Event { event, reply: None }).is_ok()
    }

    /// Queue a device rescan; `false` once the session task is gone
    pub fn rescan(&self) -> bool {
        self.commands.send(Command::Rescan { reply: None }).is_ok()
    }

    /// Apply an event and wait for its outcome; `None` once the task is gone
    pub async fn apply(&self, event: SessionEvent) -> Option<EventOutcome> {
        let (reply, outcome) = oneshot::channel();
        self.commands.send(Command::Event { event, reply: Some(reply) }).ok()?;
        outcome.await.ok()
    }
}

/// Builder for a session task
#[derive(Debug)]
pub struct SessionRunner {
    session: GameSession,
    tick_period: Duration,
    device: Option<DeviceAdapter>,
}

impl SessionRunner {
    pub fn new(session: GameSession) -> Self {
        Self {
            session,
            tick_period: Duration::from_millis(TICK_PERIOD_MS),
            device: None,
        }
    }

    /// Override the session timer period
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Feed colours from a micro:bit adapter; the runner starts and tears it down
    pub fn with_device(mut self, device: DeviceAdapter) -> Self {
        self.device = Some(device);
        self
    }

    /// Start the session on the current tokio runtime
    pub fn spawn(self) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(self.session.snapshot());
        let (report_tx, report_rx) = watch::channel(None);
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let device_status = self.device.as_ref().map(DeviceAdapter::watch_status);

        tokio::spawn(run_session(
            self.session,
            self.device,
            self.tick_period,
            commands_rx,
            snapshot_tx,
            updates_tx.clone(),
            report_tx,
        ));

        SessionHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
            report: report_rx,
            updates: updates_tx,
            device_status,
        }
    }
}

/// Owner-side handle of a running session
///
/// Clones share the same session. Once every handle and [`EventSender`] is
/// dropped the command queue closes, which ends the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    report: watch::Receiver<Option<SessionReport>>,
    updates: broadcast::Sender<SessionUpdate>,
    device_status: Option<watch::Receiver<DeviceStatus>>,
}

impl SessionHandle {
    /// Apply an event and wait for its outcome; `None` once the task is gone
    pub async fn send(&self, event: SessionEvent) -> Option<EventOutcome> {
        self.sender().apply(event).await
    }

    /// Rescan the attached adapter and wait for it; `false` without a device
    /// or once the task is gone
    pub async fn rescan(&self) -> bool {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Rescan { reply: Some(reply) }).is_err() {
            return false;
        }
        done.await.unwrap_or(false)
    }

    /// Latest adapter status, if a device is attached
    pub fn device_status(&self) -> Option<DeviceStatus> {
        self.device_status.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Adapter status updates, if a device is attached
    pub fn watch_device(&self) -> Option<watch::Receiver<DeviceStatus>> {
        self.device_status.clone()
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            commands: self.commands.clone(),
        }
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until the first slot is armed (or the session already ended)
    pub async fn started(&self) -> SessionSnapshot {
        let mut rx = self.snapshot.clone();
        let started = match rx.wait_for(|s| s.phase != Phase::Idle).await {
            Ok(snapshot) => Some(snapshot.clone()),
            Err(_) => None,
        };
        started.unwrap_or_else(|| self.snapshot())
    }

    /// Live per-event updates
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Report if the session already ended
    pub fn try_report(&self) -> Option<SessionReport> {
        self.report.borrow().clone()
    }

    /// Receiver that turns `Some` when the session ends
    pub fn reports(&self) -> watch::Receiver<Option<SessionReport>> {
        self.report.clone()
    }

    /// Wait for the session to end; `None` if the task died first
    pub async fn report(&self) -> Option<SessionReport> {
        let mut rx = self.report.clone();
        let result = rx.wait_for(|r| r.is_some()).await;
        result.ok().and_then(|r| r.clone())
    }
}

/// Next colour from the adapter, or never when there is none
async fn next_device_event(device: &mut Option<DeviceAdapter>) -> DeviceEvent {
    match device {
        Some(adapter) => adapter.next_event().await,
        None => pending().await,
    }
}

fn apply_directive(clock: &mut TrialClock, directive: ClockDirective) {
    match directive {
        ClockDirective::Keep => {}
        ClockDirective::ArmSlot { arm, after } => clock.arm_slot(arm, after),
        ClockDirective::CancelAll => clock.cancel_all(),
    }
}

async fn run_session(
    mut session: GameSession,
    mut device: Option<DeviceAdapter>,
    tick_period: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    updates_tx: broadcast::Sender<SessionUpdate>,
    report_tx: watch::Sender<Option<SessionReport>>,
) {
    let (clock_tx, mut clock_rx) = mpsc::unbounded_channel();
    let mut clock = TrialClock::new(clock_tx, tick_period);

    if let Some(adapter) = device.as_mut() {
        adapter.start_listening();
    }

    let started = session.start();
    clock.start_session_timer();
    apply_directive(&mut clock, started.directive);
    publish(&session, started, &snapshot_tx, &updates_tx);

    while session.phase() == Phase::Running {
        let (event, reply) = tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Event { event, reply }) => (event, reply),
                Some(Command::Rescan { reply }) => {
                    let attached = match device.as_mut() {
                        Some(adapter) => {
                            info!("rescanning device");
                            adapter.rescan().await;
                            true
                        }
                        None => false,
                    };
                    if let Some(reply) = reply {
                        let _ = reply.send(attached);
                    }
                    continue;
                }
                None => {
                    info!("session owner went away, ending session");
                    (SessionEvent::EndGame, None)
                }
            },
            Some(event) = clock_rx.recv() => (event, None),
            device_event = next_device_event(&mut device) => match device_event {
                DeviceEvent::ColorChanged(color) => (SessionEvent::DeviceColor(Category::Color(color)), None),
            },
        };

        let outcome = session.handle(event);
        apply_directive(&mut clock, outcome.directive);
        publish(&session, outcome, &snapshot_tx, &updates_tx);
        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    // Teardown before summarising
    clock.cancel_all();
    drop(clock_rx);
    if let Some(mut adapter) = device.take() {
        adapter.shutdown().await;
    }

    let Some(summary) = session.summary() else {
        warn!("session loop left without ending");
        return;
    };
    let report = SessionReport {
        elapsed_seconds: session.elapsed_seconds(),
        end_reason: session.end_reason().unwrap_or(EndReason::EndGame),
        resolved_slots: session.resolved_slots(),
        summary,
    };
    info!(
        elapsed = report.elapsed_seconds,
        hits = report.summary.total_hit,
        misses = report.summary.total_miss,
        accuracy = report.summary.overall_accuracy_percent,
        "session report ready"
    );
    report_tx.send_replace(Some(report));

    // Late player input gets an explicit "already ended"
    commands.close();
    while let Some(command) = commands.recv().await {
        match command {
            Command::Event { event, reply } => {
                let outcome = session.handle(event);
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            Command::Rescan { reply } => {
                if let Some(reply) = reply {
                    let _ = reply.send(false);
                }
            }
        }
    }
}

fn publish(
    session: &GameSession,
    outcome: EventOutcome,
    snapshot_tx: &watch::Sender<SessionSnapshot>,
    updates_tx: &broadcast::Sender<SessionUpdate>,
) {
    let snapshot = session.snapshot();
    snapshot_tx.send_replace(snapshot.clone());
    let _ = updates_tx.send(SessionUpdate::new(outcome.code, snapshot));
}
