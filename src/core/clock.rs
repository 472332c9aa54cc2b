//! Trial clock: session timer + slot timer
//!
//! Both timers only *send* events into the session queue; they never touch
//! session state. The slot timer is replaced on every slot transition, and a
//! timeout that was already queued before the replacement carries an old arm
//! id, which the state machine ignores.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::trace;

use crate::types::SessionEvent;

/// Timer tasks feeding one session
#[derive(Debug)]
pub struct TrialClock {
    events: mpsc::UnboundedSender<SessionEvent>,
    tick_period: Duration,
    session_task: Option<JoinHandle<()>>,
    slot_task: Option<JoinHandle<()>>,
}

impl TrialClock {
    /// Clock sending into `events`, ticking every `tick_period`
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>, tick_period: Duration) -> Self {
        Self {
            events,
            tick_period,
            session_task: None,
            slot_task: None,
        }
    }

    /// Start sending `Tick` once per period (first tick one period from now)
    pub fn start_session_timer(&mut self) {
        if let Some(task) = self.session_task.take() {
            task.abort();
        }
        let events = self.events.clone();
        let period = self.tick_period;
        self.session_task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(SessionEvent::Tick).is_err() {
                    break;
                }
            }
        }));
    }

    /// Replace the pending slot timer with one for `arm`
    pub fn arm_slot(&mut self, arm: u64, after: Duration) {
        self.cancel_slot();
        let events = self.events.clone();
        trace!(arm, ?after, "slot timer armed");
        self.slot_task = Some(tokio::spawn(async move {
            sleep(after).await;
            let _ = events.send(SessionEvent::SlotTimeout { arm });
        }));
    }

    pub fn cancel_slot(&mut self) {
        if let Some(task) = self.slot_task.take() {
            task.abort();
        }
    }

    /// Stop both timers
    pub fn cancel_all(&mut self) {
        self.cancel_slot();
        if let Some(task) = self.session_task.take() {
            task.abort();
        }
    }
}

impl Drop for TrialClock {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_session_timer_ticks_every_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = TrialClock::new(tx, Duration::from_secs(1));
        clock.start_session_timer();

        sleep(Duration::from_millis(3500)).await;
        clock.cancel_all();

        let mut ticks = 0;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event, SessionEvent::Tick);
            ticks += 1;
        }
        assert_eq!(ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_cancels_previous_slot_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = TrialClock::new(tx, Duration::from_secs(1));

        clock.arm_slot(1, Duration::from_secs(5));
        sleep(Duration::from_secs(3)).await;
        clock.arm_slot(2, Duration::from_secs(5));
        sleep(Duration::from_secs(6)).await;

        assert_eq!(rx.try_recv().unwrap(), SessionEvent::SlotTimeout { arm: 2 });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_silences_clock() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = TrialClock::new(tx, Duration::from_secs(1));
        clock.start_session_timer();
        clock.arm_slot(1, Duration::from_secs(2));
        clock.cancel_all();

        sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
