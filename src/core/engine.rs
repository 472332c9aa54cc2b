//! Game session state machine
//!
//! State transitions:
//! - IDLE → RUNNING: `start()` arms slot 0
//! - RUNNING → RUNNING: hit / timeout advance the slot, wrong tap keeps it
//! - RUNNING → ENDED: end game, session timeout, or last slot in fixed-length mode
//!
//! The machine is synchronous and owns no timers. Each `handle` call returns
//! a `ClockDirective` telling the driver how to re-arm or cancel the clock.

use tracing::{debug, info};

use crate::core::{summarize, ScoreLedger, TargetSequence};
use crate::types::{
    Category, EndReason, EventOutcome, InputMode, MissAttribution, OutcomeCode, Phase, SequenceEnd,
    SessionConfig, SessionEvent, SessionSnapshot, SessionSummary,
};
use crate::error::SessionConfigError;

/// One timed play-through
#[derive(Debug)]
pub struct GameSession {
    /// Immutable parameters
    config: SessionConfig,
    /// Current phase
    phase: Phase,
    /// Category chooser
    sequence: TargetSequence,
    /// Per-category counters
    ledger: ScoreLedger,
    /// Seconds counted by the session timer
    elapsed_seconds: u32,
    /// Active slot index
    current_slot: usize,
    /// Active category (meaningful while running)
    active: Category,
    /// Generation of the pending slot timer
    arm: u64,
    /// Device colour matched the active slot (lock-then-confirm mode)
    locked: bool,
    /// Colour the device showed last; re-checked on every new slot
    device_color: Option<Category>,
    /// Slots resolved by a hit, a timeout or a confirm
    resolved_slots: u32,
    /// Misses from wrong taps (these do not resolve a slot)
    wrong_taps: u32,
    end_reason: Option<EndReason>,
}

impl GameSession {
    /// Validate `config` and build an idle session
    pub fn new(config: SessionConfig) -> Result<Self, SessionConfigError> {
        config.validate()?;
        let sequence = TargetSequence::new(config.policy, config.categories.clone(), config.slot_count, config.seed);
        Ok(Self::with_sequence(config, sequence))
    }

    /// Idle session using a caller-supplied sequence (tests inject sources here)
    pub fn with_sequence(config: SessionConfig, sequence: TargetSequence) -> Self {
        let ledger = ScoreLedger::new(&config.categories);
        let active = config.categories[0];
        Self {
            config,
            phase: Phase::Idle,
            sequence,
            ledger,
            elapsed_seconds: 0,
            current_slot: 0,
            active,
            arm: 0,
            locked: false,
            device_color: None,
            resolved_slots: 0,
            wrong_taps: 0,
            end_reason: None,
        }
    }

    /// Arm the first slot and enter `Running`
    pub fn start(&mut self) -> EventOutcome {
        match self.phase {
            Phase::Idle => {}
            Phase::Running => return EventOutcome::keep(OutcomeCode::S001_SESSION_STARTED),
            Phase::Ended => return EventOutcome::keep(OutcomeCode::E004_ALREADY_ENDED),
        }
        self.phase = Phase::Running;
        self.current_slot = 0;
        self.active = self.sequence.initial();
        self.arm += 1;
        info!(
            slots = self.config.slot_count,
            interval = self.config.interval_seconds,
            practice = self.config.practice_seconds,
            policy = %self.config.policy,
            "session started"
        );
        EventOutcome::arm(OutcomeCode::S001_SESSION_STARTED, self.arm, self.config.interval())
    }

    /// Apply one event
    pub fn handle(&mut self, event: SessionEvent) -> EventOutcome {
        match self.phase {
            Phase::Idle => return EventOutcome::keep(OutcomeCode::E003_NOT_RUNNING),
            Phase::Ended => return EventOutcome::keep(OutcomeCode::E004_ALREADY_ENDED),
            Phase::Running => {}
        }

        let outcome = match event {
            SessionEvent::Tap(category) => self.on_tap(category),
            SessionEvent::DeviceColor(category) => match self.config.input_mode {
                InputMode::Direct => self.on_tap(category),
                InputMode::LockThenConfirm => self.on_device_lock(category),
            },
            SessionEvent::Confirm => self.on_confirm(),
            SessionEvent::SlotTimeout { arm } => self.on_slot_timeout(arm),
            SessionEvent::Tick => self.on_tick(),
            SessionEvent::SessionTimeout => self.end(EndReason::SessionTimeout),
            SessionEvent::EndGame => self.end(EndReason::EndGame),
        };
        debug!(?event, code = outcome.code.code(), slot = self.current_slot, "event handled");
        outcome
    }

    fn on_tap(&mut self, category: Category) -> EventOutcome {
        if category == self.active {
            self.ledger.record_hit(self.active);
            return self.advance(OutcomeCode::T001_HIT);
        }
        let charged = match self.config.miss_attribution {
            MissAttribution::Tapped if self.ledger.contains(category) => category,
            _ => self.active,
        };
        self.ledger.record_miss(charged);
        self.wrong_taps += 1;
        EventOutcome::keep(OutcomeCode::T002_WRONG_CATEGORY)
    }

    fn on_device_lock(&mut self, category: Category) -> EventOutcome {
        self.device_color = Some(category);
        if !self.locked && category == self.active {
            self.locked = true;
            EventOutcome::keep(OutcomeCode::T003_LOCKED)
        } else {
            EventOutcome::keep(OutcomeCode::T003_DEVICE_IGNORED)
        }
    }

    fn on_confirm(&mut self) -> EventOutcome {
        if self.config.input_mode == InputMode::Direct {
            return EventOutcome::keep(OutcomeCode::T004_CONFIRM_IGNORED);
        }
        if self.locked {
            self.ledger.record_hit(self.active);
            self.advance(OutcomeCode::T004_CONFIRM_HIT)
        } else {
            self.ledger.record_miss(self.active);
            self.advance(OutcomeCode::T004_CONFIRM_UNLOCKED)
        }
    }

    fn on_slot_timeout(&mut self, arm: u64) -> EventOutcome {
        if arm != self.arm {
            return EventOutcome::keep(OutcomeCode::C002_STALE_TIMEOUT);
        }
        self.ledger.record_miss(self.active);
        self.advance(OutcomeCode::C001_SLOT_TIMEOUT)
    }

    fn on_tick(&mut self) -> EventOutcome {
        self.elapsed_seconds += 1;
        if self.elapsed_seconds >= self.config.practice_seconds {
            self.end(EndReason::SessionTimeout)
        } else {
            EventOutcome::keep(OutcomeCode::C003_TICK)
        }
    }

    /// Resolve the active slot and move on (or end a fixed-length round)
    fn advance(&mut self, code: OutcomeCode) -> EventOutcome {
        self.resolved_slots += 1;
        self.locked = false;
        let next = self.sequence.next(self.current_slot);
        if next.wrapped && self.config.sequence_end == SequenceEnd::Terminate {
            return self.end(EndReason::SequenceComplete);
        }
        self.current_slot = next.index;
        self.active = next.category;
        // The device may still be showing the new target
        self.locked = self.config.input_mode == InputMode::LockThenConfirm && self.device_color == Some(self.active);
        self.arm += 1;
        EventOutcome::arm(code, self.arm, self.config.interval())
    }

    fn end(&mut self, reason: EndReason) -> EventOutcome {
        self.phase = Phase::Ended;
        self.locked = false;
        self.end_reason = Some(reason);
        info!(
            ?reason,
            elapsed = self.elapsed_seconds,
            hits = self.ledger.total_hits(),
            misses = self.ledger.total_misses(),
            "session ended"
        );
        let code = match reason {
            EndReason::EndGame => OutcomeCode::E001_END_REQUESTED,
            EndReason::SessionTimeout => OutcomeCode::C004_SESSION_TIMEOUT,
            EndReason::SequenceComplete => OutcomeCode::E002_SEQUENCE_COMPLETE,
        };
        EventOutcome::ended(code)
    }

    /// Get current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Active category, only while running
    pub fn active(&self) -> Option<Category> {
        (self.phase == Phase::Running).then_some(self.active)
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    pub fn current_arm(&self) -> u64 {
        self.arm
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn resolved_slots(&self) -> u32 {
        self.resolved_slots
    }

    pub fn wrong_taps(&self) -> u32 {
        self.wrong_taps
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    /// Summary of the ledger; `None` until the session has ended
    pub fn summary(&self) -> Option<SessionSummary> {
        (self.phase == Phase::Ended).then(|| summarize(&self.ledger))
    }

    /// Observable state
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            elapsed_seconds: self.elapsed_seconds,
            practice_seconds: self.config.practice_seconds,
            current_slot: self.current_slot,
            slot_count: self.config.slot_count,
            active: self.active(),
            locked: self.locked,
            ledger: self.ledger.snapshot(),
            resolved_slots: self.resolved_slots,
            end_reason: self.end_reason,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CategoryPolicy, ClockDirective, Color, Tally};
    use std::time::Duration;

    fn red() -> Category {
        Color::Red.into()
    }

    fn blue() -> Category {
        Color::Blue.into()
    }

    fn two_colors(policy: CategoryPolicy, slots: usize) -> SessionConfig {
        SessionConfig::from_minutes(1, 1, policy)
            .with_categories(vec![red(), blue()])
            .with_slot_count(slots)
    }

    fn running(config: SessionConfig) -> GameSession {
        let mut session = GameSession::new(config).unwrap();
        session.start();
        session
    }

    #[test]
    fn test_initial_phase_is_idle() {
        let session = GameSession::new(SessionConfig::default()).unwrap();
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.active(), None);
    }

    #[test]
    fn test_invalid_config_never_builds() {
        let config = SessionConfig::default().with_categories(vec![]);
        assert_eq!(GameSession::new(config).unwrap_err(), SessionConfigError::EmptyCategories);
    }

    #[test]
    fn test_start_arms_first_slot() {
        let mut session = GameSession::new(two_colors(CategoryPolicy::Sequence, 4)).unwrap();
        let outcome = session.start();
        assert_eq!(outcome.code, OutcomeCode::S001_SESSION_STARTED);
        assert_eq!(
            outcome.directive,
            ClockDirective::ArmSlot { arm: 1, after: Duration::from_secs(1) }
        );
        assert_eq!(session.active(), Some(red()));
    }

    #[test]
    fn test_events_before_start_are_rejected() {
        let mut session = GameSession::new(two_colors(CategoryPolicy::Sequence, 4)).unwrap();
        let outcome = session.handle(SessionEvent::Tap(red()));
        assert_eq!(outcome.code, OutcomeCode::E003_NOT_RUNNING);
        assert_eq!(session.ledger().total_hits(), 0);
    }

    #[test]
    fn test_hit_advances_and_rearms() {
        let mut session = running(two_colors(CategoryPolicy::Sequence, 4));
        let outcome = session.handle(SessionEvent::Tap(red()));
        assert_eq!(outcome.code, OutcomeCode::T001_HIT);
        assert!(matches!(outcome.directive, ClockDirective::ArmSlot { arm: 2, .. }));
        assert_eq!(session.current_slot(), 1);
        assert_eq!(session.active(), Some(blue()));
    }

    #[test]
    fn test_wrong_tap_charges_active_and_keeps_slot() {
        let mut session = running(two_colors(CategoryPolicy::Sequence, 4));
        let outcome = session.handle(SessionEvent::Tap(blue()));
        assert_eq!(outcome.code, OutcomeCode::T002_WRONG_CATEGORY);
        assert_eq!(outcome.directive, ClockDirective::Keep);
        assert_eq!(session.ledger().get(red()), Some(Tally { hit: 0, miss: 1 }));
        assert_eq!(session.ledger().get(blue()), Some(Tally::default()));
        assert_eq!(session.current_slot(), 0);
        assert_eq!(session.wrong_taps(), 1);
    }

    #[test]
    fn test_wrong_tap_charges_tapped_when_configured() {
        let config = two_colors(CategoryPolicy::Sequence, 4).with_miss_attribution(MissAttribution::Tapped);
        let mut session = running(config);
        session.handle(SessionEvent::Tap(blue()));
        assert_eq!(session.ledger().get(blue()), Some(Tally { hit: 0, miss: 1 }));
        assert_eq!(session.ledger().get(red()), Some(Tally::default()));

        // Not configured: falls back to the active category
        session.handle(SessionEvent::Tap(Color::Green.into()));
        assert_eq!(session.ledger().get(red()), Some(Tally { hit: 0, miss: 1 }));
    }

    #[test]
    fn test_stale_timeout_after_hit_is_noop() {
        let mut session = running(two_colors(CategoryPolicy::Sequence, 4));
        let first_arm = session.current_arm();
        session.handle(SessionEvent::Tap(red()));

        let outcome = session.handle(SessionEvent::SlotTimeout { arm: first_arm });
        assert_eq!(outcome.code, OutcomeCode::C002_STALE_TIMEOUT);
        assert_eq!(session.ledger().total_misses(), 0);
        assert_eq!(session.resolved_slots(), 1);
        assert_eq!(session.current_slot(), 1);
    }

    #[test]
    fn test_fixed_all_timeouts_terminate() {
        let config = SessionConfig::from_minutes(1, 1, CategoryPolicy::Fixed)
            .with_categories(vec![red()])
            .with_slot_count(5)
            .with_sequence_end(SequenceEnd::Terminate);
        let mut session = running(config);

        for _ in 0..5 {
            let arm = session.current_arm();
            session.handle(SessionEvent::SlotTimeout { arm });
        }

        assert_eq!(session.phase(), Phase::Ended);
        assert_eq!(session.end_reason(), Some(EndReason::SequenceComplete));
        assert_eq!(session.ledger().get(red()), Some(Tally { hit: 0, miss: 5 }));
        let summary = session.summary().unwrap();
        assert_eq!(summary.get(red()).unwrap().accuracy_percent, 0);
    }

    #[test]
    fn test_sequence_all_hits() {
        let config = two_colors(CategoryPolicy::Sequence, 4).with_sequence_end(SequenceEnd::Terminate);
        let mut session = running(config);

        for _ in 0..4 {
            let active = session.active().unwrap();
            session.handle(SessionEvent::Tap(active));
        }

        assert_eq!(session.phase(), Phase::Ended);
        assert_eq!(session.ledger().get(red()), Some(Tally { hit: 2, miss: 0 }));
        assert_eq!(session.ledger().get(blue()), Some(Tally { hit: 2, miss: 0 }));
        let summary = session.summary().unwrap();
        assert_eq!(summary.get(red()).unwrap().accuracy_percent, 100);
        assert_eq!(summary.get(blue()).unwrap().accuracy_percent, 100);
    }

    #[test]
    fn test_wrap_keeps_running() {
        let mut session = running(two_colors(CategoryPolicy::Sequence, 2));
        session.handle(SessionEvent::Tap(red()));
        session.handle(SessionEvent::Tap(blue()));
        assert_eq!(session.phase(), Phase::Running);
        assert_eq!(session.current_slot(), 0);
        assert_eq!(session.active(), Some(red()));
    }

    #[test]
    fn test_session_timer_ends_and_freezes() {
        let mut config = two_colors(CategoryPolicy::Sequence, 20);
        config.practice_seconds = 3;
        let mut session = running(config);

        assert_eq!(session.handle(SessionEvent::Tick).code, OutcomeCode::C003_TICK);
        session.handle(SessionEvent::Tick);
        let outcome = session.handle(SessionEvent::Tick);
        assert_eq!(outcome.code, OutcomeCode::C004_SESSION_TIMEOUT);
        assert_eq!(outcome.directive, ClockDirective::CancelAll);
        assert_eq!(session.phase(), Phase::Ended);

        let frozen = session.ledger().clone();
        let arm = session.current_arm();
        for event in [
            SessionEvent::Tap(red()),
            SessionEvent::SlotTimeout { arm },
            SessionEvent::Tick,
            SessionEvent::Confirm,
            SessionEvent::EndGame,
        ] {
            assert_eq!(session.handle(event).code, OutcomeCode::E004_ALREADY_ENDED);
        }
        assert_eq!(session.ledger(), &frozen);
        assert_eq!(session.elapsed_seconds(), 3);
    }

    #[test]
    fn test_end_game() {
        let mut session = running(two_colors(CategoryPolicy::Sequence, 4));
        let outcome = session.handle(SessionEvent::EndGame);
        assert_eq!(outcome.code, OutcomeCode::E001_END_REQUESTED);
        assert_eq!(session.active(), None);
        assert!(session.summary().is_some());
    }

    #[test]
    fn test_device_color_acts_as_tap_in_direct_mode() {
        let mut session = running(two_colors(CategoryPolicy::Sequence, 4));
        let outcome = session.handle(SessionEvent::DeviceColor(red()));
        assert_eq!(outcome.code, OutcomeCode::T001_HIT);
    }

    #[test]
    fn test_lock_then_confirm() {
        let config = two_colors(CategoryPolicy::Sequence, 4).with_input_mode(InputMode::LockThenConfirm);
        let mut session = running(config);

        assert_eq!(session.handle(SessionEvent::DeviceColor(blue())).code, OutcomeCode::T003_DEVICE_IGNORED);
        assert_eq!(session.handle(SessionEvent::DeviceColor(red())).code, OutcomeCode::T003_LOCKED);
        assert!(session.is_locked());

        assert_eq!(session.handle(SessionEvent::Confirm).code, OutcomeCode::T004_CONFIRM_HIT);
        assert!(!session.is_locked());
        assert_eq!(session.active(), Some(blue()));

        // Confirm before the device locks: miss, still advances
        assert_eq!(session.handle(SessionEvent::Confirm).code, OutcomeCode::T004_CONFIRM_UNLOCKED);
        assert_eq!(session.ledger().get(blue()), Some(Tally { hit: 0, miss: 1 }));
        assert_eq!(session.current_slot(), 2);
    }

    #[test]
    fn test_confirm_ignored_in_direct_mode() {
        let config = SessionConfig::from_minutes(1, 1, CategoryPolicy::Fixed).with_categories(vec![red()]);
        let mut session = running(config);
        let arm = session.current_arm();

        let outcome = session.handle(SessionEvent::Confirm);
        assert_eq!(outcome, EventOutcome::keep(OutcomeCode::T004_CONFIRM_IGNORED));
        assert_eq!(session.ledger().get(red()), Some(Tally { hit: 0, miss: 0 }));
        assert_eq!(session.current_slot(), 0);
        assert_eq!(session.resolved_slots(), 0);
        assert_eq!(session.current_arm(), arm);
    }

    #[test]
    fn test_held_colour_relocks_next_slot() {
        let config = SessionConfig::from_minutes(1, 1, CategoryPolicy::Fixed)
            .with_categories(vec![red(), blue()])
            .with_input_mode(InputMode::LockThenConfirm);
        let mut session = running(config);

        session.handle(SessionEvent::DeviceColor(red()));
        assert_eq!(session.handle(SessionEvent::Confirm).code, OutcomeCode::T004_CONFIRM_HIT);
        // Still showing RED: the new RED slot is locked without a fresh colour event
        assert!(session.is_locked());
        assert_eq!(session.handle(SessionEvent::Confirm).code, OutcomeCode::T004_CONFIRM_HIT);
        assert_eq!(session.ledger().get(red()), Some(Tally { hit: 2, miss: 0 }));

        // The device moved on, so the next slot waits for RED again
        session.handle(SessionEvent::DeviceColor(blue()));
        let arm = session.current_arm();
        session.handle(SessionEvent::SlotTimeout { arm });
        assert!(!session.is_locked());
    }

    #[test]
    fn test_lock_cleared_by_timeout() {
        let config = two_colors(CategoryPolicy::Sequence, 4).with_input_mode(InputMode::LockThenConfirm);
        let mut session = running(config);
        session.handle(SessionEvent::DeviceColor(red()));
        let arm = session.current_arm();
        session.handle(SessionEvent::SlotTimeout { arm });
        assert!(!session.is_locked());
        assert_eq!(session.ledger().get(red()), Some(Tally { hit: 0, miss: 1 }));
    }

    #[test]
    fn test_resolved_slots_match_ledger() {
        let mut session = running(two_colors(CategoryPolicy::Sequence, 6));
        let script = [true, false, true, true, false, false, true];
        for hit in script {
            if hit {
                let active = session.active().unwrap();
                session.handle(SessionEvent::Tap(active));
            } else {
                let arm = session.current_arm();
                session.handle(SessionEvent::SlotTimeout { arm });
            }
            // Exactly one active category while running
            assert!(session.active().is_some());
        }
        let ledger = session.ledger();
        assert_eq!(
            ledger.total_hits() + ledger.total_misses(),
            session.resolved_slots()
        );
        assert_eq!(session.resolved_slots(), script.len() as u32);
    }
}
