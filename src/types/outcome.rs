//! Outcome codes for every event the session state machine processes

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why an event changed (or did not change) the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum OutcomeCode {
    // =========================================================================
    // S001: Lifecycle
    // =========================================================================
    /// First slot armed, session running
    S001_SESSION_STARTED,

    // =========================================================================
    // T: Player input
    // =========================================================================
    /// Tapped category matched the active one
    T001_HIT,
    /// Tapped category did not match; miss recorded, slot kept
    T002_WRONG_CATEGORY,
    /// Device colour matched the active slot, slot locked
    T003_LOCKED,
    /// Device colour ignored (no match, or slot already locked)
    T003_DEVICE_IGNORED,
    /// Confirm on a locked slot
    T004_CONFIRM_HIT,
    /// Confirm on an unlocked slot
    T004_CONFIRM_UNLOCKED,
    /// Confirm outside lock-then-confirm mode; nothing recorded
    T004_CONFIRM_IGNORED,

    // =========================================================================
    // C: Clock
    // =========================================================================
    /// Slot expired unresolved
    C001_SLOT_TIMEOUT,
    /// Timeout for a slot that was already resolved
    C002_STALE_TIMEOUT,
    /// Session timer advanced
    C003_TICK,
    /// Practice duration reached
    C004_SESSION_TIMEOUT,

    // =========================================================================
    // E: Ending / rejected
    // =========================================================================
    /// Player ended the game
    E001_END_REQUESTED,
    /// Last slot resolved in fixed-length mode
    E002_SEQUENCE_COMPLETE,
    /// Event before the session started
    E003_NOT_RUNNING,
    /// Event after the session ended
    E004_ALREADY_ENDED,
}

impl OutcomeCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::S001_SESSION_STARTED => "S001_SESSION_STARTED",
            Self::T001_HIT => "T001_HIT",
            Self::T002_WRONG_CATEGORY => "T002_WRONG_CATEGORY",
            Self::T003_LOCKED => "T003_LOCKED",
            Self::T003_DEVICE_IGNORED => "T003_DEVICE_IGNORED",
            Self::T004_CONFIRM_HIT => "T004_CONFIRM_HIT",
            Self::T004_CONFIRM_UNLOCKED => "T004_CONFIRM_UNLOCKED",
            Self::T004_CONFIRM_IGNORED => "T004_CONFIRM_IGNORED",
            Self::C001_SLOT_TIMEOUT => "C001_SLOT_TIMEOUT",
            Self::C002_STALE_TIMEOUT => "C002_STALE_TIMEOUT",
            Self::C003_TICK => "C003_TICK",
            Self::C004_SESSION_TIMEOUT => "C004_SESSION_TIMEOUT",
            Self::E001_END_REQUESTED => "E001_END_REQUESTED",
            Self::E002_SEQUENCE_COMPLETE => "E002_SEQUENCE_COMPLETE",
            Self::E003_NOT_RUNNING => "E003_NOT_RUNNING",
            Self::E004_ALREADY_ENDED => "E004_ALREADY_ENDED",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::S001_SESSION_STARTED => "Session started",
            Self::T001_HIT => "Correct",
            Self::T002_WRONG_CATEGORY => "Wrong target",
            Self::T003_LOCKED => "Colour locked - tap to score",
            Self::T003_DEVICE_IGNORED => "Device colour ignored",
            Self::T004_CONFIRM_HIT => "Locked slot confirmed",
            Self::T004_CONFIRM_UNLOCKED => "Confirmed before lock",
            Self::T004_CONFIRM_IGNORED => "Confirm ignored",
            Self::C001_SLOT_TIMEOUT => "Too slow",
            Self::C002_STALE_TIMEOUT => "Timeout for resolved slot ignored",
            Self::C003_TICK => "Clock tick",
            Self::C004_SESSION_TIMEOUT => "Practice time is up",
            Self::E001_END_REQUESTED => "Game ended",
            Self::E002_SEQUENCE_COMPLETE => "All targets done",
            Self::E003_NOT_RUNNING => "Session not started",
            Self::E004_ALREADY_ENDED => "Session already ended",
        }
    }

    /// Did this outcome resolve the active slot?
    pub fn resolves_slot(&self) -> bool {
        matches!(
            self,
            Self::T001_HIT | Self::T004_CONFIRM_HIT | Self::T004_CONFIRM_UNLOCKED | Self::C001_SLOT_TIMEOUT
        )
    }
}

impl std::fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

/// What the clock must do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDirective {
    /// Leave timers as they are
    Keep,
    /// Replace the pending slot timer
    ArmSlot { arm: u64, after: Duration },
    /// Session over: stop every timer
    CancelAll,
}

/// Result of one `GameSession::handle` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventOutcome {
    pub code: OutcomeCode,
    pub directive: ClockDirective,
}

impl EventOutcome {
    pub fn keep(code: OutcomeCode) -> Self {
        Self { code, directive: ClockDirective::Keep }
    }

    pub fn arm(code: OutcomeCode, arm: u64, after: Duration) -> Self {
        Self { code, directive: ClockDirective::ArmSlot { arm, after } }
    }

    pub fn ended(code: OutcomeCode) -> Self {
        Self { code, directive: ClockDirective::CancelAll }
    }
}
