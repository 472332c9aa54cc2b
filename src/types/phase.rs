//! Session phase and input events

use serde::{Deserialize, Serialize};

use crate::types::Category;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Configured, first slot not armed yet
    Idle,
    /// Exactly one slot active
    Running,
    /// Terminal; ledger frozen
    Ended,
}

impl Phase {
    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            Phase::Idle => "\x1b[90m",
            Phase::Running => "\x1b[32m",
            Phase::Ended => "\x1b[36m",
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "IDLE",
            Phase::Running => "RUNNING",
            Phase::Ended => "ENDED",
        };
        write!(f, "{}", name)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    EndGame,
    SessionTimeout,
    SequenceComplete,
}

/// Everything that can happen to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Player tapped the active slot showing `Category`
    Tap(Category),
    /// Player tapped the active slot without naming a category
    Confirm,
    /// Colour reported by the micro:bit
    DeviceColor(Category),
    /// Slot timer fired for the slot armed as `arm`
    SlotTimeout { arm: u64 },
    /// Session timer advanced one second
    Tick,
    /// Session timer expired (external clock)
    SessionTimeout,
    /// Player pressed "end game"
    EndGame,
}
