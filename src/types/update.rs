//! Snapshots and updates published by a running session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Category, CategoryTally, EndReason, OutcomeCode, Phase, SessionSummary};

/// Full observable state of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub elapsed_seconds: u32,
    pub practice_seconds: u32,
    pub current_slot: usize,
    pub slot_count: usize,
    /// `None` unless running
    pub active: Option<Category>,
    /// Slot locked by a device colour (lock-then-confirm mode)
    pub locked: bool,
    pub ledger: Vec<CategoryTally>,
    pub resolved_slots: u32,
    pub end_reason: Option<EndReason>,
}

/// Output emitted after each processed event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpdate {
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// What the event did
    pub outcome: OutcomeCode,
    /// State after the event
    pub snapshot: SessionSnapshot,
}

impl SessionUpdate {
    pub fn new(outcome: OutcomeCode, snapshot: SessionSnapshot) -> Self {
        Self {
            timestamp: Utc::now(),
            outcome,
            snapshot,
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let s = &self.snapshot;
        let active = match s.active {
            Some(Category::Color(c)) => format!("{}{}{}", c.color_code(), c.token(), Phase::color_reset()),
            Some(other) => other.to_string(),
            None => "-".to_string(),
        };
        format!(
            "{}[{}]{} t={}/{}s | slot={}/{} | active={}{} | {}",
            s.phase.color_code(),
            s.phase,
            Phase::color_reset(),
            s.elapsed_seconds,
            s.practice_seconds,
            s.current_slot + 1,
            s.slot_count,
            active,
            if s.locked { " (locked)" } else { "" },
            self.outcome.description()
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        let s = &self.snapshot;
        format!(
            "phase={} | t={}/{}s | slot={}/{} | active={} | locked={} | outcome={}",
            s.phase,
            s.elapsed_seconds,
            s.practice_seconds,
            s.current_slot + 1,
            s.slot_count,
            s.active.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            s.locked,
            self.outcome.code()
        )
    }
}

/// Final result of a session, emitted once after teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub elapsed_seconds: u32,
    pub end_reason: EndReason,
    pub resolved_slots: u32,
    pub summary: SessionSummary,
}
