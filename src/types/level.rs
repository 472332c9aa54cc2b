//! Level presets and the level-settings picker values

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::{CategoryPolicy, SequenceEnd, SessionConfig};

/// Practice duration choices (minutes)
pub const PRACTICE_MINUTE_CHOICES: [u32; 7] = [3, 5, 10, 15, 20, 25, 30];

/// Slot interval choices (seconds)
pub const INTERVAL_CHOICES: [u32; 5] = [5, 10, 15, 20, 25];

/// Built-in levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    L1,
    L2,
    L3,
}

/// Fixed-length round definition for a level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelPreset {
    pub level: Level,
    pub id: u32,
    pub time_limit_secs: u32,
    pub target_count: usize,
    pub title: String,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::L1, Level::L2, Level::L3];

    pub fn id(&self) -> u32 {
        match self {
            Level::L1 => 1,
            Level::L2 => 2,
            Level::L3 => 3,
        }
    }

    pub fn preset(&self) -> LevelPreset {
        let (time_limit_secs, target_count) = match self {
            Level::L1 => (60, 10),
            Level::L2 => (60, 10),
            Level::L3 => (90, 15),
        };
        LevelPreset {
            level: *self,
            id: self.id(),
            time_limit_secs,
            target_count,
            title: format!("關卡 {}", self.id()),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L1" | "1" => Ok(Level::L1),
            "L2" | "2" => Ok(Level::L2),
            "L3" | "3" => Ok(Level::L3),
            other => Err(format!("unknown level '{}' (L1 | L2 | L3)", other)),
        }
    }
}

impl LevelPreset {
    /// A fixed-length round: the slot interval is the time limit spread
    /// over the targets, and the session ends after the last target
    pub fn session_config(&self, policy: CategoryPolicy) -> SessionConfig {
        let interval = (self.time_limit_secs / self.target_count.max(1) as u32).max(1);
        SessionConfig {
            practice_seconds: self.time_limit_secs,
            interval_seconds: interval,
            policy,
            slot_count: self.target_count,
            sequence_end: SequenceEnd::Terminate,
            ..SessionConfig::default()
        }
    }
}

/// Difficulty stars shown for an interval choice
pub fn difficulty_stars(interval_seconds: u32) -> u8 {
    match interval_seconds {
        25 => 1,
        20 => 2,
        15 => 3,
        10 => 4,
        5 => 5,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let l3 = Level::L3.preset();
        assert_eq!(l3.time_limit_secs, 90);
        assert_eq!(l3.target_count, 15);
        assert_eq!(Level::L1.preset().title, "關卡 1");
    }

    #[test]
    fn test_preset_session_is_fixed_length() {
        let config = Level::L3.preset().session_config(CategoryPolicy::Sequence);
        assert_eq!(config.interval_seconds, 6);
        assert_eq!(config.slot_count, 15);
        assert_eq!(config.sequence_end, SequenceEnd::Terminate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_difficulty_stars() {
        assert_eq!(difficulty_stars(5), 5);
        assert_eq!(difficulty_stars(25), 1);
        assert_eq!(difficulty_stars(7), 2);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("l2".parse::<Level>().unwrap(), Level::L2);
        assert!("L9".parse::<Level>().is_err());
    }
}
