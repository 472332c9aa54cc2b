//! Core types for Brick Hospital

mod category;
mod device;
mod level;
mod outcome;
mod phase;
mod profile;
mod session_config;
mod summary;
mod update;

pub use category::{Category, Color, DecodedToken, Shape, UnknownCategory};
pub use device::{AdapterState, DeviceEvent, DeviceInfo, DeviceStatus, PermissionResult, SerialSettings};
pub use level::{difficulty_stars, Level, LevelPreset, INTERVAL_CHOICES, PRACTICE_MINUTE_CHOICES};
pub use outcome::{ClockDirective, EventOutcome, OutcomeCode};
pub use phase::{EndReason, Phase, SessionEvent};
pub use profile::{GameRecord, UserProfile, GUEST_USER_ID};
pub use session_config::{CategoryPolicy, InputMode, MissAttribution, SequenceEnd, SessionConfig};
pub use summary::{CategorySummary, CategoryTally, SessionSummary, Tally};
pub use update::{SessionReport, SessionSnapshot, SessionUpdate};
