//! Brick Hospital: reaction and recognition training core
//!
//! A timed-trial session walks an "active" target across a grid of slots.
//! The patient resolves each slot by tapping it (or by showing the colour on
//! a micro:bit over USB serial) before the slot timer fires. Hits and misses
//! are tallied per category and summarised when the session ends.
//!
//! Layout:
//! - `types`   - value types shared by every layer
//! - `core`    - sequence generator, ledger, clock, state machine, runner, API
//! - `device`  - USB-serial micro:bit adapter
//! - `account` - user id resolution and local persistence

pub mod account;
pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod logging;
pub mod types;

// =============================================================================
// SESSION DEFAULTS [C] - Level settings screen defaults
// =============================================================================

/// Practice duration when none is configured (minutes)
pub const DEFAULT_PRACTICE_MINUTES: u32 = 20;

/// Seconds a slot stays active before it counts as a miss
pub const DEFAULT_INTERVAL_SECS: u32 = 5;

/// Slots in the grid (10 rows x 2 columns)
pub const DEFAULT_SLOT_COUNT: usize = 20;

/// Session timer period (milliseconds)
pub const TICK_PERIOD_MS: u64 = 1000;

// =============================================================================
// SERIAL [C] - Must match the micro:bit firmware
// =============================================================================

/// Baud rate of the micro:bit serial stream
pub const SERIAL_BAUD_RATE: u32 = 115_200;

/// Bounded timeout for each blocking read (milliseconds)
pub const SERIAL_READ_TIMEOUT_MS: u64 = 1000;

/// Read buffer size (bytes)
pub const SERIAL_READ_BUFFER: usize = 64;

/// BBC micro:bit USB vendor id
pub const MICROBIT_VENDOR_ID: u16 = 0x0D28;

/// Lines kept in the adapter status log
pub const STATUS_LOG_MAX_LINES: usize = 14;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
