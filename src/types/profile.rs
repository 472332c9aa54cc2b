//! Backend records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Level, SessionReport};

/// User id used when nobody is logged in
pub const GUEST_USER_ID: &str = "guest";

/// Row of the `user_profiles` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub surname: Option<String>,
    pub phone: Option<String>,
    pub hospital_name: Option<String>,
    pub assigned_doctor: Option<String>,
    pub verification_status: Option<String>,
    pub user_type: Option<String>,
}

/// One finished play-through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub user_id: String,
    pub level: u32,
    pub score: u32,
    pub play_time_seconds: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GameRecord {
    /// Record for a report; the score is the number of hits
    pub fn from_report(report: &SessionReport, user_id: &str, level: Option<Level>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("game_{:x}", now.timestamp_nanos_opt().unwrap_or_default() as u64),
            user_id: user_id.to_string(),
            level: level.map(|l| l.id()).unwrap_or(0),
            score: report.summary.total_hit,
            play_time_seconds: report.elapsed_seconds,
            completed_at: Some(now),
        }
    }
}
