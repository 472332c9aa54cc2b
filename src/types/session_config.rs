//! Session parameters

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::SessionConfigError;
use crate::types::Category;
use crate::{DEFAULT_INTERVAL_SECS, DEFAULT_PRACTICE_MINUTES, DEFAULT_SLOT_COUNT};

/// How the next active category is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryPolicy {
    /// Always the first configured category
    Fixed,
    /// `categories[slot % len]`
    #[default]
    Sequence,
    /// Uniform draw on every slot
    Random,
}

impl FromStr for CategoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(CategoryPolicy::Fixed),
            "sequence" => Ok(CategoryPolicy::Sequence),
            "random" => Ok(CategoryPolicy::Random),
            other => Err(format!("unknown category policy '{}' (fixed | sequence | random)", other)),
        }
    }
}

impl fmt::Display for CategoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CategoryPolicy::Fixed => "fixed",
            CategoryPolicy::Sequence => "sequence",
            CategoryPolicy::Random => "random",
        };
        write!(f, "{}", name)
    }
}

/// What happens after the last slot is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceEnd {
    /// Continuous practice: back to slot 0 until the session timer fires
    #[default]
    Wrap,
    /// Fixed-length round: the session ends
    Terminate,
}

/// Which category a wrong tap is charged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissAttribution {
    /// The category that was active
    #[default]
    Active,
    /// The category that was tapped (active one if tapped is not configured)
    Tapped,
}

/// How device colours are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// A device colour acts exactly like a tap
    #[default]
    Direct,
    /// A matching device colour locks the slot; a confirm tap scores it
    LockThenConfirm,
}

/// Immutable parameters of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Total practice time (seconds)
    pub practice_seconds: u32,
    /// Time a slot stays active (seconds)
    pub interval_seconds: u32,
    pub policy: CategoryPolicy,
    pub slot_count: usize,
    pub categories: Vec<Category>,
    #[serde(default)]
    pub sequence_end: SequenceEnd,
    #[serde(default)]
    pub miss_attribution: MissAttribution,
    #[serde(default)]
    pub input_mode: InputMode,
    /// Seed for the random policy; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            practice_seconds: DEFAULT_PRACTICE_MINUTES * 60,
            interval_seconds: DEFAULT_INTERVAL_SECS,
            policy: CategoryPolicy::Sequence,
            slot_count: DEFAULT_SLOT_COUNT,
            categories: Category::colors(),
            sequence_end: SequenceEnd::Wrap,
            miss_attribution: MissAttribution::Active,
            input_mode: InputMode::Direct,
            seed: None,
        }
    }
}

impl SessionConfig {
    /// Build from the level-settings pickers (minutes + seconds)
    pub fn from_minutes(practice_minutes: u32, interval_seconds: u32, policy: CategoryPolicy) -> Self {
        Self {
            practice_seconds: practice_minutes.saturating_mul(60),
            interval_seconds,
            policy,
            ..Self::default()
        }
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_slot_count(mut self, slot_count: usize) -> Self {
        self.slot_count = slot_count;
        self
    }

    pub fn with_sequence_end(mut self, sequence_end: SequenceEnd) -> Self {
        self.sequence_end = sequence_end;
        self
    }

    pub fn with_miss_attribution(mut self, attribution: MissAttribution) -> Self {
        self.miss_attribution = attribution;
        self
    }

    pub fn with_input_mode(mut self, input_mode: InputMode) -> Self {
        self.input_mode = input_mode;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject configurations that can never enter `Running`
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        if self.categories.is_empty() {
            return Err(SessionConfigError::EmptyCategories);
        }
        let mut seen = HashSet::new();
        for c in &self.categories {
            if !seen.insert(*c) {
                return Err(SessionConfigError::DuplicateCategory(c.to_string()));
            }
        }
        if self.practice_seconds == 0 {
            return Err(SessionConfigError::ZeroDuration);
        }
        if self.interval_seconds == 0 {
            return Err(SessionConfigError::ZeroInterval);
        }
        if self.slot_count == 0 {
            return Err(SessionConfigError::ZeroSlots);
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_seconds))
    }

    pub fn contains(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;

    #[test]
    fn test_default_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_categories() {
        let config = SessionConfig::default().with_categories(vec![]);
        assert_eq!(config.validate(), Err(SessionConfigError::EmptyCategories));
    }

    #[test]
    fn test_rejects_duplicates() {
        let config = SessionConfig::default()
            .with_categories(vec![Color::Red.into(), Color::Red.into()]);
        assert_eq!(
            config.validate(),
            Err(SessionConfigError::DuplicateCategory("RED".to_string()))
        );
    }

    #[test]
    fn test_rejects_non_positive_timing() {
        let mut config = SessionConfig::default();
        config.interval_seconds = 0;
        assert_eq!(config.validate(), Err(SessionConfigError::ZeroInterval));

        let config = SessionConfig::from_minutes(0, 5, CategoryPolicy::Fixed);
        assert_eq!(config.validate(), Err(SessionConfigError::ZeroDuration));

        let config = SessionConfig::default().with_slot_count(0);
        assert_eq!(config.validate(), Err(SessionConfigError::ZeroSlots));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("Random".parse::<CategoryPolicy>().unwrap(), CategoryPolicy::Random);
        assert!("shuffle".parse::<CategoryPolicy>().is_err());
    }

    #[test]
    fn test_json_defaults_for_optional_policies() {
        let json = r#"{
            "practice_seconds": 60,
            "interval_seconds": 5,
            "policy": "fixed",
            "slot_count": 15,
            "categories": ["RED", "BLUE"]
        }"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.sequence_end, SequenceEnd::Wrap);
        assert_eq!(config.input_mode, InputMode::Direct);
        assert_eq!(config.categories.len(), 2);
    }
}
