//! Ledger and summary value types

use serde::{Deserialize, Serialize};

use crate::types::Category;

/// Hit/miss counters for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tally {
    pub hit: u32,
    pub miss: u32,
}

impl Tally {
    pub fn attempts(&self) -> u32 {
        self.hit + self.miss
    }
}

/// One ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTally {
    pub category: Category,
    pub hit: u32,
    pub miss: u32,
}

/// One summary row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: Category,
    pub hit: u32,
    pub miss: u32,
    /// round(100 * hit / (hit + miss)), 0 with no attempts
    pub accuracy_percent: u8,
}

/// Per-category accuracy report handed to the summary screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub categories: Vec<CategorySummary>,
    pub total_hit: u32,
    pub total_miss: u32,
    pub overall_accuracy_percent: u8,
}

impl SessionSummary {
    pub fn get(&self, category: Category) -> Option<&CategorySummary> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// Plain text table (one line per category)
    pub fn to_parseable_string(&self) -> String {
        let mut lines: Vec<String> = self
            .categories
            .iter()
            .map(|c| format!("{} hit={} miss={} accuracy={}%", c.category, c.hit, c.miss, c.accuracy_percent))
            .collect();
        lines.push(format!(
            "TOTAL hit={} miss={} accuracy={}%",
            self.total_hit, self.total_miss, self.overall_accuracy_percent
        ));
        lines.join("\n")
    }
}
