//! Score ledger: per-category hit/miss counters

use crate::types::{Category, CategoryTally, Tally};

/// Counters for the configured categories, kept in configured order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreLedger {
    rows: Vec<(Category, Tally)>,
}

impl ScoreLedger {
    /// Zeroed counters for every category
    pub fn new(categories: &[Category]) -> Self {
        Self {
            rows: categories.iter().map(|c| (*c, Tally::default())).collect(),
        }
    }

    /// Panics if `category` was not configured
    pub fn record_hit(&mut self, category: Category) {
        self.row_mut(category).hit += 1;
    }

    /// Panics if `category` was not configured
    pub fn record_miss(&mut self, category: Category) {
        self.row_mut(category).miss += 1;
    }

    pub fn get(&self, category: Category) -> Option<Tally> {
        self.rows.iter().find(|(c, _)| *c == category).map(|(_, t)| *t)
    }

    pub fn contains(&self, category: Category) -> bool {
        self.rows.iter().any(|(c, _)| *c == category)
    }

    pub fn snapshot(&self) -> Vec<CategoryTally> {
        self.rows
            .iter()
            .map(|(category, t)| CategoryTally {
                category: *category,
                hit: t.hit,
                miss: t.miss,
            })
            .collect()
    }

    pub fn total_hits(&self) -> u32 {
        self.rows.iter().map(|(_, t)| t.hit).sum()
    }

    pub fn total_misses(&self) -> u32 {
        self.rows.iter().map(|(_, t)| t.miss).sum()
    }

    fn row_mut(&mut self, category: Category) -> &mut Tally {
        match self.rows.iter_mut().find(|(c, _)| *c == category) {
            Some((_, tally)) => tally,
            None => panic!("category {} is not part of this session", category),
        }
    }
}
