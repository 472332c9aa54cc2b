//! Session summary aggregator

use crate::core::ScoreLedger;
use crate::types::{CategorySummary, SessionSummary};

/// round(100 * hit / (hit + miss)), halves rounding up; 0 with no attempts
pub fn accuracy_percent(hit: u32, miss: u32) -> u8 {
    let total = u64::from(hit) + u64::from(miss);
    if total == 0 {
        return 0;
    }
    ((200 * u64::from(hit) + total) / (2 * total)) as u8
}

/// Reduce a frozen ledger to the per-category report
pub fn summarize(ledger: &ScoreLedger) -> SessionSummary {
    let categories: Vec<CategorySummary> = ledger
        .snapshot()
        .into_iter()
        .map(|row| CategorySummary {
            category: row.category,
            hit: row.hit,
            miss: row.miss,
            accuracy_percent: accuracy_percent(row.hit, row.miss),
        })
        .collect();
    let total_hit = ledger.total_hits();
    let total_miss = ledger.total_misses();

    SessionSummary {
        categories,
        total_hit,
        total_miss,
        overall_accuracy_percent: accuracy_percent(total_hit, total_miss),
    }
}
