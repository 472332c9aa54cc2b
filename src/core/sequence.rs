//! Target sequence generator
//!
//! Picks the category for each slot:
//! - fixed:    always `categories[0]`
//! - sequence: `categories[index % len]`
//! - random:   uniform draw from the injected source

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::types::{Category, CategoryPolicy};

/// Next slot chosen by the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub index: usize,
    pub category: Category,
    /// The sweep ran past the last slot and restarted at 0
    pub wrapped: bool,
}

/// Category chooser for one session
pub struct TargetSequence {
    policy: CategoryPolicy,
    categories: Vec<Category>,
    slot_count: usize,
    rng: Box<dyn RngCore + Send>,
}

impl std::fmt::Debug for TargetSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetSequence")
            .field("policy", &self.policy)
            .field("categories", &self.categories)
            .field("slot_count", &self.slot_count)
            .finish_non_exhaustive()
    }
}

impl TargetSequence {
    /// Generator with a seeded source (entropy when `seed` is `None`)
    pub fn new(policy: CategoryPolicy, categories: Vec<Category>, slot_count: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_source(policy, categories, slot_count, Box::new(rng))
    }

    /// Generator drawing random categories from `rng`
    pub fn with_source(
        policy: CategoryPolicy,
        categories: Vec<Category>,
        slot_count: usize,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        assert!(!categories.is_empty(), "target sequence needs at least one category");
        assert!(slot_count > 0, "target sequence needs at least one slot");
        Self {
            policy,
            categories,
            slot_count,
            rng,
        }
    }

    /// Category for slot 0
    pub fn initial(&mut self) -> Category {
        self.category_for(0)
    }

    /// Slot after `previous`, wrapping modulo the slot count
    pub fn next(&mut self, previous: usize) -> Advance {
        let raw = previous + 1;
        let wrapped = raw >= self.slot_count;
        let index = raw % self.slot_count;
        Advance {
            index,
            category: self.category_for(index),
            wrapped,
        }
    }

    fn category_for(&mut self, index: usize) -> Category {
        match self.policy {
            CategoryPolicy::Fixed => self.categories[0],
            CategoryPolicy::Sequence => self.categories[index % self.categories.len()],
            CategoryPolicy::Random => {
                let pick = self.rng.gen_range(0..self.categories.len());
                self.categories[pick]
            }
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;

    fn colors() -> Vec<Category> {
        vec![Color::Red.into(), Color::Yellow.into(), Color::Blue.into()]
    }

    #[test]
    fn test_fixed_always_first() {
        let mut seq = TargetSequence::new(CategoryPolicy::Fixed, colors(), 4, None);
        assert_eq!(seq.initial(), Color::Red.into());
        for i in 0..8 {
            let adv = seq.next(i % 4);
            assert_eq!(adv.category, Color::Red.into());
            assert_eq!(adv.index, (i % 4 + 1) % 4);
        }
    }

    #[test]
    fn test_sequence_cycles_by_index() {
        let mut seq = TargetSequence::new(CategoryPolicy::Sequence, colors(), 5, None);
        assert_eq!(seq.initial(), Color::Red.into());
        assert_eq!(seq.next(0).category, Color::Yellow.into());
        assert_eq!(seq.next(1).category, Color::Blue.into());
        assert_eq!(seq.next(2).category, Color::Red.into());
    }

    #[test]
    fn test_wrap_flag_on_last_slot() {
        let mut seq = TargetSequence::new(CategoryPolicy::Sequence, colors(), 3, None);
        assert!(!seq.next(1).wrapped);
        let adv = seq.next(2);
        assert!(adv.wrapped);
        assert_eq!(adv.index, 0);
        assert_eq!(adv.category, Color::Red.into());
    }

    #[test]
    fn test_random_is_reproducible_with_seed() {
        let mut a = TargetSequence::new(CategoryPolicy::Random, colors(), 20, Some(7));
        let mut b = TargetSequence::new(CategoryPolicy::Random, colors(), 20, Some(7));
        let draws_a: Vec<Category> = (0..20).map(|i| a.next(i).category).collect();
        let draws_b: Vec<Category> = (0..20).map(|i| b.next(i).category).collect();
        assert_eq!(draws_a, draws_b);
        assert!(draws_a.iter().all(|c| colors().contains(c)));
    }

    #[test]
    #[should_panic]
    fn test_empty_categories_is_a_precondition() {
        TargetSequence::new(CategoryPolicy::Sequence, vec![], 3, None);
    }
}
