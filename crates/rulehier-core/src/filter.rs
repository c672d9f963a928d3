//! Train/valid/test classification of target pairs.

use ahash::{AHashMap, AHashSet};
use rulehier_graph::{EntityId, Pair};

/// Read-only classification of a target's pairs into the three splits.
#[derive(Debug, Default, Clone)]
pub struct FilterSet {
    train: AHashSet<Pair>,
    valid: AHashSet<Pair>,
    test: AHashSet<Pair>,
}

impl FilterSet {
    pub fn build_filter_set(
        train: impl IntoIterator<Item = Pair>,
        valid: impl IntoIterator<Item = Pair>,
        test: impl IntoIterator<Item = Pair>,
    ) -> Self {
        Self {
            train: train.into_iter().collect(),
            valid: valid.into_iter().collect(),
            test: test.into_iter().collect(),
        }
    }

    /// In train or valid.
    pub fn is_known(&self, pair: &Pair) -> bool {
        self.train.contains(pair) || self.valid.contains(pair)
    }

    pub fn is_known_with_test(&self, pair: &Pair) -> bool {
        self.is_known(pair) || self.test.contains(pair)
    }

    pub fn in_test_set(&self, pair: &Pair) -> bool {
        self.test.contains(pair)
    }

    pub fn test_set_size(&self) -> usize {
        self.test.len()
    }

    /// Number of known pairs.
    pub fn size(&self) -> usize {
        self.train.len() + self.valid.iter().filter(|p| !self.train.contains(p)).count()
    }

    pub fn train(&self) -> &AHashSet<Pair> {
        &self.train
    }

    pub fn valid(&self) -> &AHashSet<Pair> {
        &self.valid
    }

    pub fn test(&self) -> &AHashSet<Pair> {
        &self.test
    }

    /// Drop valid and test pairs mentioning an entity absent from every
    /// training fact. Returns how many pairs were removed.
    pub fn filter_unsolvable(&mut self, train_entities: &AHashSet<EntityId>) -> usize {
        let solvable = |p: &Pair| train_entities.contains(&p.sub) && train_entities.contains(&p.obj);
        let before = self.valid.len() + self.test.len();
        self.valid.retain(solvable);
        self.test.retain(solvable);
        before - self.valid.len() - self.test.len()
    }

    /// At least 90% of training subjects have a single object.
    pub fn is_target_functional(&self) -> bool {
        let mut objects: AHashMap<EntityId, usize> = AHashMap::new();
        for pair in &self.train {
            *objects.entry(pair.sub).or_insert(0) += 1;
        }
        if objects.is_empty() {
            return false;
        }
        let functional = objects.values().filter(|&&n| n == 1).count();
        functional as f64 / objects.len() as f64 >= 0.9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(a: u32, b: u32) -> Pair {
        Pair::new(a, b)
    }

    #[test]
    fn classification() {
        let filter = FilterSet::build_filter_set([p(1, 2)], [p(2, 3), p(1, 2)], [p(3, 4)]);
        assert!(filter.is_known(&p(1, 2)));
        assert!(filter.is_known(&p(2, 3)));
        assert!(!filter.is_known(&p(3, 4)));
        assert!(filter.is_known_with_test(&p(3, 4)));
        assert!(filter.in_test_set(&p(3, 4)));
        assert_eq!(filter.test_set_size(), 1);
        assert_eq!(filter.size(), 2);
    }

    #[test]
    fn unsolvable_pairs_are_dropped() {
        let mut filter = FilterSet::build_filter_set([p(1, 2)], [p(2, 9)], [p(1, 2), p(8, 1)]);
        let train_entities: AHashSet<EntityId> = [1, 2].into_iter().collect();
        assert_eq!(filter.filter_unsolvable(&train_entities), 2);
        assert!(filter.valid().is_empty());
        assert_eq!(filter.test_set_size(), 1);
    }

    #[test]
    fn functional_target() {
        let none: [Pair; 0] = [];
        let filter = FilterSet::build_filter_set([p(1, 2), p(3, 4)], none, none);
        assert!(filter.is_target_functional());
        let filter = FilterSet::build_filter_set([p(1, 2), p(1, 3)], none, none);
        assert!(!filter.is_target_functional());
    }
}
