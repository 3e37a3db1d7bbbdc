//! Named event counters

use std::collections::BTreeMap;

/// Event tallies keyed by static names.
///
/// Names are compile-time constants, so lookups never allocate and
/// [`Counter::snapshot`] comes back in name order.
#[derive(Debug, Default, Clone)]
pub struct Counter {
    tallies: BTreeMap<&'static str, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, name: &'static str, by: usize) {
        *self.tallies.entry(name).or_default() += by;
    }

    pub fn get(&self, name: &str) -> usize {
        self.tallies.get(name).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.values().all(|&tally| tally == 0)
    }

    pub fn snapshot(&self) -> Vec<(&'static str, usize)> {
        self.tallies.iter().map(|(&name, &tally)| (name, tally)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tallies_accumulate_per_name() {
        let mut counter = Counter::new();
        assert!(counter.is_empty());

        counter.increment("b", 1);
        counter.increment("a", 2);
        counter.increment("a", 3);
        counter.increment("c", 0);

        assert_eq!(counter.get("a"), 5);
        assert_eq!(counter.get("missing"), 0);
        assert_eq!(counter.snapshot(), vec![("a", 5), ("b", 1), ("c", 0)]);
        assert!(!counter.is_empty());
    }
}
