use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use ulid::Ulid;

/// Source of row ids. Injected so tests can make ids deterministic.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Ulid;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UlidGenerator;

impl IdGenerator for UlidGenerator {
    fn next_id(&self) -> Ulid {
        Ulid::new()
    }
}

/// Monotonic ids `1, 2, 3, ...` (as ULIDs).
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> Ulid {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Ulid::from(n as u128)
    }
}

/// Today's date as the salon sees it.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_are_ordered() {
        let ids = SequentialIds::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_eq!(a, Ulid::from(1u128));
        assert!(a < b);
    }
}
