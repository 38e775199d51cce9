use crate::{Result, TaskError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Task priority, 1 (lowest) to 10 (highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Priority(i32);

impl Priority {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 10;

    /// Validate and construct a priority.
    pub fn new(value: i32) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(TaskError::InvalidPriority(value));
        }
        Ok(Priority(value))
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    /// Redis sorted-set score for this priority: lowest score pops first,
    /// so the score is the negated priority.
    pub fn score(&self) -> i64 {
        -(self.0 as i64)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority(5)
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl TryFrom<i32> for Priority {
    type Error = TaskError;

    fn try_from(value: i32) -> Result<Self> {
        Priority::new(value)
    }
}

impl From<Priority> for i32 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range() {
        assert!(Priority::new(0).is_err());
        assert!(Priority::new(11).is_err());
        assert!(Priority::new(1).is_ok());
        assert!(Priority::new(10).is_ok());
    }

    #[test]
    fn higher_priority_sorts_greater_and_scores_lower() {
        let low = Priority::new(1).unwrap();
        let high = Priority::new(10).unwrap();
        assert!(high > low);
        assert!(high.score() < low.score());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn in_range_values_round_trip_through_value(value in Priority::MIN..=Priority::MAX) {
            let priority = Priority::new(value).unwrap();
            prop_assert_eq!(priority.value(), value);
        }

        #[test]
        fn out_of_range_values_are_always_rejected(value in any::<i32>()) {
            prop_assume!(!(Priority::MIN..=Priority::MAX).contains(&value));
            prop_assert!(Priority::new(value).is_err());
        }

        #[test]
        fn score_is_always_the_negated_priority(value in Priority::MIN..=Priority::MAX) {
            let priority = Priority::new(value).unwrap();
            prop_assert_eq!(priority.score(), -(value as i64));
        }

        #[test]
        fn ordering_matches_value_ordering(a in Priority::MIN..=Priority::MAX, b in Priority::MIN..=Priority::MAX) {
            let pa = Priority::new(a).unwrap();
            let pb = Priority::new(b).unwrap();
            prop_assert_eq!(pa.cmp(&pb), a.cmp(&b));
        }
    }
}
