use serde::{Deserialize, Serialize};

use super::PersonId;

/// An undirected friendship edge.
///
/// The store may hold `(a, b)`, `(b, a)` or both; all of them describe the
/// same relationship. `Friendship::new` normalizes the pair so that two
/// values built from either direction compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Friendship {
    low: PersonId,
    high: PersonId,
}

impl Friendship {
    /// Returns `None` for a self-edge.
    pub fn new(a: PersonId, b: PersonId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn members(&self) -> (PersonId, PersonId) {
        (self.low, self.high)
    }
}
