use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Amount, Friendship, PersonId};

/// Derived per-person figures, overwritten on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowingRecord {
    pub person_id: PersonId,
    pub net_worth: Amount,
    pub max_borrow_amount: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Net worth of one person: the sum of their account balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetWorth {
    pub person_id: PersonId,
    pub net_worth: Amount,
}

/// Borrowing capacity of one person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowingCapacity {
    pub person_id: PersonId,
    pub max_borrow_amount: Amount,
}

/// Sum over friends of how far each friend's balance exceeds `own`.
///
/// A person with a non-positive balance can borrow nothing. A friend whose
/// balance is equal to or below `own` contributes zero.
pub fn borrowing_capacity<I>(own: Amount, friend_balances: I) -> Amount
where
    I: IntoIterator<Item = Amount>,
{
    if !own.is_positive() {
        return Amount::ZERO;
    }
    friend_balances
        .into_iter()
        .map(|friend| friend.excess_over(own))
        .sum()
}

/// Balances and friendships read in one consistent pass over the store.
///
/// Used to compute every person's capacity without re-reading the store
/// between persons.
#[derive(Debug, Clone, Default)]
pub struct BorrowingSnapshot {
    balances: BTreeMap<PersonId, Amount>,
    friends: BTreeMap<PersonId, BTreeSet<PersonId>>,
}

impl BorrowingSnapshot {
    pub fn new(
        balances: impl IntoIterator<Item = (PersonId, Amount)>,
        edges: impl IntoIterator<Item = (PersonId, PersonId)>,
    ) -> Self {
        let mut friends: BTreeMap<PersonId, BTreeSet<PersonId>> = BTreeMap::new();
        for edge in edges.into_iter().filter_map(|(a, b)| Friendship::new(a, b)) {
            let (a, b) = edge.members();
            friends.entry(a).or_default().insert(b);
            friends.entry(b).or_default().insert(a);
        }

        Self {
            balances: balances.into_iter().collect(),
            friends,
        }
    }

    pub fn persons(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.balances.keys().copied()
    }

    pub fn balance_of(&self, person: PersonId) -> Amount {
        self.balances.get(&person).copied().unwrap_or_default()
    }

    pub fn friends_of(&self, person: PersonId) -> impl Iterator<Item = PersonId> + '_ {
        self.friends.get(&person).into_iter().flatten().copied()
    }

    pub fn capacity_for(&self, person: PersonId) -> Amount {
        borrowing_capacity(
            self.balance_of(person),
            self.friends_of(person).map(|friend| self.balance_of(friend)),
        )
    }

    pub fn capacities(&self) -> Vec<BorrowingCapacity> {
        self.persons()
            .map(|person_id| BorrowingCapacity {
                person_id,
                max_borrow_amount: self.capacity_for(person_id),
            })
            .collect()
    }
}
