use chrono::Utc;
use tracing::{debug, info};

use crate::domain::{BorrowingCapacity, DomainEvent, PersonId};

use super::{Engine, EngineError};

impl Engine {
    /// Compute and store how much one person may borrow from their friends.
    ///
    /// Each friend whose balance exceeds the person's own contributes the
    /// difference. A person with no positive balance gets zero and their
    /// friends are not looked up.
    pub async fn compute_borrowing_capacity(
        &self,
        person_id: Option<PersonId>,
    ) -> Result<BorrowingCapacity, EngineError> {
        let person_id = person_id.ok_or_else(|| {
            EngineError::Validation("person_id is required to compute borrowing capacity".into())
        })?;
        self.require_person(person_id).await?;

        let inputs = self.repo.load_capacity_inputs(person_id).await?;
        if inputs.own_balance.is_positive() {
            debug!(
                person_id,
                balance = %inputs.own_balance,
                friends = inputs.friend_balances.len(),
                "Fetched friends' balances"
            );
        } else {
            info!(
                person_id,
                balance = %inputs.own_balance,
                "Person has no positive balance, borrowing capacity is zero"
            );
        }

        let capacity = BorrowingCapacity {
            person_id,
            max_borrow_amount: inputs.capacity(),
        };
        self.repo.save_capacities(&[capacity], Utc::now()).await?;

        self.publish(vec![DomainEvent::BorrowingCapacityUpdated {
            person_id,
            max_borrow_amount: capacity.max_borrow_amount,
        }])
        .await;

        info!(
            person_id,
            max_borrow_amount = %capacity.max_borrow_amount,
            "Borrowing capacity calculated"
        );
        Ok(capacity)
    }

    /// Compute every person's capacity from one snapshot of balances and
    /// friendships, then store all results together.
    pub async fn compute_all_borrowing_capacities(
        &self,
    ) -> Result<Vec<BorrowingCapacity>, EngineError> {
        let snapshot = self.repo.load_borrowing_snapshot().await?;
        let capacities = snapshot.capacities();

        self.repo.save_capacities(&capacities, Utc::now()).await?;

        self.publish(
            capacities
                .iter()
                .map(|c| DomainEvent::BorrowingCapacityUpdated {
                    person_id: c.person_id,
                    max_borrow_amount: c.max_borrow_amount,
                })
                .collect(),
        )
        .await;

        info!(persons = capacities.len(), "Borrowing capacity calculated for all persons");
        Ok(capacities)
    }
}
