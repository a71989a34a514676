use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::{DomainEvent, NetWorth, PersonId};

use super::{Engine, EngineError};

impl Engine {
    /// Sum account balances per person and store the result as each
    /// person's net worth. Persons without accounts are skipped.
    pub async fn aggregate_net_worth(
        &self,
        person_id: Option<PersonId>,
    ) -> Result<Vec<NetWorth>, EngineError> {
        if let Some(id) = person_id {
            self.require_person(id).await?;
        }

        let entries = self.repo.net_worths(person_id).await?;

        match person_id {
            Some(id) if entries.is_empty() => {
                info!(person_id = id, "Person has no bank accounts, skipping net worth");
            }
            Some(_) => {}
            None => match self.repo.persons_without_accounts().await {
                Ok(skipped) => {
                    for id in skipped {
                        debug!(person_id = id, "Person has no bank accounts, skipping net worth");
                    }
                }
                Err(err) => warn!(
                    error = %format!("{err:#}"),
                    "Failed to list persons without accounts"
                ),
            },
        }

        self.repo.save_net_worths(&entries, Utc::now()).await?;

        self.publish(
            entries
                .iter()
                .map(|entry| DomainEvent::NetWorthUpdated {
                    person_id: entry.person_id,
                    net_worth: entry.net_worth,
                })
                .collect(),
        )
        .await;

        info!(persons = entries.len(), "Net worth calculated");
        Ok(entries)
    }
}
