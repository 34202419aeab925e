use std::sync::Arc;

use ballotbox_core::{Collection, Record, RecordStore, RecordStoreError, Voter, VoterRegistration};
use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};

use crate::{
    error::{RegistrationError, ValidationError},
    StoreLock,
};

/// Validates and persists voters, enforcing unique voter ids.
pub struct RegistrationService<S: RecordStore> {
    records: Arc<S>,
    lock: StoreLock,
}

impl<S: RecordStore> RegistrationService<S> {
    pub fn new(records: Arc<S>, lock: StoreLock) -> Self {
        Self { records, lock }
    }

    /// Register a voter. The duplicate check and the append run as one
    /// critical section under the store lock and the record store's
    /// exclusive lock.
    #[instrument(skip_all, fields(voter_id = %request.voter_id.trim()))]
    pub async fn register(&self, request: VoterRegistration) -> Result<Voter, RegistrationError> {
        let voter = validate(request, Utc::now().date_naive())?;

        let _guard = self.lock.write().await;
        let _store_guard = self.records.lock_exclusive().await?;
        if is_registered(self.records.as_ref(), &voter.voter_id).await? {
            warn!("duplicate registration rejected");
            return Err(RegistrationError::DuplicateVoter {
                voter_id: voter.voter_id,
            });
        }

        let record = serde_json::to_value(&voter).map_err(|e| RecordStoreError::Storage {
            reason: format!("encode voter: {e}"),
        })?;
        self.records.append(Collection::Voters, record).await?;
        info!("voter registered");
        Ok(voter)
    }

    /// All registered voters in registration order.
    #[instrument(skip_all)]
    pub async fn voters(&self) -> Result<Vec<Voter>, RecordStoreError> {
        let records = {
            let _guard = self.lock.read().await;
            let _store_guard = self.records.lock_shared().await?;
            self.records.read_all(Collection::Voters).await?
        };
        records.into_iter().map(decode_voter).collect()
    }
}

/// Whether a voter with `voter_id` exists. Callers hold the store lock.
pub(crate) async fn is_registered<S: RecordStore + ?Sized>(
    records: &S,
    voter_id: &str,
) -> Result<bool, RecordStoreError> {
    let voters = records.read_all(Collection::Voters).await?;
    Ok(voters
        .iter()
        .any(|v| v.get("voter_id").and_then(Record::as_str) == Some(voter_id)))
}

fn decode_voter(record: Record) -> Result<Voter, RecordStoreError> {
    serde_json::from_value(record).map_err(|e| RecordStoreError::Corrupt {
        collection: Collection::Voters,
        reason: e.to_string(),
    })
}

fn validate(request: VoterRegistration, today: NaiveDate) -> Result<Voter, ValidationError> {
    let voter_id = request.voter_id.trim();
    if voter_id.is_empty() {
        return Err(ValidationError::Missing { field: "voter_id" });
    }
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ValidationError::Missing { field: "name" });
    }
    let date_of_birth = request.date_of_birth.ok_or(ValidationError::Missing {
        field: "date_of_birth",
    })?;
    if date_of_birth > today {
        return Err(ValidationError::FutureDateOfBirth(date_of_birth));
    }
    let photo_reference = request
        .photo_reference
        .filter(|p| !p.trim().is_empty())
        .ok_or(ValidationError::Missing { field: "photo" })?;

    Ok(Voter::new(
        voter_id.to_string(),
        name.to_string(),
        date_of_birth,
        photo_reference,
    ))
}
