use std::sync::Arc;

use ballotbox_core::{
    CandidateSet, Collection, EligibilityPolicy, Record, RecordStore, RecordStoreError,
};
use ballotbox_storage::{cipher::BallotCipher, key_provider::KeyProvider};
use tracing::{info, instrument, warn};

use crate::{error::BallotError, registration::is_registered, StoreLock};

/// Accepts at most one ballot per voter id and stores it sealed, with no
/// link back to the voter.
pub struct BallotService<S: RecordStore, K: KeyProvider> {
    records: Arc<S>,
    keys: Arc<K>,
    lock: StoreLock,
    candidates: CandidateSet,
    policy: EligibilityPolicy,
}

impl<S: RecordStore, K: KeyProvider> BallotService<S, K> {
    pub fn new(
        records: Arc<S>,
        keys: Arc<K>,
        lock: StoreLock,
        candidates: CandidateSet,
        policy: EligibilityPolicy,
    ) -> Self {
        Self {
            records,
            keys,
            lock,
            candidates,
            policy,
        }
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    /// Cast a ballot for `candidate` on behalf of `voter_id`.
    ///
    /// The voted-set check, sealing, and the combined ballot + voted-marker
    /// commit run under the store's write lock and the record store's
    /// exclusive lock. The ballot and the marker are written in one batch, so
    /// neither is ever persisted without the other. The id is trimmed the
    /// same way registration trims it.
    #[instrument(skip_all, fields(voter_id = %voter_id.trim()))]
    pub async fn cast(&self, voter_id: &str, candidate: &str) -> Result<(), BallotError> {
        let voter_id = voter_id.trim();
        if voter_id.is_empty() {
            return Err(BallotError::MissingVoterId);
        }
        if !self.candidates.contains(candidate) {
            warn!("ballot names an unknown candidate");
            return Err(BallotError::InvalidCandidate {
                candidate: candidate.to_string(),
            });
        }

        let _guard = self.lock.write().await;
        let _store_guard = self.records.lock_exclusive().await?;
        if self
            .records
            .contains_member(Collection::Voted, voter_id)
            .await?
        {
            warn!("repeat vote rejected");
            return Err(BallotError::AlreadyVoted {
                voter_id: voter_id.to_string(),
            });
        }
        if self.policy == EligibilityPolicy::RegisteredOnly
            && !is_registered(self.records.as_ref(), voter_id).await?
        {
            warn!("unregistered voter rejected");
            return Err(BallotError::NotRegistered {
                voter_id: voter_id.to_string(),
            });
        }

        let key = self.keys.get_or_create().await?;
        let sealed = BallotCipher::new(&key)?.seal(candidate.as_bytes())?;
        let ballot = serde_json::to_value(&sealed).map_err(|e| RecordStoreError::Storage {
            reason: format!("encode ballot: {e}"),
        })?;

        self.records
            .append_batch(vec![
                (Collection::Ballots, ballot),
                (Collection::Voted, Record::String(voter_id.to_string())),
            ])
            .await?;
        info!("ballot cast");
        Ok(())
    }

    /// Whether `voter_id` has already cast a ballot.
    #[instrument(skip_all, fields(voter_id = %voter_id.trim()))]
    pub async fn has_voted(&self, voter_id: &str) -> Result<bool, BallotError> {
        let _guard = self.lock.read().await;
        let _store_guard = self.records.lock_shared().await?;
        Ok(self
            .records
            .contains_member(Collection::Voted, voter_id.trim())
            .await?)
    }
}
