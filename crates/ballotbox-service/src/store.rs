use std::sync::Arc;

use ballotbox_core::{
    CandidateSet, EligibilityPolicy, RecordStore, RecordStoreError, Voter, VoterRegistration,
};
use ballotbox_storage::key_provider::KeyProvider;

use crate::{
    BallotError, BallotService, RegistrationError, RegistrationService, StoreLock, Tally,
    TallyError, TallyService,
};

/// Election settings the store is built with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BallotStoreConfig {
    pub candidates: CandidateSet,
    pub policy: EligibilityPolicy,
}

/// Entry point for the presentation shell: wires the three services to one
/// record store, one key provider and one lock.
pub struct BallotStore<S: RecordStore, K: KeyProvider> {
    registration: RegistrationService<S>,
    ballots: BallotService<S, K>,
    tally: TallyService<S, K>,
}

impl<S: RecordStore, K: KeyProvider> BallotStore<S, K> {
    pub fn new(records: S, keys: K, config: BallotStoreConfig) -> Self {
        let records = Arc::new(records);
        let keys = Arc::new(keys);
        let lock = StoreLock::default();
        Self {
            registration: RegistrationService::new(records.clone(), lock.clone()),
            ballots: BallotService::new(
                records.clone(),
                keys.clone(),
                lock.clone(),
                config.candidates,
                config.policy,
            ),
            tally: TallyService::new(records, keys, lock),
        }
    }

    pub async fn register(&self, request: VoterRegistration) -> Result<Voter, RegistrationError> {
        self.registration.register(request).await
    }

    pub async fn cast(&self, voter_id: &str, candidate: &str) -> Result<(), BallotError> {
        self.ballots.cast(voter_id, candidate).await
    }

    pub async fn tally(&self) -> Result<Tally, TallyError> {
        self.tally.compute().await
    }

    pub async fn has_voted(&self, voter_id: &str) -> Result<bool, BallotError> {
        self.ballots.has_voted(voter_id).await
    }

    pub async fn voters(&self) -> Result<Vec<Voter>, RecordStoreError> {
        self.registration.voters().await
    }

    pub fn candidates(&self) -> &CandidateSet {
        self.ballots.candidates()
    }
}
