//! Core abstractions for the ballot store: voter and ballot types, the
//! candidate set, and the append-only record store contract.
//! Kept free of crypto and filesystem dependencies.

pub mod ballots;
pub mod records;
pub mod voters;

pub use ballots::{CandidateSet, CandidateSetError, EligibilityPolicy, EncryptedBallot};
pub use records::{
    Collection, InMemoryRecordStore, Record, RecordStore, RecordStoreError, StoreGuard,
};
pub use voters::{Voter, VoterRegistration};
