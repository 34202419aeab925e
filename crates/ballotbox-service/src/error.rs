use ballotbox_core::RecordStoreError;
use ballotbox_storage::{cipher::CipherError, key_provider::KeyError};
use chrono::NaiveDate;
use thiserror::Error;

/// Input the user can correct and resubmit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill all fields and upload a photo (missing {field})")]
    Missing { field: &'static str },
    #[error("date of birth {0} is in the future")]
    FutureDateOfBirth(NaiveDate),
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("This Voter ID is already registered: {voter_id}")]
    DuplicateVoter { voter_id: String },
    #[error(transparent)]
    Storage(#[from] RecordStoreError),
}

#[derive(Debug, Error)]
pub enum BallotError {
    #[error("voter id is required to vote")]
    MissingVoterId,
    #[error("voter {voter_id} is not registered")]
    NotRegistered { voter_id: String },
    #[error("You have already voted ({voter_id})")]
    AlreadyVoted { voter_id: String },
    #[error("unknown candidate: {candidate}")]
    InvalidCandidate { candidate: String },
    #[error(transparent)]
    Storage(#[from] RecordStoreError),
    #[error("ballot encryption failed: {0}")]
    Encryption(#[from] CipherError),
    #[error(transparent)]
    Key(#[from] KeyError),
}

#[derive(Debug, Error)]
pub enum TallyError {
    #[error("ballot #{index} cannot be read: {reason}")]
    CorruptBallot { index: usize, reason: String },
    #[error(transparent)]
    Storage(#[from] RecordStoreError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
}
