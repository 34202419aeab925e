use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One cast vote, sealed with the store key. Carries no voter identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedBallot {
    /// Per-ballot random nonce, base64url without padding.
    pub nonce: String,
    /// AEAD ciphertext of the candidate label, base64url without padding.
    pub ciphertext: String,
}

/// Who may cast a ballot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityPolicy {
    /// Only ids present in the voters collection may vote.
    #[default]
    RegisteredOnly,
    /// Any id that has not voted yet may vote, registered or not.
    AnyUnvotedId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CandidateSetError {
    #[error("candidate set is empty")]
    Empty,
    #[error("candidate label is blank")]
    Blank,
    #[error("duplicate candidate: {0}")]
    Duplicate(String),
}

/// Fixed, ordered set of candidates a ballot may name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    labels: Vec<String>,
}

impl CandidateSet {
    pub fn new<I, S>(labels: I) -> Result<Self, CandidateSetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for label in labels {
            let label = label.into();
            if label.trim().is_empty() {
                return Err(CandidateSetError::Blank);
            }
            if out.contains(&label) {
                return Err(CandidateSetError::Duplicate(label));
            }
            out.push(label);
        }
        if out.is_empty() {
            return Err(CandidateSetError::Empty);
        }
        Ok(Self { labels: out })
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, candidate: &str) -> bool {
        self.labels.iter().any(|label| label == candidate)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for CandidateSet {
    fn default() -> Self {
        Self {
            labels: vec![
                "Candidate A".to_string(),
                "Candidate B".to_string(),
                "Candidate C".to_string(),
            ],
        }
    }
}
