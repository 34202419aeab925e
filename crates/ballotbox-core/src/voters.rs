use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Registered voter. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Voter {
    pub voter_id: String,
    pub name: String,
    #[serde(rename = "dob")]
    pub date_of_birth: NaiveDate,
    /// Opaque reference to a photo stored by the caller.
    #[serde(rename = "photo")]
    pub photo_reference: String,
    pub registered_at: DateTime<Utc>,
}

impl Voter {
    pub fn new(
        voter_id: String,
        name: String,
        date_of_birth: NaiveDate,
        photo_reference: String,
    ) -> Self {
        Self {
            voter_id,
            name,
            date_of_birth,
            photo_reference,
            registered_at: Utc::now(),
        }
    }
}

/// Registration form input as collected by the shell. Optional fields model
/// inputs the user may have left blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoterRegistration {
    pub voter_id: String,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub photo_reference: Option<String>,
}
