//! Ballot store services: voter registration, at-most-once casting of sealed
//! ballots, and tallying. Every service shares one store-wide lock.

pub mod ballot;
pub mod error;
pub mod registration;
pub mod store;
pub mod tally;

use std::sync::Arc;

use tokio::sync::RwLock;

pub use ballot::BallotService;
pub use error::{BallotError, RegistrationError, TallyError, ValidationError};
pub use registration::RegistrationService;
pub use store::{BallotStore, BallotStoreConfig};
pub use tally::{Tally, TallyService};

/// Store-wide lock. Writers (`register`, `cast`) take it exclusively; tally
/// snapshots take it shared.
pub type StoreLock = Arc<RwLock<()>>;
