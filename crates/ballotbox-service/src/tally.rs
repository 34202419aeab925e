use std::{collections::BTreeMap, sync::Arc};

use ballotbox_core::{CandidateSet, Collection, EncryptedBallot, RecordStore};
use ballotbox_storage::{cipher::BallotCipher, key_provider::KeyProvider};
use tracing::{debug, instrument, warn};

use crate::{error::TallyError, StoreLock};

/// Votes per candidate label.
pub type Tally = BTreeMap<String, u64>;

/// Decrypts the ballot log and counts votes. Never mutates the store.
pub struct TallyService<S: RecordStore, K: KeyProvider> {
    records: Arc<S>,
    keys: Arc<K>,
    lock: StoreLock,
}

impl<S: RecordStore, K: KeyProvider> TallyService<S, K> {
    pub fn new(records: Arc<S>, keys: Arc<K>, lock: StoreLock) -> Self {
        Self {
            records,
            keys,
            lock,
        }
    }

    /// Count every stored ballot. Any ballot that fails to open aborts the
    /// tally rather than being skipped.
    #[instrument(skip_all)]
    pub async fn compute(&self) -> Result<Tally, TallyError> {
        let ballots = {
            let _guard = self.lock.read().await;
            let _store_guard = self.records.lock_shared().await?;
            self.records.read_all(Collection::Ballots).await?
        };

        let mut tally = Tally::new();
        if ballots.is_empty() {
            return Ok(tally);
        }

        let key = self.keys.get_or_create().await?;
        let cipher = BallotCipher::new(&key)?;
        for (index, record) in ballots.into_iter().enumerate() {
            let ballot: EncryptedBallot =
                serde_json::from_value(record).map_err(|e| corrupt(index, e))?;
            let plaintext = cipher.open(&ballot).map_err(|e| corrupt(index, e))?;
            let label = String::from_utf8(plaintext).map_err(|e| corrupt(index, e))?;
            *tally.entry(label).or_insert(0) += 1;
        }

        debug!(total = total(&tally), "tally computed");
        Ok(tally)
    }
}

/// Total number of counted ballots.
pub fn total(tally: &Tally) -> u64 {
    tally.values().sum()
}

/// Rows for display: every configured candidate in configured order (zero
/// counts included), then any other label found in the log.
pub fn rows(tally: &Tally, candidates: &CandidateSet) -> Vec<(String, u64)> {
    let mut rows: Vec<(String, u64)> = candidates
        .iter()
        .map(|label| (label.to_string(), tally.get(label).copied().unwrap_or(0)))
        .collect();
    rows.extend(
        tally
            .iter()
            .filter(|(label, _)| !candidates.contains(label))
            .map(|(label, count)| (label.clone(), *count)),
    );
    rows
}

fn corrupt<E: ToString>(index: usize, err: E) -> TallyError {
    warn!(index, "unreadable ballot");
    TallyError::CorruptBallot {
        index,
        reason: err.to_string(),
    }
}
