//! # Store
//!
//! Persistence boundary for the catalog and the vote ledger.
//!
//! Every implementation must enforce a uniqueness constraint over
//! (voter address, nomination) inside [`Store::commit`], independent of the
//! checks the ledger runs beforehand. Recording the vote and bumping the tally
//! happen together or not at all.
use std::collections::{BTreeMap, HashMap, hash_map::Entry};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{
    models::{Candidate, CandidateId, CatalogSeed, Nomination, NominationId, VoteRecord},
    target::Target,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which uniqueness rule a losing commit ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    SameTarget,
    SameNomination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    Recorded(VoteRecord),
    Rejected(Conflict),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// All nominations in ascending id order.
    async fn nominations(&self) -> Result<Vec<Nomination>, StoreError>;

    /// Candidates of one nomination in ascending id order.
    async fn candidates(&self, nomination: NominationId) -> Result<Vec<Candidate>, StoreError>;

    async fn nomination_exists(&self, nomination: NominationId) -> Result<bool, StoreError>;

    async fn candidate_nomination(
        &self,
        candidate: CandidateId,
    ) -> Result<Option<NominationId>, StoreError>;

    /// Targets of every vote record held by `voter`.
    async fn voted_targets(&self, voter: &str) -> Result<Vec<Target>, StoreError>;

    async fn has_voted_for(&self, voter: &str, target: Target) -> Result<bool, StoreError>;

    async fn has_voted_in(&self, voter: &str, nomination: NominationId)
    -> Result<bool, StoreError>;

    /// Atomically appends the record and increments the target's tally.
    async fn commit(
        &self,
        voter: &str,
        target: Target,
        nomination: NominationId,
    ) -> Result<Commit, StoreError>;
}

#[derive(Default)]
struct Tables {
    nominations: BTreeMap<NominationId, Nomination>,
    candidates: BTreeMap<CandidateId, Candidate>,
    records: Vec<VoteRecord>,
    ballots: HashMap<(String, NominationId), Target>,
}

/// In-process store used by tests and `STORE_BACKEND=memory` runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn from_seed(seed: &CatalogSeed) -> Self {
        let mut tables = Tables::default();

        for nomination in &seed.nominations {
            tables.nominations.insert(
                nomination.id,
                Nomination {
                    id: nomination.id,
                    title: nomination.title.clone(),
                    emoji: nomination.emoji.clone(),
                    description: nomination.description.clone(),
                    votes: 0,
                },
            );

            for candidate in &nomination.candidates {
                tables.candidates.insert(
                    candidate.id,
                    Candidate {
                        id: candidate.id,
                        name: candidate.name.clone(),
                        nomination_id: nomination.id,
                        votes: 0,
                    },
                );
            }
        }

        Self {
            tables: RwLock::new(tables),
        }
    }

    pub async fn records(&self) -> Vec<VoteRecord> {
        self.tables.read().await.records.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn nominations(&self) -> Result<Vec<Nomination>, StoreError> {
        Ok(self.tables.read().await.nominations.values().cloned().collect())
    }

    async fn candidates(&self, nomination: NominationId) -> Result<Vec<Candidate>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .candidates
            .values()
            .filter(|candidate| candidate.nomination_id == nomination)
            .cloned()
            .collect())
    }

    async fn nomination_exists(&self, nomination: NominationId) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .nominations
            .contains_key(&nomination))
    }

    async fn candidate_nomination(
        &self,
        candidate: CandidateId,
    ) -> Result<Option<NominationId>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .candidates
            .get(&candidate)
            .map(|candidate| candidate.nomination_id))
    }

    async fn voted_targets(&self, voter: &str) -> Result<Vec<Target>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .records
            .iter()
            .filter(|record| record.voter == voter)
            .map(|record| record.target)
            .collect())
    }

    async fn has_voted_for(&self, voter: &str, target: Target) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .records
            .iter()
            .any(|record| record.voter == voter && record.target == target))
    }

    async fn has_voted_in(
        &self,
        voter: &str,
        nomination: NominationId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .ballots
            .contains_key(&(voter.to_string(), nomination)))
    }

    async fn commit(
        &self,
        voter: &str,
        target: Target,
        nomination: NominationId,
    ) -> Result<Commit, StoreError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        let tally = match target {
            Target::Candidate(id) => tables.candidates.get_mut(&id).map(|c| &mut c.votes),
            Target::Nomination(id) => tables.nominations.get_mut(&id).map(|n| &mut n.votes),
        }
        .ok_or_else(|| StoreError::Corrupt(format!("{target} has no tally")))?;

        match tables.ballots.entry((voter.to_string(), nomination)) {
            Entry::Occupied(entry) if *entry.get() == target => {
                Ok(Commit::Rejected(Conflict::SameTarget))
            }
            Entry::Occupied(_) => Ok(Commit::Rejected(Conflict::SameNomination)),
            Entry::Vacant(entry) => {
                entry.insert(target);
                *tally += 1;

                let record = VoteRecord {
                    id: tables.records.len() as u64 + 1,
                    voter: voter.to_string(),
                    target,
                };
                tables.records.push(record.clone());

                Ok(Commit::Recorded(record))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SeedCandidate, SeedNomination};

    fn store() -> MemoryStore {
        MemoryStore::from_seed(&CatalogSeed {
            nominations: vec![
                SeedNomination {
                    id: 2,
                    title: "Best Film".to_string(),
                    emoji: "🎬".to_string(),
                    description: String::new(),
                    candidates: vec![
                        SeedCandidate {
                            id: 21,
                            name: "B".to_string(),
                        },
                        SeedCandidate {
                            id: 20,
                            name: "A".to_string(),
                        },
                    ],
                },
                SeedNomination {
                    id: 1,
                    title: "Best Book".to_string(),
                    emoji: "📚".to_string(),
                    description: String::new(),
                    candidates: vec![],
                },
            ],
        })
    }

    #[tokio::test]
    async fn test_ordering() {
        let store = store();

        let ids: Vec<_> = store
            .nominations()
            .await
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);

        let ids: Vec<_> = store
            .candidates(2)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![20, 21]);
        assert!(store.candidates(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_enforces_uniqueness() {
        let store = store();

        let first = store.commit("1.1.1.1", Target::Candidate(20), 2).await.unwrap();
        assert!(matches!(first, Commit::Recorded(ref r) if r.id == 1));

        assert_eq!(
            store.commit("1.1.1.1", Target::Candidate(20), 2).await.unwrap(),
            Commit::Rejected(Conflict::SameTarget)
        );
        assert_eq!(
            store.commit("1.1.1.1", Target::Candidate(21), 2).await.unwrap(),
            Commit::Rejected(Conflict::SameNomination)
        );

        let candidates = store.candidates(2).await.unwrap();
        assert_eq!(candidates[0].votes, 1);
        assert_eq!(candidates[1].votes, 0);
        assert_eq!(store.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_without_tally_leaves_no_record() {
        let store = store();

        assert!(matches!(
            store.commit("1.1.1.1", Target::Candidate(99), 2).await,
            Err(StoreError::Corrupt(_))
        ));
        assert!(store.records().await.is_empty());
        assert!(!store.has_voted_in("1.1.1.1", 2).await.unwrap());
    }
}
