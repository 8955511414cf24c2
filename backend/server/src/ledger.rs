//! # Vote Ledger
//!
//! Validates a ballot and commits it. Each step short-circuits with its own rejection:
//!
//! 1. Voting window, when a deadline is configured
//! 2. Malformed request, the target id is missing or not a positive integer
//! 3. Unknown target
//! 4. Already voted for this exact option
//! 5. Already voted in the owning nomination
//! 6. Commit, record and tally together
//!
//! Steps 4 and 5 give precise answers to the common case. The store's uniqueness
//! index is what actually decides a race, and a losing commit is reported with the
//! same rejections.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    models::VoteRecord,
    store::{Commit, Conflict, Store, StoreError},
    target::{Scheme, Target},
};

#[derive(Error, Debug)]
pub enum VoteError {
    #[error("Voting has closed")]
    VotingClosed,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(Target),

    #[error("Already voted for this option")]
    AlreadyVotedForOption,

    #[error("Already voted in this nomination")]
    AlreadyVotedInNomination,

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl VoteError {
    pub fn reason(&self) -> &'static str {
        match self {
            VoteError::VotingClosed => "voting_closed",
            VoteError::InvalidRequest(_) => "invalid_request",
            VoteError::NotFound(_) => "not_found",
            VoteError::AlreadyVotedForOption => "already_voted_for_option",
            VoteError::AlreadyVotedInNomination => "already_voted_in_nomination",
            VoteError::Store(_) => "store_unavailable",
        }
    }
}

impl From<Conflict> for VoteError {
    fn from(conflict: Conflict) -> Self {
        match conflict {
            Conflict::SameTarget => VoteError::AlreadyVotedForOption,
            Conflict::SameNomination => VoteError::AlreadyVotedInNomination,
        }
    }
}

/// Ballot as sent by the client. Only the field of the active scheme is read.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub candidate_id: Option<Value>,
    pub nomination_id: Option<Value>,
}

impl VoteRequest {
    pub fn target(&self, scheme: Scheme) -> Result<Target, VoteError> {
        let field = scheme.field();
        let raw = match scheme {
            Scheme::Candidate => &self.candidate_id,
            Scheme::Nomination => &self.nomination_id,
        };

        let id = match raw {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => number.as_u64(),
            Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
            Some(_) => None,
        };

        match (raw, id) {
            (None | Some(Value::Null), _) => {
                Err(VoteError::InvalidRequest(format!("{field} is required")))
            }
            (_, Some(id)) if id > 0 => u32::try_from(id)
                .map(|id| Target::new(scheme, id))
                .map_err(|_| VoteError::InvalidRequest(format!("{field} is out of range"))),
            _ => Err(VoteError::InvalidRequest(format!(
                "{field} must be a positive integer"
            ))),
        }
    }
}

pub struct Ledger {
    store: Arc<dyn Store>,
    scheme: Scheme,
    deadline: Option<DateTime<Utc>>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, scheme: Scheme, deadline: Option<DateTime<Utc>>) -> Self {
        Self {
            store,
            scheme,
            deadline,
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub async fn cast_vote(
        &self,
        voter: &str,
        request: &VoteRequest,
    ) -> Result<VoteRecord, VoteError> {
        self.cast_vote_at(voter, request, Utc::now()).await
    }

    pub async fn cast_vote_at(
        &self,
        voter: &str,
        request: &VoteRequest,
        now: DateTime<Utc>,
    ) -> Result<VoteRecord, VoteError> {
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            return Err(VoteError::VotingClosed);
        }

        let target = request.target(self.scheme)?;
        let store = self.store.as_ref();

        let nomination = target
            .owning_nomination(store)
            .await?
            .ok_or(VoteError::NotFound(target))?;

        if store.has_voted_for(voter, target).await? {
            debug!("{voter} repeated a vote for {target}");
            return Err(VoteError::AlreadyVotedForOption);
        }

        if store.has_voted_in(voter, nomination).await? {
            debug!("{voter} already voted in nomination {nomination}");
            return Err(VoteError::AlreadyVotedInNomination);
        }

        match store.commit(voter, target, nomination).await? {
            Commit::Recorded(record) => {
                info!("Recorded vote {} from {voter} for {target}", record.id);
                Ok(record)
            }
            Commit::Rejected(conflict) => {
                debug!("{voter} lost a commit race for {target}: {conflict:?}");
                Err(conflict.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::{
        models::{CatalogSeed, SeedCandidate, SeedNomination},
        store::MemoryStore,
    };

    fn seed() -> CatalogSeed {
        CatalogSeed {
            nominations: vec![
                SeedNomination {
                    id: 1,
                    title: "Best Film".to_string(),
                    emoji: "🎬".to_string(),
                    description: "Feature films".to_string(),
                    candidates: vec![
                        SeedCandidate {
                            id: 10,
                            name: "First".to_string(),
                        },
                        SeedCandidate {
                            id: 11,
                            name: "Second".to_string(),
                        },
                    ],
                },
                SeedNomination {
                    id: 2,
                    title: "Best Song".to_string(),
                    emoji: "🎵".to_string(),
                    description: "Singles".to_string(),
                    candidates: vec![SeedCandidate {
                        id: 20,
                        name: "Third".to_string(),
                    }],
                },
            ],
        }
    }

    fn ledger(scheme: Scheme) -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::from_seed(&seed()));
        let ledger = Ledger::new(store.clone(), scheme, None);

        (store, ledger)
    }

    fn candidate(id: Value) -> VoteRequest {
        VoteRequest {
            candidate_id: Some(id),
            nomination_id: None,
        }
    }

    async fn candidate_votes(store: &MemoryStore, nomination: u32) -> Vec<u32> {
        store
            .candidates(nomination)
            .await
            .unwrap()
            .iter()
            .map(|c| c.votes)
            .collect()
    }

    #[test]
    fn test_request_parsing() {
        assert_eq!(
            candidate(json!(10)).target(Scheme::Candidate).unwrap(),
            Target::Candidate(10)
        );
        assert_eq!(
            candidate(json!("10")).target(Scheme::Candidate).unwrap(),
            Target::Candidate(10)
        );

        for bad in [json!(0), json!(-3), json!(1.5), json!("ten"), json!([10]), json!(u64::MAX)] {
            assert!(matches!(
                candidate(bad).target(Scheme::Candidate),
                Err(VoteError::InvalidRequest(_))
            ));
        }

        assert!(matches!(
            VoteRequest::default().target(Scheme::Candidate),
            Err(VoteError::InvalidRequest(message)) if message == "candidateId is required"
        ));
        assert!(matches!(
            candidate(Value::Null).target(Scheme::Candidate),
            Err(VoteError::InvalidRequest(_))
        ));
        assert!(matches!(
            candidate(json!(10)).target(Scheme::Nomination),
            Err(VoteError::InvalidRequest(message)) if message == "nominationId is required"
        ));
    }

    #[tokio::test]
    async fn test_vote_recorded() {
        let (store, ledger) = ledger(Scheme::Candidate);

        let record = ledger.cast_vote("1.2.3.4", &candidate(json!(11))).await.unwrap();
        assert_eq!(record.target, Target::Candidate(11));
        assert_eq!(record.voter, "1.2.3.4");

        assert_eq!(candidate_votes(&store, 1).await, vec![0, 1]);
        assert_eq!(store.records().await, vec![record]);
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let (store, ledger) = ledger(Scheme::Candidate);

        let result = ledger.cast_vote("1.2.3.4", &candidate(json!(99))).await;
        assert!(matches!(result, Err(VoteError::NotFound(Target::Candidate(99)))));
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_target() {
        let (store, ledger) = ledger(Scheme::Candidate);

        let result = ledger.cast_vote("1.2.3.4", &VoteRequest::default()).await;
        assert!(matches!(result, Err(VoteError::InvalidRequest(_))));
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_same_option_twice() {
        let (store, ledger) = ledger(Scheme::Candidate);

        ledger.cast_vote("1.2.3.4", &candidate(json!(10))).await.unwrap();
        let result = ledger.cast_vote("1.2.3.4", &candidate(json!(10))).await;

        assert!(matches!(result, Err(VoteError::AlreadyVotedForOption)));
        assert_eq!(candidate_votes(&store, 1).await, vec![1, 0]);
    }

    #[tokio::test]
    async fn test_one_choice_per_nomination() {
        let (store, ledger) = ledger(Scheme::Candidate);

        ledger.cast_vote("1.2.3.4", &candidate(json!(10))).await.unwrap();
        let result = ledger.cast_vote("1.2.3.4", &candidate(json!(11))).await;

        assert!(matches!(result, Err(VoteError::AlreadyVotedInNomination)));
        assert_eq!(candidate_votes(&store, 1).await, vec![1, 0]);
        assert_eq!(store.records().await.len(), 1);

        // Other nominations and other voters are unaffected.
        ledger.cast_vote("1.2.3.4", &candidate(json!(20))).await.unwrap();
        ledger.cast_vote("5.6.7.8", &candidate(json!(11))).await.unwrap();
        assert_eq!(candidate_votes(&store, 1).await, vec![1, 1]);
        assert_eq!(candidate_votes(&store, 2).await, vec![1]);
    }

    #[tokio::test]
    async fn test_nomination_scheme() {
        let (store, ledger) = ledger(Scheme::Nomination);
        let request = VoteRequest {
            candidate_id: None,
            nomination_id: Some(json!(2)),
        };

        ledger.cast_vote("1.2.3.4", &request).await.unwrap();
        assert!(matches!(
            ledger.cast_vote("1.2.3.4", &request).await,
            Err(VoteError::AlreadyVotedForOption)
        ));

        let votes: Vec<_> = store
            .nominations()
            .await
            .unwrap()
            .iter()
            .map(|n| n.votes)
            .collect();
        assert_eq!(votes, vec![0, 1]);

        let missing = VoteRequest {
            candidate_id: None,
            nomination_id: Some(json!(3)),
        };
        assert!(matches!(
            ledger.cast_vote("1.2.3.4", &missing).await,
            Err(VoteError::NotFound(Target::Nomination(3)))
        ));
    }

    #[tokio::test]
    async fn test_deadline() {
        let store = Arc::new(MemoryStore::from_seed(&seed()));
        let deadline = Utc::now();
        let ledger = Ledger::new(store.clone(), Scheme::Candidate, Some(deadline));

        let closed = ledger
            .cast_vote_at("1.2.3.4", &candidate(json!(10)), deadline)
            .await;
        assert!(matches!(closed, Err(VoteError::VotingClosed)));
        assert!(store.records().await.is_empty());

        ledger
            .cast_vote_at("1.2.3.4", &candidate(json!(10)), deadline - Duration::seconds(1))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_target() {
        let (store, ledger) = ledger(Scheme::Candidate);
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger.cast_vote("9.9.9.9", &candidate(json!(10))).await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(VoteError::AlreadyVotedForOption) => {}
                Err(other) => panic!("unexpected rejection: {other}"),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(candidate_votes(&store, 1).await, vec![1, 0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_nomination() {
        let (store, ledger) = ledger(Scheme::Candidate);
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = ledger.clone();
                let id = if i % 2 == 0 { 10 } else { 11 };
                tokio::spawn(async move {
                    ledger.cast_vote("9.9.9.9", &candidate(json!(id))).await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(VoteError::AlreadyVotedForOption | VoteError::AlreadyVotedInNomination) => {}
                Err(other) => panic!("unexpected rejection: {other}"),
            }
        }

        assert_eq!(accepted, 1);

        let votes = candidate_votes(&store, 1).await;
        assert_eq!(votes.iter().sum::<u32>(), 1);

        // Tallies never drift from the ledger.
        let records = store.records().await;
        for (candidate, tally) in [(10, votes[0]), (11, votes[1])] {
            let counted = records
                .iter()
                .filter(|r| r.target == Target::Candidate(candidate))
                .count();
            assert_eq!(counted as u32, tally);
        }
    }
}
