//! # Redis
//!
//! Persistent store for the catalog and the vote ledger.
//!
//! ## Layout
//!
//! - `nominations`: hash of nomination id to JSON (title, emoji, description)
//! - `nomination_votes`: hash of nomination id to **votes** int
//! - `nomination:{id}:candidates`: hash of candidate id to name
//! - `candidate_nomination`: hash of candidate id to owning nomination id, never rewritten
//! - `candidate_votes`: hash of candidate id to **votes** int
//! - `ballots:{voter}`: hash of nomination id to target tag (`c:12`, `n:3`)
//! - `vote_records`: append-only list of JSON vote records, ids from `vote_records:seq`
//!
//! ## Uniqueness
//!
//! `ballots:{voter}` is the (voter, nomination) uniqueness index. A commit runs as one
//! Lua script, so Redis executes the index check, the record append and the tally
//! increment with no other command interleaved. A losing request sees the existing
//! tag and reports which rule it hit.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    models::{Candidate, CandidateId, CatalogSeed, Nomination, NominationId, VoteRecord},
    store::{Commit, Conflict, Store, StoreError},
    target::Target,
};

pub const NOMINATIONS: &str = "nominations";
pub const NOMINATION_VOTES: &str = "nomination_votes";
pub const CANDIDATE_NOMINATION: &str = "candidate_nomination";
pub const CANDIDATE_VOTES: &str = "candidate_votes";
pub const VOTE_RECORDS: &str = "vote_records";
pub const VOTE_RECORD_SEQ: &str = "vote_records:seq";

const COMMIT_SCRIPT: &str = r#"
local existing = redis.call('HGET', KEYS[1], ARGV[1])
if existing then
    return {0, existing}
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('HINCRBY', KEYS[2], ARGV[3], 1)
local id = redis.call('INCR', KEYS[3])
redis.call('RPUSH', KEYS[4], cjson.encode({id = id, voter = ARGV[4], target = ARGV[2]}))
return {id, ARGV[2]}
"#;

fn candidates_key(nomination: NominationId) -> String {
    format!("nomination:{nomination}:candidates")
}

fn ballots_key(voter: &str) -> String {
    format!("ballots:{voter}")
}

fn tally_key(target: Target) -> &'static str {
    match target {
        Target::Candidate(_) => CANDIDATE_VOTES,
        Target::Nomination(_) => NOMINATION_VOTES,
    }
}

fn parse_tag(tag: &str) -> Result<Target, StoreError> {
    tag.parse().map_err(StoreError::Corrupt)
}

#[derive(Serialize, Deserialize)]
struct StoredNomination {
    title: String,
    emoji: String,
    description: String,
}

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

/// What a seeding pass wrote.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub nominations: usize,
    pub candidates: usize,
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    commit_script: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let connection = init_redis(redis_url).await?;
        info!("Connected to Redis");

        Ok(Self::new(connection))
    }

    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            commit_script: Script::new(COMMIT_SCRIPT),
        }
    }

    /// Writes catalog entries. Tallies are created at zero only when missing, and a
    /// candidate may never move to a different nomination.
    pub async fn seed(&self, catalog: &CatalogSeed) -> Result<SeedReport, StoreError> {
        let mut conn = self.connection.clone();
        let mut report = SeedReport::default();

        for nomination in &catalog.nominations {
            for candidate in &nomination.candidates {
                let owner: Option<NominationId> =
                    conn.hget(CANDIDATE_NOMINATION, candidate.id).await?;

                if let Some(owner) = owner.filter(|owner| *owner != nomination.id) {
                    return Err(StoreError::Corrupt(format!(
                        "candidate {} already belongs to nomination {owner}",
                        candidate.id
                    )));
                }
            }
        }

        let mut pipe = redis::pipe();
        pipe.atomic();

        for nomination in &catalog.nominations {
            let stored = serde_json::to_string(&StoredNomination {
                title: nomination.title.clone(),
                emoji: nomination.emoji.clone(),
                description: nomination.description.clone(),
            })?;

            pipe.hset(NOMINATIONS, nomination.id, stored)
                .ignore()
                .hset_nx(NOMINATION_VOTES, nomination.id, 0)
                .ignore();
            report.nominations += 1;

            for candidate in &nomination.candidates {
                pipe.hset(candidates_key(nomination.id), candidate.id, &candidate.name)
                    .ignore()
                    .hset_nx(CANDIDATE_NOMINATION, candidate.id, nomination.id)
                    .ignore()
                    .hset_nx(CANDIDATE_VOTES, candidate.id, 0)
                    .ignore();
                report.candidates += 1;
            }
        }

        let () = pipe.query_async(&mut conn).await?;

        Ok(report)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn nominations(&self) -> Result<Vec<Nomination>, StoreError> {
        let mut conn = self.connection.clone();

        let (stored, votes): (HashMap<NominationId, String>, HashMap<NominationId, u32>) =
            redis::pipe()
                .atomic()
                .hgetall(NOMINATIONS)
                .hgetall(NOMINATION_VOTES)
                .query_async(&mut conn)
                .await?;

        let mut nominations = stored
            .into_iter()
            .map(|(id, json)| {
                let stored: StoredNomination = serde_json::from_str(&json)?;

                Ok(Nomination {
                    id,
                    title: stored.title,
                    emoji: stored.emoji,
                    description: stored.description,
                    votes: votes.get(&id).copied().unwrap_or(0),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        nominations.sort_by_key(|nomination| nomination.id);

        Ok(nominations)
    }

    async fn candidates(&self, nomination: NominationId) -> Result<Vec<Candidate>, StoreError> {
        let mut conn = self.connection.clone();

        let names: HashMap<CandidateId, String> = conn.hgetall(candidates_key(nomination)).await?;
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<CandidateId> = names.keys().copied().collect();
        ids.sort_unstable();

        let votes: Vec<Option<u32>> = redis::cmd("HMGET")
            .arg(CANDIDATE_VOTES)
            .arg(&ids)
            .query_async(&mut conn)
            .await?;

        Ok(ids
            .into_iter()
            .zip(votes)
            .map(|(id, votes)| Candidate {
                id,
                name: names[&id].clone(),
                nomination_id: nomination,
                votes: votes.unwrap_or(0),
            })
            .collect())
    }

    async fn nomination_exists(&self, nomination: NominationId) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();

        Ok(conn.hexists(NOMINATIONS, nomination).await?)
    }

    async fn candidate_nomination(
        &self,
        candidate: CandidateId,
    ) -> Result<Option<NominationId>, StoreError> {
        let mut conn = self.connection.clone();

        Ok(conn.hget(CANDIDATE_NOMINATION, candidate).await?)
    }

    async fn voted_targets(&self, voter: &str) -> Result<Vec<Target>, StoreError> {
        let mut conn = self.connection.clone();

        let tags: Vec<String> = conn.hvals(ballots_key(voter)).await?;

        tags.iter().map(|tag| parse_tag(tag)).collect()
    }

    async fn has_voted_for(&self, voter: &str, target: Target) -> Result<bool, StoreError> {
        Ok(self.voted_targets(voter).await?.contains(&target))
    }

    async fn has_voted_in(
        &self,
        voter: &str,
        nomination: NominationId,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();

        Ok(conn.hexists(ballots_key(voter), nomination).await?)
    }

    async fn commit(
        &self,
        voter: &str,
        target: Target,
        nomination: NominationId,
    ) -> Result<Commit, StoreError> {
        let mut conn = self.connection.clone();
        let tag = target.tag();

        let (id, recorded): (u64, String) = self
            .commit_script
            .key(ballots_key(voter))
            .key(tally_key(target))
            .key(VOTE_RECORD_SEQ)
            .key(VOTE_RECORDS)
            .arg(nomination)
            .arg(&tag)
            .arg(target.id())
            .arg(voter)
            .invoke_async(&mut conn)
            .await?;

        if id > 0 {
            return Ok(Commit::Recorded(VoteRecord {
                id,
                voter: voter.to_string(),
                target,
            }));
        }

        let conflict = if parse_tag(&recorded)? == target {
            Conflict::SameTarget
        } else {
            Conflict::SameNomination
        };

        Ok(Commit::Rejected(conflict))
    }
}
