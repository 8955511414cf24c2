//! # Votable Targets
//!
//! Both voting schemes share one validation pipeline. The only difference is what a
//! ballot points at:
//!
//! - **Candidate scheme**: the ballot names a candidate, its nomination is looked up
//!   through the candidate's stored reference.
//! - **Nomination scheme**: the ballot names a nomination, which owns itself.
//!
//! Targets are persisted as short tags, `c:<id>` and `n:<id>`.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    models::NominationId,
    store::{Store, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheme {
    #[default]
    Candidate,
    Nomination,
}

impl Scheme {
    /// JSON field carrying the target identifier in a vote request.
    pub fn field(&self) -> &'static str {
        match self {
            Scheme::Candidate => "candidateId",
            Scheme::Nomination => "nominationId",
        }
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "candidate" | "candidates" => Ok(Scheme::Candidate),
            "nomination" | "nominations" => Ok(Scheme::Nomination),
            other => Err(format!("unknown voting scheme '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    Candidate(u32),
    Nomination(NominationId),
}

impl Target {
    pub fn new(scheme: Scheme, id: u32) -> Self {
        match scheme {
            Scheme::Candidate => Target::Candidate(id),
            Scheme::Nomination => Target::Nomination(id),
        }
    }

    pub fn id(&self) -> u32 {
        match *self {
            Target::Candidate(id) | Target::Nomination(id) => id,
        }
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            Target::Candidate(_) => Scheme::Candidate,
            Target::Nomination(_) => Scheme::Nomination,
        }
    }

    pub fn tag(&self) -> String {
        match self {
            Target::Candidate(id) => format!("c:{id}"),
            Target::Nomination(id) => format!("n:{id}"),
        }
    }

    /// Resolves the nomination this target counts against, `None` when the target does not exist.
    pub async fn owning_nomination(
        &self,
        store: &dyn Store,
    ) -> Result<Option<NominationId>, StoreError> {
        match *self {
            Target::Candidate(id) => store.candidate_nomination(id).await,
            Target::Nomination(id) => Ok(store.nomination_exists(id).await?.then_some(id)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Candidate(id) => write!(f, "candidate {id}"),
            Target::Nomination(id) => write!(f, "nomination {id}"),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let (kind, id) = tag
            .split_once(':')
            .ok_or_else(|| format!("malformed target tag '{tag}'"))?;

        let id = id
            .parse()
            .map_err(|e| format!("malformed target id in '{tag}': {e}"))?;

        match kind {
            "c" => Ok(Target::Candidate(id)),
            "n" => Ok(Target::Nomination(id)),
            _ => Err(format!("unknown target kind in '{tag}'")),
        }
    }
}

impl TryFrom<String> for Target {
    type Error = String;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        tag.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.tag()
    }
}
