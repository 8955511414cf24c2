use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::Target;

pub type NominationId = u32;
pub type CandidateId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nomination {
    pub id: NominationId,
    pub title: String,
    pub emoji: String,
    pub description: String,
    /// Only surfaced in the nomination scheme, always kept in sync with the ledger.
    #[serde(default)]
    pub votes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub nomination_id: NominationId,
    #[serde(default)]
    pub votes: u32,
}

/// Append-only ledger entry binding a voter address to what it voted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: u64,
    pub voter: String,
    pub target: Target,
}

/// Catalog file layout consumed by the seeder.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSeed {
    pub nominations: Vec<SeedNomination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedNomination {
    pub id: NominationId,
    pub title: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub candidates: Vec<SeedCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCandidate {
    pub id: CandidateId,
    pub name: String,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

impl CatalogSeed {
    pub fn read(path: &Path) -> Result<Self, CatalogError> {
        let json = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let catalog = Self::parse(&json)?;
        catalog.validate()?;

        Ok(catalog)
    }

    pub fn parse(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Ids are unique across the file and start at 1, titles and names are not blank.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |message: String| -> Result<(), CatalogError> {
            Err(CatalogError::Invalid(message))
        };

        let mut nomination_ids = HashSet::new();
        let mut candidate_ids = HashSet::new();

        for nomination in &self.nominations {
            if nomination.id == 0 {
                return invalid("nomination ids start at 1".to_string());
            }
            if !nomination_ids.insert(nomination.id) {
                return invalid(format!("duplicate nomination id {}", nomination.id));
            }
            if nomination.title.trim().is_empty() {
                return invalid(format!("nomination {} has a blank title", nomination.id));
            }

            for candidate in &nomination.candidates {
                if candidate.id == 0 {
                    return invalid("candidate ids start at 1".to_string());
                }
                if !candidate_ids.insert(candidate.id) {
                    return invalid(format!("duplicate candidate id {}", candidate.id));
                }
                if candidate.name.trim().is_empty() {
                    return invalid(format!("candidate {} has a blank name", candidate.id));
                }
            }
        }

        Ok(())
    }

    pub fn candidate_count(&self) -> usize {
        self.nominations.iter().map(|n| n.candidates.len()).sum()
    }
}
