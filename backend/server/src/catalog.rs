//! # Catalog
//!
//! Read-only projection of nominations for display, plus the targets the caller
//! already picked so the frontend can grey them out.
use serde::Serialize;

use crate::{
    models::{Candidate, CandidateId, Nomination},
    store::{Store, StoreError},
    target::Scheme,
};

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub nominations: Vec<NominationView>,
    pub voted_for: Vec<u32>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct NominationView {
    pub id: u32,
    pub title: String,
    pub emoji: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<CandidateView>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CandidateView {
    pub id: CandidateId,
    pub name: String,
    pub votes: u32,
}

impl From<Candidate> for CandidateView {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name,
            votes: candidate.votes,
        }
    }
}

fn view(
    nomination: Nomination,
    scheme: Scheme,
    candidates: Option<Vec<CandidateView>>,
) -> NominationView {
    NominationView {
        id: nomination.id,
        title: nomination.title,
        emoji: nomination.emoji,
        description: nomination.description,
        votes: (scheme == Scheme::Nomination).then_some(nomination.votes),
        candidates,
    }
}

pub async fn list_catalog(
    store: &dyn Store,
    scheme: Scheme,
    voter: &str,
) -> Result<Catalog, StoreError> {
    let mut nominations = Vec::new();

    for nomination in store.nominations().await? {
        let candidates = match scheme {
            Scheme::Candidate => Some(
                store
                    .candidates(nomination.id)
                    .await?
                    .into_iter()
                    .map(CandidateView::from)
                    .collect(),
            ),
            Scheme::Nomination => None,
        };

        nominations.push(view(nomination, scheme, candidates));
    }

    let mut voted_for: Vec<u32> = store
        .voted_targets(voter)
        .await?
        .into_iter()
        .filter(|target| target.scheme() == scheme)
        .map(|target| target.id())
        .collect();
    voted_for.sort_unstable();

    Ok(Catalog {
        nominations,
        voted_for,
    })
}
