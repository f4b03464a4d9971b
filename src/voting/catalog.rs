use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{
    common::election::ElectionStatus,
    db::{candidate::Candidate, election::Election},
    mongodb::Id,
};

use super::store::VotingStore;

/// A position as the ballot sees it: its limits and the candidates currently approved for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPosition {
    pub id: Id,
    pub name: String,
    pub max_selections: usize,
    pub required: bool,
    /// Approved candidates, in catalog order.
    pub candidates: Vec<Id>,
}

impl CatalogPosition {
    pub fn is_eligible(&self, candidate_id: Id) -> bool {
        self.candidates.contains(&candidate_id)
    }

    /// Single-choice positions replace the current selection instead of rejecting a new one.
    pub fn is_single_choice(&self) -> bool {
        self.max_selections == 1
    }
}

/// Read-only snapshot of an election's positions and approved candidates.
///
/// Snapshots are never cached across requests: every operation that validates a
/// selection builds a fresh one with [`PositionCatalog::fetch`].
#[derive(Debug, Clone)]
pub struct PositionCatalog {
    pub election_id: Id,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    positions: Vec<CatalogPosition>,
    by_id: HashMap<Id, usize>,
}

impl PositionCatalog {
    /// Assemble a catalog from an election and its candidates. Candidates that are not
    /// approved, or that belong to another election or an unknown position, are left out.
    pub fn new(election: &Election, candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let mut positions: Vec<CatalogPosition> = election
            .positions
            .iter()
            .map(|position| CatalogPosition {
                id: position.id,
                name: position.name.clone(),
                max_selections: (position.max_selections as usize).max(1),
                required: position.required,
                candidates: Vec::new(),
            })
            .collect();
        let by_id: HashMap<Id, usize> = positions
            .iter()
            .enumerate()
            .map(|(index, position)| (position.id, index))
            .collect();

        for candidate in candidates {
            if !candidate.is_approved() || candidate.election_id != election.id {
                continue;
            }
            if let Some(&index) = by_id.get(&candidate.position_id) {
                positions[index].candidates.push(candidate.id);
            }
        }

        Self {
            election_id: election.id,
            status: election.status,
            start_time: election.start_time,
            end_time: election.end_time,
            positions,
            by_id,
        }
    }

    /// Load the current catalog for an election from the store.
    pub async fn fetch<S>(store: &S, election_id: Id) -> Result<Self>
    where
        S: VotingStore + ?Sized,
    {
        let election = store
            .election(election_id)
            .await?
            .ok_or_else(|| Error::ElectionNotFound(election_id.to_string()))?;
        let candidates = store.approved_candidates(election_id).await?;
        Ok(Self::new(&election, candidates))
    }

    pub fn position(&self, position_id: Id) -> Option<&CatalogPosition> {
        self.by_id.get(&position_id).map(|&index| &self.positions[index])
    }

    /// All positions, in ballot order.
    pub fn positions(&self) -> &[CatalogPosition] {
        &self.positions
    }

    /// Is the election accepting votes at `now`?
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ElectionStatus::Active && self.start_time <= now && now <= self.end_time
    }

    /// Fail with [`Error::ElectionNotOpen`] unless the election is accepting votes at `now`.
    pub fn ensure_open_at(&self, now: DateTime<Utc>) -> Result<()> {
        if self.is_open_at(now) {
            return Ok(());
        }
        let reason = if self.status != ElectionStatus::Active {
            format!("election {} is {:?}", self.election_id, self.status)
        } else if now < self.start_time {
            format!("election {} opens at {}", self.election_id, self.start_time)
        } else {
            format!("election {} closed at {}", self.election_id, self.end_time)
        };
        Err(Error::ElectionNotOpen(reason))
    }
}
