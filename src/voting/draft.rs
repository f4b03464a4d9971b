use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::ballot::PositionVote,
    mongodb::{id_string, serde_string_map, Id},
};

use super::catalog::{CatalogPosition, PositionCatalog};

/// What the voter has chosen for one position so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "candidate_ids")]
pub enum PositionChoice {
    /// One or more candidates, in the order they were chosen. Never empty.
    Selections(Vec<Id>),
    /// An explicit choice not to vote for this position.
    Abstain,
}

/// A single edit to a draft, as sent by the voting client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PositionMutation {
    #[serde(rename_all = "camelCase")]
    Select {
        #[serde(with = "id_string")]
        position_id: Id,
        #[serde(with = "id_string")]
        candidate_id: Id,
    },
    #[serde(rename_all = "camelCase")]
    Deselect {
        #[serde(with = "id_string")]
        position_id: Id,
        #[serde(with = "id_string")]
        candidate_id: Id,
    },
    #[serde(rename_all = "camelCase")]
    Abstain {
        #[serde(with = "id_string")]
        position_id: Id,
        abstain: bool,
    },
}

impl PositionMutation {
    pub fn position_id(&self) -> Id {
        match *self {
            Self::Select { position_id, .. }
            | Self::Deselect { position_id, .. }
            | Self::Abstain { position_id, .. } => position_id,
        }
    }
}

/// A voter's in-progress ballot.
///
/// Choices are keyed by position ID; nothing here depends on the order in which the
/// voter visits positions. A position with no entry is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotDraft {
    pub session_id: Id,
    pub election_id: Id,
    #[serde(with = "serde_string_map")]
    choices: HashMap<Id, PositionChoice>,
}

impl BallotDraft {
    pub fn new(session_id: Id, election_id: Id) -> Self {
        Self {
            session_id,
            election_id,
            choices: HashMap::new(),
        }
    }

    /// Select a candidate for a position.
    ///
    /// On a single-choice position the new candidate replaces any previous one. On a
    /// multi-choice position a selection beyond the limit is rejected and the existing
    /// selections are kept. Selecting on an abstained position withdraws the abstention.
    pub fn set_selection(
        &mut self,
        catalog: &PositionCatalog,
        position_id: Id,
        candidate_id: Id,
    ) -> Result<()> {
        let position = SelectionValidator::new(catalog).eligible(position_id, candidate_id)?;

        match self.choices.get_mut(&position_id) {
            Some(PositionChoice::Selections(selected)) => {
                if selected.contains(&candidate_id) {
                    return Ok(());
                }
                if position.is_single_choice() {
                    *selected = vec![candidate_id];
                } else if selected.len() >= position.max_selections {
                    return Err(Error::InvalidSelection(format!(
                        "position {} allows at most {} selections",
                        position_id, position.max_selections
                    )));
                } else {
                    selected.push(candidate_id);
                }
            }
            Some(PositionChoice::Abstain) | None => {
                self.choices
                    .insert(position_id, PositionChoice::Selections(vec![candidate_id]));
            }
        }
        Ok(())
    }

    /// Deselect a candidate. Removing a candidate that is not selected does nothing.
    pub fn remove_selection(&mut self, position_id: Id, candidate_id: Id) {
        if let Some(PositionChoice::Selections(selected)) = self.choices.get_mut(&position_id) {
            selected.retain(|id| *id != candidate_id);
            if selected.is_empty() {
                self.choices.remove(&position_id);
            }
        }
    }

    /// Abstain from a position, clearing its selections, or withdraw an abstention.
    ///
    /// Withdrawing leaves the position with no selections; it stays incomplete until the
    /// voter chooses again. Withdrawing on a position that has selections changes nothing.
    pub fn set_abstain(
        &mut self,
        catalog: &PositionCatalog,
        position_id: Id,
        abstain: bool,
    ) -> Result<()> {
        SelectionValidator::new(catalog).position(position_id)?;
        if abstain {
            self.choices.insert(position_id, PositionChoice::Abstain);
        } else if self.is_abstained(position_id) {
            self.choices.remove(&position_id);
        }
        Ok(())
    }

    /// Apply a client mutation, returning the position it touched.
    pub fn apply(&mut self, catalog: &PositionCatalog, mutation: &PositionMutation) -> Result<Id> {
        match *mutation {
            PositionMutation::Select {
                position_id,
                candidate_id,
            } => self.set_selection(catalog, position_id, candidate_id)?,
            PositionMutation::Deselect {
                position_id,
                candidate_id,
            } => self.remove_selection(position_id, candidate_id),
            PositionMutation::Abstain {
                position_id,
                abstain,
            } => self.set_abstain(catalog, position_id, abstain)?,
        }
        Ok(mutation.position_id())
    }

    /// Currently selected candidates for a position, in selection order.
    pub fn selections(&self, position_id: Id) -> &[Id] {
        match self.choices.get(&position_id) {
            Some(PositionChoice::Selections(selected)) => selected.as_slice(),
            _ => &[],
        }
    }

    pub fn is_abstained(&self, position_id: Id) -> bool {
        matches!(self.choices.get(&position_id), Some(PositionChoice::Abstain))
    }

    /// A position is complete once it has a selection or an abstention.
    pub fn is_position_complete(&self, position_id: Id) -> bool {
        !self.selections(position_id).is_empty() || self.is_abstained(position_id)
    }

    /// Every required position of the catalog is complete.
    pub fn is_ballot_complete(&self, catalog: &PositionCatalog) -> bool {
        SelectionValidator::new(catalog).missing(self).is_empty()
    }

    /// Project the draft onto one vote per catalog position, in ballot order.
    ///
    /// Untouched optional positions become blank votes: no candidates, no abstention.
    pub fn to_position_votes(&self, catalog: &PositionCatalog) -> Result<Vec<PositionVote>> {
        let missing = SelectionValidator::new(catalog).missing(self);
        if !missing.is_empty() {
            return Err(Error::IncompleteBallot(missing.len()));
        }

        let votes = catalog
            .positions()
            .iter()
            .map(|position| match self.choices.get(&position.id) {
                Some(PositionChoice::Selections(selected)) => {
                    PositionVote::selected(position.id, selected.clone())
                }
                Some(PositionChoice::Abstain) => PositionVote::abstained(position.id),
                None => PositionVote::blank(position.id),
            })
            .collect();
        Ok(votes)
    }

    /// Iterate over every touched position and its choice.
    pub fn choices(&self) -> impl Iterator<Item = (&Id, &PositionChoice)> {
        self.choices.iter()
    }
}

/// Checks draft choices against a catalog snapshot.
pub struct SelectionValidator<'c> {
    catalog: &'c PositionCatalog,
}

impl<'c> SelectionValidator<'c> {
    pub fn new(catalog: &'c PositionCatalog) -> Self {
        Self { catalog }
    }

    /// Look up a position, failing if the election has no such position.
    pub fn position(&self, position_id: Id) -> Result<&'c CatalogPosition> {
        self.catalog.position(position_id).ok_or_else(|| {
            Error::InvalidSelection(format!(
                "position {} is not part of election {}",
                position_id, self.catalog.election_id
            ))
        })
    }

    /// Look up a position, failing unless the candidate is approved for it.
    pub fn eligible(&self, position_id: Id, candidate_id: Id) -> Result<&'c CatalogPosition> {
        let position = self.position(position_id)?;
        if !position.is_eligible(candidate_id) {
            return Err(Error::InvalidSelection(format!(
                "candidate {} is not an approved candidate for position {}",
                candidate_id, position_id
            )));
        }
        Ok(position)
    }

    /// Required positions the draft has not completed, in ballot order.
    pub fn missing(&self, draft: &BallotDraft) -> Vec<Id> {
        self.catalog
            .positions()
            .iter()
            .filter(|position| position.required && !draft.is_position_complete(position.id))
            .map(|position| position.id)
            .collect()
    }

    /// Re-check every held choice against the catalog. A candidate that has since lost
    /// eligibility is an error, never silently dropped.
    pub fn validate(&self, draft: &BallotDraft) -> Result<()> {
        if draft.election_id != self.catalog.election_id {
            return Err(Error::InvalidSelection(format!(
                "draft belongs to election {}",
                draft.election_id
            )));
        }
        for (&position_id, choice) in draft.choices() {
            let position = self.position(position_id)?;
            if let PositionChoice::Selections(selected) = choice {
                if selected.len() > position.max_selections {
                    return Err(Error::InvalidSelection(format!(
                        "position {} allows at most {} selections",
                        position_id, position.max_selections
                    )));
                }
                for &candidate_id in selected {
                    self.eligible(position_id, candidate_id)?;
                }
            }
        }
        Ok(())
    }
}
