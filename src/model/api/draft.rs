use serde::{Deserialize, Serialize};

use crate::model::mongodb::{id_string, Id};
use crate::voting::{BallotDraft, PositionCatalog};

/// Completion state after a draft mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionStatus {
    #[serde(with = "id_string")]
    pub position_id: Id,
    pub complete: bool,
    pub ballot_complete: bool,
}

/// One position of a draft snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    #[serde(with = "id_string")]
    pub position_id: Id,
    pub name: String,
    pub max_selections: usize,
    pub required: bool,
    /// Hex IDs of the selected candidates, in selection order.
    pub candidate_ids: Vec<String>,
    pub abstain: bool,
    pub complete: bool,
}

/// Snapshot of a draft, laid out in ballot order for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    #[serde(with = "id_string")]
    pub session_id: Id,
    #[serde(with = "id_string")]
    pub election_id: Id,
    pub positions: Vec<PositionView>,
    pub complete: bool,
}

impl DraftView {
    pub fn new(draft: &BallotDraft, catalog: &PositionCatalog) -> Self {
        let positions = catalog
            .positions()
            .iter()
            .map(|position| PositionView {
                position_id: position.id,
                name: position.name.clone(),
                max_selections: position.max_selections,
                required: position.required,
                candidate_ids: draft
                    .selections(position.id)
                    .iter()
                    .map(Id::to_string)
                    .collect(),
                abstain: draft.is_abstained(position.id),
                complete: draft.is_position_complete(position.id),
            })
            .collect();
        Self {
            session_id: draft.session_id,
            election_id: draft.election_id,
            positions,
            complete: draft.is_ballot_complete(catalog),
        }
    }
}
