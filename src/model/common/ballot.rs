use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// The recorded choice for a single position: either some candidates, or an explicit
/// abstention. An optional position the voter never touched has neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionVote {
    pub position_id: Id,
    pub candidate_ids: Vec<Id>,
    pub abstain: bool,
}

impl PositionVote {
    pub fn selected(position_id: Id, candidate_ids: Vec<Id>) -> Self {
        Self {
            position_id,
            candidate_ids,
            abstain: false,
        }
    }

    pub fn abstained(position_id: Id) -> Self {
        Self {
            position_id,
            candidate_ids: Vec::new(),
            abstain: true,
        }
    }

    pub fn blank(position_id: Id) -> Self {
        Self {
            position_id,
            candidate_ids: Vec::new(),
            abstain: false,
        }
    }

    /// Canonical byte encoding, used when computing the ballot integrity hash.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(12 + 1 + 4 + 12 * self.candidate_ids.len());
        bytes.extend(self.position_id.to_bytes());
        bytes.push(u8::from(self.abstain));
        // Candidate counts are tiny; the length prefix keeps adjacent votes unambiguous.
        bytes.extend((self.candidate_ids.len() as u32).to_le_bytes());
        for candidate in &self.candidate_ids {
            bytes.extend(candidate.to_bytes());
        }
        bytes
    }
}
