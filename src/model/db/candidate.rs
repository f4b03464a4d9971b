use serde::{Deserialize, Serialize};

use crate::model::{common::election::ApprovalStatus, mongodb::Id};

/// A nominee for a position, as written by the administration system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Foreign Key election ID.
    pub election_id: Id,
    /// Foreign Key position ID.
    pub position_id: Id,
    /// Display name.
    pub name: String,
    /// Only approved candidates may be voted for.
    pub approval: ApprovalStatus,
}

impl Candidate {
    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalStatus::Approved
    }
}
