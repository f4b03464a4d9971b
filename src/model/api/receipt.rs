use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    db::ballot::Ballot,
    mongodb::{id_string, Id},
};

/// Proof of submission returned to the voter. Deliberately carries no vote content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(with = "id_string")]
    pub ballot_id: Id,
    pub submitted_at: DateTime<Utc>,
}

impl From<&Ballot> for Receipt {
    fn from(ballot: &Ballot) -> Self {
        Self {
            ballot_id: ballot.id,
            submitted_at: ballot.submitted_at,
        }
    }
}
