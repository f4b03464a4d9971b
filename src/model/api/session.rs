use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    db::session::VotingSession,
    mongodb::{id_string, Id},
};

/// A newly created or resumed voting session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescription {
    #[serde(with = "id_string")]
    pub session_id: Id,
    #[serde(with = "id_string")]
    pub election_id: Id,
    pub expires_at: DateTime<Utc>,
}

impl From<&VotingSession> for SessionDescription {
    fn from(session: &VotingSession) -> Self {
        Self {
            session_id: session.id,
            election_id: session.election_id,
            expires_at: session.expires_at,
        }
    }
}
