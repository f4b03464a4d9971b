use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{self, serde_helpers::chrono_datetime_as_bson_datetime, to_bson, Bson};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;
use crate::voting::BallotDraft;

/// States in the voting session lifecycle.
///
/// `Created` only exists between construction and the first insert; every stored session
/// starts `Active`. `Submitted`, `Expired` and `Cancelled` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Created,
    Active,
    Submitted,
    Expired,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Submitted | Self::Expired | Self::Cancelled)
    }

    /// Does a session in this state occupy the voter's single slot for its election?
    /// Submitted sessions keep the slot forever, which is what blocks a second vote.
    pub fn holds_slot(self) -> bool {
        !matches!(self, Self::Expired | Self::Cancelled)
    }
}

impl From<SessionStatus> for Bson {
    fn from(status: SessionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

/// Core session data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingSessionCore {
    /// Foreign Key election ID.
    pub election_id: Id,
    /// The voter, as identified by the upstream identity provider.
    pub voter_id: Id,
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Mirror of `status.holds_slot()`. The partial unique index on
    /// (`voter_id`, `election_id`) only covers documents where this is true.
    pub live: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
    pub submitted_at: Option<bson::DateTime>,
    /// The in-progress ballot. Discarded once the session ends.
    pub draft: Option<BallotDraft>,
}

/// A voting session from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingSession {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub session: VotingSessionCore,
}

impl VotingSession {
    /// Create a new session with an empty draft, ready for insertion.
    pub fn new(
        election_id: Id,
        voter_id: Id,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let id = Id::new();
        Self {
            id,
            session: VotingSessionCore {
                election_id,
                voter_id,
                status: SessionStatus::Created,
                live: SessionStatus::Created.holds_slot(),
                created_at,
                expires_at,
                submitted_at: None,
                draft: Some(BallotDraft::new(id, election_id)),
            },
        }
    }

    /// Move from `Created` to `Active`. Sessions are activated before their first write.
    pub fn activate(mut self) -> Self {
        debug_assert_eq!(self.status, SessionStatus::Created);
        self.session.status = SessionStatus::Active;
        self
    }

    /// Has this session passed its expiry time?
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at.map(|t| t.to_chrono())
    }

    /// The draft of an active session. Only terminal sessions have no draft.
    pub fn draft(&self) -> Option<&BallotDraft> {
        self.session.draft.as_ref()
    }
}

impl Deref for VotingSession {
    type Target = VotingSessionCore;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl DerefMut for VotingSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}
