use std::sync::Arc;

use crate::error::Result;
use crate::model::{
    db::{
        ballot::Ballot,
        candidate::Candidate,
        election::Election,
        session::{SessionStatus, VotingSession},
    },
    mongodb::Id,
};

use super::draft::BallotDraft;

/// Storage needed by the voting protocol.
///
/// Every uniqueness guarantee is delegated to the store: implementations must back
/// [`VotingStore::insert_session`] and [`VotingStore::commit_ballot`] with constraints that
/// hold across processes, not with a check followed by a write.
#[rocket::async_trait]
pub trait VotingStore: Send + Sync {
    /// Fetch an election and its positions.
    async fn election(&self, election_id: Id) -> Result<Option<Election>>;

    /// Fetch the currently approved candidates of an election.
    async fn approved_candidates(&self, election_id: Id) -> Result<Vec<Candidate>>;

    /// Insert a session unless another session already holds the voter's slot for the
    /// election. Returns false, writing nothing, if the slot is taken.
    async fn insert_session(&self, session: &VotingSession) -> Result<bool>;

    async fn session(&self, session_id: Id) -> Result<Option<VotingSession>>;

    /// The session currently holding the voter's slot for the election, if any.
    async fn live_session(&self, election_id: Id, voter_id: Id) -> Result<Option<VotingSession>>;

    /// Move an active session to `Expired` or `Cancelled`, discarding its draft and
    /// releasing the slot. Returns false if the session was not active.
    async fn end_session(&self, session_id: Id, status: SessionStatus) -> Result<bool>;

    /// Overwrite the draft of an active session. Returns false if the session was not active.
    async fn save_draft(&self, session_id: Id, draft: &BallotDraft) -> Result<bool>;

    /// In one atomic unit: insert the ballot and move its session from `Active` to
    /// `Submitted`. Nothing is written unless both succeed.
    ///
    /// Fails with [`AlreadyVoted`](crate::error::Error::AlreadyVoted) if the voter already
    /// has a ballot for the election from another session, and with
    /// [`ConcurrentSubmissionConflict`](crate::error::Error::ConcurrentSubmissionConflict)
    /// if the session already has a ballot, is no longer active, or a concurrent commit
    /// touched the same records.
    async fn commit_ballot(&self, ballot: &Ballot) -> Result<()>;

    async fn ballot_for_session(&self, session_id: Id) -> Result<Option<Ballot>>;
}

/// The store as held in managed state.
pub type DynStore = Arc<dyn VotingStore>;
