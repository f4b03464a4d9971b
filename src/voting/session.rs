use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::model::{
    api::draft::PositionStatus,
    db::session::{SessionStatus, VotingSession},
    mongodb::Id,
};

use super::catalog::PositionCatalog;
use super::draft::{BallotDraft, PositionMutation};
use super::store::VotingStore;

/// How many times to try claiming the voter's slot before giving up. A second attempt
/// is only needed after expiring a stale session that held it.
const CLAIM_ATTEMPTS: usize = 2;

/// Opens, resumes and ends voting sessions, and applies draft mutations.
///
/// Expiry is lazy: a session past its `expires_at` is moved to `Expired` by whichever
/// operation next touches it.
pub struct SessionManager<'s, S: ?Sized> {
    store: &'s S,
    session_ttl: Duration,
}

impl<'s, S> SessionManager<'s, S>
where
    S: VotingStore + ?Sized,
{
    pub fn new(store: &'s S, session_ttl: Duration) -> Self {
        Self { store, session_ttl }
    }

    /// Open a session for `voter_id` in `election_id`.
    ///
    /// The voter's slot is claimed by a conditional insert. If another live session already
    /// holds it, that session decides the outcome: an unexpired active one is handed back,
    /// a submitted one means the voter has voted, and an expired one is ended and the claim
    /// retried.
    pub async fn create_session(
        &self,
        election_id: Id,
        voter_id: Id,
        now: DateTime<Utc>,
    ) -> Result<VotingSession> {
        let catalog = PositionCatalog::fetch(self.store, election_id).await?;
        catalog.ensure_open_at(now)?;
        let expires_at = (now + self.session_ttl).min(catalog.end_time);

        for _ in 0..CLAIM_ATTEMPTS {
            let session = VotingSession::new(election_id, voter_id, now, expires_at).activate();
            if self.store.insert_session(&session).await? {
                info!(
                    "Opened voting session {} in election {election_id}, expires {expires_at}",
                    session.id
                );
                return Ok(session);
            }

            // The slot was released between our insert and this read; just try again.
            let Some(live) = self.store.live_session(election_id, voter_id).await? else {
                continue;
            };
            match live.status {
                SessionStatus::Submitted => return Err(Error::AlreadyVoted),
                SessionStatus::Active if !live.is_expired_at(now) => {
                    debug!("Handing back live voting session {}", live.id);
                    return Ok(live);
                }
                SessionStatus::Active => {
                    self.expire(live.id).await?;
                }
                status => debug!("Slot held by session {} in state {status:?}", live.id),
            }
        }

        warn!("Could not claim a voting session in election {election_id}");
        Err(Error::ConcurrentSubmissionConflict)
    }

    /// Fetch an active, unexpired session belonging to `voter_id`.
    ///
    /// An active session found past its expiry is expired on the spot.
    pub async fn resume_session(
        &self,
        session_id: Id,
        voter_id: Id,
        now: DateTime<Utc>,
    ) -> Result<VotingSession> {
        let session = self.owned_session(session_id, voter_id).await?;
        match session.status {
            SessionStatus::Active if session.is_expired_at(now) => {
                self.expire(session_id).await?;
                Err(Error::SessionExpired)
            }
            SessionStatus::Active => Ok(session),
            SessionStatus::Submitted => Err(Error::AlreadyVoted),
            SessionStatus::Expired => Err(Error::SessionExpired),
            SessionStatus::Created | SessionStatus::Cancelled => {
                Err(Error::session_not_found(session_id))
            }
        }
    }

    /// Move an active session to `Expired`, discarding its draft. Returns false, changing
    /// nothing, if the session was not active.
    pub async fn expire(&self, session_id: Id) -> Result<bool> {
        let expired = self
            .store
            .end_session(session_id, SessionStatus::Expired)
            .await?;
        if expired {
            info!("Expired voting session {session_id}");
        }
        Ok(expired)
    }

    /// Abandon a session, discarding its draft. Cancelling a session that has already
    /// ended is a no-op.
    pub async fn cancel(&self, session_id: Id, voter_id: Id) -> Result<()> {
        let session = self.owned_session(session_id, voter_id).await?;
        if session.status == SessionStatus::Active
            && self
                .store
                .end_session(session_id, SessionStatus::Cancelled)
                .await?
        {
            info!("Cancelled voting session {session_id}");
        }
        Ok(())
    }

    /// The current draft of a session, with the catalog it is judged against.
    pub async fn draft(
        &self,
        session_id: Id,
        voter_id: Id,
        now: DateTime<Utc>,
    ) -> Result<(BallotDraft, PositionCatalog)> {
        let session = self.resume_session(session_id, voter_id, now).await?;
        let catalog = PositionCatalog::fetch(self.store, session.election_id).await?;
        Ok((current_draft(&session), catalog))
    }

    /// Apply a mutation to a session's draft and persist the result. A rejected mutation
    /// leaves the stored draft untouched.
    pub async fn mutate(
        &self,
        session_id: Id,
        voter_id: Id,
        mutation: &PositionMutation,
        now: DateTime<Utc>,
    ) -> Result<PositionStatus> {
        let session = self.resume_session(session_id, voter_id, now).await?;
        let catalog = PositionCatalog::fetch(self.store, session.election_id).await?;
        catalog.ensure_open_at(now)?;

        let mut draft = current_draft(&session);
        let position_id = draft.apply(&catalog, mutation)?;
        if !self.store.save_draft(session_id, &draft).await? {
            // The session ended between our read and write.
            return Err(Error::ConcurrentSubmissionConflict);
        }

        Ok(PositionStatus {
            position_id,
            complete: draft.is_position_complete(position_id),
            ballot_complete: draft.is_ballot_complete(&catalog),
        })
    }

    /// Load a session, hiding sessions that belong to other voters.
    pub(super) async fn owned_session(&self, session_id: Id, voter_id: Id) -> Result<VotingSession> {
        self.store
            .session(session_id)
            .await?
            .filter(|session| session.voter_id == voter_id)
            .ok_or_else(|| Error::session_not_found(session_id))
    }
}

fn current_draft(session: &VotingSession) -> BallotDraft {
    session
        .draft()
        .cloned()
        .unwrap_or_else(|| BallotDraft::new(session.id, session.election_id))
}
