use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::model::{api::receipt::Receipt, db::ballot::Ballot, mongodb::Id};

use super::catalog::PositionCatalog;
use super::draft::SelectionValidator;
use super::session::SessionManager;
use super::store::VotingStore;

/// Turns a session's draft into a committed ballot.
pub struct SubmissionCoordinator<'s, S: ?Sized> {
    store: &'s S,
    sessions: SessionManager<'s, S>,
    integrity_secret: &'s [u8],
}

impl<'s, S> SubmissionCoordinator<'s, S>
where
    S: VotingStore + ?Sized,
{
    pub fn new(store: &'s S, session_ttl: Duration, integrity_secret: &'s [u8]) -> Self {
        Self {
            store,
            sessions: SessionManager::new(store, session_ttl),
            integrity_secret,
        }
    }

    /// Submit the draft of an active session as the voter's ballot.
    ///
    /// The draft is checked against a freshly fetched catalog, then the ballot is inserted
    /// and the session marked submitted in a single atomic commit. Until that commit
    /// succeeds the session stays active with its draft intact, so a failed submission can
    /// be corrected or retried.
    pub async fn submit(
        &self,
        session_id: Id,
        voter_id: Id,
        now: DateTime<Utc>,
    ) -> Result<Receipt> {
        let session = self
            .sessions
            .resume_session(session_id, voter_id, now)
            .await?;
        let catalog = PositionCatalog::fetch(self.store, session.election_id).await?;
        catalog.ensure_open_at(now)?;

        let draft = session
            .draft()
            .ok_or_else(|| Error::session_not_found(session_id))?;
        SelectionValidator::new(&catalog).validate(draft)?;
        let position_votes = draft.to_position_votes(&catalog)?;

        let ballot = Ballot::seal(
            session_id,
            session.election_id,
            voter_id,
            position_votes,
            now,
            self.integrity_secret,
        );
        if let Err(err) = self.store.commit_ballot(&ballot).await {
            warn!("Ballot for session {session_id} was not committed: {err}");
            return Err(err);
        }

        info!(
            "Committed ballot {} for session {session_id} in election {}",
            ballot.id, ballot.election_id
        );
        Ok(Receipt::from(&ballot))
    }

    /// The receipt of the ballot a session committed.
    pub async fn receipt(&self, session_id: Id, voter_id: Id) -> Result<Receipt> {
        let session = self.sessions.owned_session(session_id, voter_id).await?;
        let ballot = self
            .store
            .ballot_for_session(session.id)
            .await?
            .ok_or_else(|| Error::session_not_found(session_id))?;
        Ok(Receipt::from(&ballot))
    }
}

#[cfg(test)]
mod tests {
    use chrono::SubsecRound;

    use crate::model::{
        common::{
            ballot::PositionVote,
            election::{ApprovalStatus, ElectionStatus},
        },
        db::{
            candidate::Candidate,
            election::{Election, Position},
            session::{SessionStatus, VotingSession},
        },
    };
    use crate::voting::{memory::MemoryStore, PositionMutation};

    use super::*;

    const KEY: &[u8] = b"integrity";

    struct Fixture {
        store: MemoryStore,
        election: Election,
        candidates: Vec<Candidate>,
        voter: Id,
        now: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            log4rs_test_utils::test_logging::init_logging_once_for(["campus_ballot"], None, None);
            let now = Utc::now();
            let (store, election, candidates) = MemoryStore::example(now);
            Self {
                store,
                election,
                candidates,
                voter: Id::new(),
                now,
            }
        }

        fn coordinator(&self) -> SubmissionCoordinator<'_, MemoryStore> {
            SubmissionCoordinator::new(&self.store, Duration::minutes(15), KEY)
        }

        fn sessions(&self) -> SessionManager<'_, MemoryStore> {
            SessionManager::new(&self.store, Duration::minutes(15))
        }

        fn position(&self, index: usize) -> Id {
            self.election.positions[index].id
        }

        async fn open(&self) -> VotingSession {
            self.sessions()
                .create_session(self.election.id, self.voter, self.now)
                .await
                .unwrap()
        }

        async fn select(&self, session: &VotingSession, position: usize, candidate: usize) {
            let mutation = PositionMutation::Select {
                position_id: self.position(position),
                candidate_id: self.candidates[candidate].id,
            };
            self.sessions()
                .mutate(session.id, self.voter, &mutation, self.now)
                .await
                .unwrap();
        }

        async fn abstain(&self, session: &VotingSession, position: usize) {
            let mutation = PositionMutation::Abstain {
                position_id: self.position(position),
                abstain: true,
            };
            self.sessions()
                .mutate(session.id, self.voter, &mutation, self.now)
                .await
                .unwrap();
        }
    }

    #[rocket::async_test]
    async fn selection_and_abstention_are_committed() {
        let f = Fixture::new();
        let session = f.open().await;
        f.select(&session, 0, 0).await;
        f.abstain(&session, 1).await;

        let receipt = f
            .coordinator()
            .submit(session.id, f.voter, f.now)
            .await
            .unwrap();

        let ballots = f.store.ballots();
        assert_eq!(ballots.len(), 1);
        let ballot = &ballots[0];
        assert_eq!(receipt.ballot_id, ballot.id);
        assert_eq!(receipt.submitted_at, f.now.trunc_subsecs(3));
        assert_eq!(
            ballot.position_votes,
            vec![
                PositionVote::selected(f.position(0), vec![f.candidates[0].id]),
                PositionVote::abstained(f.position(1)),
            ]
        );
        assert_eq!(ballot.position_votes.len(), f.election.positions.len());
        assert!(ballot.verify_integrity(KEY));

        let stored = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Submitted);
        assert_eq!(stored.submitted_at(), Some(receipt.submitted_at));
        assert!(stored.draft().is_none());
    }

    #[rocket::async_test]
    async fn voters_cannot_vote_twice() {
        let f = Fixture::new();
        let session = f.open().await;
        f.select(&session, 0, 0).await;
        f.select(&session, 1, 3).await;
        let receipt = f
            .coordinator()
            .submit(session.id, f.voter, f.now)
            .await
            .unwrap();

        let err = f
            .sessions()
            .create_session(f.election.id, f.voter, f.now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyVoted));

        // A retry of the same submission does not write a second ballot.
        let err = f
            .coordinator()
            .submit(session.id, f.voter, f.now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyVoted));
        assert_eq!(f.store.ballots().len(), 1);

        // The receipt is still available.
        let again = f.coordinator().receipt(session.id, f.voter).await.unwrap();
        assert_eq!(again, receipt);
    }

    #[rocket::async_test]
    async fn incomplete_ballot_stays_editable() {
        let f = Fixture::new();
        let session = f.open().await;
        f.select(&session, 0, 0).await;
        let before = f.store.session(session.id).await.unwrap().unwrap();

        let err = f
            .coordinator()
            .submit(session.id, f.voter, f.now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IncompleteBallot(1)));

        let after = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(after.status, SessionStatus::Active);
        assert_eq!(after.draft(), before.draft());
        assert!(f.store.ballots().is_empty());

        // Finishing the ballot lets it through.
        f.abstain(&session, 1).await;
        f.coordinator()
            .submit(session.id, f.voter, f.now)
            .await
            .unwrap();
    }

    #[rocket::async_test]
    async fn revoked_candidate_blocks_submission() {
        let f = Fixture::new();
        let session = f.open().await;
        f.select(&session, 0, 1).await;
        f.abstain(&session, 1).await;
        f.store
            .set_approval(f.candidates[1].id, ApprovalStatus::Rejected);

        let err = f
            .coordinator()
            .submit(session.id, f.voter, f.now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSelection(_)));

        let stored = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        assert_eq!(
            stored.draft().unwrap().selections(f.position(0)),
            &[f.candidates[1].id]
        );
    }

    #[rocket::async_test]
    async fn closed_election_blocks_submission() {
        let f = Fixture::new();
        let session = f.open().await;
        f.select(&session, 0, 0).await;
        f.abstain(&session, 1).await;
        f.store
            .update_election(f.election.id, |e| e.status = ElectionStatus::Completed);

        let err = f
            .coordinator()
            .submit(session.id, f.voter, f.now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ElectionNotOpen(_)));
        assert!(f.store.ballots().is_empty());
    }

    #[rocket::async_test]
    async fn submission_after_election_end_expires_the_session() {
        let f = Fixture::new();
        let end = f.now + Duration::seconds(10);
        f.store.update_election(f.election.id, |e| e.end_time = end);
        let session = f.open().await;
        f.select(&session, 0, 0).await;
        f.abstain(&session, 1).await;

        let err = f
            .coordinator()
            .submit(session.id, f.voter, f.now + Duration::seconds(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionExpired));
        let stored = f.store.session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Expired);
        assert!(f.store.ballots().is_empty());
    }

    #[rocket::async_test]
    async fn untouched_optional_position_is_blank() {
        let now = Utc::now();
        let mut election = Election::example(now);
        election
            .election
            .positions
            .push(Position::example("Treasurer", 1, false));
        let candidates: Vec<Candidate> = election
            .positions
            .iter()
            .map(|p| Candidate::example(election.id, p, &p.name))
            .collect();
        let f = Fixture {
            store: MemoryStore::with_election(election.clone(), candidates.clone()),
            election,
            candidates,
            voter: Id::new(),
            now,
        };
        let session = f.open().await;
        f.select(&session, 0, 0).await;
        f.abstain(&session, 1).await;

        f.coordinator()
            .submit(session.id, f.voter, f.now)
            .await
            .unwrap();
        let ballot = &f.store.ballots()[0];
        assert_eq!(ballot.position_votes.len(), 3);
        assert_eq!(ballot.position_votes[2], PositionVote::blank(f.position(2)));
    }

    #[rocket::async_test]
    async fn concurrent_submissions_commit_once() {
        let f = Fixture::new();
        let session = f.open().await;
        f.select(&session, 0, 0).await;
        f.abstain(&session, 1).await;

        let coordinator = f.coordinator();
        let (a, b) = rocket::tokio::join!(
            coordinator.submit(session.id, f.voter, f.now),
            coordinator.submit(session.id, f.voter, f.now),
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(|r| r.err()).unwrap();
        assert!(matches!(
            err,
            Error::AlreadyVoted | Error::ConcurrentSubmissionConflict
        ));
        assert_eq!(f.store.ballots().len(), 1);
    }

    #[rocket::async_test]
    async fn racing_sessions_commit_once() {
        let f = Fixture::new();
        let first = f.open().await;
        // A second session that slipped past the slot check.
        let second = VotingSession::new(
            f.election.id,
            f.voter,
            f.now,
            f.now + Duration::minutes(15),
        )
        .activate();
        f.store.force_insert_session(second.clone());
        for session in [&first, &second] {
            f.select(session, 0, 0).await;
            f.abstain(session, 1).await;
        }

        f.coordinator()
            .submit(first.id, f.voter, f.now)
            .await
            .unwrap();
        let err = f
            .coordinator()
            .submit(second.id, f.voter, f.now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyVoted));
        assert_eq!(f.store.ballots().len(), 1);

        // The losing session is untouched and can still be cancelled.
        let stored = f.store.session(second.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        f.sessions().cancel(second.id, f.voter).await.unwrap();
    }

    #[rocket::async_test]
    async fn racing_sessions_submit_concurrently() {
        let f = Fixture::new();
        let first = f.open().await;
        let second = VotingSession::new(
            f.election.id,
            f.voter,
            f.now,
            f.now + Duration::minutes(15),
        )
        .activate();
        f.store.force_insert_session(second.clone());
        for session in [&first, &second] {
            f.select(session, 0, 0).await;
            f.abstain(session, 1).await;
        }

        let coordinator = f.coordinator();
        let (a, b) = rocket::tokio::join!(
            coordinator.submit(first.id, f.voter, f.now),
            coordinator.submit(second.id, f.voter, f.now),
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(|r| r.err()).unwrap();
        assert!(matches!(err, Error::AlreadyVoted));
        assert_eq!(f.store.ballots().len(), 1);
    }

    #[rocket::async_test]
    async fn receipts_are_private() {
        let f = Fixture::new();
        let session = f.open().await;

        let err = f
            .coordinator()
            .receipt(session.id, f.voter)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
        let err = f
            .coordinator()
            .receipt(session.id, Id::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }
}
