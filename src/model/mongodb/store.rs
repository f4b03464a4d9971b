use mongodb::{
    bson::{self, doc, to_bson},
    error::Error as DbError,
    Client, ClientSession, Database,
};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    common::election::ApprovalStatus,
    db::{
        ballot::Ballot,
        candidate::Candidate,
        election::Election,
        session::{SessionStatus, VotingSession},
    },
};
use crate::voting::{BallotDraft, VotingStore};

use super::bson::Id;
use super::collection::{Coll, BALLOT_VOTER_INDEX};
use super::errors::{duplicate_key_message, is_duplicate_key_error, is_write_conflict};

/// [`VotingStore`] backed by a MongoDB replica set. Uniqueness comes from the indexes
/// created by [`ensure_indexes_exist`](super::ensure_indexes_exist); atomic submission
/// from a multi-document transaction.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn sessions(&self) -> Coll<VotingSession> {
        Coll::from_db(&self.db)
    }

    fn ballots(&self) -> Coll<Ballot> {
        Coll::from_db(&self.db)
    }

    /// The writes of a ballot commit, run inside the caller's transaction.
    async fn commit_in_transaction(
        &self,
        ballot: &Ballot,
        session: &mut ClientSession,
    ) -> Result<()> {
        // Claim the (voter, election) pair and the session in a single insert.
        if let Err(err) = self
            .ballots()
            .insert_one_with_session(ballot, None, session)
            .await
        {
            return Err(classify_ballot_insert(err));
        }

        let filter = doc! {
            "_id": ballot.session_id,
            "status": SessionStatus::Active,
        };
        let update = doc! {
            "$set": {
                "status": SessionStatus::Submitted,
                "submitted_at": bson::DateTime::from_chrono(ballot.submitted_at),
            },
            "$unset": { "draft": "" },
        };
        let result = self
            .sessions()
            .update_one_with_session(filter, update, None, session)
            .await
            .map_err(classify_write)?;
        if result.modified_count != 1 {
            return Err(Error::ConcurrentSubmissionConflict);
        }
        Ok(())
    }
}

/// Work out which uniqueness guarantee a failed ballot insert ran into.
fn classify_ballot_insert(err: DbError) -> Error {
    match duplicate_key_message(&err) {
        Some(message) if message.contains(BALLOT_VOTER_INDEX) => Error::AlreadyVoted,
        Some(_) => Error::ConcurrentSubmissionConflict,
        None => classify_write(err),
    }
}

fn classify_write(err: DbError) -> Error {
    if is_write_conflict(&err) {
        Error::ConcurrentSubmissionConflict
    } else {
        err.into()
    }
}

#[rocket::async_trait]
impl VotingStore for MongoStore {
    async fn election(&self, election_id: Id) -> Result<Option<Election>> {
        let election = Coll::<Election>::from_db(&self.db)
            .find_one(election_id.as_doc(), None)
            .await?;
        Ok(election)
    }

    async fn approved_candidates(&self, election_id: Id) -> Result<Vec<Candidate>> {
        let filter = doc! {
            "election_id": election_id,
            "approval": ApprovalStatus::Approved,
        };
        let candidates: Vec<Candidate> = Coll::<Candidate>::from_db(&self.db)
            .find(filter, None)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn insert_session(&self, session: &VotingSession) -> Result<bool> {
        match self.sessions().insert_one(session, None).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key_error(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn session(&self, session_id: Id) -> Result<Option<VotingSession>> {
        let session = self.sessions().find_one(session_id.as_doc(), None).await?;
        Ok(session)
    }

    async fn live_session(&self, election_id: Id, voter_id: Id) -> Result<Option<VotingSession>> {
        let filter = doc! {
            "election_id": election_id,
            "voter_id": voter_id,
            "live": true,
        };
        let session = self.sessions().find_one(filter, None).await?;
        Ok(session)
    }

    async fn end_session(&self, session_id: Id, status: SessionStatus) -> Result<bool> {
        debug_assert!(status.is_terminal() && !status.holds_slot());
        let filter = doc! {
            "_id": session_id,
            "status": SessionStatus::Active,
        };
        let update = doc! {
            "$set": { "status": status, "live": false },
            "$unset": { "draft": "" },
        };
        let result = self.sessions().update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn save_draft(&self, session_id: Id, draft: &BallotDraft) -> Result<bool> {
        let filter = doc! {
            "_id": session_id,
            "status": SessionStatus::Active,
        };
        let draft = to_bson(draft)?;
        let update = doc! {
            "$set": { "draft": draft },
        };
        let result = self.sessions().update_one(filter, update, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn commit_ballot(&self, ballot: &Ballot) -> Result<()> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        if let Err(err) = self.commit_in_transaction(ballot, &mut session).await {
            if let Err(abort_err) = session.abort_transaction().await {
                warn!("Failed to abort ballot transaction: {abort_err}");
            }
            return Err(err);
        }

        session.commit_transaction().await.map_err(classify_write)
    }

    async fn ballot_for_session(&self, session_id: Id) -> Result<Option<Ballot>> {
        let filter = doc! { "session_id": session_id };
        let ballot = self.ballots().find_one(filter, None).await?;
        Ok(ballot)
    }
}
