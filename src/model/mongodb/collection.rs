use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{
    ballot::Ballot, candidate::Candidate, election::Election, session::VotingSession,
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Read-only collections owned by the administration system.
impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}
impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}

impl MongoCollection for VotingSession {
    const NAME: &'static str = "voting_sessions";
}

impl MongoCollection for Ballot {
    const NAME: &'static str = "ballots";
}

/// At most one live (active or submitted) session per voter per election.
pub const SESSION_SLOT_INDEX: &str = "session_live_slot";
/// At most one ballot per voter per election.
pub const BALLOT_VOTER_INDEX: &str = "ballot_voter_election";
/// At most one ballot per session.
pub const BALLOT_SESSION_INDEX: &str = "ballot_session";

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    // Session collection.
    let slot_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "election_id": 1})
        .options(
            IndexOptions::builder()
                .name(SESSION_SLOT_INDEX.to_string())
                .unique(true)
                .partial_filter_expression(doc! {"live": true})
                .build(),
        )
        .build();
    Coll::<VotingSession>::from_db(db)
        .create_index(slot_index, None)
        .await?;

    // Ballot collection.
    let voter_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "election_id": 1})
        .options(
            IndexOptions::builder()
                .name(BALLOT_VOTER_INDEX.to_string())
                .unique(true)
                .build(),
        )
        .build();
    let session_index = IndexModel::builder()
        .keys(doc! {"session_id": 1})
        .options(
            IndexOptions::builder()
                .name(BALLOT_SESSION_INDEX.to_string())
                .unique(true)
                .build(),
        )
        .build();
    Coll::<Ballot>::from_db(db)
        .create_indexes([voter_index, session_index], None)
        .await?;

    Ok(())
}
