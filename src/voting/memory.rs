//! In-process [`VotingStore`] for tests. A single mutex stands in for the database's
//! unique indexes and transactions. Reads and commits yield to the runtime first, so
//! joined futures interleave between loading a session and committing its ballot.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use mongodb::bson;
use rocket::tokio::task::yield_now;

use crate::error::{Error, Result};
use crate::model::{
    common::election::ApprovalStatus,
    db::{
        ballot::Ballot,
        candidate::Candidate,
        election::{Election, ElectionCore},
        session::{SessionStatus, VotingSession},
    },
    mongodb::Id,
};

use super::draft::BallotDraft;
use super::store::VotingStore;

#[derive(Default)]
struct State {
    elections: HashMap<Id, Election>,
    candidates: Vec<Candidate>,
    sessions: HashMap<Id, VotingSession>,
    ballots: Vec<Ballot>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn with_election(election: Election, candidates: Vec<Candidate>) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.elections.insert(election.id, election);
            state.candidates = candidates;
        }
        store
    }

    /// An open election (see [`Election::example`]) with three approved candidates per
    /// position. Candidates are returned in position order.
    pub fn example(now: DateTime<Utc>) -> (Self, Election, Vec<Candidate>) {
        let election = Election::example(now);
        let candidates: Vec<Candidate> = election
            .positions
            .iter()
            .flat_map(|position| {
                (1..=3).map(|n| {
                    Candidate::example(election.id, position, &format!("{} {n}", position.name))
                })
            })
            .collect();
        let store = Self::with_election(election.clone(), candidates.clone());
        (store, election, candidates)
    }

    /// Change an election as the administration system would.
    pub fn update_election(&self, election_id: Id, update: impl FnOnce(&mut ElectionCore)) {
        let mut state = self.state.lock().unwrap();
        let election = state.elections.get_mut(&election_id).unwrap();
        update(&mut election.election);
    }

    pub fn set_approval(&self, candidate_id: Id, approval: ApprovalStatus) {
        let mut state = self.state.lock().unwrap();
        let candidate = state
            .candidates
            .iter_mut()
            .find(|c| c.id == candidate_id)
            .unwrap();
        candidate.approval = approval;
    }

    /// Insert a session without the slot check, as if another process had raced us past
    /// the live-session index.
    pub fn force_insert_session(&self, session: VotingSession) {
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert(session.id, session);
    }

    pub fn ballots(&self) -> Vec<Ballot> {
        self.state.lock().unwrap().ballots.clone()
    }
}

#[rocket::async_trait]
impl VotingStore for MemoryStore {
    async fn election(&self, election_id: Id) -> Result<Option<Election>> {
        Ok(self.state.lock().unwrap().elections.get(&election_id).cloned())
    }

    async fn approved_candidates(&self, election_id: Id) -> Result<Vec<Candidate>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .candidates
            .iter()
            .filter(|c| c.election_id == election_id && c.is_approved())
            .cloned()
            .collect())
    }

    async fn insert_session(&self, session: &VotingSession) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let taken = state.sessions.values().any(|s| {
            s.live && s.voter_id == session.voter_id && s.election_id == session.election_id
        });
        if taken {
            return Ok(false);
        }
        state.sessions.insert(session.id, session.clone());
        Ok(true)
    }

    async fn session(&self, session_id: Id) -> Result<Option<VotingSession>> {
        yield_now().await;
        Ok(self.state.lock().unwrap().sessions.get(&session_id).cloned())
    }

    async fn live_session(&self, election_id: Id, voter_id: Id) -> Result<Option<VotingSession>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sessions
            .values()
            .find(|s| s.live && s.voter_id == voter_id && s.election_id == election_id)
            .cloned())
    }

    async fn end_session(&self, session_id: Id, status: SessionStatus) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.status == SessionStatus::Active => {
                session.status = status;
                session.live = false;
                session.draft = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_draft(&self, session_id: Id, draft: &BallotDraft) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.status == SessionStatus::Active => {
                session.draft = Some(draft.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit_ballot(&self, ballot: &Ballot) -> Result<()> {
        yield_now().await;
        let mut state = self.state.lock().unwrap();
        if state.ballots.iter().any(|b| b.session_id == ballot.session_id) {
            return Err(Error::ConcurrentSubmissionConflict);
        }
        if state
            .ballots
            .iter()
            .any(|b| b.voter_id == ballot.voter_id && b.election_id == ballot.election_id)
        {
            return Err(Error::AlreadyVoted);
        }
        let session = match state.sessions.get_mut(&ballot.session_id) {
            Some(session) if session.status == SessionStatus::Active => session,
            _ => return Err(Error::ConcurrentSubmissionConflict),
        };
        session.status = SessionStatus::Submitted;
        session.submitted_at = Some(bson::DateTime::from_chrono(ballot.submitted_at));
        session.draft = None;
        state.ballots.push(ballot.clone());
        Ok(())
    }

    async fn ballot_for_session(&self, session_id: Id) -> Result<Option<Ballot>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .ballots
            .iter()
            .find(|b| b.session_id == session_id)
            .cloned())
    }
}
