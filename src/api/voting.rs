use chrono::Utc;
use rocket::{
    serde::json::{self, Json},
    Route, State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        draft::{DraftView, PositionStatus},
        identity::VoterIdentity,
        receipt::Receipt,
        session::SessionDescription,
    },
    mongodb::Id,
};
use crate::voting::{
    DynStore, PositionMutation, SessionManager, SubmissionCoordinator, VotingStore,
};

pub fn routes() -> Vec<Route> {
    routes![
        create_session,
        get_draft,
        mutate_draft,
        submit,
        cancel,
        get_receipt,
    ]
}

fn sessions<'s>(store: &'s DynStore, config: &Config) -> SessionManager<'s, dyn VotingStore> {
    SessionManager::new(store.as_ref(), config.session_ttl())
}

fn coordinator<'s>(
    store: &'s DynStore,
    config: &'s Config,
) -> SubmissionCoordinator<'s, dyn VotingStore> {
    SubmissionCoordinator::new(
        store.as_ref(),
        config.session_ttl(),
        config.integrity_secret(),
    )
}

#[post("/voter/elections/<election_id>/session")]
async fn create_session(
    voter: VoterIdentity,
    election_id: Id,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<Json<SessionDescription>> {
    let session = sessions(store, config)
        .create_session(election_id, voter.voter_id, Utc::now())
        .await?;
    Ok(Json(SessionDescription::from(&session)))
}

#[get("/voter/sessions/<session_id>/draft")]
async fn get_draft(
    voter: VoterIdentity,
    session_id: Id,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<Json<DraftView>> {
    let (draft, catalog) = sessions(store, config)
        .draft(session_id, voter.voter_id, Utc::now())
        .await?;
    Ok(Json(DraftView::new(&draft, &catalog)))
}

#[post("/voter/sessions/<session_id>/draft", data = "<mutation>", format = "json")]
async fn mutate_draft(
    voter: VoterIdentity,
    session_id: Id,
    mutation: std::result::Result<Json<PositionMutation>, json::Error<'_>>,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<Json<PositionStatus>> {
    let mutation = mutation.map_err(|err| Error::BadRequest(err.to_string()))?;
    let status = sessions(store, config)
        .mutate(session_id, voter.voter_id, &mutation, Utc::now())
        .await?;
    Ok(Json(status))
}

#[post("/voter/sessions/<session_id>/submit")]
async fn submit(
    voter: VoterIdentity,
    session_id: Id,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<Json<Receipt>> {
    let receipt = coordinator(store, config)
        .submit(session_id, voter.voter_id, Utc::now())
        .await?;
    Ok(Json(receipt))
}

#[post("/voter/sessions/<session_id>/cancel")]
async fn cancel(
    voter: VoterIdentity,
    session_id: Id,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<()> {
    sessions(store, config)
        .cancel(session_id, voter.voter_id)
        .await
}

#[get("/voter/sessions/<session_id>/receipt")]
async fn get_receipt(
    voter: VoterIdentity,
    session_id: Id,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<Json<Receipt>> {
    let receipt = coordinator(store, config)
        .receipt(session_id, voter.voter_id)
        .await?;
    Ok(Json(receipt))
}
