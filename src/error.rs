use jsonwebtoken::errors::Error as JwtError;
use mongodb::{bson::ser::Error as BsonError, error::Error as DbError};
use rocket::{
    http::Status,
    request::Outcome,
    response::{status::Custom, Responder},
    serde::json::Json,
    Catcher, Request,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Election not found: {0}")]
    ElectionNotFound(String),
    #[error("Election is not open for voting: {0}")]
    ElectionNotOpen(String),
    #[error("A ballot has already been cast for this election")]
    AlreadyVoted,
    #[error("Voting session not found: {0}")]
    SessionNotFound(String),
    #[error("Voting session has expired")]
    SessionExpired,
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),
    #[error("Ballot is incomplete: {0} required position(s) have no choice")]
    IncompleteBallot(usize),
    #[error("Another submission for this ballot is in progress or already succeeded")]
    ConcurrentSubmissionConflict,
    #[error(transparent)]
    PersistenceFailure(#[from] DbError),
    #[error("Failed to encode document: {0}")]
    Encoding(#[from] BsonError),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl Error {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ElectionNotFound(_) => "ElectionNotFound",
            Self::ElectionNotOpen(_) => "ElectionNotOpen",
            Self::AlreadyVoted => "AlreadyVoted",
            Self::SessionNotFound(_) => "SessionNotFound",
            Self::SessionExpired => "SessionExpired",
            Self::InvalidSelection(_) => "InvalidSelection",
            Self::IncompleteBallot(_) => "IncompleteBallot",
            Self::ConcurrentSubmissionConflict => "ConcurrentSubmissionConflict",
            Self::PersistenceFailure(_) | Self::Encoding(_) => "PersistenceFailure",
            Self::Unauthorized(_) => "Unauthorized",
            Self::BadRequest(_) => "BadRequest",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::ElectionNotFound(_) | Self::SessionNotFound(_) => Status::NotFound,
            Self::ElectionNotOpen(_) => Status::Forbidden,
            Self::AlreadyVoted | Self::ConcurrentSubmissionConflict => Status::Conflict,
            Self::SessionExpired => Status::Gone,
            Self::InvalidSelection(_) | Self::IncompleteBallot(_) => Status::UnprocessableEntity,
            Self::PersistenceFailure(_) | Self::Encoding(_) => Status::InternalServerError,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::BadRequest(_) => Status::BadRequest,
        }
    }

    pub fn session_not_found(id: impl ToString) -> Self {
        Self::SessionNotFound(id.to_string())
    }

    fn body(&self) -> ErrorBody {
        // Hide database internals from clients.
        let message = if matches!(self, Self::PersistenceFailure(_) | Self::Encoding(_)) {
            "Storage failure, please retry".to_string()
        } else {
            self.to_string()
        };
        ErrorBody {
            error: self.kind(),
            message,
        }
    }

    /// Fail a request guard with this error. Rocket drops guard errors on the way to the
    /// catcher, so the body is left in the request cache for [`catchers`] to send.
    pub fn guard_failure<T>(self, req: &Request<'_>) -> Outcome<T, Self> {
        debug!("{self}");
        let body = self.body();
        req.local_cache(|| GuardFailure(Some(body)));
        Outcome::Failure((self.status(), self))
    }
}

impl From<JwtError> for Error {
    fn from(err: JwtError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

/// JSON body sent with every error response.
#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        Custom(status, Json(self.body())).respond_to(req)
    }
}

struct GuardFailure(Option<ErrorBody>);

/// Catchers that keep the `{error, message}` shape for requests no handler answered.
pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

#[catch(default)]
fn default_catcher(status: Status, req: &Request<'_>) -> Custom<Json<ErrorBody>> {
    if let GuardFailure(Some(body)) = req.local_cache(|| GuardFailure(None)) {
        return Custom(status, Json(body.clone()));
    }
    let error = match status.code {
        401 => "Unauthorized",
        404 => "NotFound",
        400..=499 => "BadRequest",
        _ => "InternalError",
    };
    let message = status.reason().unwrap_or("Unknown error").to_string();
    Custom(status, Json(ErrorBody { error, message }))
}
