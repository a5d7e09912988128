use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// All the ways a request can fail.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    /// Malformed or missing input.
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// No session where one is required.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// The caller lacks the required relationship to the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// The operation is invalid for the poll's current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// A re-vote on a uniqueness-constrained poll type.
    #[error("Duplicate vote: {0}")]
    DuplicateVote(String),
}

impl Error {
    pub fn bad_request(what: impl Into<String>) -> Self {
        Self::BadRequest(what.into())
    }

    pub fn unauthorized(what: impl Into<String>) -> Self {
        Self::Unauthorized(what.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        Self::Forbidden(what.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        warn!("{self}");
        Err(match self {
            Self::Db(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.into_kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::BadRequest(_) | Self::InvalidState(_) => Status::BadRequest,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::DuplicateVote(_) => Status::Conflict,
        })
    }
}
