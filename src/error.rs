use log::{error, warn};
use mongodb::bson::ser::Error as BsonError;
use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder};
use thiserror::Error;

use crate::model::identity::IdentityError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Bson(#[from] BsonError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        Err(match self {
            Self::BadRequest(ref msg) => {
                warn!("{msg}");
                Status::BadRequest
            }
            Self::NotFound(ref msg) => {
                warn!("Not found: {msg}");
                Status::NotFound
            }
            Self::Db(_) | Self::Bson(_) | Self::Identity(_) => {
                error!("{self}");
                Status::InternalServerError
            }
        })
    }
}
