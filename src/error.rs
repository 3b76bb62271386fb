//! Error types for lwm2m-enabler
//!
//! Protocol outcomes (NotFound, BadRequest, ...) are not errors: they travel as
//! [`Response`](crate::response::Response) values. `Error` covers everything that
//! fails before a request reaches an enabler: parsing paths and arguments,
//! building malformed requests, loading object models, decoding uplink payloads.

use thiserror::Error;

use crate::response::ResponseCode;

/// Result type alias for lwm2m-enabler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur outside the protocol status set
#[derive(Error, Debug)]
pub enum Error {
    /// Path text could not be parsed
    #[error("Invalid path \"{path}\": {reason}")]
    InvalidPath { path: String, reason: String },

    /// Request does not have a legal shape
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Execute arguments could not be parsed
    #[error("Invalid execute arguments: {0}")]
    InvalidArguments(String),

    /// Failed to load or validate an object model
    #[error("Model error: {0}")]
    Model(String),

    /// CBOR payload could not be decoded
    #[error("CBOR error: {0}")]
    Cbor(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Map the error onto the protocol status a transport should answer with
    pub fn to_response_code(&self) -> ResponseCode {
        match self {
            Error::InvalidPath { .. }
            | Error::InvalidRequest(_)
            | Error::InvalidArguments(_)
            | Error::Cbor(_)
            | Error::Json(_) => ResponseCode::BadRequest,
            Error::Model(_) | Error::Io(_) => ResponseCode::InternalServerError,
        }
    }

    /// Diagnostic text surfaced to the peer
    pub fn diagnostic(&self) -> String {
        self.to_string()
    }
}
