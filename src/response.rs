//! Typed responses returned by every enabler operation

use coap_lite::ResponseType;
use std::fmt;

use crate::error::Error;
use crate::link_format::Link;
use crate::node::Node;
use crate::path::Path;

/// Closed set of statuses an operation can end with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Created,
    Deleted,
    Changed,
    Content,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

impl ResponseCode {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ResponseCode::Created
                | ResponseCode::Deleted
                | ResponseCode::Changed
                | ResponseCode::Content
        )
    }

    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// CoAP response code to put on the wire
    pub fn to_coap(self) -> ResponseType {
        match self {
            ResponseCode::Created => ResponseType::Created,
            ResponseCode::Deleted => ResponseType::Deleted,
            ResponseCode::Changed => ResponseType::Changed,
            ResponseCode::Content => ResponseType::Content,
            ResponseCode::BadRequest => ResponseType::BadRequest,
            ResponseCode::NotFound => ResponseType::NotFound,
            ResponseCode::MethodNotAllowed => ResponseType::MethodNotAllowed,
            ResponseCode::InternalServerError => ResponseType::InternalServerError,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResponseCode::Created => "2.01 CREATED",
            ResponseCode::Deleted => "2.02 DELETED",
            ResponseCode::Changed => "2.04 CHANGED",
            ResponseCode::Content => "2.05 CONTENT",
            ResponseCode::BadRequest => "4.00 BAD_REQUEST",
            ResponseCode::NotFound => "4.04 NOT_FOUND",
            ResponseCode::MethodNotAllowed => "4.05 METHOD_NOT_ALLOWED",
            ResponseCode::InternalServerError => "5.00 INTERNAL_SERVER_ERROR",
        };
        f.write_str(text)
    }
}

/// Outcome of one operation, optionally carrying content
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T = ()> {
    code: ResponseCode,
    content: Option<T>,
    error_message: Option<String>,
}

pub type CreateResponse = Response<Path>;
pub type ReadResponse = Response<Node>;
pub type ObserveResponse = Response<Node>;
pub type WriteResponse = Response;
pub type DeleteResponse = Response;
pub type ExecuteResponse = Response;
pub type DiscoverResponse = Response<Vec<Link>>;
pub type BootstrapReadResponse = Response<Node>;
pub type BootstrapWriteResponse = Response;
pub type BootstrapDeleteResponse = Response;
pub type BootstrapDiscoverResponse = Response<Vec<Link>>;

impl<T> Response<T> {
    fn new(code: ResponseCode, content: Option<T>, error_message: Option<String>) -> Self {
        Self {
            code,
            content,
            error_message,
        }
    }

    /// 2.01, optionally with the location of the created instance
    pub fn created(location: Option<T>) -> Self {
        Self::new(ResponseCode::Created, location, None)
    }

    pub fn deleted() -> Self {
        Self::new(ResponseCode::Deleted, None, None)
    }

    pub fn changed() -> Self {
        Self::new(ResponseCode::Changed, None, None)
    }

    pub fn content(content: T) -> Self {
        Self::new(ResponseCode::Content, Some(content), None)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::BadRequest, None, Some(message.into()))
    }

    pub fn not_found() -> Self {
        Self::new(ResponseCode::NotFound, None, None)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(ResponseCode::MethodNotAllowed, None, None)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::InternalServerError, None, Some(message.into()))
    }

    /// Error response for a library error (bad path, malformed payload, ...)
    pub fn from_error(err: &Error) -> Self {
        Self::new(err.to_response_code(), None, Some(err.diagnostic()))
    }

    pub fn code(&self) -> ResponseCode {
        self.code
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    pub fn content_ref(&self) -> Option<&T> {
        self.content.as_ref()
    }

    pub fn into_content(self) -> Option<T> {
        self.content
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Same status and message with the content dropped
    pub fn discard_content<U>(self) -> Response<U> {
        Response::new(self.code, None, self.error_message)
    }
}
