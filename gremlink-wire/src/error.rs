//! # Response Errors
//!
//! Purpose: Carry an error status back to the caller with enough
//! classification to branch on, without holding the full response alive.

use std::fmt;

use thiserror::Error;

use crate::response::{Response, StatusCode};

/// An error status returned by the server for a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ResponseError {
    pub request_id: String,
    pub code: StatusCode,
    pub message: String,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error ({}: {:?}) in request {:?}: {:?}",
            self.code.0,
            self.code.to_string(),
            self.request_id,
            self.message
        )
    }
}

impl ResponseError {
    /// Extracts the error details from a response carrying an error status.
    pub fn from_response(response: &Response) -> Self {
        ResponseError {
            request_id: response.request_id.clone(),
            code: response.status.code,
            message: response.status.message.clone(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == StatusCode::UNAUTHORIZED
    }

    /// An authentication challenge. The connection handles these inline;
    /// callers only see one when the handshake itself failed.
    pub fn is_authenticate(&self) -> bool {
        self.code == StatusCode::AUTHENTICATE
    }

    pub fn is_malformed_request(&self) -> bool {
        self.code == StatusCode::MALFORMED_REQUEST
    }

    pub fn is_invalid_request_arguments(&self) -> bool {
        self.code == StatusCode::INVALID_REQUEST_ARGUMENTS
    }

    pub fn is_server_error(&self) -> bool {
        self.code == StatusCode::SERVER_ERROR
    }

    pub fn is_script_evaluation_error(&self) -> bool {
        self.code == StatusCode::SCRIPT_EVALUATION_ERROR
    }

    pub fn is_server_timeout(&self) -> bool {
        self.code == StatusCode::SERVER_TIMEOUT
    }

    pub fn is_server_serialization_error(&self) -> bool {
        self.code == StatusCode::SERVER_SERIALIZATION_ERROR
    }

    /// Whether the status code is outside the protocol's known set.
    pub fn is_invalid_status(&self) -> bool {
        self.code.is_invalid()
    }
}
