//! # Driver Errors
//!
//! Purpose: One error type for every failure a caller can observe, with
//! predicates to branch on without destructuring.

use gremlink_wire::ResponseError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by the driver.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The address did not parse as a URL.
    #[error("invalid address {addr:?}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: url::ParseError,
    },
    /// The content type does not fit the one-byte frame length prefix.
    #[error("content type {0:?} exceeds 255 bytes")]
    ContentTypeTooLong(String),
    /// WebSocket dial, read, or write failure.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    /// Request encoding or response decoding failure.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    /// The server answered with an error status.
    #[error(transparent)]
    Response(#[from] ResponseError),
    /// The server challenged for authentication but no credentials were
    /// configured on the connection.
    #[error("authentication challenged but no credentials configured")]
    MissingCredentials,
    /// The caller's deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The connection was closed, locally or by the peer.
    #[error("connection closed")]
    ConnectionClosed,
    /// The cluster has shut down; no further checkouts are possible.
    #[error("cluster closed")]
    ClusterClosed,
}

impl ClientError {
    /// The server's error status, when this is a response error.
    pub fn response(&self) -> Option<&ResponseError> {
        match self {
            ClientError::Response(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_cluster_closed(&self) -> bool {
        matches!(self, ClientError::ClusterClosed)
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, ClientError::DeadlineExceeded)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.response().is_some_and(ResponseError::is_unauthorized)
    }

    pub fn is_authenticate(&self) -> bool {
        self.response().is_some_and(ResponseError::is_authenticate)
    }

    pub fn is_malformed_request(&self) -> bool {
        self.response()
            .is_some_and(ResponseError::is_malformed_request)
    }

    pub fn is_invalid_request_arguments(&self) -> bool {
        self.response()
            .is_some_and(ResponseError::is_invalid_request_arguments)
    }

    pub fn is_server_error(&self) -> bool {
        self.response().is_some_and(ResponseError::is_server_error)
    }

    pub fn is_script_evaluation_error(&self) -> bool {
        self.response()
            .is_some_and(ResponseError::is_script_evaluation_error)
    }

    pub fn is_server_timeout(&self) -> bool {
        self.response().is_some_and(ResponseError::is_server_timeout)
    }

    pub fn is_server_serialization_error(&self) -> bool {
        self.response()
            .is_some_and(ResponseError::is_server_serialization_error)
    }

    pub fn is_invalid_status(&self) -> bool {
        self.response().is_some_and(ResponseError::is_invalid_status)
    }
}
