//! # Response Model and Status Taxonomy
//!
//! Purpose: Decode server messages and classify their status codes into
//! the success / partial / auth-challenge / error categories the driver
//! acts on.
//!
//! ## Design Principles
//! 1. **Opaque Results**: `result.data` stays raw JSON; the driver never
//!    interprets it.
//! 2. **Total Classification**: Every integer classifies into exactly one
//!    category; unknown codes are errors.
//! 3. **Cheap Copies**: `StatusCode` is a `u16` newtype, freely copyable.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::ResponseError;

/// One server message for a request: a partial result, a terminal result,
/// an authentication challenge, or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "requestId", default)]
    pub request_id: String,
    pub status: ResponseStatus,
    #[serde(default)]
    pub result: ResponseResult,
}

/// Status details of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseStatus {
    pub code: StatusCode,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    #[serde(default)]
    pub message: String,
}

/// Result payload of a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseResult {
    /// Raw result data, handed to the caller untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
}

impl Response {
    /// Whether more messages follow in this response stream.
    pub fn is_partial(&self) -> bool {
        self.status.code.is_partial()
    }

    /// Classifies the response, turning error statuses into a
    /// [`ResponseError`]. Auth challenges classify as errors here; the
    /// connection consumes them before callers ever see one.
    pub fn check(&self) -> Result<(), ResponseError> {
        if self.status.code.is_terminal() || self.status.code.is_partial() {
            Ok(())
        } else {
            Err(ResponseError::from_response(self))
        }
    }
}

/// A server status code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StatusCode(pub u16);

impl StatusCode {
    /// Request processed to completion; stream ends.
    pub const SUCCESS: StatusCode = StatusCode(200);
    /// Request processed but produced no result; stream ends.
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    /// Some content returned, more messages follow.
    pub const PARTIAL_CONTENT: StatusCode = StatusCode(206);
    /// Requested resources the user may not access.
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    /// Challenge to authenticate before the request proceeds.
    pub const AUTHENTICATE: StatusCode = StatusCode(407);
    /// Message could not be parsed or routed.
    pub const MALFORMED_REQUEST: StatusCode = StatusCode(498);
    /// Message parsed but its arguments were conflicting or incomplete.
    pub const INVALID_REQUEST_ARGUMENTS: StatusCode = StatusCode(499);
    /// General server failure.
    pub const SERVER_ERROR: StatusCode = StatusCode(500);
    /// Script failed to evaluate.
    pub const SCRIPT_EVALUATION_ERROR: StatusCode = StatusCode(597);
    /// Server exceeded one of its timeouts.
    pub const SERVER_TIMEOUT: StatusCode = StatusCode(598);
    /// Server could not serialize a result object.
    pub const SERVER_SERIALIZATION_ERROR: StatusCode = StatusCode(599);

    /// Terminal success: the stream ends with this message.
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusCode::SUCCESS | StatusCode::NO_CONTENT)
    }

    /// Partial success: more messages follow.
    pub fn is_partial(self) -> bool {
        self == StatusCode::PARTIAL_CONTENT
    }

    /// Authentication challenge; not an error from the caller's view.
    pub fn is_authenticate(self) -> bool {
        self == StatusCode::AUTHENTICATE
    }

    /// Whether the code is outside the known protocol set.
    pub fn is_invalid(self) -> bool {
        !matches!(
            self,
            StatusCode::SUCCESS
                | StatusCode::NO_CONTENT
                | StatusCode::PARTIAL_CONTENT
                | StatusCode::UNAUTHORIZED
                | StatusCode::AUTHENTICATE
                | StatusCode::MALFORMED_REQUEST
                | StatusCode::INVALID_REQUEST_ARGUMENTS
                | StatusCode::SERVER_ERROR
                | StatusCode::SCRIPT_EVALUATION_ERROR
                | StatusCode::SERVER_TIMEOUT
                | StatusCode::SERVER_SERIALIZATION_ERROR
        )
    }

    /// Error from the caller's perspective: neither terminal, partial,
    /// nor an auth challenge. Unknown codes are errors.
    pub fn is_error(self) -> bool {
        !self.is_terminal() && !self.is_partial() && !self.is_authenticate()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            StatusCode::SUCCESS => "Success",
            StatusCode::NO_CONTENT => "No Content",
            StatusCode::PARTIAL_CONTENT => "Partial Content",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::AUTHENTICATE => "Authenticate",
            StatusCode::MALFORMED_REQUEST => "Malformed Request",
            StatusCode::INVALID_REQUEST_ARGUMENTS => "Invalid Request Arguments",
            StatusCode::SERVER_ERROR => "Server Error",
            StatusCode::SCRIPT_EVALUATION_ERROR => "Script Evaluation Error",
            StatusCode::SERVER_TIMEOUT => "Server Timeout",
            StatusCode::SERVER_SERIALIZATION_ERROR => "Server Serialization Error",
            StatusCode(code) => return write!(f, "Invalid Response Code: {}", code),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_known_code() {
        let terminal = [200u16, 204];
        let partial = [206u16];
        let authenticate = [407u16];
        let errors = [401u16, 498, 499, 500, 597, 598, 599];

        for code in terminal {
            let code = StatusCode(code);
            assert!(code.is_terminal());
            assert!(!code.is_partial());
            assert!(!code.is_authenticate());
            assert!(!code.is_error());
            assert!(!code.is_invalid());
        }
        for code in partial {
            let code = StatusCode(code);
            assert!(code.is_partial());
            assert!(!code.is_terminal());
            assert!(!code.is_error());
        }
        for code in authenticate {
            let code = StatusCode(code);
            assert!(code.is_authenticate());
            assert!(!code.is_error());
            assert!(!code.is_invalid());
        }
        for code in errors {
            let code = StatusCode(code);
            assert!(code.is_error());
            assert!(!code.is_invalid());
        }
    }

    #[test]
    fn unknown_codes_are_invalid_errors() {
        for code in [0u16, 123, 201, 300, 404, 600, 999] {
            let code = StatusCode(code);
            assert!(code.is_invalid());
            assert!(code.is_error());
        }
    }

    fn response_with(code: u16) -> Response {
        Response {
            request_id: "r-1".to_string(),
            status: ResponseStatus {
                code: StatusCode(code),
                attributes: HashMap::new(),
                message: String::new(),
            },
            result: ResponseResult::default(),
        }
    }

    #[test]
    fn check_passes_only_terminal_and_partial() {
        for code in [200u16, 204, 206] {
            assert!(response_with(code).check().is_ok(), "code {}", code);
        }
        // Everything else must come back as an error so the connection
        // can intercept challenges before the caller's callback runs.
        for code in [401u16, 407, 498, 499, 500, 597, 598, 599, 123] {
            let err = response_with(code).check().unwrap_err();
            assert_eq!(err.code, StatusCode(code));
        }
        assert!(response_with(407).check().unwrap_err().is_authenticate());
    }

    #[test]
    fn decodes_response_and_keeps_data_raw() {
        let body = r#"{
            "requestId": "r-9",
            "status": {"code": 206, "attributes": {}, "message": ""},
            "result": {"data": [{"id": 1}], "meta": {"source": "g"}}
        }"#;
        let response: Response = serde_json::from_str(body).unwrap();
        assert_eq!(response.request_id, "r-9");
        assert!(response.is_partial());
        assert!(response.check().is_ok());
        let data = response.result.data.expect("data");
        assert_eq!(data.get(), r#"[{"id": 1}]"#);
    }

    #[test]
    fn decodes_response_without_result() {
        let body = r#"{"requestId": "r-1", "status": {"code": 204}}"#;
        let response: Response = serde_json::from_str(body).unwrap();
        assert!(response.check().is_ok());
        assert!(!response.is_partial());
        assert!(response.result.data.is_none());
    }

    #[test]
    fn status_display_names() {
        assert_eq!(StatusCode::SUCCESS.to_string(), "Success");
        assert_eq!(StatusCode::SERVER_TIMEOUT.to_string(), "Server Timeout");
        assert_eq!(StatusCode(123).to_string(), "Invalid Response Code: 123");
    }
}
