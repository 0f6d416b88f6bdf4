//! # Request Model
//!
//! Purpose: Define the outgoing message shape and the typed argument
//! payloads for each server operation.
//!
//! ## Design Principles
//! 1. **Open Composition**: Session and transaction argument shapes embed
//!    the base shapes via `#[serde(flatten)]` instead of a closed enum.
//! 2. **Opaque Payload**: `Request.args` is a JSON value so the engine can
//!    serialize any argument struct without knowing its concrete type.
//! 3. **Stable Field Names**: Serialized names follow the server protocol
//!    (`requestId`, `op`, `processor`, `args`) exactly.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Operation names understood by the server.
pub mod ops {
    pub const EVAL: &str = "eval";
    pub const AUTHENTICATION: &str = "authentication";
    pub const CLOSE: &str = "close";
}

/// Processor names routing a request on the server side.
pub mod processors {
    /// The default (sessionless) processor.
    pub const DEFAULT: &str = "";
    /// The session processor, binding requests to server-side state.
    pub const SESSION: &str = "session";
}

/// Script language identifier accepted by stock servers.
pub const LANGUAGE_GREMLIN_GROOVY: &str = "gremlin-groovy";

/// Variable bindings made visible to an evaluated script.
pub type Bindings = HashMap<String, Value>;

/// A raw request as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub op: String,
    pub processor: String,
    pub args: Value,
}

impl Request {
    /// Builds a request with a freshly generated id.
    pub fn new(
        processor: &str,
        op: &str,
        args: impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Self::with_id(Uuid::new_v4().to_string(), processor, op, args)
    }

    /// Builds a request reusing an existing id, e.g. when answering an
    /// authentication challenge for an in-flight request.
    pub fn with_id(
        request_id: impl Into<String>,
        processor: &str,
        op: &str,
        args: impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Request {
            request_id: request_id.into(),
            op: op.to_string(),
            processor: processor.to_string(),
            args: serde_json::to_value(args)?,
        })
    }
}

/// Arguments available to all operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpArgs {
    /// Result batch size; `None` uses the server default.
    #[serde(
        rename = "batchSize",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub batch_size: Option<u32>,
}

/// Arguments for the `eval` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalArgs {
    #[serde(flatten)]
    pub op: OpArgs,
    /// The script to evaluate.
    pub gremlin: String,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub bindings: Bindings,
    pub language: String,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub aliases: HashMap<String, String>,
    /// Server-side evaluation timeout in milliseconds.
    #[serde(rename = "scriptEvaluationTimeout")]
    pub script_evaluation_timeout: u64,
}

/// Arguments for the `authentication` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationArgs {
    pub sasl: String,
    #[serde(rename = "saslMechanism")]
    pub sasl_mechanism: String,
}

impl AuthenticationArgs {
    /// Derives SASL PLAIN arguments from a username and password.
    ///
    /// The token is `base64(0x00 + username + 0x00 + password)`.
    pub fn plain(username: &str, password: &str) -> Self {
        let mut token = Vec::with_capacity(username.len() + password.len() + 2);
        token.push(0);
        token.extend_from_slice(username.as_bytes());
        token.push(0);
        token.extend_from_slice(password.as_bytes());

        AuthenticationArgs {
            sasl: BASE64.encode(token),
            sasl_mechanism: "PLAIN".to_string(),
        }
    }
}

/// Arguments binding a request to a server-side session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionArgs {
    pub session: String,
}

/// Arguments for closing a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloseArgs {
    /// Force-close even if a transaction is open.
    #[serde(default)]
    pub force: bool,
}

/// Eval arguments carrying a transaction-management flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvalArgs {
    #[serde(flatten)]
    pub eval: EvalArgs,
    #[serde(rename = "manageTransaction", default)]
    pub manage_transaction: bool,
}

/// Eval arguments routed through the session processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionEvalArgs {
    #[serde(flatten)]
    pub session: SessionArgs,
    #[serde(flatten)]
    pub eval: TransactionEvalArgs,
}

/// Close arguments routed through the session processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCloseArgs {
    #[serde(flatten)]
    pub session: SessionArgs,
    #[serde(flatten)]
    pub close: CloseArgs,
}
