//! # Operators
//!
//! Purpose: Build well-formed requests (eval, authenticate, session
//! close) with configured defaults and route them through anything that
//! can process a request, a bare connection or a whole cluster alike.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use gremlink_wire::{
    ops, processors, AuthenticationArgs, Bindings, CloseArgs, EvalArgs, OpArgs, Request,
    Response, SessionArgs, SessionCloseArgs, SessionEvalArgs, TransactionEvalArgs,
    LANGUAGE_GREMLIN_GROOVY,
};

use crate::cluster::Cluster;
use crate::conn::Connection;
use crate::deadline::Deadline;
use crate::error::ClientError;

/// Default server-side script evaluation timeout.
pub const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_millis(3000);

/// Callback receiving each partial or terminal response of a request.
pub type OnResponse<'a> = &'a mut (dyn FnMut(&Response) + Send);

/// Capability to process one raw request and stream its responses.
///
/// Implemented by [`Connection`] and [`Cluster`]; an operator is agnostic
/// to whether it talks to one socket or a pool.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    async fn process_request(
        &self,
        deadline: Deadline,
        request: Request,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError>;
}

#[async_trait]
impl RequestProcessor for Connection {
    async fn process_request(
        &self,
        deadline: Deadline,
        request: Request,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        Connection::process_request(self, deadline, &request, on_response).await
    }
}

#[async_trait]
impl RequestProcessor for Cluster {
    async fn process_request(
        &self,
        deadline: Deadline,
        request: Request,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        Cluster::process_request(self, deadline, &request, on_response).await
    }
}

#[async_trait]
impl<P: RequestProcessor + ?Sized> RequestProcessor for Arc<P> {
    async fn process_request(
        &self,
        deadline: Deadline,
        request: Request,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        (**self).process_request(deadline, request, on_response).await
    }
}

/// Defaults applied by the `*_default` helpers.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Server-side evaluation timeout.
    pub eval_timeout: Duration,
    /// Script language tag.
    pub language: String,
    /// Result batch size; `None` uses the server default.
    pub batch_size: Option<u32>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            eval_timeout: DEFAULT_EVAL_TIMEOUT,
            language: LANGUAGE_GREMLIN_GROOVY.to_string(),
            batch_size: None,
        }
    }
}

impl OperatorConfig {
    fn eval_args(&self, gremlin: &str, bindings: Bindings) -> EvalArgs {
        EvalArgs {
            op: OpArgs {
                batch_size: self.batch_size,
            },
            gremlin: gremlin.to_string(),
            bindings,
            language: self.language.clone(),
            aliases: Default::default(),
            script_evaluation_timeout: self.eval_timeout.as_millis() as u64,
        }
    }
}

/// Builds sessionless requests and forwards them to a processor.
#[derive(Debug, Clone)]
pub struct Operator<P> {
    processor: P,
    pub config: OperatorConfig,
}

impl<P: RequestProcessor> Operator<P> {
    pub fn new(processor: P) -> Self {
        Self::with_config(processor, OperatorConfig::default())
    }

    pub fn with_config(processor: P, config: OperatorConfig) -> Self {
        Operator { processor, config }
    }

    /// Evaluates a script with explicit arguments.
    pub async fn eval(
        &self,
        deadline: Deadline,
        args: EvalArgs,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        let request = Request::new(processors::DEFAULT, ops::EVAL, args)?;
        self.processor
            .process_request(deadline, request, on_response)
            .await
    }

    /// Evaluates a script, filling in the configured defaults.
    pub async fn eval_default(
        &self,
        deadline: Deadline,
        gremlin: &str,
        bindings: Bindings,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        self.eval(deadline, self.config.eval_args(gremlin, bindings), on_response)
            .await
    }

    /// Sends a standalone authentication request, e.g. to authenticate
    /// proactively instead of waiting for a challenge.
    pub async fn authenticate(
        &self,
        deadline: Deadline,
        args: AuthenticationArgs,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        let request = Request::new(processors::DEFAULT, ops::AUTHENTICATION, args)?;
        self.processor
            .process_request(deadline, request, on_response)
            .await
    }

    /// Starts a new server-side session with a fresh id.
    pub fn new_session(&self) -> SessionOperator<P>
    where
        P: Clone,
    {
        SessionOperator {
            processor: self.processor.clone(),
            config: self.config.clone(),
            session: Uuid::new_v4().to_string(),
        }
    }
}

/// Builds session-bound requests sharing transactional context on the
/// server until the session is closed.
#[derive(Debug, Clone)]
pub struct SessionOperator<P> {
    processor: P,
    pub config: OperatorConfig,
    session: String,
}

impl<P: RequestProcessor> SessionOperator<P> {
    /// The session id sent with every request.
    pub fn session_id(&self) -> &str {
        &self.session
    }

    fn session_args(&self) -> SessionArgs {
        SessionArgs {
            session: self.session.clone(),
        }
    }

    /// Evaluates a script inside the session.
    pub async fn eval(
        &self,
        deadline: Deadline,
        args: TransactionEvalArgs,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        let request = Request::new(
            processors::SESSION,
            ops::EVAL,
            SessionEvalArgs {
                session: self.session_args(),
                eval: args,
            },
        )?;
        self.processor
            .process_request(deadline, request, on_response)
            .await
    }

    /// Evaluates a script inside the session with configured defaults.
    pub async fn eval_default(
        &self,
        deadline: Deadline,
        gremlin: &str,
        bindings: Bindings,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        self.eval(
            deadline,
            TransactionEvalArgs {
                eval: self.config.eval_args(gremlin, bindings),
                manage_transaction: false,
            },
            on_response,
        )
        .await
    }

    /// Releases the server-side session state.
    ///
    /// Session teardown rides the authentication op carrying close args;
    /// the session processor routes it to the close handler.
    pub async fn close(
        &self,
        deadline: Deadline,
        args: CloseArgs,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        let request = Request::new(
            processors::SESSION,
            ops::AUTHENTICATION,
            SessionCloseArgs {
                session: self.session_args(),
                close: args,
            },
        )?;
        self.processor
            .process_request(deadline, request, on_response)
            .await
    }

    /// Releases the session without forcing open transactions.
    pub async fn close_default(
        &self,
        deadline: Deadline,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        self.close(deadline, CloseArgs::default(), on_response).await
    }
}
