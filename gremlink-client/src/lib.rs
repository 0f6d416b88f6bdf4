//! # Gremlink Driver
//!
//! Purpose: Provide a pooled, async WebSocket driver for the Gremlin
//! Server protocol: framed requests, streaming partial responses, inline
//! SASL authentication, and reconnecting multi-address pooling.
//!
//! ## Design Principles
//! 1. **Capability Seam**: `RequestProcessor` is the one-method contract
//!    satisfied by both a single `Connection` and a `Cluster`, so request
//!    builders never care which they talk to.
//! 2. **One Request Per Socket At A Time**: a connection's whole
//!    send+receive cycle runs under a single lock; the transport supports
//!    neither concurrent writes nor interleaved reads.
//! 3. **Retry Lives In One Place**: connections never retry; the cluster
//!    owns reconnect-with-backoff and connection replacement.
//! 4. **Explicit Shared State**: frame buffers come from a registry handle
//!    passed into constructors, not from an ambient global.

mod cluster;
mod conn;
mod deadline;
mod error;
mod op;
mod sendbuf;

pub use cluster::{Cluster, ClusterConfig, OnConnectError, DEFAULT_BACKOFF_BASE,
    DEFAULT_BACKOFF_MAX, DEFAULT_CONNECTIONS_PER_ADDRESS};
pub use conn::{ConnectOptions, Connection, Credentials, DEFAULT_MIME_TYPE};
pub use deadline::Deadline;
pub use error::ClientError;
pub use op::{OnResponse, Operator, OperatorConfig, RequestProcessor, SessionOperator,
    DEFAULT_EVAL_TIMEOUT};
pub use sendbuf::{BufferRegistry, SendBufferPool};

// Handshake headers are plain HTTP headers on the underlying transport.
pub use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderName, HeaderValue};
