//! # Connection
//!
//! Purpose: Own one WebSocket and run the send/receive discipline for a
//! single logical request: framed send, streamed partial reads, and the
//! inline SASL handshake when the server challenges.
//!
//! ## Design Principles
//! 1. **Serialized Cycles**: One lock covers the whole send+receive cycle,
//!    auth round-trips included; wire bytes of two requests never
//!    interleave on one socket.
//! 2. **Two-State Receive**: The auth handshake is an explicit state
//!    transition inside the receive loop, not a recursive re-entry, so
//!    failure and deadline semantics stay auditable.
//! 3. **No Retries Here**: Transport failures surface to the caller;
//!    reconnecting is the cluster's job.

use std::sync::Arc;

use bytes::{BufMut, Bytes};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use gremlink_wire::{ops, processors, AuthenticationArgs, Request, Response};

use crate::deadline::Deadline;
use crate::error::ClientError;
use crate::op::OnResponse;
use crate::sendbuf::{BufferRegistry, SendBufferPool};
use crate::HeaderMap;

/// Content type used when none is configured.
pub const DEFAULT_MIME_TYPE: &str = "application/json";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Username and password for the SASL PLAIN handshake.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Options for dialing a server.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Content type framing every outgoing message.
    pub mime_type: String,
    /// Credentials answering authentication challenges. Without them a
    /// challenge surfaces as [`ClientError::MissingCredentials`].
    pub credentials: Option<Credentials>,
    /// Extra HTTP headers sent with the WebSocket handshake.
    pub headers: HeaderMap,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            credentials: None,
            headers: HeaderMap::new(),
        }
    }
}

/// Receive-loop state for one logical request.
enum ReadState {
    /// Reading result messages for the caller.
    Streaming,
    /// Sent the SASL answer; the next messages resolve the challenge.
    AwaitingAuth,
}

/// One server connection.
///
/// Processes one request at a time; concurrent callers queue on the
/// internal lock. After [`Connection::close`] every call fails with
/// [`ClientError::ConnectionClosed`].
#[derive(Debug)]
pub struct Connection {
    addr: String,
    mime_type: String,
    auth_args: Option<AuthenticationArgs>,
    buffers: Arc<SendBufferPool>,
    io: Mutex<Option<WsStream>>,
}

impl Connection {
    /// Dials a server address (`ws://host:port/path` or `wss://...`).
    pub async fn dial(
        deadline: Deadline,
        addr: &str,
        options: ConnectOptions,
        registry: &BufferRegistry,
    ) -> Result<Connection, ClientError> {
        Url::parse(addr).map_err(|source| ClientError::InvalidAddress {
            addr: addr.to_string(),
            source,
        })?;
        if options.mime_type.len() > u8::MAX as usize {
            return Err(ClientError::ContentTypeTooLong(options.mime_type));
        }

        let mut handshake = addr.into_client_request()?;
        for (name, value) in options.headers.iter() {
            handshake.headers_mut().append(name, value.clone());
        }

        let (ws, _) = deadline.bound(connect_async(handshake)).await??;
        tracing::debug!(addr, mime_type = %options.mime_type, "connected");

        Ok(Connection {
            addr: addr.to_string(),
            auth_args: options
                .credentials
                .as_ref()
                .map(|c| AuthenticationArgs::plain(&c.username, &c.password)),
            buffers: registry.pool(&options.mime_type),
            mime_type: options.mime_type,
            io: Mutex::new(Some(ws)),
        })
    }

    /// The address this connection was dialed with.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The content type framing outgoing messages.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Sends a request and streams its responses into the callback.
    ///
    /// The callback fires once per partial message plus once for the
    /// terminal message, in arrival order. Authentication challenges are
    /// answered inline and never reach the callback.
    pub async fn process_request(
        &self,
        deadline: Deadline,
        request: &Request,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        let mut guard = self.io.lock().await;
        let ws = guard.as_mut().ok_or(ClientError::ConnectionClosed)?;

        self.send_frame(ws, deadline, request).await?;
        self.read_responses(ws, deadline, on_response).await
    }

    /// Closes the connection. Waits for an in-flight request to finish,
    /// then shuts the socket. Idempotent.
    pub async fn close(&self) -> Result<(), ClientError> {
        let mut guard = self.io.lock().await;
        if let Some(mut ws) = guard.take() {
            match ws.close(None).await {
                Ok(())
                | Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => {}
                Err(err) => return Err(err.into()),
            }
            tracing::debug!(addr = %self.addr, "closed");
        }
        Ok(())
    }

    async fn send_frame(
        &self,
        ws: &mut WsStream,
        deadline: Deadline,
        request: &Request,
    ) -> Result<(), ClientError> {
        let mut buf = self.buffers.get();
        if let Err(err) = serde_json::to_writer((&mut buf).writer(), request) {
            self.buffers.put(buf);
            return Err(err.into());
        }

        // The sink takes ownership of its payload, so the pooled buffer is
        // copied out once and kept for the next request.
        let frame = Bytes::copy_from_slice(&buf);
        self.buffers.put(buf);

        deadline.bound(ws.send(Message::Binary(frame))).await??;
        Ok(())
    }

    async fn read_responses(
        &self,
        ws: &mut WsStream,
        deadline: Deadline,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        let mut state = ReadState::Streaming;
        loop {
            let message = match deadline.bound(ws.next()).await? {
                Some(Ok(message)) => message,
                Some(Err(err)) => return Err(err.into()),
                None => return Err(ClientError::ConnectionClosed),
            };

            let response: Response = match &message {
                Message::Binary(body) => serde_json::from_slice(body)?,
                Message::Text(body) => serde_json::from_str(body.as_str())?,
                Message::Close(_) => return Err(ClientError::ConnectionClosed),
                // Control frames are not part of the response stream.
                _ => continue,
            };

            if let Err(err) = response.check() {
                if !err.is_authenticate() {
                    return Err(err.into());
                }
                if matches!(state, ReadState::AwaitingAuth) {
                    // A second challenge means the SASL answer was rejected.
                    return Err(err.into());
                }

                let auth_args = self
                    .auth_args
                    .clone()
                    .ok_or(ClientError::MissingCredentials)?;
                let answer = Request::with_id(
                    response.request_id.clone(),
                    processors::DEFAULT,
                    ops::AUTHENTICATION,
                    auth_args,
                )?;
                self.send_frame(ws, deadline, &answer).await?;
                state = ReadState::AwaitingAuth;
                continue;
            }

            state = ReadState::Streaming;
            on_response(&response);
            if !response.is_partial() {
                return Ok(());
            }
        }
    }
}
