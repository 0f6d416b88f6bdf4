//! # Cluster
//!
//! Purpose: Pool connections across one or more server addresses, hand
//! them out one caller at a time, and replace failed ones with a
//! jittered-backoff redial that only shutdown can stop.
//!
//! ## Design Principles
//! 1. **Channel As Truth**: The pool channel is the single source of
//!    "available" connections; checkout consumes, checkin produces, so a
//!    connection never has two owners.
//! 2. **Fail The Caller, Heal Out-Of-Band**: A request on a bad
//!    connection returns its error immediately; the redial happens on a
//!    background task and never blocks anyone.
//! 3. **Jittered Growth**: Backoff grows multiplicatively, jitters to
//!    avoid reconnect storms, and caps at a configured maximum.
//! 4. **Deterministic Retry Tests**: The backoff RNG is injectable.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, watch, Mutex};

use gremlink_wire::Request;

use crate::conn::{ConnectOptions, Connection};
use crate::deadline::Deadline;
use crate::error::ClientError;
use crate::op::OnResponse;
use crate::sendbuf::BufferRegistry;

/// Seed value for the reconnect backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Cap on the wait between reconnect attempts.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);
/// Connections dialed per configured address.
pub const DEFAULT_CONNECTIONS_PER_ADDRESS: usize = 1;

/// Observer invoked after each failed dial with the address, the error,
/// and the 1-based attempt count. Without one, failures log at `warn`.
pub type OnConnectError = Arc<dyn Fn(&str, &ClientError, u32) + Send + Sync>;

/// Configuration for a [`Cluster`].
#[derive(Clone)]
pub struct ClusterConfig {
    /// Dial options shared by every pooled connection (content type,
    /// credentials, handshake headers).
    pub connect: ConnectOptions,
    pub connections_per_address: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub on_connect_error: Option<OnConnectError>,
    /// Frame buffer registry; share one handle to share pools across
    /// clusters with the same content type.
    pub registry: BufferRegistry,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            connect: ConnectOptions::default(),
            connections_per_address: DEFAULT_CONNECTIONS_PER_ADDRESS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            on_connect_error: None,
            registry: BufferRegistry::new(),
        }
    }
}

/// A pool of connections across a set of server addresses.
///
/// Construction returns immediately; background tasks dial the pool full.
/// Cloning shares the same pool.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

struct ClusterInner {
    pool_tx: mpsc::Sender<Connection>,
    pool_rx: Mutex<mpsc::Receiver<Connection>>,
    options: ConnectOptions,
    registry: BufferRegistry,
    backoff_base: Duration,
    backoff_max: Duration,
    on_connect_error: Option<OnConnectError>,
    closing: watch::Sender<bool>,
}

impl Cluster {
    /// Creates a cluster and starts dialing
    /// `addrs.len() * connections_per_address` connections in the
    /// background. Dials that fail retry with jittered backoff until they
    /// succeed or the cluster closes.
    pub fn new<I, S>(config: ClusterConfig, addrs: I) -> Cluster
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let addrs: Vec<String> = addrs.into_iter().map(Into::into).collect();
        let per_address = config.connections_per_address.max(1);
        let capacity = (addrs.len() * per_address).max(1);

        let (pool_tx, pool_rx) = mpsc::channel(capacity);
        let (closing, _) = watch::channel(false);

        let inner = Arc::new(ClusterInner {
            pool_tx,
            pool_rx: Mutex::new(pool_rx),
            options: config.connect,
            registry: config.registry,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            on_connect_error: config.on_connect_error,
            closing,
        });

        for addr in addrs {
            for _ in 0..per_address {
                let inner = inner.clone();
                let addr = addr.clone();
                tokio::spawn(async move {
                    if let Some(conn) = inner.connect(&addr).await {
                        inner.checkin(conn).await;
                    }
                });
            }
        }

        Cluster { inner }
    }

    /// Checks out a connection, runs the request on it, and checks it
    /// back in. On any error the connection is discarded and replaced
    /// out-of-band while the error returns to the caller.
    pub async fn process_request(
        &self,
        deadline: Deadline,
        request: &Request,
        on_response: OnResponse<'_>,
    ) -> Result<(), ClientError> {
        let conn = self.checkout(deadline).await?;

        match conn.process_request(deadline, request, on_response).await {
            Ok(()) => {
                self.inner.checkin(conn).await;
                Ok(())
            }
            Err(err) => {
                let addr = conn.addr().to_string();
                let _ = conn.close().await;
                self.inner.replace(addr);
                Err(err)
            }
        }
    }

    /// Shuts the cluster down: blocks all future checkouts, wakes blocked
    /// ones with [`ClientError::ClusterClosed`], and closes every pooled
    /// connection. Idempotent. Connections checked out by in-flight
    /// requests are closed on their failed checkin instead.
    pub async fn close(&self) {
        if self.inner.closing.send_replace(true) {
            return;
        }

        let mut pool = self.inner.pool_rx.lock().await;
        pool.close();
        while let Ok(conn) = pool.try_recv() {
            let _ = conn.close().await;
        }
    }

    /// Whether [`Cluster::close`] has been called.
    pub fn is_closed(&self) -> bool {
        *self.inner.closing.borrow()
    }

    async fn checkout(&self, deadline: Deadline) -> Result<Connection, ClientError> {
        // Subscribe before the fast-path check so a concurrent close
        // cannot slip between the check and the waits below.
        let mut closing = self.inner.closing.subscribe();
        if *closing.borrow() {
            return Err(ClientError::ClusterClosed);
        }

        let mut pool = tokio::select! {
            guard = self.inner.pool_rx.lock() => guard,
            _ = deadline.expired() => return Err(ClientError::DeadlineExceeded),
            _ = closing.changed() => return Err(ClientError::ClusterClosed),
        };

        tokio::select! {
            conn = pool.recv() => conn.ok_or(ClientError::ClusterClosed),
            _ = deadline.expired() => Err(ClientError::DeadlineExceeded),
            _ = closing.changed() => Err(ClientError::ClusterClosed),
        }
    }
}

impl ClusterInner {
    /// Dials until success or shutdown, waiting a jittered exponential
    /// backoff between attempts. Never gives up on its own.
    async fn connect(&self, addr: &str) -> Option<Connection> {
        let mut backoff = Backoff::new(self.backoff_base, self.backoff_max);
        let mut attempts: u32 = 1;
        let mut closing = self.closing.subscribe();

        loop {
            if *closing.borrow() {
                return None;
            }

            let dialed =
                Connection::dial(Deadline::NONE, addr, self.options.clone(), &self.registry)
                    .await;
            let err = match dialed {
                Ok(conn) => return Some(conn),
                Err(err) => err,
            };

            match &self.on_connect_error {
                Some(observer) => observer(addr, &err, attempts),
                None => tracing::warn!(addr, attempts, error = %err, "connect failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff.current()) => {}
                _ = closing.changed() => return None,
            }
            backoff.advance();
            attempts += 1;
        }
    }

    /// Returns a connection to the pool. After shutdown the pool channel
    /// rejects the send and the connection is closed instead.
    async fn checkin(&self, conn: Connection) {
        if let Err(SendError(conn)) = self.pool_tx.send(conn).await {
            let _ = conn.close().await;
        }
    }

    /// Replaces a discarded connection out-of-band.
    fn replace(self: &Arc<Self>, addr: String) {
        let inner = self.clone();
        tokio::spawn(async move {
            if let Some(conn) = inner.connect(&addr).await {
                inner.checkin(conn).await;
            }
        });
    }
}

/// Jittered exponential backoff: starts at `base`, each step draws
/// uniformly from `[base, previous * 3)` and caps at `max`.
struct Backoff {
    base: Duration,
    max: Duration,
    sleep: Duration,
    rng: SmallRng,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self::with_rng(base, max, SmallRng::from_entropy())
    }

    fn with_rng(base: Duration, max: Duration, rng: SmallRng) -> Self {
        // A zero base would make the jitter range empty.
        let base = base.max(Duration::from_millis(1));
        Backoff {
            base,
            max,
            sleep: base,
            rng,
        }
    }

    /// The wait before the next attempt.
    fn current(&self) -> Duration {
        self.sleep
    }

    /// Draws the next jittered sleep.
    fn advance(&mut self) -> Duration {
        let base = self.base.as_nanos() as u64;
        let grown = self.sleep.saturating_mul(3).as_nanos().min(u128::from(u64::MAX)) as u64;
        let jittered = if grown > base {
            self.rng.gen_range(base..grown)
        } else {
            base
        };
        self.sleep = Duration::from_nanos(jittered).min(self.max);
        self.sleep
    }
}
