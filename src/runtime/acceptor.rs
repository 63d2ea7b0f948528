//! Accept loop and connection dispatch.
//!
//! The acceptor task is the only owner of the listening socket. Each pass of
//! its loop arms one accept and races it against the endpoint's shutdown
//! signal; an accepted connection is handed to a freshly spawned
//! `EchoSession` and the loop immediately arms the next accept.

use crate::runtime::{ConnectionHandle, EchoSession};
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, trace, warn};

/// Pause before re-arming after a failed accept, so fd exhaustion does not spin.
const REARM_BACKOFF: Duration = Duration::from_millis(10);

/// What the accept loop does after an accept fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptErrorPolicy {
    /// Log the failure and stop accepting. Existing sessions keep running
    /// and the endpoint stays bound until shutdown.
    #[default]
    Stop,
    /// Log the failure and arm the next accept.
    Rearm,
}

/// Source of incoming connections.
pub trait Accept: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next connection.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }
        Ok((stream, peer))
    }
}

/// Shared slot holding the most recently accepted connection.
pub type LatestConnection = Arc<Mutex<Option<ConnectionHandle>>>;

/// Open/closed state of the bound server socket.
///
/// Closing flips the flag exactly once and wakes the acceptor, which drops
/// the socket on its way out.
#[derive(Debug)]
pub struct ListeningEndpoint {
    addr: SocketAddr,
    open: AtomicBool,
    shutdown: Notify,
}

impl ListeningEndpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            open: AtomicBool::new(true),
            shutdown: Notify::new(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close the endpoint. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        if self.open.swap(false, Ordering::AcqRel) {
            self.shutdown.notify_one();
            true
        } else {
            false
        }
    }

    async fn closed(&self) {
        if !self.is_open() {
            return;
        }
        self.shutdown.notified().await;
    }
}

/// Accept loop for one listening endpoint.
pub struct Acceptor<L> {
    listener: L,
    endpoint: Arc<ListeningEndpoint>,
    latest: LatestConnection,
    payload_len: usize,
    policy: AcceptErrorPolicy,
    next_session_id: u64,
}

impl<L: Accept> Acceptor<L> {
    pub fn new(
        listener: L,
        endpoint: Arc<ListeningEndpoint>,
        latest: LatestConnection,
        payload_len: usize,
        policy: AcceptErrorPolicy,
    ) -> Self {
        Self {
            listener,
            endpoint,
            latest,
            payload_len,
            policy,
            next_session_id: 0,
        }
    }

    /// Accept connections until the endpoint closes.
    ///
    /// Returns once the endpoint is closed; the listener is dropped with it.
    pub async fn run(mut self) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.endpoint.closed() => break,
                res = self.listener.accept() => res,
            };

            match accepted {
                Ok((stream, peer)) => {
                    if !self.endpoint.is_open() {
                        trace!(peer = %peer, "Dropping connection accepted during shutdown");
                        break;
                    }
                    self.dispatch(stream, peer);
                }
                Err(e) => {
                    error!(addr = %self.endpoint.local_addr(), error = %e, "Failed to accept connection");
                    match self.policy {
                        AcceptErrorPolicy::Rearm => {
                            tokio::time::sleep(REARM_BACKOFF).await;
                        }
                        AcceptErrorPolicy::Stop => {
                            warn!(
                                addr = %self.endpoint.local_addr(),
                                "No longer accepting connections until shutdown"
                            );
                            self.endpoint.closed().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!(addr = %self.endpoint.local_addr(), "Accept loop finished");
    }

    /// Track the connection as the latest one and spawn its session.
    fn dispatch(&mut self, stream: L::Stream, peer: SocketAddr) {
        let id = self.next_session_id;
        self.next_session_id += 1;

        let (handle, close) = ConnectionHandle::new(id);
        *self.latest.lock() = Some(handle);
        debug!(session = id, peer = %peer, "Accepted connection");

        let session = EchoSession::new(id, stream, self.payload_len, close);
        tokio::spawn(async move {
            match session.run().await {
                Ok(summary) => debug!(
                    session = summary.id,
                    round_trips = summary.round_trips,
                    bytes = summary.bytes_echoed,
                    "Session ended"
                ),
                Err(e) => debug!(session = id, error = %e, "Session terminated"),
            }
        });
    }
}
