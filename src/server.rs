//! Echo server lifecycle.
//!
//! Binds the listening endpoint, hands it to the accept loop, and shuts both
//! down in order: the most recent client connection first, then the
//! listening socket.

use crate::error::BindError;
use crate::runtime::{AcceptErrorPolicy, Acceptor, LatestConnection, ListeningEndpoint};
use crate::DEFAULT_PAYLOAD_LENGTH;
use parking_lot::Mutex;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Default listen backlog
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Settings fixed for the life of a server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind on; `localhost` or an IP literal.
    pub host: String,
    /// Bytes echoed per read. Must match the client's payload length.
    pub payload_len: usize,
    pub backlog: u32,
    pub accept_errors: AcceptErrorPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::LOCALHOST.to_string(),
            payload_len: DEFAULT_PAYLOAD_LENGTH,
            backlog: DEFAULT_BACKLOG,
            accept_errors: AcceptErrorPolicy::default(),
        }
    }
}

struct Running {
    endpoint: Arc<ListeningEndpoint>,
    latest: LatestConnection,
    accept_task: JoinHandle<()>,
}

impl Running {
    /// Close the latest connection and the endpoint, then wait for the
    /// accept loop to drop the listener.
    async fn stop(self) {
        close_latest(&self.latest);

        let addr = self.endpoint.local_addr();
        self.endpoint.close();
        if let Err(e) = self.accept_task.await {
            warn!(addr = %addr, error = %e, "Accept loop ended abnormally");
        }

        // An accept that passed the open check before the endpoint closed
        // may have replaced the latest connection after the first close.
        close_latest(&self.latest);

        info!(addr = %addr, "Echo server stopped");
    }
}

fn close_latest(latest: &LatestConnection) {
    let Some(handle) = latest.lock().take() else {
        return;
    };
    if handle.close() {
        debug!(session = handle.id(), "Closed latest client connection");
    } else {
        trace!(session = handle.id(), "Latest client connection already closed");
    }
}

/// Server instance
pub struct EchoServer {
    config: ServerConfig,
    running: Option<Running>,
}

impl EchoServer {
    /// Create a new server instance
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }

    /// Bind `host:port` and start accepting connections.
    ///
    /// Fails with `BindError::ZeroPayloadLength` if the configured payload
    /// length is 0. Must be called from within a tokio runtime. Port 0 binds an ephemeral
    /// port; the returned address is the one actually bound.
    pub async fn start(&mut self, port: u16) -> Result<SocketAddr, BindError> {
        if let Some(running) = &self.running {
            return Err(BindError::AlreadyStarted(running.endpoint.local_addr()));
        }
        if self.config.payload_len == 0 {
            return Err(BindError::ZeroPayloadLength);
        }

        let addr = resolve(&self.config.host, port)?;
        let listener = create_listener(addr, self.config.backlog)
            .map_err(|source| BindError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| BindError::Bind { addr, source })?;

        let endpoint = Arc::new(ListeningEndpoint::new(local_addr));
        let latest: LatestConnection = Arc::new(Mutex::new(None));
        let acceptor = Acceptor::new(
            listener,
            Arc::clone(&endpoint),
            Arc::clone(&latest),
            self.config.payload_len,
            self.config.accept_errors,
        );
        let accept_task = tokio::spawn(acceptor.run());

        info!(
            addr = %local_addr,
            payload_len = self.config.payload_len,
            accept_errors = ?self.config.accept_errors,
            "Echo server listening"
        );

        self.running = Some(Running {
            endpoint,
            latest,
            accept_task,
        });
        Ok(local_addr)
    }

    /// Close the latest client connection, then the listening endpoint.
    ///
    /// Safe to call more than once and before `start`. Returns after the
    /// listening socket has been dropped. Sessions other than the latest one
    /// are left to notice closure through their own I/O.
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            trace!("Shutdown requested, server not running");
            return;
        };

        running.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.endpoint.local_addr())
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            close_latest(&running.latest);
            running.endpoint.close();
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, BindError> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
    }
    host.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|source| BindError::Resolve {
            addr: format!("{host}:{port}"),
            source,
        })
}

/// Create a non-blocking TCP listener registered with the current runtime.
fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    TcpListener::from_std(socket.into())
}
