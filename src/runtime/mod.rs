//! Echo runtime: accept loop, per-connection sessions and their buffers.
//!
//! Everything here runs as tasks on the caller's tokio runtime:
//! - `Acceptor`: owns the listening socket and spawns sessions
//! - `EchoSession`: read/write state machine for one connection
//! - `IoContext`: the session's buffer and phase
//! - `ConnectionHandle`: server-side handle used to close a session

mod acceptor;
mod connection;
mod context;
mod session;

pub use acceptor::{AcceptErrorPolicy, Acceptor, LatestConnection, ListeningEndpoint};
pub use connection::{CloseSignal, ConnectionHandle};
pub use context::IoContext;
pub use session::{EchoSession, SessionSummary};
