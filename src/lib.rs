//! async-echo: a completion-driven TCP echo server
//!
//! The server accepts connections on a tokio runtime and runs one echo
//! session per connection. A session alternates strictly between one read
//! and one write of at most the configured payload length, so each
//! connection holds exactly one buffer and never needs a lock.
//!
//! Modules:
//! - `runtime`: accept loop, sessions, buffers and connection handles
//! - `server`: bind, start and ordered shutdown
//! - `client`: fixed-payload echo client for tests and benchmarks
//! - `bench`: round-trip timing driver
//! - `config`: CLI and TOML configuration

pub mod bench;
pub mod client;
pub mod config;
pub mod error;
pub mod runtime;
pub mod server;

pub use client::{filled_payload, EchoClient};
pub use error::{BenchError, BindError, ConfigError, ConnectError, EchoError, SessionError};
pub use server::{EchoServer, ServerConfig};

/// Payload length used when none is configured. Client and server must agree.
pub const DEFAULT_PAYLOAD_LENGTH: usize = 64;
