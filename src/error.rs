//! Error types for the echo server and its client driver.

use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;

/// Failure to bring up the listening endpoint.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("invalid bind address '{addr}': {source}")]
    Resolve {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server already listening on {0}")]
    AlreadyStarted(SocketAddr),

    #[error("payload length must be at least 1 byte")]
    ZeroPayloadLength,
}

/// Fault that terminates a single echo session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// The server closed the connection while an operation was outstanding.
    #[error("connection closed by server")]
    Closed,
}

/// Failure to open a client connection.
#[derive(Error, Debug)]
#[error("failed to connect to {addr}: {source}")]
pub struct ConnectError {
    pub addr: SocketAddr,
    #[source]
    pub source: io::Error,
}

/// Failure of a client-side echo round trip.
#[derive(Error, Debug)]
pub enum EchoError {
    #[error("payload of {len} bytes exceeds the {max} byte payload length")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("connection closed after {received} of {expected} echoed bytes")]
    PeerClosed { received: usize, expected: usize },

    #[error("echo did not match the sent payload")]
    Mismatch,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failure of a benchmark run.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Echo(#[from] EchoError),

    #[error("benchmark task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .path.display(), .source)]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file '{}': {}", .path.display(), .source)]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
