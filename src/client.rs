//! Echo client used by tests and the benchmark driver.
//!
//! Each call writes a payload and waits until the same number of bytes has
//! come back. The server may return the echo in several pieces, so the
//! client keeps reading until the payload length is reached.

use crate::error::{ConnectError, EchoError};
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

/// Build a payload of `len` copies of `fill`.
pub fn filled_payload(fill: u8, len: usize) -> Bytes {
    Bytes::from(vec![fill; len])
}

/// A connected echo client.
#[derive(Debug)]
pub struct EchoClient {
    stream: TcpStream,
    payload_len: usize,
}

impl EchoClient {
    /// Connect to `addr`. Payloads longer than `payload_len` are refused.
    pub async fn connect(addr: SocketAddr, payload_len: usize) -> Result<Self, ConnectError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ConnectError { addr, source })?;
        stream
            .set_nodelay(true)
            .map_err(|source| ConnectError { addr, source })?;
        trace!(addr = %addr, "Client connected");
        Ok(Self {
            stream,
            payload_len,
        })
    }

    /// Connect to `port` on the IPv4 loopback address.
    pub async fn connect_port(port: u16, payload_len: usize) -> Result<Self, ConnectError> {
        Self::connect(SocketAddr::from((Ipv4Addr::LOCALHOST, port)), payload_len).await
    }

    /// Send `payload` and wait for its echo.
    pub async fn send_and_await_echo(&mut self, payload: &[u8]) -> Result<Bytes, EchoError> {
        if payload.len() > self.payload_len {
            return Err(EchoError::PayloadTooLarge {
                len: payload.len(),
                max: self.payload_len,
            });
        }

        self.stream.write_all(payload).await?;

        let expected = payload.len();
        let mut echo = BytesMut::with_capacity(expected);
        while echo.len() < expected {
            let want = expected - echo.len();
            let mut target = (&mut echo).limit(want);
            let n = self.stream.read_buf(&mut target).await?;
            if n == 0 {
                return Err(EchoError::PeerClosed {
                    received: echo.len(),
                    expected,
                });
            }
        }

        Ok(echo.freeze())
    }

    /// Send `payload`, wait for its echo and check it matches.
    pub async fn round_trip(&mut self, payload: &[u8]) -> Result<(), EchoError> {
        let echo = self.send_and_await_echo(payload).await?;
        if echo.as_ref() != payload {
            return Err(EchoError::Mismatch);
        }
        Ok(())
    }

    /// Shut down the write side and drop the connection.
    pub async fn close(mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
