//! Echo session state machine.
//!
//! One session drives one client connection. It has at most one I/O
//! operation in flight: a read, whose completion turns the buffer around
//! for a write, whose completion installs a fresh buffer for the next read.
//! Whatever a read returned is written back as-is; partial reads are not
//! accumulated into a full payload.

use crate::error::SessionError;
use crate::runtime::{CloseSignal, IoContext};
use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A read is (about to be) outstanding.
    AwaitingRead,
    /// The last read's bytes are being written back.
    AwaitingWrite,
    /// Peer closed, I/O failed, or the server closed the connection.
    Terminal,
}

/// Totals for a session that ended because the peer closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: u64,
    pub bytes_echoed: u64,
    pub round_trips: u64,
}

/// A single client connection being echoed.
pub struct EchoSession<S> {
    id: u64,
    stream: S,
    ctx: IoContext,
    state: SessionState,
    close: CloseSignal,
    bytes_echoed: u64,
    round_trips: u64,
}

impl<S> EchoSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a session that echoes up to `payload_len` bytes per read.
    pub fn new(id: u64, stream: S, payload_len: usize, close: CloseSignal) -> Self {
        debug_assert!(payload_len > 0, "payload length must be non-zero");
        Self {
            id,
            stream,
            ctx: IoContext::new_for_reading(payload_len),
            state: SessionState::AwaitingRead,
            close,
            bytes_echoed: 0,
            round_trips: 0,
        }
    }

    /// Drive the session until it reaches `Terminal`.
    ///
    /// Returns the session totals if the peer closed, or the fault that
    /// ended it. The socket is dropped either way.
    pub async fn run(mut self) -> Result<SessionSummary, SessionError> {
        while self.state != SessionState::Terminal {
            if let Err(e) = self.step().await {
                self.state = SessionState::Terminal;
                return Err(e);
            }
        }

        Ok(SessionSummary {
            id: self.id,
            bytes_echoed: self.bytes_echoed,
            round_trips: self.round_trips,
        })
    }

    /// Complete the outstanding operation and issue the next one.
    async fn step(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::AwaitingRead => {
                let limit = self.ctx.read_limit();
                let mut target = self.ctx.buffer_mut().limit(limit);

                let n = tokio::select! {
                    biased;
                    _ = self.close.closed() => return Err(SessionError::Closed),
                    res = self.stream.read_buf(&mut target) => res.map_err(SessionError::Read)?,
                };

                if n == 0 {
                    trace!(session = self.id, "Peer closed connection");
                    self.state = SessionState::Terminal;
                    return Ok(());
                }

                self.ctx.flip_for_write();
                trace!(session = self.id, bytes = n, "Read complete, writing back");
                self.state = SessionState::AwaitingWrite;
            }

            SessionState::AwaitingWrite => {
                let out = self.ctx.buffer();
                let len = out.len();

                tokio::select! {
                    biased;
                    _ = self.close.closed() => return Err(SessionError::Closed),
                    res = self.stream.write_all(out) => res.map_err(SessionError::Write)?,
                }

                self.bytes_echoed += len as u64;
                self.round_trips += 1;

                self.ctx.flip_for_read();
                trace!(session = self.id, bytes = len, "Write complete, reading");
                self.state = SessionState::AwaitingRead;
            }

            SessionState::Terminal => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ConnectionHandle;
    use std::io;
    use std::time::Duration;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_echo_until_peer_closes() {
        let stream = Builder::new().read(b"hello").write(b"hello").build();
        let (_handle, close) = ConnectionHandle::new(1);

        let summary = EchoSession::new(1, stream, 64, close).run().await.unwrap();
        assert_eq!(
            summary,
            SessionSummary {
                id: 1,
                bytes_echoed: 5,
                round_trips: 1
            }
        );
    }

    #[tokio::test]
    async fn test_partial_reads_echoed_as_is() {
        let stream = Builder::new()
            .read(b"ab")
            .write(b"ab")
            .read(b"cde")
            .write(b"cde")
            .build();
        let (_handle, close) = ConnectionHandle::new(2);

        let summary = EchoSession::new(2, stream, 64, close).run().await.unwrap();
        assert_eq!(summary.round_trips, 2);
        assert_eq!(summary.bytes_echoed, 5);
    }

    #[tokio::test]
    async fn test_reads_bounded_by_payload_length() {
        // The mock hands out at most what fits in the read buffer, so an
        // 8 byte burst against a 4 byte payload takes two round trips.
        let stream = Builder::new()
            .read(b"abcdefgh")
            .write(b"abcd")
            .write(b"efgh")
            .build();
        let (_handle, close) = ConnectionHandle::new(3);

        let summary = EchoSession::new(3, stream, 4, close).run().await.unwrap();
        assert_eq!(summary.round_trips, 2);
        assert_eq!(summary.bytes_echoed, 8);
    }

    #[tokio::test]
    async fn test_read_error_terminates() {
        let stream = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let (_handle, close) = ConnectionHandle::new(4);

        let err = EchoSession::new(4, stream, 64, close).run().await.unwrap_err();
        assert!(matches!(err, SessionError::Read(e) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn test_write_error_terminates() {
        let stream = Builder::new()
            .read(b"x")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"))
            .build();
        let (_handle, close) = ConnectionHandle::new(5);

        let err = EchoSession::new(5, stream, 64, close).run().await.unwrap_err();
        assert!(matches!(err, SessionError::Write(e) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[tokio::test]
    async fn test_close_request_interrupts_pending_read() {
        let (server_side, _client_side) = tokio::io::duplex(64);
        let (handle, close) = ConnectionHandle::new(6);

        let session = EchoSession::new(6, server_side, 64, close);
        assert_eq!(session.state, SessionState::AwaitingRead);
        let task = tokio::spawn(session.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.close());

        let res = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("session did not observe close")
            .unwrap();
        assert!(matches!(res, Err(SessionError::Closed)));
        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn test_echo_over_duplex() {
        let (server_side, mut client_side) = tokio::io::duplex(256);
        let (_handle, close) = ConnectionHandle::new(7);
        let task = tokio::spawn(EchoSession::new(7, server_side, 64, close).run());

        for fill in [b'a', b'b', b'c'] {
            let payload = vec![fill; 64];
            client_side.write_all(&payload).await.unwrap();
            let mut echo = vec![0u8; 64];
            client_side.read_exact(&mut echo).await.unwrap();
            assert_eq!(echo, payload);
        }

        drop(client_side);
        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.bytes_echoed, 192);
    }
}
