//! Handles for accepted client connections.
//!
//! The socket itself is owned by its echo session. What the rest of the
//! server keeps is a `ConnectionHandle`: enough to see whether the session is
//! still alive and to ask it to close. The session side holds the matching
//! `CloseSignal` and races it against every outstanding read or write.

use tokio::sync::watch;

/// Server-side view of one accepted connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u64,
    close_tx: watch::Sender<bool>,
}

/// Session-side receiver for close requests.
#[derive(Debug)]
pub struct CloseSignal {
    rx: watch::Receiver<bool>,
}

impl ConnectionHandle {
    /// Create a handle for session `id` and the signal its session listens on.
    pub fn new(id: u64) -> (Self, CloseSignal) {
        let (close_tx, rx) = watch::channel(false);
        (Self { id, close_tx }, CloseSignal { rx })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// A connection is open until close is requested or its session ends.
    pub fn is_open(&self) -> bool {
        !*self.close_tx.borrow() && !self.close_tx.is_closed()
    }

    /// Ask the owning session to close its socket.
    ///
    /// Returns `false` if the connection was already closed.
    pub fn close(&self) -> bool {
        if !self.is_open() {
            return false;
        }
        self.close_tx.send_replace(true);
        true
    }
}

impl CloseSignal {
    /// Resolve once close has been requested.
    ///
    /// Dropping the handle without closing it never resolves this: a handle
    /// replaced by a newer connection must not tear down the older session.
    pub async fn closed(&mut self) {
        if self.rx.wait_for(|closed| *closed).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_handle_open_until_closed() {
        let (handle, signal) = ConnectionHandle::new(7);
        assert_eq!(handle.id(), 7);
        assert!(handle.is_open());
        assert!(!*signal.rx.borrow());

        assert!(handle.close());
        assert!(!handle.is_open());
        assert!(*signal.rx.borrow());

        // Second close is a no-op
        assert!(!handle.close());
    }

    #[test]
    fn test_handle_closed_when_session_gone() {
        let (handle, signal) = ConnectionHandle::new(1);
        drop(signal);
        assert!(!handle.is_open());
        assert!(!handle.close());
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let (handle, mut signal) = ConnectionHandle::new(1);
        let waiter = tokio::spawn(async move { signal.closed().await });
        handle.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("close signal not delivered")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_close() {
        let (handle, mut signal) = ConnectionHandle::new(1);
        drop(handle);
        let res = tokio::time::timeout(Duration::from_millis(50), signal.closed()).await;
        assert!(res.is_err());
    }
}
