//! Per-connection buffer and phase tracking.
//!
//! An `IoContext` holds the single buffer a session is currently using and
//! the phase that buffer is in. A session alternates between filling the
//! buffer from the socket (`Reading`) and draining it back (`Writing`); the
//! flip methods move between the two.

use bytes::BytesMut;

/// Which direction the context's buffer is currently used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Buffer is being filled by a read.
    Reading,
    /// Buffer holds bytes waiting to be written back.
    Writing,
}

/// Buffer plus phase for one echo session.
#[derive(Debug)]
pub struct IoContext {
    buffer: BytesMut,
    phase: Phase,
    capacity: usize,
}

impl IoContext {
    /// Create a context with an empty buffer of `capacity` bytes, ready to read.
    pub fn new_for_reading(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            phase: Phase::Reading,
            capacity,
        }
    }

    /// Switch from reading to writing.
    ///
    /// The bytes filled by the last read become the region to send.
    ///
    /// # Panics
    /// Panics in debug builds if the context is already writing.
    pub fn flip_for_write(&mut self) -> &mut BytesMut {
        debug_assert!(
            self.phase == Phase::Reading,
            "flip_for_write called while writing"
        );
        self.phase = Phase::Writing;
        &mut self.buffer
    }

    /// Switch from writing to reading.
    ///
    /// The drained buffer is discarded and a fresh one of the full capacity
    /// takes its place.
    ///
    /// # Panics
    /// Panics in debug builds if the context is already reading.
    pub fn flip_for_read(&mut self) -> &mut BytesMut {
        debug_assert!(
            self.phase == Phase::Writing,
            "flip_for_read called while reading"
        );
        self.buffer = BytesMut::with_capacity(self.capacity);
        self.phase = Phase::Reading;
        &mut self.buffer
    }

    /// Configured payload capacity, fixed for the life of the context.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that a read may still place into the current buffer.
    pub fn read_limit(&self) -> usize {
        self.capacity.saturating_sub(self.buffer.len())
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_reading() {
        let ctx = IoContext::new_for_reading(64);
        assert_eq!(ctx.phase, Phase::Reading);
        assert_eq!(ctx.capacity(), 64);
        assert_eq!(ctx.read_limit(), 64);
        assert!(ctx.buffer().is_empty());
    }

    #[test]
    fn test_phase_transitions() {
        let mut ctx = IoContext::new_for_reading(8);
        ctx.buffer_mut().extend_from_slice(b"abc");
        assert_eq!(ctx.read_limit(), 5);

        let out = ctx.flip_for_write();
        assert_eq!(&out[..], b"abc");
        assert_eq!(ctx.phase, Phase::Writing);

        let fresh = ctx.flip_for_read();
        assert!(fresh.is_empty());
        assert!(fresh.capacity() >= 8);
        assert_eq!(ctx.phase, Phase::Reading);
        assert_eq!(ctx.read_limit(), 8);
    }

    #[test]
    fn test_flip_for_read_discards_previous_bytes() {
        let mut ctx = IoContext::new_for_reading(4);
        ctx.buffer_mut().extend_from_slice(b"wxyz");
        assert_eq!(ctx.read_limit(), 0);
        ctx.flip_for_write();
        ctx.flip_for_read();
        assert!(ctx.buffer().is_empty());
        assert_eq!(ctx.read_limit(), 4);
        assert_eq!(ctx.capacity(), 4);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "flip_for_write called while writing")]
    fn test_double_flip_for_write_panics() {
        let mut ctx = IoContext::new_for_reading(4);
        ctx.flip_for_write();
        ctx.flip_for_write();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "flip_for_read called while reading")]
    fn test_flip_for_read_while_reading_panics() {
        let mut ctx = IoContext::new_for_reading(4);
        ctx.flip_for_read();
    }
}
