//! Bounded growable byte buffer.
//!
//! [`BoundedBuffer`] is an append-only byte sequence with a soft maximum: pushes
//! past the max fail with [`BufferError::Full`] instead of growing unbounded.
//! Allocation failure (rare, but real on constrained hosts) is surfaced as
//! [`BufferError::Oom`] via [`Vec::try_reserve`] rather than aborting the process.

/// Error taxonomy for [`BoundedBuffer`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// The push would make the buffer exceed its configured maximum.
    Full,
    /// The underlying allocator could not satisfy the growth request.
    Oom,
}

/// An append-only byte buffer capped at `max_capacity`.
///
/// Not thread-safe — each session owns its rx/tx buffers exclusively.
pub struct BoundedBuffer {
    data: Vec<u8>,
    max_capacity: usize,
}

impl BoundedBuffer {
    /// Create an empty buffer that will never grow past `max_capacity` bytes.
    pub fn new(max_capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            max_capacity,
        }
    }

    /// Append `bytes`, growing the backing allocation as needed.
    ///
    /// Fails with `Full` if the result would exceed `max_capacity`, or `Oom` if
    /// the allocator can't satisfy the growth.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let new_len = self.data.len() + bytes.len();
        if new_len > self.max_capacity {
            return Err(BufferError::Full);
        }
        if self.data.capacity() < new_len {
            self.data
                .try_reserve(new_len - self.data.len())
                .map_err(|_| BufferError::Oom)?;
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Empty the buffer, retaining its allocated capacity.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Shrink the logical length to `n`. `n` must be `<= self.len()`.
    pub fn truncate(&mut self, n: usize) {
        debug_assert!(n <= self.data.len());
        self.data.truncate(n);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_within_max_succeeds() {
        let mut buf = BoundedBuffer::new(10);
        assert_eq!(buf.push(b"hello"), Ok(()));
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.as_slice(), b"hello");
    }

    #[test]
    fn push_past_max_fails_full() {
        let mut buf = BoundedBuffer::new(4);
        assert_eq!(buf.push(b"hello"), Err(BufferError::Full));
        // Failed push must not partially apply.
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn clear_retains_capacity() {
        let mut buf = BoundedBuffer::new(100);
        buf.push(b"abcdef").unwrap();
        let cap_before = buf.data.capacity();
        buf.clear();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.data.capacity(), cap_before);
    }

    #[test]
    fn truncate_shrinks_length() {
        let mut buf = BoundedBuffer::new(100);
        buf.push(b"abcdef").unwrap();
        buf.truncate(3);
        assert_eq!(buf.as_slice(), b"abc");
    }

    #[test]
    fn repeated_pushes_accumulate_until_full() {
        let mut buf = BoundedBuffer::new(6);
        assert_eq!(buf.push(b"abc"), Ok(()));
        assert_eq!(buf.push(b"def"), Ok(()));
        assert_eq!(buf.push(b"g"), Err(BufferError::Full));
        assert_eq!(buf.as_slice(), b"abcdef");
    }
}
