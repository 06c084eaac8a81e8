//! Receive window: fixed capacity, independent read/write cursors, compaction before each receive.

/// Receive buffer size used when none is configured.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1024;

/// Cursor-based receive window.
///
/// Layout: `[consumed][readable: read_pos..write_pos][writable: write_pos..capacity]`.
/// Invariant: `0 <= read_pos <= write_pos <= capacity`.
///
/// Not synchronized. A session owns exactly one and only touches it from its single receive task.
#[derive(Debug)]
pub struct RecvBuffer {
    buf: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl RecvBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Unread bytes.
    pub fn data_size(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Writable tail space.
    pub fn free_size(&self) -> usize {
        self.buf.len() - self.write_pos
    }

    /// The unread window, `data_size()` bytes long.
    pub fn readable_region(&self) -> &[u8] {
        &self.buf[self.read_pos..self.write_pos]
    }

    /// The free tail, `free_size()` bytes long. Bytes written here become readable after `commit_write`.
    pub fn writable_region(&mut self) -> &mut [u8] {
        &mut self.buf[self.write_pos..]
    }

    /// Mark `n` bytes of the writable region as filled.
    pub fn commit_write(&mut self, n: usize) -> Result<(), BufferError> {
        let available = self.free_size();
        if n > available {
            return Err(BufferError::Overflow {
                requested: n,
                available,
            });
        }
        self.write_pos += n;
        Ok(())
    }

    /// Mark `n` leading bytes of the readable region as consumed.
    pub fn commit_read(&mut self, n: usize) -> Result<(), BufferError> {
        let available = self.data_size();
        if n > available {
            return Err(BufferError::Underflow {
                requested: n,
                available,
            });
        }
        self.read_pos += n;
        Ok(())
    }

    /// Move unread bytes to offset 0 so the whole tail is writable again.
    /// Call before arming each receive.
    pub fn compact(&mut self) {
        let data_size = self.data_size();
        if data_size == 0 {
            self.read_pos = 0;
            self.write_pos = 0;
            return;
        }
        if self.read_pos > 0 {
            self.buf.copy_within(self.read_pos..self.write_pos, 0);
        }
        self.read_pos = 0;
        self.write_pos = data_size;
    }
}

impl Default for RecvBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RECV_BUFFER_SIZE)
    }
}

/// Commit rejected by the buffer. The buffer is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("write commit of {requested} bytes exceeds free space ({available})")]
    Overflow { requested: usize, available: usize },
    #[error("read commit of {requested} bytes exceeds unread data ({available})")]
    Underflow { requested: usize, available: usize },
}
