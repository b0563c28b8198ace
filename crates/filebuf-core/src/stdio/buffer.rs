//! Byte buffer of a raw file handle.
//!
//! POSIX stdio buffering semantics: fully-buffered (`_IOFBF`), line-buffered
//! (`_IOLBF`) and unbuffered (`_IONBF`). One buffer serves both directions;
//! the owning handle decides which direction it is in.
//!
//! Invariants:
//! - `pos <= filled <= data.len()` while reading
//! - `pos <= data.len()` while writing (`data[..pos]` is pending output)
//! - the mode and storage cannot change once I/O has happened

use std::io::{self, Read};

/// Default buffer size (POSIX BUFSIZ).
pub const BUFSIZ: usize = 8192;

/// Buffering mode, matching POSIX `_IOFBF`, `_IOLBF`, `_IONBF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufMode {
    /// Fully buffered: flush when the buffer is full.
    Full,
    /// Line buffered: flush on newline or when full.
    Line,
    /// Unbuffered: every transfer goes straight to the handle.
    None,
}

/// POSIX constant values for the setvbuf mode argument.
pub const IOFBF: i32 = 0;
pub const IOLBF: i32 = 1;
pub const IONBF: i32 = 2;

impl BufMode {
    /// Convert from the POSIX integer constant.
    pub fn from_posix(mode: i32) -> Option<BufMode> {
        match mode {
            IOFBF => Some(BufMode::Full),
            IOLBF => Some(BufMode::Line),
            IONBF => Some(BufMode::None),
            _ => Option::None,
        }
    }
}

#[derive(Debug)]
pub struct StreamBuffer {
    data: Vec<u8>,
    /// Read cursor, or end of pending output.
    pos: usize,
    /// Valid bytes when reading.
    filled: usize,
    mode: BufMode,
    /// Set by the first transfer; freezes mode and storage.
    io_started: bool,
}

fn capacity_for(mode: BufMode, size: usize) -> usize {
    if matches!(mode, BufMode::None) {
        0
    } else {
        size.max(1)
    }
}

impl StreamBuffer {
    /// Create a new buffer with the given mode and capacity.
    pub fn new(mode: BufMode, capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity_for(mode, capacity)],
            pos: 0,
            filled: 0,
            mode,
            io_started: false,
        }
    }

    /// Create a fully-buffered buffer with default BUFSIZ.
    pub fn default_full() -> Self {
        Self::new(BufMode::Full, BUFSIZ)
    }

    /// Create an unbuffered "buffer" (zero-size).
    pub fn unbuffered() -> Self {
        Self::new(BufMode::None, 0)
    }

    pub fn mode(&self) -> BufMode {
        self.mode
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn io_started(&self) -> bool {
        self.io_started
    }

    /// Record a transfer that bypassed the buffer.
    pub fn mark_io_started(&mut self) {
        self.io_started = true;
    }

    /// Change buffering mode and size.
    ///
    /// Returns `false` if I/O has already occurred (POSIX disallows this).
    pub fn set_mode(&mut self, mode: BufMode, size: usize) -> bool {
        if self.io_started {
            return false;
        }
        self.mode = mode;
        self.data = vec![0u8; capacity_for(mode, size)];
        self.reset();
        true
    }

    /// Use caller-supplied storage (setvbuf with a non-null buffer).
    ///
    /// Empty storage in a buffered mode still gets one byte of room.
    pub fn adopt(&mut self, mode: BufMode, mut storage: Vec<u8>) -> bool {
        if self.io_started {
            return false;
        }
        if matches!(mode, BufMode::None) {
            storage.clear();
        } else if storage.is_empty() {
            storage.push(0);
        }
        self.mode = mode;
        self.data = storage;
        self.reset();
        true
    }

    // -----------------------------------------------------------------------
    // Write side
    // -----------------------------------------------------------------------

    /// Copy as much of `data` as fits; returns the number of bytes taken.
    pub fn stage(&mut self, data: &[u8]) -> usize {
        self.io_started = true;
        let take = data.len().min(self.space());
        self.data[self.pos..self.pos + take].copy_from_slice(&data[..take]);
        self.pos += take;
        take
    }

    /// Free room for staged output.
    pub fn space(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Output staged but not yet handed to the OS.
    pub fn pending(&self) -> &[u8] {
        &self.data[..self.pos]
    }

    /// Drop the first `n` pending bytes after they were written.
    ///
    /// A short write keeps the unwritten tail at the front of the buffer.
    pub fn consume_flushed(&mut self, n: usize) {
        let n = n.min(self.pos);
        self.data.copy_within(n..self.pos, 0);
        self.pos -= n;
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Take up to `count` buffered bytes.
    pub fn read(&mut self, count: usize) -> &[u8] {
        self.io_started = true;
        let take = count.min(self.readable());
        let slice = &self.data[self.pos..self.pos + take];
        self.pos += take;
        slice
    }

    /// Number of buffered bytes available for reading.
    pub fn readable(&self) -> usize {
        self.filled.saturating_sub(self.pos)
    }

    /// Refill from `src`, discarding whatever was buffered.
    ///
    /// `Ok(0)` means end of input.
    pub fn fill_from<R: Read + ?Sized>(&mut self, src: &mut R) -> io::Result<usize> {
        self.io_started = true;
        self.reset();
        loop {
            match src.read(&mut self.data) {
                Ok(n) => {
                    self.filled = n;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Push bytes back in front of the read cursor (for ungetc).
    ///
    /// Backs up over already-consumed bytes when possible, otherwise shifts
    /// the unread bytes right if there is room. Returns `false` otherwise.
    pub fn unget(&mut self, bytes: &[u8]) -> bool {
        let n = bytes.len();
        if self.pos >= n {
            self.pos -= n;
        } else if self.pos == 0 && self.filled + n <= self.data.len() {
            self.data.copy_within(0..self.filled, n);
            self.filled += n;
        } else {
            return false;
        }
        self.data[self.pos..self.pos + n].copy_from_slice(bytes);
        true
    }

    /// Discard all buffered data in either direction.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.filled = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_until_full() {
        let mut buf = StreamBuffer::new(BufMode::Full, 8);
        assert_eq!(buf.stage(b"abcd"), 4);
        assert_eq!(buf.stage(b"efghijkl"), 4);
        assert_eq!(buf.pending(), b"abcdefgh");
        assert_eq!(buf.space(), 0);
    }

    #[test]
    fn test_partial_flush_keeps_tail() {
        let mut buf = StreamBuffer::new(BufMode::Full, 8);
        buf.stage(b"hello");
        buf.consume_flushed(2);
        assert_eq!(buf.pending(), b"llo");
        buf.stage(b"!");
        assert_eq!(buf.pending(), b"llo!");
        buf.consume_flushed(100);
        assert!(buf.pending().is_empty());
    }

    #[test]
    fn test_unbuffered_stages_nothing() {
        let mut buf = StreamBuffer::unbuffered();
        assert_eq!(buf.capacity(), 0);
        assert_eq!(buf.stage(b"hello"), 0);
        assert!(buf.io_started());
    }

    #[test]
    fn test_fill_and_read() {
        let mut buf = StreamBuffer::new(BufMode::Full, 64);
        let mut src: &[u8] = b"hello world";
        assert_eq!(buf.fill_from(&mut src).unwrap(), 11);
        assert_eq!(buf.read(5), b"hello");
        assert_eq!(buf.read(60), b" world");
        assert_eq!(buf.readable(), 0);
        assert_eq!(buf.fill_from(&mut src).unwrap(), 0);
    }

    #[test]
    fn test_unget_backs_up() {
        let mut buf = StreamBuffer::new(BufMode::Full, 64);
        let mut src: &[u8] = b"ello";
        buf.fill_from(&mut src).unwrap();
        let _ = buf.read(2);
        assert!(buf.unget(b"xy"));
        assert_eq!(buf.read(4), b"xylo");
    }

    #[test]
    fn test_unget_shifts_when_at_front() {
        let mut buf = StreamBuffer::new(BufMode::Full, 8);
        let mut src: &[u8] = b"bc";
        buf.fill_from(&mut src).unwrap();
        assert!(buf.unget(b"a"));
        assert_eq!(buf.read(8), b"abc");
    }

    #[test]
    fn test_unget_without_room_fails() {
        let mut buf = StreamBuffer::new(BufMode::Full, 2);
        let mut src: &[u8] = b"ab";
        buf.fill_from(&mut src).unwrap();
        assert!(!buf.unget(b"z"));
    }

    #[test]
    fn test_set_mode_before_io() {
        let mut buf = StreamBuffer::new(BufMode::Full, 64);
        assert!(buf.set_mode(BufMode::Line, 128));
        assert_eq!(buf.mode(), BufMode::Line);
        assert_eq!(buf.capacity(), 128);
    }

    #[test]
    fn test_set_mode_after_io_fails() {
        let mut buf = StreamBuffer::new(BufMode::Full, 64);
        buf.stage(b"x");
        assert!(!buf.set_mode(BufMode::Line, 128));
        assert!(!buf.adopt(BufMode::Full, vec![0; 4]));
    }

    #[test]
    fn test_adopt_storage() {
        let mut buf = StreamBuffer::default_full();
        assert!(buf.adopt(BufMode::Full, vec![0; 16]));
        assert_eq!(buf.capacity(), 16);
        assert!(buf.adopt(BufMode::None, vec![0; 16]));
        assert_eq!(buf.capacity(), 0);
        assert!(buf.adopt(BufMode::Full, Vec::new()));
        assert_eq!(buf.capacity(), 1);
    }

    #[test]
    fn test_bufmode_from_posix() {
        assert_eq!(BufMode::from_posix(0), Some(BufMode::Full));
        assert_eq!(BufMode::from_posix(1), Some(BufMode::Line));
        assert_eq!(BufMode::from_posix(2), Some(BufMode::None));
        assert_eq!(BufMode::from_posix(3), Option::None);
    }
}
