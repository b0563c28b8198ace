//! In-memory byte backend for the raw handle adapter.
//!
//! Clones share the same bytes and budgets but keep their own position, so a
//! test can hand one clone to [`filebuf_core::RawFile::from_io`] and inspect
//! or sabotage the file through another.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Shared {
    data: Vec<u8>,
    /// Bytes that may still be read before one read fails.
    read_budget: Option<usize>,
    /// Bytes that may still be written before one write fails.
    write_budget: Option<usize>,
    reads: u64,
    writes: u64,
}

/// Shared in-memory file.
#[derive(Clone, Default)]
pub struct MemFile {
    shared: Arc<Mutex<Shared>>,
    pos: u64,
}

impl fmt::Debug for MemFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("MemFile")
            .field("len", &shared.data.len())
            .field("pos", &self.pos)
            .field("read_budget", &shared.read_budget)
            .field("write_budget", &shared.write_budget)
            .finish()
    }
}

impl MemFile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A file holding `bytes`, positioned at the start.
    #[must_use]
    pub fn with_data(bytes: impl Into<Vec<u8>>) -> Self {
        let file = Self::new();
        file.shared.lock().data = bytes.into();
        file
    }

    /// Snapshot of the current file contents.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.shared.lock().data.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Let `n` more bytes through, then fail the next read once.
    pub fn fail_read_after(&self, n: usize) {
        self.shared.lock().read_budget = Some(n);
    }

    /// Let `n` more bytes through, then fail the next write once.
    pub fn fail_write_after(&self, n: usize) {
        self.shared.lock().write_budget = Some(n);
    }

    /// Remove any pending budgets.
    pub fn clear_budgets(&self) {
        let mut shared = self.shared.lock();
        shared.read_budget = None;
        shared.write_budget = None;
    }

    /// Number of `read` calls that reached the backend.
    #[must_use]
    pub fn read_calls(&self) -> u64 {
        self.shared.lock().reads
    }

    /// Number of `write` calls that reached the backend.
    #[must_use]
    pub fn write_calls(&self) -> u64 {
        self.shared.lock().writes
    }
}

fn injected(what: &str) -> io::Error {
    io::Error::other(format!("injected {what} failure"))
}

/// Apply a budget to a transfer of `want` bytes.
fn spend(budget: &mut Option<usize>, want: usize, what: &str) -> io::Result<usize> {
    match *budget {
        None => Ok(want),
        Some(0) => {
            *budget = None;
            Err(injected(what))
        }
        Some(left) => {
            let n = want.min(left);
            *budget = Some(left - n);
            Ok(n)
        }
    }
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock();
        shared.reads += 1;
        let start = usize::try_from(self.pos).unwrap_or(usize::MAX).min(shared.data.len());
        let avail = shared.data.len() - start;
        let want = buf.len().min(avail);
        if want == 0 {
            return Ok(0);
        }
        let n = spend(&mut shared.read_budget, want, "read")?;
        buf[..n].copy_from_slice(&shared.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock();
        shared.writes += 1;
        if buf.is_empty() {
            return Ok(0);
        }
        let n = spend(&mut shared.write_budget, buf.len(), "write")?;
        let start = usize::try_from(self.pos).map_err(|_| io::Error::other("position overflow"))?;
        let end = start + n;
        if shared.data.len() < end {
            shared.data.resize(end, 0);
        }
        shared.data[start..end].copy_from_slice(&buf[..n]);
        self.pos = end as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.shared.lock().data.len() as i64;
        let target = match pos {
            SeekFrom::Start(n) => i64::try_from(n).ok(),
            SeekFrom::Current(d) => (self.pos as i64).checked_add(d),
            SeekFrom::End(d) => len.checked_add(d),
        };
        match target {
            Some(t) if t >= 0 => {
                self.pos = t as u64;
                Ok(self.pos)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_bytes_not_position() {
        let mut a = MemFile::new();
        let mut b = a.clone();
        a.write_all(b"hello").unwrap();
        let mut out = [0u8; 5];
        b.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"hello");
        assert_eq!(a.contents(), b"hello");
    }

    #[test]
    fn write_budget_short_then_error_then_recovers() {
        let mut f = MemFile::new();
        f.fail_write_after(3);
        assert_eq!(f.write(b"abcdef").unwrap(), 3);
        assert!(f.write(b"def").is_err());
        assert_eq!(f.write(b"def").unwrap(), 3);
        assert_eq!(f.contents(), b"abcdef");
    }

    #[test]
    fn read_budget() {
        let mut f = MemFile::with_data(b"0123456789".to_vec());
        f.fail_read_after(4);
        let mut out = [0u8; 10];
        assert_eq!(f.read(&mut out).unwrap(), 4);
        assert!(f.read(&mut out).is_err());
        assert_eq!(f.read(&mut out).unwrap(), 6);
    }

    #[test]
    fn seek_past_end_then_write_zero_fills() {
        let mut f = MemFile::with_data(b"ab".to_vec());
        assert_eq!(f.seek(SeekFrom::End(2)).unwrap(), 4);
        f.write_all(b"z").unwrap();
        assert_eq!(f.contents(), b"ab\0\0z");
        assert!(f.seek(SeekFrom::Current(-10)).is_err());
    }
}
