//! Raw file handle.
//!
//! `RawFile` is the safe model of a C `FILE`: an OS (or in-memory) byte
//! stream, a stdio buffer, open flags, the eof/error indicators and a
//! one-byte pushback slot. Clones share the same handle, which is how a
//! borrowed handle is represented; the handle is released when it is closed
//! or when the last clone goes away.
//!
//! Every call takes the handle's reentrant lock for its duration. Callers that
//! need several calls to appear atomic hold a [`FileLock`] (or use
//! [`RawFile::with_lock`]) around them.

use std::cell::RefCell;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use super::buffer::{BufMode, StreamBuffer};
use crate::config::io_config;
use crate::error::OpenError;
use crate::ios::{OpenMode, SeekDir};
use crate::unit::CharUnit;

/// Anything a raw handle can sit on.
pub trait RawIo: Read + Write + Seek + Send + fmt::Debug {}

impl<T: Read + Write + Seek + Send + fmt::Debug> RawIo for T {}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// File open mode flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub readable: bool,
    pub writable: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub binary: bool,
    pub exclusive: bool,
}

impl OpenFlags {
    /// Flags for a handle that can do everything (wrapped in-memory streams).
    pub fn read_write() -> Self {
        Self {
            readable: true,
            writable: true,
            ..Self::default()
        }
    }

    fn to_options(self, prot: u32) -> OpenOptions {
        let mut opts = OpenOptions::new();
        opts.read(self.readable)
            .write(self.writable)
            .append(self.append)
            .truncate(self.truncate);
        if self.exclusive {
            opts.create_new(true);
        } else {
            opts.create(self.create);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(prot);
        }
        #[cfg(not(unix))]
        let _ = prot;
        opts
    }
}

/// Runtime stream state flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamFlags {
    pub eof: bool,
    pub error: bool,
}

/// Which way the shared buffer currently points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Idle,
    Read,
    Write,
}

// ---------------------------------------------------------------------------
// Mode parsing
// ---------------------------------------------------------------------------

/// Parse a POSIX fopen mode string (e.g. "r", "w+", "rb", "a+b", "wx").
///
/// Returns `None` if the mode string is invalid.
pub fn parse_mode(mode: &str) -> Option<OpenFlags> {
    let mut bytes = mode.bytes();
    let mut flags = OpenFlags::default();

    match bytes.next()? {
        b'r' => {
            flags.readable = true;
        }
        b'w' => {
            flags.writable = true;
            flags.create = true;
            flags.truncate = true;
        }
        b'a' => {
            flags.writable = true;
            flags.create = true;
            flags.append = true;
        }
        _ => return None,
    }

    // Modifiers: '+', 'b', 'x' in any order.
    for b in bytes {
        match b {
            b'+' => {
                flags.readable = true;
                flags.writable = true;
            }
            b'b' => flags.binary = true,
            b'x' => flags.exclusive = true,
            _ => return None,
        }
    }

    Some(flags)
}

/// The fopen mode string for an `OpenMode`, or `None` for an invalid
/// combination. `ATE` is not part of the string (the caller seeks).
pub fn mode_string(mode: OpenMode) -> Option<String> {
    let key = mode & (OpenMode::IN | OpenMode::OUT | OpenMode::APP | OpenMode::TRUNC);
    let base = if key == OpenMode::IN {
        "r"
    } else if key == OpenMode::OUT || key == OpenMode::OUT | OpenMode::TRUNC {
        "w"
    } else if key == OpenMode::OUT | OpenMode::APP || key == OpenMode::APP {
        "a"
    } else if key == OpenMode::IN | OpenMode::OUT {
        "r+"
    } else if key == OpenMode::IN | OpenMode::OUT | OpenMode::TRUNC {
        "w+"
    } else if key == OpenMode::IN | OpenMode::OUT | OpenMode::APP
        || key == OpenMode::IN | OpenMode::APP
    {
        "a+"
    } else {
        return None;
    };

    let mut s = String::from(base);
    if mode.contains(OpenMode::BINARY) {
        s.push('b');
    }
    if mode.contains(OpenMode::NOREPLACE) {
        // Only modes that may create the file can refuse to replace one.
        if base.starts_with('r') {
            return None;
        }
        s.push('x');
    }
    Some(s)
}

// ---------------------------------------------------------------------------
// Handle state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct FileState {
    io: Option<Box<dyn RawIo>>,
    buffer: StreamBuffer,
    open_flags: OpenFlags,
    flags: StreamFlags,
    dir: Direction,
    /// One-byte pushback layered on top of the buffer.
    ungetc_byte: Option<u8>,
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "file handle is closed")
}

impl FileState {
    fn new(io: Box<dyn RawIo>, open_flags: OpenFlags) -> Self {
        Self {
            io: Some(io),
            buffer: StreamBuffer::new(BufMode::Full, io_config().buffer_size),
            open_flags,
            flags: StreamFlags::default(),
            dir: Direction::Idle,
            ungetc_byte: None,
        }
    }

    /// Bytes read from the OS but not yet consumed by the caller.
    fn unread(&self) -> usize {
        if self.dir == Direction::Read {
            self.buffer.readable() + usize::from(self.ungetc_byte.is_some())
        } else {
            0
        }
    }

    /// Hand staged output to the OS. A short write keeps the remainder.
    fn flush_pending(&mut self) -> io::Result<()> {
        let Some(io) = self.io.as_mut() else {
            return Err(closed_error());
        };
        while !self.buffer.pending().is_empty() {
            match io.write(self.buffer.pending()) {
                Ok(0) => {
                    self.flags.error = true;
                    return Err(io::Error::from(io::ErrorKind::WriteZero));
                }
                Ok(n) => self.buffer.consume_flushed(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.flags.error = true;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Give the OS position back to the caller's logical position.
    fn discard_unread(&mut self) -> io::Result<()> {
        let unread = self.unread();
        self.buffer.reset();
        self.ungetc_byte = None;
        if unread > 0 {
            let io = self.io.as_mut().ok_or_else(closed_error)?;
            io.seek(SeekFrom::Current(-(unread as i64)))?;
        }
        Ok(())
    }

    fn begin_read(&mut self) -> bool {
        if self.io.is_none() {
            return false;
        }
        if !self.open_flags.readable {
            self.flags.error = true;
            return false;
        }
        if self.dir == Direction::Write {
            if self.flush_pending().is_err() {
                return false;
            }
            self.buffer.reset();
        }
        self.dir = Direction::Read;
        true
    }

    fn begin_write(&mut self) -> bool {
        if self.io.is_none() {
            return false;
        }
        if !self.open_flags.writable {
            self.flags.error = true;
            return false;
        }
        if self.dir == Direction::Read {
            if let Err(e) = self.discard_unread() {
                log::debug!("read-to-write switch could not reposition: {e}");
                self.flags.error = true;
                return false;
            }
        }
        self.dir = Direction::Write;
        true
    }

    /// Read into `out` straight from the OS, retrying interrupts.
    fn read_direct(&mut self, out: &mut [u8]) -> usize {
        let Some(io) = self.io.as_mut() else {
            return 0;
        };
        self.buffer.mark_io_started();
        loop {
            match io.read(out) {
                Ok(0) => {
                    self.flags.eof = true;
                    return 0;
                }
                Ok(n) => return n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::debug!("raw read failed: {e}");
                    self.flags.error = true;
                    return 0;
                }
            }
        }
    }

    /// Refill the buffer. Returns `false` at end of input or on error.
    fn refill(&mut self) -> bool {
        let Some(io) = self.io.as_mut() else {
            return false;
        };
        match self.buffer.fill_from(io.as_mut()) {
            Ok(0) => {
                self.flags.eof = true;
                false
            }
            Ok(_) => true,
            Err(e) => {
                log::debug!("buffer refill failed: {e}");
                self.flags.error = true;
                false
            }
        }
    }

    fn read_block(&mut self, out: &mut [u8]) -> usize {
        if out.is_empty() || !self.begin_read() {
            return 0;
        }
        let mut done = 0;
        if let Some(b) = self.ungetc_byte.take() {
            out[0] = b;
            done = 1;
        }
        while done < out.len() {
            let chunk = self.buffer.read(out.len() - done);
            if !chunk.is_empty() {
                let n = chunk.len();
                out[done..done + n].copy_from_slice(chunk);
                done += n;
                continue;
            }
            let rest = out.len() - done;
            if rest >= self.buffer.capacity() {
                let n = self.read_direct(&mut out[done..]);
                if n == 0 {
                    break;
                }
                done += n;
            } else if !self.refill() {
                break;
            }
        }
        done
    }

    /// Write `data` straight to the OS; returns the bytes accepted.
    fn write_direct(&mut self, data: &[u8]) -> usize {
        let Some(io) = self.io.as_mut() else {
            return 0;
        };
        self.buffer.mark_io_started();
        let mut done = 0;
        while done < data.len() {
            match io.write(&data[done..]) {
                Ok(0) => {
                    self.flags.error = true;
                    break;
                }
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::debug!("raw write failed after {done} bytes: {e}");
                    self.flags.error = true;
                    break;
                }
            }
        }
        done
    }

    fn write_block(&mut self, data: &[u8]) -> usize {
        if data.is_empty() || !self.begin_write() {
            return 0;
        }
        let mut done = 0;
        while done < data.len() {
            let rest = &data[done..];
            if self.buffer.pending().is_empty() && rest.len() >= self.buffer.capacity() {
                done += self.write_direct(rest);
                break;
            }
            done += self.buffer.stage(rest);
            if self.buffer.space() == 0 && self.flush_pending().is_err() {
                break;
            }
        }
        if self.buffer.mode() == BufMode::Line && data[..done].contains(&b'\n') {
            if let Err(e) = self.flush_pending() {
                log::debug!("line flush failed: {e}");
            }
        }
        done
    }

    fn seek(&mut self, off: i64, dir: SeekDir) -> Option<u64> {
        self.io.as_ref()?;
        if self.dir == Direction::Write && self.flush_pending().is_err() {
            return None;
        }
        let off = if dir == SeekDir::Current {
            off.checked_sub(self.unread() as i64)?
        } else {
            off
        };
        let target = dir.to_seek_from(off)?;
        self.buffer.reset();
        self.ungetc_byte = None;
        self.dir = Direction::Idle;
        let io = self.io.as_mut()?;
        match io.seek(target) {
            Ok(pos) => {
                self.flags.eof = false;
                Some(pos)
            }
            Err(e) => {
                log::debug!("seek to {target:?} failed: {e}");
                None
            }
        }
    }

    fn tell(&mut self) -> Option<u64> {
        let unread = self.unread() as u64;
        let pending = if self.dir == Direction::Write {
            self.buffer.pending().len() as u64
        } else {
            0
        };
        let io = self.io.as_mut()?;
        let pos = io.stream_position().ok()?;
        (pos + pending).checked_sub(unread)
    }

    fn unget(&mut self, bytes: &[u8]) -> bool {
        if self.io.is_none() || !self.open_flags.readable || self.ungetc_byte.is_some() {
            return false;
        }
        if self.dir == Direction::Write {
            return false;
        }
        self.dir = Direction::Read;
        let ok = if self.buffer.unget(bytes) {
            true
        } else if let [b] = bytes {
            self.ungetc_byte = Some(*b);
            true
        } else {
            false
        };
        if ok {
            // POSIX: ungetc clears EOF.
            self.flags.eof = false;
        }
        ok
    }

    fn flush(&mut self) -> bool {
        if self.io.is_none() {
            return false;
        }
        let result = match self.dir {
            Direction::Write => match self.flush_pending() {
                Ok(()) => self.io.as_mut().map_or_else(|| Err(closed_error()), |io| io.flush()),
                Err(e) => Err(e),
            },
            Direction::Read => self.discard_unread(),
            Direction::Idle => Ok(()),
        };
        match result {
            Ok(()) => {
                self.dir = Direction::Idle;
                true
            }
            Err(e) => {
                log::debug!("flush failed: {e}");
                false
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if self.io.is_none() {
            return Err(closed_error());
        }
        let flushed = if self.dir == Direction::Write {
            self.flush_pending()
        } else {
            Ok(())
        };
        let mut io = self.io.take().ok_or_else(closed_error)?;
        let synced = io.flush();
        drop(io);
        self.buffer.reset();
        self.ungetc_byte = None;
        self.dir = Direction::Idle;
        flushed.and(synced)
    }
}

impl Drop for FileState {
    fn drop(&mut self) {
        if self.io.is_none() || self.dir != Direction::Write {
            return;
        }
        if let Err(e) = self.flush_pending() {
            log::warn!("unflushed output lost when the handle was dropped: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Public handle
// ---------------------------------------------------------------------------

/// Shared, buffered byte handle.
#[derive(Clone)]
pub struct RawFile {
    inner: Arc<ReentrantMutex<RefCell<FileState>>>,
}

/// Guard holding a handle's lock; unlocks on drop.
pub struct FileLock<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<FileState>>,
}

impl fmt::Debug for RawFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.lock();
        match guard.try_borrow() {
            Ok(state) => f
                .debug_struct("RawFile")
                .field("open", &state.io.is_some())
                .field("flags", &state.open_flags)
                .field("mode", &state.buffer.mode())
                .finish(),
            Err(_) => f.write_str("RawFile { <busy> }"),
        }
    }
}

impl RawFile {
    /// Open `path` with fopen-style flags and creation permissions `prot`.
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags, prot: u32) -> io::Result<RawFile> {
        let path = path.as_ref();
        let file = flags.to_options(prot).open(path)?;
        log::debug!("opened {} with {flags:?}", path.display());
        Ok(Self::from_file(file, flags))
    }

    /// Open `path` with an ios-style mode, honoring `ATE`.
    pub fn open_mode(
        path: impl AsRef<Path>,
        mode: OpenMode,
        prot: u32,
    ) -> Result<RawFile, OpenError> {
        let mode_str = mode_string(mode).ok_or(OpenError::InvalidMode(mode))?;
        let flags = parse_mode(&mode_str).ok_or(OpenError::InvalidMode(mode))?;
        let file = Self::open(path, flags, prot)?;
        if mode.contains(OpenMode::ATE) && file.seek(0, SeekDir::End).is_none() {
            let _ = file.close();
            return Err(OpenError::Io(io::Error::other(
                "could not position at end of file",
            )));
        }
        Ok(file)
    }

    /// Wrap an already-open file.
    pub fn from_file(file: File, flags: OpenFlags) -> RawFile {
        Self::from_io(file, flags)
    }

    /// Wrap any seekable byte stream.
    pub fn from_io(io: impl RawIo + 'static, flags: OpenFlags) -> RawFile {
        RawFile {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(FileState::new(
                Box::new(io),
                flags,
            )))),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FileState) -> R) -> R {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    // -----------------------------------------------------------------------
    // Locking
    // -----------------------------------------------------------------------

    /// Lock the handle until the guard is dropped. Reentrant for this thread.
    pub fn lock(&self) -> FileLock<'_> {
        FileLock {
            _guard: self.inner.lock(),
        }
    }

    /// Run `f` with the handle locked.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _lock = self.lock();
        f()
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn is_open(&self) -> bool {
        self.with_state(|s| s.io.is_some())
    }

    pub fn open_flags(&self) -> OpenFlags {
        self.with_state(|s| s.open_flags)
    }

    pub fn is_eof(&self) -> bool {
        self.with_state(|s| s.flags.eof)
    }

    pub fn is_error(&self) -> bool {
        self.with_state(|s| s.flags.error)
    }

    /// Clear EOF and error indicators.
    pub fn clear_err(&self) {
        self.with_state(|s| {
            s.flags.eof = false;
            s.flags.error = false;
        });
    }

    pub fn buffer_capacity(&self) -> usize {
        self.with_state(|s| s.buffer.capacity())
    }

    // -----------------------------------------------------------------------
    // Buffering control
    // -----------------------------------------------------------------------

    /// Change the buffering mode (POSIX setvbuf with a null buffer).
    ///
    /// Must be called before any I/O. Returns false if too late.
    pub fn set_buffering(&self, mode: BufMode, size: usize) -> bool {
        self.with_state(|s| s.io.is_some() && s.buffer.set_mode(mode, size))
    }

    /// setvbuf with caller-supplied storage.
    pub fn set_buffer(&self, mode: BufMode, storage: Vec<u8>) -> bool {
        self.with_state(|s| s.io.is_some() && s.buffer.adopt(mode, storage))
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// fgetc: `None` at end of input or on error.
    pub fn read_byte(&self) -> Option<u8> {
        let mut b = [0u8; 1];
        (self.read_block(&mut b) == 1).then_some(b[0])
    }

    /// Read one unit as `WIDTH` little-endian bytes. A unit cut short by end
    /// of input is lost, as with fgetwc on a truncated file.
    pub fn read_unit<C: CharUnit>(&self) -> Option<C> {
        let mut raw = [0u8; 4];
        let raw = &mut raw[..C::WIDTH];
        (self.read_block(raw) == C::WIDTH).then(|| C::from_le_slice(raw))
    }

    /// fputc.
    pub fn write_byte(&self, byte: u8) -> bool {
        self.write_block(&[byte]) == 1
    }

    /// fread: bytes actually transferred. Short means end of input or error.
    pub fn read_block(&self, out: &mut [u8]) -> usize {
        self.with_state(|s| s.read_block(out))
    }

    /// fwrite: bytes accepted. Short means the handle failed.
    pub fn write_block(&self, data: &[u8]) -> usize {
        self.with_state(|s| s.write_block(data))
    }

    /// ungetc. Best effort: backs up inside the read buffer, else uses the
    /// single pushback slot.
    pub fn unget_byte(&self, byte: u8) -> bool {
        self.with_state(|s| s.unget(&[byte]))
    }

    /// Push back one unit. Units wider than a byte only fit by backing up
    /// inside the read buffer.
    pub fn unget_unit<C: CharUnit>(&self, unit: C) -> bool {
        let mut raw = [0u8; 4];
        unit.write_le(&mut raw);
        self.with_state(|s| s.unget(&raw[..C::WIDTH]))
    }

    // -----------------------------------------------------------------------
    // Positioning
    // -----------------------------------------------------------------------

    /// fseek; returns the new absolute offset.
    pub fn seek(&self, off: i64, dir: SeekDir) -> Option<u64> {
        self.with_state(|s| s.seek(off, dir))
    }

    /// fsetpos.
    pub fn seek_to(&self, pos: u64) -> bool {
        i64::try_from(pos)
            .ok()
            .and_then(|off| self.seek(off, SeekDir::Begin))
            .is_some()
    }

    /// fgetpos / ftell.
    pub fn tell(&self) -> Option<u64> {
        self.with_state(FileState::tell)
    }

    /// fflush. On a reading handle this hands unread bytes back to the OS.
    pub fn flush(&self) -> bool {
        self.with_state(FileState::flush)
    }

    /// fclose: flush, then release the OS handle. Closing twice fails.
    pub fn close(&self) -> io::Result<()> {
        self.with_state(FileState::close)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
