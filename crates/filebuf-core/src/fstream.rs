//! File stream facades.
//!
//! [`IfStream`], [`OfStream`] and [`FStream`] each own one [`FileBuf`] and an
//! [`IoState`]. Engine results (`Option`, `bool`, short counts, `Result`) are
//! folded into the eof/fail/bad bits here; nothing on these paths panics or
//! returns an error value.
//!
//! The unformatted operations live in capability traits so each facade only
//! exposes the directions it supports: [`StreamBase`] for everything,
//! [`InputStream`] for the reading facades and [`OutputStream`] for the
//! writing ones.

use std::path::Path;

use crate::error::OpenError;
use crate::filebuf::{FileBuf, StreamPos};
use crate::ios::{IoState, OpenMode, SeekDir};
use crate::locale::Locale;
use crate::stdio::file::RawFile;
use crate::unit::CharUnit;

/// State and engine access shared by every stream.
pub trait StreamBase<C: CharUnit> {
    fn rdbuf(&self) -> &FileBuf<C>;

    fn rdbuf_mut(&mut self) -> &mut FileBuf<C>;

    fn rdstate(&self) -> IoState;

    /// Replace the state bits.
    fn clear(&mut self, state: IoState);

    /// Add state bits.
    fn setstate(&mut self, bits: IoState) {
        let state = self.rdstate() | bits;
        self.clear(state);
    }

    fn good(&self) -> bool {
        self.rdstate().good()
    }

    fn eof(&self) -> bool {
        self.rdstate().eof
    }

    /// True if either `fail` or `bad` is set.
    fn fail(&self) -> bool {
        let s = self.rdstate();
        s.fail || s.bad
    }

    fn bad(&self) -> bool {
        self.rdstate().bad
    }

    fn is_open(&self) -> bool {
        self.rdbuf().is_open()
    }

    /// Close the engine; a failed close sets `fail`.
    fn close(&mut self) {
        if let Err(e) = self.rdbuf_mut().close() {
            log::debug!("stream close failed: {e}");
            self.setstate(IoState::FAIL);
        }
    }

    /// Switch locales; returns the previous one.
    fn imbue(&mut self, locale: Locale) -> Locale {
        let previous = self.getloc();
        self.rdbuf_mut().imbue(locale);
        previous
    }

    fn getloc(&self) -> Locale {
        self.rdbuf().getloc().clone()
    }
}

/// Unformatted input.
pub trait InputStream<C: CharUnit>: StreamBase<C> {
    /// Extract one unit. End of input sets `eof` and `fail`.
    fn get(&mut self) -> Option<C> {
        if !self.good() {
            self.setstate(IoState::FAIL);
            return None;
        }
        let unit = self.rdbuf_mut().uflow();
        if unit.is_none() {
            self.setstate(IoState::EOF | IoState::FAIL);
        }
        unit
    }

    /// Look at the next unit without extracting it. End of input sets `eof`.
    fn peek(&mut self) -> Option<C> {
        if !self.good() {
            self.setstate(IoState::FAIL);
            return None;
        }
        let unit = self.rdbuf_mut().underflow();
        if unit.is_none() {
            self.setstate(IoState::EOF);
        }
        unit
    }

    /// Make the last extracted unit available again.
    fn unget(&mut self) -> bool {
        let mut state = self.rdstate();
        state.eof = false;
        self.clear(state);
        if self.fail() {
            return false;
        }
        let ok = self.rdbuf_mut().sungetc();
        if !ok {
            self.setstate(IoState::BAD);
        }
        ok
    }

    /// Push `unit` back so it is extracted next.
    fn putback(&mut self, unit: C) -> bool {
        let mut state = self.rdstate();
        state.eof = false;
        self.clear(state);
        if self.fail() {
            return false;
        }
        let ok = self.rdbuf_mut().pbackfail(Some(unit));
        if !ok {
            self.setstate(IoState::BAD);
        }
        ok
    }

    /// Extract up to `out.len()` units. A short read sets `eof` and `fail`.
    fn read(&mut self, out: &mut [C]) -> usize {
        if !self.good() {
            self.setstate(IoState::FAIL);
            return 0;
        }
        let n = self.rdbuf_mut().xsgetn(out);
        if n < out.len() {
            self.setstate(IoState::EOF | IoState::FAIL);
        }
        n
    }

    fn seekg(&mut self, off: i64, dir: SeekDir) -> bool {
        let mut state = self.rdstate();
        state.eof = false;
        self.clear(state);
        if self.fail() {
            return false;
        }
        let ok = self.rdbuf_mut().seekoff(off, dir).is_some();
        if !ok {
            self.setstate(IoState::FAIL);
        }
        ok
    }

    fn seekg_to(&mut self, pos: StreamPos) -> bool {
        let mut state = self.rdstate();
        state.eof = false;
        self.clear(state);
        if self.fail() {
            return false;
        }
        let ok = self.rdbuf_mut().seekpos(pos).is_some();
        if !ok {
            self.setstate(IoState::FAIL);
        }
        ok
    }

    fn tellg(&mut self) -> Option<StreamPos> {
        if self.fail() {
            return None;
        }
        self.rdbuf_mut().seekoff(0, SeekDir::Current)
    }

    /// Synchronize with the file; failure sets `bad`.
    fn sync(&mut self) -> bool {
        if !self.rdbuf().is_open() {
            return false;
        }
        let ok = self.rdbuf_mut().sync();
        if !ok {
            self.setstate(IoState::BAD);
        }
        ok
    }
}

/// Unformatted output.
pub trait OutputStream<C: CharUnit>: StreamBase<C> {
    /// Insert one unit; failure sets `bad`.
    fn put(&mut self, unit: C) -> bool {
        if !self.good() {
            self.setstate(IoState::FAIL);
            return false;
        }
        let ok = self.rdbuf_mut().overflow(Some(unit));
        if !ok {
            self.setstate(IoState::BAD);
        }
        ok
    }

    /// Insert `units`; a short write sets `bad`.
    fn write(&mut self, units: &[C]) -> usize {
        if !self.good() {
            self.setstate(IoState::FAIL);
            return 0;
        }
        let n = self.rdbuf_mut().xsputn(units);
        if n < units.len() {
            self.setstate(IoState::BAD);
        }
        n
    }

    /// Push pending output (and any homing sequence) to the file.
    fn flush(&mut self) -> bool {
        if !self.rdbuf().is_open() || !self.good() {
            return false;
        }
        let ok = self.rdbuf_mut().sync();
        if !ok {
            self.setstate(IoState::BAD);
        }
        ok
    }

    fn seekp(&mut self, off: i64, dir: SeekDir) -> bool {
        if self.fail() {
            return false;
        }
        let ok = self.rdbuf_mut().seekoff(off, dir).is_some();
        if !ok {
            self.setstate(IoState::FAIL);
        }
        ok
    }

    fn seekp_to(&mut self, pos: StreamPos) -> bool {
        if self.fail() {
            return false;
        }
        let ok = self.rdbuf_mut().seekpos(pos).is_some();
        if !ok {
            self.setstate(IoState::FAIL);
        }
        ok
    }

    fn tellp(&mut self) -> Option<StreamPos> {
        if self.fail() {
            return None;
        }
        self.rdbuf_mut().seekoff(0, SeekDir::Current)
    }
}

macro_rules! file_stream {
    ($(#[$meta:meta])* $name:ident, implied: $implied:expr, default: $default:expr) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $name<C: CharUnit = u8> {
            buf: FileBuf<C>,
            state: IoState,
        }

        impl<C: CharUnit> $name<C> {
            /// Mode used by [`Self::from_path`].
            pub const DEFAULT_MODE: OpenMode = $default;

            /// Bits added to every mode passed to `open`.
            const IMPLIED_MODE: OpenMode = $implied;

            /// An unopened stream.
            #[must_use]
            pub fn new() -> Self {
                Self {
                    buf: FileBuf::new(),
                    state: IoState::GOOD,
                }
            }

            /// Open `path` in the default mode; failure sets `fail`.
            #[must_use]
            pub fn from_path(path: impl AsRef<Path>) -> Self {
                Self::with_mode(path, Self::DEFAULT_MODE)
            }

            /// Open `path` in `mode`; failure sets `fail`.
            #[must_use]
            pub fn with_mode(path: impl AsRef<Path>, mode: OpenMode) -> Self {
                let mut stream = Self::new();
                if let Err(e) = stream.buf.open(path, mode | Self::IMPLIED_MODE) {
                    log::debug!("stream open failed: {e}");
                    stream.state |= IoState::FAIL;
                }
                stream
            }

            /// Wrap a handle opened elsewhere. Dropping the stream leaves the
            /// handle open.
            #[must_use]
            pub fn from_raw(file: RawFile) -> Self {
                Self {
                    buf: FileBuf::from_raw(file),
                    state: IoState::GOOD,
                }
            }

            /// Open `path`. Success clears the state; failure (including an
            /// already-open stream) sets `fail`.
            pub fn open(&mut self, path: impl AsRef<Path>, mode: OpenMode) {
                let result = self.buf.open(path, mode | Self::IMPLIED_MODE);
                self.fold_open(result);
            }

            /// Like [`Self::open`] with explicit creation permissions.
            pub fn open_with_prot(&mut self, path: impl AsRef<Path>, mode: OpenMode, prot: u32) {
                let result = self.buf.open_with_prot(path, mode | Self::IMPLIED_MODE, prot);
                self.fold_open(result);
            }

            /// Open a file named by UTF-16 code units.
            pub fn open_wide(&mut self, name: &[u16], mode: OpenMode) {
                let result = self.buf.open_wide(name, mode | Self::IMPLIED_MODE);
                self.fold_open(result);
            }

            fn fold_open(&mut self, result: Result<(), OpenError>) {
                match result {
                    Ok(()) => self.state = IoState::GOOD,
                    Err(e) => {
                        log::debug!("stream open failed: {e}");
                        self.state |= IoState::FAIL;
                    }
                }
            }

            /// Exchange engine and state with `other`.
            pub fn swap(&mut self, other: &mut Self) {
                self.buf.swap(&mut other.buf);
                std::mem::swap(&mut self.state, &mut other.state);
            }

            /// Move the stream out, leaving an unopened one behind.
            #[must_use]
            pub fn take(&mut self) -> Self {
                std::mem::take(self)
            }
        }

        impl<C: CharUnit> StreamBase<C> for $name<C> {
            fn rdbuf(&self) -> &FileBuf<C> {
                &self.buf
            }

            fn rdbuf_mut(&mut self) -> &mut FileBuf<C> {
                &mut self.buf
            }

            fn rdstate(&self) -> IoState {
                self.state
            }

            fn clear(&mut self, state: IoState) {
                self.state = state;
            }
        }
    };
}

file_stream!(
    /// Input file stream.
    IfStream,
    implied: OpenMode::IN,
    default: OpenMode::IN
);

file_stream!(
    /// Output file stream.
    OfStream,
    implied: OpenMode::OUT,
    default: OpenMode::OUT
);

file_stream!(
    /// Bidirectional file stream. The mode passed to `open` is used as given.
    FStream,
    implied: OpenMode::empty(),
    default: OpenMode::IN.union(OpenMode::OUT)
);

impl<C: CharUnit> InputStream<C> for IfStream<C> {}
impl<C: CharUnit> InputStream<C> for FStream<C> {}
impl<C: CharUnit> OutputStream<C> for OfStream<C> {}
impl<C: CharUnit> OutputStream<C> for FStream<C> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_sets_fail() {
        let dir = tempfile::tempdir().unwrap();
        let s = IfStream::<u8>::from_path(dir.path().join("missing.txt"));
        assert!(!s.is_open());
        assert!(s.fail());
        assert!(!s.bad());
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let mut out = OfStream::<u8>::from_path(&path);
        assert!(out.good());
        assert_eq!(out.write(b"hello"), 5);
        assert!(out.put(b'\n'));
        assert_eq!(out.tellp().map(|p| p.offset), Some(6));
        out.close();
        assert!(out.good());

        let mut input = IfStream::<u8>::from_path(&path);
        assert_eq!(input.peek(), Some(b'h'));
        assert_eq!(input.get(), Some(b'h'));
        assert!(input.unget());
        let mut buf = [0u8; 10];
        assert_eq!(input.read(&mut buf), 6);
        assert_eq!(&buf[..6], b"hello\n");
        assert!(input.eof() && input.fail());
        // seekg clears eof but not fail.
        assert!(!input.seekg(0, SeekDir::Begin));
        input.clear(IoState::GOOD);
        assert!(input.seekg(0, SeekDir::Begin));
        assert_eq!(input.get(), Some(b'h'));
    }

    #[test]
    fn open_on_open_stream_fails_and_success_clears() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let mut s = OfStream::<u8>::new();
        s.setstate(IoState::EOF);
        s.open(&a, OpenMode::TRUNC);
        assert!(s.good());
        s.open(&b, OpenMode::OUT);
        assert!(s.fail());
        assert!(s.is_open());
        s.close();
        s.close();
        assert!(s.fail());
    }

    #[test]
    fn fstream_reads_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rw.txt");
        let mut s = FStream::<u8>::with_mode(
            &path,
            OpenMode::IN | OpenMode::OUT | OpenMode::TRUNC,
        );
        assert!(s.is_open());
        assert_eq!(s.write(b"abc"), 3);
        assert!(s.seekg(0, SeekDir::Begin));
        assert_eq!(s.get(), Some(b'a'));
        assert!(s.putback(b'Z'));
        assert_eq!(s.get(), Some(b'Z'));
        assert_eq!(s.get(), Some(b'b'));
        let pos = s.tellg().unwrap();
        assert!(s.seekp(0, SeekDir::End));
        assert!(s.put(b'd'));
        assert!(s.seekg_to(pos));
        assert_eq!(s.get(), Some(b'c'));
        assert_eq!(s.get(), Some(b'd'));
        assert_eq!(s.get(), None);
    }

    #[test]
    fn fstream_mode_is_not_augmented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in-only.txt");
        std::fs::write(&path, b"x").unwrap();
        let mut s = FStream::<u8>::with_mode(&path, OpenMode::IN);
        assert!(s.is_open());
        // The unit sits in the output window until the flush reaches the handle.
        assert!(s.put(b'y'));
        assert!(!s.flush());
        assert!(s.bad());
    }

    #[test]
    fn take_and_swap_move_state_with_engine() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = IfStream::<u8>::from_path(dir.path().join("nope"));
        assert!(a.fail());
        let mut b = IfStream::<u8>::new();
        a.swap(&mut b);
        assert!(a.good());
        assert!(b.fail());
        let c = b.take();
        assert!(c.fail());
        assert!(b.good());
    }

    #[test]
    fn imbue_returns_previous_locale() {
        let mut s = IfStream::<u8>::new();
        let prev = s.imbue(Locale::classic());
        assert_eq!(prev.name(), Locale::default().name());
        assert_eq!(s.getloc().name(), "C");
    }

    #[test]
    fn closed_stream_operations() {
        let mut s = FStream::<u16>::new();
        assert_eq!(s.get(), None);
        assert!(s.eof() && s.fail());
        s.clear(IoState::GOOD);
        assert!(!s.put(0x41));
        assert!(s.bad());
        assert!(!InputStream::sync(&mut s));
    }
}
