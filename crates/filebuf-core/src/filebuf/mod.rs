//! Buffered conversion engine.
//!
//! [`FileBuf`] sits between a typed character stream and a [`RawFile`]. In
//! identity mode (no facility, or one that reports `always_noconv`) units go
//! to the handle as their raw little-endian bytes, batched through an output
//! window the size of the handle's buffer. With a facility bound every unit
//! is decoded or encoded one at a time, carrying the [`ConvState`] across
//! calls, and the engine is responsible for writing the homing sequence before
//! anything that moves the file position.
//!
//! Pushback that the handle cannot absorb is kept in a one-unit putback cell
//! (an explicit `GetArea` state). Bytes the facility already produced but the
//! handle did not accept are kept in a stash and written first by the next
//! put-side operation, so retrying `sync`, a seek or `close` never converts
//! or writes anything twice.

mod window;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::codecvt::{Codecvt, ConvResult, ConvState};
use crate::config::{IoConfig, io_config};
use crate::error::{CloseError, OpenError};
use crate::ios::{OpenMode, SeekDir};
use crate::locale::Locale;
use crate::metrics::{EngineMetrics, global_metrics};
use crate::stdio::buffer::BufMode;
use crate::stdio::file::RawFile;
use crate::unit::CharUnit;

use window::{GetArea, PutWindow};

/// Size of the scratch buffer for one encode or unshift call.
pub const CODECVT_TEMP_BUF: usize = 32;

/// Cap on the bytes the decode loop accumulates for one unit, whatever the
/// facility reports as its `max_length`.
pub const MAX_DECODE_BYTES: usize = 64;

/// A stream position: file offset plus the conversion state valid there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamPos {
    pub offset: u64,
    pub state: ConvState,
}

impl StreamPos {
    #[must_use]
    pub const fn new(offset: u64, state: ConvState) -> Self {
        Self { offset, state }
    }
}

impl From<u64> for StreamPos {
    fn from(offset: u64) -> Self {
        Self::new(offset, ConvState::initial())
    }
}

impl fmt::Display for StreamPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.state.is_initial() {
            write!(f, "{}", self.offset)
        } else {
            write!(f, "{} (shift {:#x})", self.offset, self.state.shift())
        }
    }
}

/// Buffered, locale-aware engine over a raw file handle.
///
/// `C` is the stream's unit type. The engine is not `Clone`; move it, or use
/// [`FileBuf::swap`] / [`FileBuf::take`].
#[derive(Debug)]
pub struct FileBuf<C: CharUnit = u8> {
    file: Option<RawFile>,
    /// The handle was opened here and is closed on drop.
    closef: bool,
    locale: Locale,
    cvt: Option<Arc<dyn Codecvt<C>>>,
    state: ConvState,
    /// Converted output was written; a homing sequence may be owed.
    wrotesome: bool,
    /// Facility output the handle has not accepted yet.
    stash: Vec<u8>,
    get: GetArea<C>,
    put: PutWindow<C>,
    /// Bytes read from the handle that have not decoded to a unit yet.
    partial: Vec<u8>,
    /// Last unit handed out, for `sungetc`.
    last: Option<C>,
    config: IoConfig,
}

impl<C: CharUnit> Default for FileBuf<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: CharUnit> FileBuf<C> {
    /// A closed engine imbued with the current global locale.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(io_config())
    }

    /// A closed engine with explicit tunables.
    #[must_use]
    pub fn with_config(config: IoConfig) -> Self {
        Self {
            file: None,
            closef: false,
            locale: Locale::default(),
            cvt: None,
            state: ConvState::initial(),
            wrotesome: false,
            stash: Vec::new(),
            get: GetArea::default(),
            put: PutWindow::default(),
            partial: Vec::new(),
            last: None,
            config,
        }
    }

    /// Attach to a handle opened elsewhere. The engine never closes it on
    /// drop; an explicit [`FileBuf::close`] still does.
    #[must_use]
    pub fn from_raw(file: RawFile) -> Self {
        let mut buf = Self::new();
        buf.attach(file, false);
        buf
    }

    fn attach(&mut self, file: RawFile, closef: bool) {
        self.file = Some(file);
        self.closef = closef;
        self.wrotesome = false;
        self.stash.clear();
        self.state = ConvState::initial();
        self.bind_codecvt();
    }

    fn detach(&mut self) {
        self.file = None;
        self.closef = false;
        self.wrotesome = false;
        self.stash.clear();
        self.state = ConvState::initial();
        self.cvt = None;
        self.reset_windows();
    }

    /// Capture the facility of the current locale (`None` if it never
    /// converts) and lay out the windows for the resulting mode.
    fn bind_codecvt(&mut self) {
        let cvt = self.locale.codecvt::<C>();
        self.cvt = if cvt.always_noconv() {
            None
        } else {
            log::debug!("binding {} facility", cvt.encoding_name());
            Some(cvt)
        };
        self.reset_windows();
    }

    fn reset_windows(&mut self) {
        self.get = GetArea::default();
        self.partial.clear();
        self.last = None;
        let capacity = match (&self.file, &self.cvt) {
            (Some(file), None) => file.buffer_capacity() / C::WIDTH,
            _ => 0,
        };
        self.put = PutWindow::with_capacity(capacity);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// True while attached to an open handle.
    pub fn is_open(&self) -> bool {
        self.file.as_ref().is_some_and(RawFile::is_open)
    }

    /// The attached handle, if any.
    pub fn file(&self) -> Option<&RawFile> {
        self.file.as_ref()
    }

    pub fn getloc(&self) -> &Locale {
        &self.locale
    }

    /// True when units pass through a facility.
    pub fn is_converting(&self) -> bool {
        self.cvt.is_some()
    }

    /// Current conversion state.
    pub fn state(&self) -> ConvState {
        self.state
    }

    /// A homing sequence may still be owed.
    pub fn needs_homing(&self) -> bool {
        self.wrotesome
    }

    /// Units that can be read without touching the handle.
    pub fn in_avail(&self) -> usize {
        self.get.available()
    }

    /// Bytes produced by the facility and not yet accepted by the handle.
    pub fn stashed(&self) -> usize {
        self.stash.len()
    }

    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Open / close
    // -----------------------------------------------------------------------

    /// Open `path` with the configured default permissions.
    pub fn open(&mut self, path: impl AsRef<Path>, mode: OpenMode) -> Result<(), OpenError> {
        let prot = self.config.default_prot;
        self.open_with_prot(path, mode, prot)
    }

    /// Open `path`, creating it with permissions `prot` if needed.
    pub fn open_with_prot(
        &mut self,
        path: impl AsRef<Path>,
        mode: OpenMode,
        prot: u32,
    ) -> Result<(), OpenError> {
        if self.file.is_some() {
            return Err(OpenError::AlreadyOpen);
        }
        let file = RawFile::open_mode(path, mode, prot)?;
        self.attach(file, true);
        Ok(())
    }

    /// Open a file named by UTF-16 code units. A NUL ends the name.
    pub fn open_wide(&mut self, name: &[u16], mode: OpenMode) -> Result<(), OpenError> {
        let end = name.iter().position(|&u| u == 0).unwrap_or(name.len());
        let path = String::from_utf16(&name[..end]).map_err(|_| OpenError::InvalidPath)?;
        if path.is_empty() {
            return Err(OpenError::InvalidPath);
        }
        self.open(path, mode)
    }

    /// Home the conversion state, close the handle and return to the closed
    /// state. The engine is closed afterwards whether or not this succeeds.
    pub fn close(&mut self) -> Result<(), CloseError> {
        let Some(file) = self.file.clone() else {
            self.detach();
            return Err(CloseError::NotOpen);
        };
        self.get.reset_back();
        let homed = self.endwrite();
        let closed = file.close();
        self.detach();

        if !homed {
            log::warn!("close: homing sequence could not be written");
            return Err(CloseError::Homing);
        }
        closed.map_err(|e| {
            log::warn!("close failed: {e}");
            CloseError::Io(e)
        })
    }

    // -----------------------------------------------------------------------
    // Output side
    // -----------------------------------------------------------------------

    /// Hand stashed bytes to the handle. Unaccepted bytes stay stashed.
    fn flush_stash(&mut self) -> bool {
        if self.stash.is_empty() {
            return true;
        }
        let Some(file) = self.file.as_ref() else {
            return false;
        };
        let n = file.write_block(&self.stash);
        self.stash.drain(..n);
        if self.stash.is_empty() {
            true
        } else {
            EngineMetrics::inc(&global_metrics().short_transfers);
            log::warn!("short write: {} byte(s) still pending", self.stash.len());
            false
        }
    }

    /// Move the output window and the stash into the handle.
    fn drain_put(&mut self) -> bool {
        let pending = self.put.pending();
        if !pending.is_empty() {
            match C::as_bytes(pending) {
                Some(bytes) => self.stash.extend_from_slice(bytes),
                None => {
                    let mut raw = [0u8; 4];
                    for &unit in pending {
                        unit.write_le(&mut raw);
                        self.stash.extend_from_slice(&raw[..C::WIDTH]);
                    }
                }
            }
            self.put.clear();
        }
        self.flush_stash()
    }

    /// Put one unit (`Some`) or drain pending output (`None`).
    pub fn overflow(&mut self, unit: Option<C>) -> bool {
        let Some(unit) = unit else {
            return self.drain_put();
        };
        self.last = None;
        if self.put.push(unit) {
            return true;
        }
        if self.file.is_none() {
            return false;
        }
        self.get.reset_back();
        if !self.drain_put() {
            return false;
        }

        let Some(cvt) = self.cvt.clone() else {
            if self.put.push(unit) {
                return true;
            }
            return self.put_raw(unit);
        };

        let mut tmp = [0u8; CODECVT_TEMP_BUF];
        let before = self.state;
        EngineMetrics::inc(&global_metrics().encode_calls);
        let conv = cvt.encode(&mut self.state, std::slice::from_ref(&unit), &mut tmp);
        match conv.result {
            ConvResult::Ok | ConvResult::Partial => {
                let bytes = &tmp[..conv.produced];
                if !bytes.is_empty() && !self.put_bytes(bytes) {
                    // Nothing reached the handle; the unit was not taken.
                    self.state = before;
                    return false;
                }
                self.wrotesome = true;
                conv.consumed == 1
            }
            ConvResult::NoConv => self.put_raw(unit),
            ConvResult::Error => {
                EngineMetrics::inc(&global_metrics().conversion_failures);
                log::debug!("{} cannot encode {:?}", cvt.encoding_name(), unit);
                false
            }
        }
    }

    /// Write one unit as its raw little-endian bytes.
    fn put_raw(&mut self, unit: C) -> bool {
        let mut raw = [0u8; 4];
        unit.write_le(&mut raw);
        EngineMetrics::inc(&global_metrics().raw_writes);
        self.put_bytes(&raw[..C::WIDTH])
    }

    /// Hand the bytes of one unit to the handle. Once any of them is
    /// accepted the unit is committed and the rest is stashed for the next
    /// drain; `false` means none was written.
    fn put_bytes(&mut self, bytes: &[u8]) -> bool {
        let Some(file) = self.file.as_ref() else {
            return false;
        };
        let n = file.write_block(bytes);
        if n == 0 {
            return false;
        }
        if n < bytes.len() {
            self.stash.extend_from_slice(&bytes[n..]);
            EngineMetrics::inc(&global_metrics().short_transfers);
            log::warn!("short write: {} of {} bytes, rest pending", n, bytes.len());
        }
        true
    }

    /// Return the conversion state to its initial shift state, writing the
    /// homing sequence if one is owed. Also drains pending output.
    fn endwrite(&mut self) -> bool {
        if !self.drain_put() {
            return false;
        }
        let Some(cvt) = &self.cvt else {
            return true;
        };
        if !self.wrotesome {
            return true;
        }
        let Some(file) = self.file.as_ref() else {
            return true;
        };

        let mut tmp = [0u8; CODECVT_TEMP_BUF];
        let conv = cvt.unshift(&mut self.state, &mut tmp);
        match conv.result {
            ConvResult::Ok | ConvResult::Partial => {
                if conv.result == ConvResult::Ok {
                    self.wrotesome = false;
                }
                let bytes = &tmp[..conv.produced];
                if !bytes.is_empty() {
                    EngineMetrics::inc(&global_metrics().homing_sequences);
                    let n = file.write_block(bytes);
                    if n < bytes.len() {
                        self.stash.extend_from_slice(&bytes[n..]);
                        EngineMetrics::inc(&global_metrics().short_transfers);
                        log::warn!("short write of homing sequence");
                        return false;
                    }
                }
                !self.wrotesome
            }
            ConvResult::NoConv => {
                self.wrotesome = false;
                true
            }
            ConvResult::Error => {
                EngineMetrics::inc(&global_metrics().conversion_failures);
                log::warn!("{} failed to unshift", cvt.encoding_name());
                false
            }
        }
    }

    /// Put up to `units.len()` units; returns how many were accepted.
    pub fn xsputn(&mut self, units: &[C]) -> usize {
        if units.is_empty() {
            return 0;
        }
        self.last = None;
        if self.cvt.is_none() {
            if let Some(bytes) = C::as_bytes(units) {
                return self.bulk_write(units, bytes);
            }
        }
        let mut done = 0;
        for &unit in units {
            if !self.overflow(Some(unit)) {
                break;
            }
            done += 1;
        }
        if done < units.len() {
            EngineMetrics::inc(&global_metrics().short_transfers);
        }
        done
    }

    /// Identity fast path for single-byte units.
    fn bulk_write(&mut self, units: &[C], bytes: &[u8]) -> usize {
        let mut done = self.put.fill(units);
        if done == units.len() || self.file.is_none() {
            return done;
        }
        self.get.reset_back();
        if !self.drain_put() {
            return done;
        }
        let Some(file) = self.file.as_ref() else {
            return done;
        };
        let chunk = self.config.bulk_chunk.max(1);
        for block in bytes[done..].chunks(chunk) {
            let n = file.write_block(block);
            done += n;
            if n < block.len() {
                EngineMetrics::inc(&global_metrics().short_transfers);
                log::warn!("bulk write stopped after {done} of {} bytes", bytes.len());
                break;
            }
        }
        done
    }

    // -----------------------------------------------------------------------
    // Input side
    // -----------------------------------------------------------------------

    /// Get the next unit and advance past it.
    pub fn uflow(&mut self) -> Option<C> {
        let unit = self.fetch();
        self.last = unit;
        unit
    }

    fn fetch(&mut self) -> Option<C> {
        if let Some(unit) = self.get.take() {
            return Some(unit);
        }
        self.file.as_ref()?;
        self.get.reset_back();
        if !self.drain_put() {
            return None;
        }
        let file = self.file.as_ref()?;

        let Some(cvt) = &self.cvt else {
            EngineMetrics::inc(&global_metrics().raw_reads);
            return file.read_unit::<C>();
        };

        let limit = cvt.max_length().clamp(1, MAX_DECODE_BYTES);
        let mut acc = [0u8; MAX_DECODE_BYTES];
        let mut len = self.partial.len().min(MAX_DECODE_BYTES);
        acc[..len].copy_from_slice(&self.partial[..len]);
        self.partial.clear();
        loop {
            let Some(byte) = file.read_byte() else {
                if len == 0 {
                    return None;
                }
                if file.is_eof() && !file.is_error() {
                    // Nothing more is coming: let the facility settle the tail.
                    let mut out = [C::default(); 1];
                    let conv = cvt.decode_final(&mut self.state, &acc[..len], &mut out);
                    let used = conv.consumed.min(len);
                    if matches!(conv.result, ConvResult::Ok | ConvResult::Partial)
                        && conv.produced > 0
                    {
                        self.partial.extend_from_slice(&acc[used..len]);
                        return Some(out[0]);
                    }
                }
                log::debug!("input stopped inside a {len}-byte sequence, kept for the next read");
                self.partial.extend_from_slice(&acc[..len]);
                return None;
            };
            acc[len] = byte;
            len += 1;

            let mut out = [C::default(); 1];
            EngineMetrics::inc(&global_metrics().decode_calls);
            let conv = cvt.decode(&mut self.state, &acc[..len], &mut out);
            let used = conv.consumed.min(len);
            match conv.result {
                ConvResult::Ok | ConvResult::Partial if conv.produced > 0 => {
                    // Give back what the facility did not need.
                    for &excess in acc[used..len].iter().rev() {
                        if !file.unget_byte(excess) {
                            log::debug!("lost look-ahead byte {excess:#04x}");
                        }
                    }
                    return Some(out[0]);
                }
                ConvResult::Ok | ConvResult::Partial => {
                    acc.copy_within(used..len, 0);
                    len -= used;
                    if len >= limit {
                        EngineMetrics::inc(&global_metrics().conversion_failures);
                        log::debug!("no unit after {len} bytes, giving up");
                        return None;
                    }
                }
                ConvResult::NoConv => return Some(C::from_byte(acc[0])),
                ConvResult::Error => {
                    EngineMetrics::inc(&global_metrics().conversion_failures);
                    log::debug!("{} rejected input", cvt.encoding_name());
                    return None;
                }
            }
        }
    }

    /// Get the next unit without advancing past it.
    pub fn underflow(&mut self) -> Option<C> {
        if let Some(unit) = self.get.peek() {
            return Some(unit);
        }
        let unit = self.uflow()?;
        self.pbackfail(Some(unit));
        Some(unit)
    }

    /// Push a unit back (`Some`), or step back over the last unit read
    /// (`None`, only possible inside the input window).
    pub fn pbackfail(&mut self, unit: Option<C>) -> bool {
        self.last = None;
        if self.get.back_up(unit) {
            return true;
        }
        let (Some(unit), Some(file)) = (unit, self.file.as_ref()) else {
            return false;
        };
        if self.cvt.is_none() && file.unget_unit(unit) {
            EngineMetrics::inc(&global_metrics().handle_ungets);
            return true;
        }
        if self.get.cell_unconsumed() {
            log::debug!("putback cell already occupied");
            return false;
        }
        self.get.set_back(unit);
        EngineMetrics::inc(&global_metrics().putback_cells);
        true
    }

    /// Step back over the last unit read, pushing it back if the input
    /// window cannot simply rewind.
    pub fn sungetc(&mut self) -> bool {
        if self.get.back_up(None) {
            self.last = None;
            return true;
        }
        match self.last.take() {
            Some(unit) => self.pbackfail(Some(unit)),
            None => false,
        }
    }

    /// Get up to `out.len()` units; returns how many were read.
    pub fn xsgetn(&mut self, out: &mut [C]) -> usize {
        let done = self.getn(out);
        self.last = done.checked_sub(1).map(|i| out[i]);
        done
    }

    fn getn(&mut self, out: &mut [C]) -> usize {
        let mut done = 0;
        while done < out.len() {
            match self.get.take() {
                Some(unit) => {
                    out[done] = unit;
                    done += 1;
                }
                None => break,
            }
        }
        if done == out.len() {
            return done;
        }
        if self.cvt.is_none() {
            if let Some(bytes) = C::as_bytes_mut(&mut out[done..]) {
                return done + self.bulk_read(bytes);
            }
        }
        for slot in &mut out[done..] {
            match self.uflow() {
                Some(unit) => *slot = unit,
                None => break,
            }
            done += 1;
        }
        if done < out.len() {
            EngineMetrics::inc(&global_metrics().short_transfers);
        }
        done
    }

    /// Identity fast path for single-byte units.
    fn bulk_read(&mut self, out: &mut [u8]) -> usize {
        if self.file.is_none() {
            return 0;
        }
        self.get.reset_back();
        if !self.drain_put() {
            return 0;
        }
        let Some(file) = self.file.as_ref() else {
            return 0;
        };
        let chunk = self.config.bulk_chunk.max(1);
        let mut done = 0;
        while out.len() - done > chunk {
            let n = file.read_block(&mut out[done..done + chunk]);
            done += n;
            if n != chunk {
                EngineMetrics::inc(&global_metrics().short_transfers);
                return done;
            }
        }
        if done < out.len() {
            done += file.read_block(&mut out[done..]);
        }
        if done < out.len() {
            EngineMetrics::inc(&global_metrics().short_transfers);
        }
        done
    }

    // -----------------------------------------------------------------------
    // Positioning
    // -----------------------------------------------------------------------

    /// Move by `off` relative to `dir`. Homes the conversion state first.
    pub fn seekoff(&mut self, off: i64, dir: SeekDir) -> Option<StreamPos> {
        let mut off = off;
        if self.get.cell_unconsumed() && dir == SeekDir::Current && self.cvt.is_none() {
            // The handle is one unit past the pushed-back unit.
            off = off.checked_sub(C::WIDTH as i64)?;
        }
        if dir == SeekDir::Current {
            // The handle is past bytes that have not decoded yet.
            off = off.checked_sub(i64::try_from(self.partial.len()).ok()?)?;
        }
        if self.file.is_none() || !self.endwrite() {
            return None;
        }
        let file = self.file.as_ref()?;
        if (off != 0 || dir != SeekDir::Current) && file.seek(off, dir).is_none() {
            log::debug!("seek by {off} from {dir:?} failed");
            return None;
        }
        let offset = file.tell()?;
        self.get.reset_back();
        self.partial.clear();
        self.last = None;
        EngineMetrics::inc(&global_metrics().seeks);
        Some(StreamPos::new(offset, self.state))
    }

    /// Return to a position captured earlier, restoring its conversion state.
    pub fn seekpos(&mut self, pos: StreamPos) -> Option<StreamPos> {
        if self.file.is_none() || !self.endwrite() {
            return None;
        }
        let file = self.file.as_ref()?;
        if !file.seek_to(pos.offset) {
            log::debug!("seek to {pos} failed");
            return None;
        }
        self.state = pos.state;
        self.get.reset_back();
        self.partial.clear();
        self.last = None;
        EngineMetrics::inc(&global_metrics().seeks);
        Some(StreamPos::new(pos.offset, self.state))
    }

    // -----------------------------------------------------------------------
    // Buffering, sync, locale
    // -----------------------------------------------------------------------

    /// Offer a buffer to the handle. No storage and `count == 0` makes the
    /// handle unbuffered; anything else fully buffered with room for `count`
    /// units (or the storage's own length when `count` is 0).
    pub fn setbuf(&mut self, storage: Option<Vec<u8>>, count: usize) -> bool {
        if self.file.is_none() || !self.drain_put() {
            return false;
        }
        let Some(file) = self.file.as_ref() else {
            return false;
        };
        let Some(size) = count.checked_mul(C::WIDTH) else {
            return false;
        };
        let ok = match storage {
            None if count == 0 => file.set_buffering(BufMode::None, 0),
            None => file.set_buffering(BufMode::Full, size),
            Some(mut bytes) => {
                if count > 0 {
                    bytes.resize(size, 0);
                }
                file.set_buffer(BufMode::Full, bytes)
            }
        };
        if ok {
            self.reset_windows();
        } else {
            log::debug!("setbuf refused: handle already in use");
        }
        ok
    }

    /// Write pending output and the homing sequence, then flush the handle.
    pub fn sync(&mut self) -> bool {
        if self.file.is_none() {
            return true;
        }
        if !self.endwrite() {
            return false;
        }
        self.file.as_ref().is_some_and(RawFile::flush)
    }

    /// Switch to `locale`'s facility. Pending output is drained first, in the
    /// old mode.
    pub fn imbue(&mut self, locale: Locale) {
        if !self.drain_put() {
            log::warn!("imbue: pending output could not be drained");
        }
        self.locale = locale;
        if self.file.is_some() {
            self.bind_codecvt();
        }
    }

    // -----------------------------------------------------------------------
    // Moves and locking
    // -----------------------------------------------------------------------

    /// Exchange everything with `other`.
    pub fn swap(&mut self, other: &mut FileBuf<C>) {
        std::mem::swap(self, other);
    }

    /// Move the engine out, leaving a closed one behind.
    #[must_use]
    pub fn take(&mut self) -> FileBuf<C> {
        std::mem::take(self)
    }

    /// Run `f` while holding the handle's lock, so a composite sequence is
    /// not interleaved with other users of a shared handle.
    pub fn locked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let file = self.file.clone();
        let _guard = file.as_ref().map(RawFile::lock);
        f(self)
    }
}

impl<C: CharUnit> Drop for FileBuf<C> {
    fn drop(&mut self) {
        if self.file.is_none() {
            return;
        }
        self.get.reset_back();
        if self.closef {
            if let Err(e) = self.close() {
                log::warn!("close on drop failed: {e}");
            }
        } else if !self.drain_put() {
            log::warn!("pending output lost when the engine was dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecvt::Conversion;
    use crate::stdio::file::OpenFlags;
    use std::io::Cursor;

    /// u16 units stored as one Latin-1 byte; anything above 0xFF is unmappable.
    #[derive(Debug)]
    struct Latin1;

    impl Codecvt<u16> for Latin1 {
        fn decode(&self, _s: &mut ConvState, from: &[u8], to: &mut [u16]) -> Conversion {
            match (from.first(), to.first_mut()) {
                (Some(&b), Some(slot)) => {
                    *slot = u16::from(b);
                    Conversion::ok(1, 1)
                }
                _ => Conversion::partial(0, 0),
            }
        }

        fn encode(&self, _s: &mut ConvState, from: &[u16], to: &mut [u8]) -> Conversion {
            match from.first() {
                Some(&u) if u > 0xFF => Conversion::error(0, 0),
                Some(&u) => {
                    to[0] = u as u8;
                    Conversion::ok(1, 1)
                }
                None => Conversion::ok(0, 0),
            }
        }

        fn unshift(&self, _s: &mut ConvState, _to: &mut [u8]) -> Conversion {
            Conversion::noconv()
        }
    }

    /// Narrow codec that enters a shift state on any write and homes with '$'.
    #[derive(Debug)]
    struct Dollar;

    impl Codecvt<u8> for Dollar {
        fn decode(&self, _s: &mut ConvState, from: &[u8], to: &mut [u8]) -> Conversion {
            to[0] = from[0];
            Conversion::ok(1, 1)
        }

        fn encode(&self, s: &mut ConvState, from: &[u8], to: &mut [u8]) -> Conversion {
            s.set_shift(1);
            to[0] = from[0];
            Conversion::ok(1, 1)
        }

        fn unshift(&self, s: &mut ConvState, to: &mut [u8]) -> Conversion {
            if s.shift() == 0 {
                return Conversion::ok(0, 0);
            }
            s.set_shift(0);
            to[0] = b'$';
            Conversion::ok(0, 1)
        }
    }

    /// Never completes a unit; sequences are at most three bytes long.
    #[derive(Debug)]
    struct Stuck;

    impl Codecvt<u16> for Stuck {
        fn decode(&self, _s: &mut ConvState, _from: &[u8], _to: &mut [u16]) -> Conversion {
            Conversion::partial(0, 0)
        }

        fn encode(&self, _s: &mut ConvState, _from: &[u16], _to: &mut [u8]) -> Conversion {
            Conversion::error(0, 0)
        }

        fn unshift(&self, _s: &mut ConvState, _to: &mut [u8]) -> Conversion {
            Conversion::noconv()
        }

        fn max_length(&self) -> usize {
            3
        }
    }

    fn latin1() -> Locale {
        Locale::classic().with_codecvt::<u16>("latin1-test", Arc::new(Latin1))
    }

    fn dollar() -> Locale {
        Locale::classic().with_codecvt::<u8>("dollar-test", Arc::new(Dollar))
    }

    fn mem_buf<C: CharUnit>(data: &[u8]) -> FileBuf<C> {
        let mut buf = FileBuf::from_raw(RawFile::from_io(
            Cursor::new(data.to_vec()),
            OpenFlags::read_write(),
        ));
        buf.imbue(Locale::classic());
        buf
    }

    #[test]
    fn decode_gives_up_at_the_facility_sequence_length() {
        let mut buf = mem_buf::<u16>(&[0xAA; 10]);
        assert!(buf.setbuf(None, 0));
        buf.imbue(Locale::classic().with_codecvt::<u16>("stuck-test", Arc::new(Stuck)));
        assert_eq!(buf.uflow(), None);
        assert_eq!(buf.file().and_then(RawFile::tell), Some(3));
    }

    #[test]
    fn oversized_unit_count_is_refused() {
        let mut buf = mem_buf::<u32>(b"");
        assert!(!buf.setbuf(None, usize::MAX / 2));
        assert!(buf.setbuf(None, 16));
    }

    #[test]
    fn closed_engine_fails_everything() {
        let mut buf = FileBuf::<u8>::new();
        assert!(!buf.is_open());
        assert_eq!(buf.uflow(), None);
        assert_eq!(buf.underflow(), None);
        assert!(!buf.overflow(Some(b'a')));
        assert!(buf.overflow(None));
        assert!(!buf.pbackfail(Some(b'a')));
        assert_eq!(buf.seekoff(0, SeekDir::Current), None);
        assert!(buf.sync());
        assert!(!buf.setbuf(None, 0));
        assert!(matches!(buf.close(), Err(CloseError::NotOpen)));
    }

    #[test]
    fn identity_read_with_pushback() {
        let mut buf = mem_buf::<u8>(b"xyz");
        assert_eq!(buf.underflow(), Some(b'x'));
        assert_eq!(buf.uflow(), Some(b'x'));
        assert!(buf.pbackfail(Some(b'Q')));
        assert_eq!(buf.uflow(), Some(b'Q'));
        assert_eq!(buf.uflow(), Some(b'y'));
        assert_eq!(buf.uflow(), Some(b'z'));
        assert_eq!(buf.uflow(), None);
    }

    #[test]
    fn unbuffered_wide_pushback_uses_cell() {
        let mut buf = mem_buf::<u16>(&[0x41, 0, 0x42, 0]);
        assert!(buf.setbuf(None, 0));
        assert_eq!(buf.uflow(), Some(0x41));
        assert!(buf.pbackfail(Some(0x41)));
        assert_eq!(buf.in_avail(), 1);
        // A second pushback while the cell is unread has nowhere to go.
        assert!(!buf.pbackfail(Some(0x40)));
        assert_eq!(buf.seekoff(0, SeekDir::Current).map(|p| p.offset), Some(0));
        assert_eq!(buf.uflow(), Some(0x41));
        assert_eq!(buf.uflow(), Some(0x42));
    }

    #[test]
    fn sungetc_replays_last_unit() {
        let mut buf = mem_buf::<u16>(&[0x41, 0, 0x42, 0]);
        assert!(!buf.sungetc());
        assert_eq!(buf.uflow(), Some(0x41));
        assert!(buf.sungetc());
        assert!(!buf.sungetc());
        assert_eq!(buf.uflow(), Some(0x41));
        let mut out = [0u16; 1];
        assert_eq!(buf.xsgetn(&mut out), 1);
        assert!(buf.sungetc());
        assert_eq!(buf.uflow(), Some(0x42));
    }

    #[test]
    fn cell_backs_up_after_consumption() {
        let mut buf = mem_buf::<u16>(&[0x41, 0]);
        assert!(buf.setbuf(None, 0));
        assert_eq!(buf.uflow(), Some(0x41));
        assert!(buf.pbackfail(Some(0x5A)));
        assert_eq!(buf.uflow(), Some(0x5A));
        assert!(buf.pbackfail(None));
        assert_eq!(buf.uflow(), Some(0x5A));
        assert_eq!(buf.uflow(), None);
    }

    #[test]
    fn identity_write_through_window() {
        let mut buf = mem_buf::<u8>(b"");
        assert_eq!(buf.xsputn(b"hello"), 5);
        assert!(buf.overflow(Some(b'!')));
        assert_eq!(buf.seekoff(0, SeekDir::Current).map(|p| p.offset), Some(6));
        assert_eq!(buf.seekpos(StreamPos::from(0)).map(|p| p.offset), Some(0));
        let mut out = [0u8; 16];
        assert_eq!(buf.xsgetn(&mut out), 6);
        assert_eq!(&out[..6], b"hello!");
    }

    #[test]
    fn wide_identity_units_are_little_endian() {
        let mut buf = mem_buf::<u32>(b"");
        assert_eq!(buf.xsputn(&[0x0102_0304, 0x0A0B_0C0D]), 2);
        assert_eq!(buf.seekoff(0, SeekDir::Begin).map(|p| p.offset), Some(0));
        assert_eq!(buf.uflow(), Some(0x0102_0304));
        assert_eq!(buf.seekoff(-4, SeekDir::End).map(|p| p.offset), Some(4));
        let mut out = [0u32; 4];
        assert_eq!(buf.xsgetn(&mut out), 1);
        assert_eq!(out[0], 0x0A0B_0C0D);
    }

    #[test]
    fn converting_engine_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.txt");
        let mut buf = FileBuf::<u16>::new();
        buf.imbue(latin1());
        buf.open(&path, OpenMode::OUT).unwrap();
        assert!(buf.is_converting());
        assert_eq!(buf.xsputn(&[0x48, 0xE9, 0x21]), 3);
        assert!(!buf.overflow(Some(0x263A)));
        buf.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x48, 0xE9, 0x21]);

        let mut buf = FileBuf::<u16>::new();
        buf.imbue(latin1());
        buf.open(&path, OpenMode::IN).unwrap();
        let mut out = [0u16; 8];
        assert_eq!(buf.xsgetn(&mut out), 3);
        assert_eq!(&out[..3], &[0x48, 0xE9, 0x21]);
    }

    #[test]
    fn converting_pushback_uses_cell() {
        let mut buf = mem_buf::<u16>(b"ab");
        buf.imbue(latin1());
        assert_eq!(buf.underflow(), Some(0x61));
        assert_eq!(buf.in_avail(), 1);
        assert_eq!(buf.uflow(), Some(0x61));
        assert_eq!(buf.uflow(), Some(0x62));
        assert_eq!(buf.uflow(), None);
    }

    #[test]
    fn homing_written_once_before_seek_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dollar.txt");
        let mut buf = FileBuf::<u8>::new();
        buf.imbue(dollar());
        buf.open(&path, OpenMode::OUT).unwrap();
        assert_eq!(buf.xsputn(b"ab"), 2);
        assert!(buf.needs_homing());
        assert!(buf.sync());
        assert!(!buf.needs_homing());
        assert!(buf.sync());
        assert!(buf.overflow(Some(b'c')));
        // The seek homes first, so the position already counts the second '$'.
        assert_eq!(buf.seekoff(0, SeekDir::Current).map(|p| p.offset), Some(5));
        assert!(!buf.needs_homing());
        buf.close().unwrap();
        assert!(matches!(buf.close(), Err(CloseError::NotOpen)));
        assert_eq!(std::fs::read(&path).unwrap(), b"ab$c$");
    }

    #[test]
    fn seekpos_restores_state() {
        let mut buf = mem_buf::<u8>(b"0123");
        let mut pos = buf.seekoff(1, SeekDir::Begin).unwrap();
        pos.state.set_shift(7);
        let back = buf.seekpos(pos).unwrap();
        assert_eq!(back.offset, 1);
        assert_eq!(buf.state().shift(), 7);
        assert_eq!(buf.uflow(), Some(b'1'));
    }

    #[test]
    fn open_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twice.txt");
        let mut buf = FileBuf::<u8>::new();
        buf.open(&path, OpenMode::OUT).unwrap();
        assert!(matches!(
            buf.open(&path, OpenMode::OUT),
            Err(OpenError::AlreadyOpen)
        ));
        assert!(buf.is_open());
    }

    #[test]
    fn open_wide_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.txt");
        let mut name: Vec<u16> = path.to_str().unwrap().encode_utf16().collect();
        name.push(0);
        let mut buf = FileBuf::<u8>::new();
        buf.open_wide(&name, OpenMode::OUT).unwrap();
        assert!(buf.is_open());
        let mut bad = FileBuf::<u8>::new();
        assert!(matches!(
            bad.open_wide(&[0xD800], OpenMode::OUT),
            Err(OpenError::InvalidPath)
        ));
    }

    #[test]
    fn drop_of_borrowed_engine_flushes_but_keeps_handle_open() {
        let file = RawFile::from_io(Cursor::new(Vec::new()), OpenFlags::read_write());
        {
            let mut buf = FileBuf::<u8>::from_raw(file.clone());
            buf.imbue(Locale::classic());
            assert_eq!(buf.xsputn(b"kept"), 4);
        }
        assert!(file.is_open());
        assert_eq!(file.tell(), Some(4));
    }

    #[test]
    fn swap_and_take_move_everything() {
        let mut a = mem_buf::<u8>(b"a");
        let mut b = FileBuf::<u8>::new();
        a.swap(&mut b);
        assert!(!a.is_open());
        assert!(b.is_open());
        let c = b.take();
        assert!(!b.is_open());
        let mut c = c;
        assert_eq!(c.uflow(), Some(b'a'));
    }

    #[test]
    fn locked_runs_under_handle_lock() {
        let mut buf = mem_buf::<u8>(b"pq");
        let pair = buf.locked(|b| (b.uflow(), b.uflow()));
        assert_eq!(pair, (Some(b'p'), Some(b'q')));
    }

    #[test]
    fn stream_pos_display() {
        let mut pos = StreamPos::from(12);
        assert_eq!(pos.to_string(), "12");
        pos.state.set_shift(1);
        assert_eq!(pos.to_string(), "12 (shift 0x1)");
    }
}
