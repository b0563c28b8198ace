//! Conversion facility contract.
//!
//! A facility translates between a stream's logical units and the raw bytes
//! stored in the file, carrying shift/encoding state across calls in a
//! [`ConvState`]. The engine drives facilities one unit at a time; a facility
//! never sees the file handle.
//!
//! Only the identity facility ([`NoConv`]) lives here. Concrete encodings are
//! supplied by callers and bound through a [`crate::locale::Locale`].

mod noconv;

pub use noconv::NoConv;

use std::fmt::Debug;

use crate::unit::CharUnit;

/// Outcome of a single facility call (mirrors `codecvt_base::result`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvResult {
    /// Everything that could be converted was converted.
    Ok,
    /// Input ended inside a sequence, or the output ran out of room.
    Partial,
    /// The facility performs no conversion; use the raw data as is.
    NoConv,
    /// Invalid input for this encoding.
    Error,
}

/// Result of a facility call plus how far it advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub result: ConvResult,
    /// Input elements consumed.
    pub consumed: usize,
    /// Output elements produced.
    pub produced: usize,
}

impl Conversion {
    #[must_use]
    pub const fn new(result: ConvResult, consumed: usize, produced: usize) -> Self {
        Self {
            result,
            consumed,
            produced,
        }
    }

    #[must_use]
    pub const fn ok(consumed: usize, produced: usize) -> Self {
        Self::new(ConvResult::Ok, consumed, produced)
    }

    #[must_use]
    pub const fn partial(consumed: usize, produced: usize) -> Self {
        Self::new(ConvResult::Partial, consumed, produced)
    }

    #[must_use]
    pub const fn noconv() -> Self {
        Self::new(ConvResult::NoConv, 0, 0)
    }

    #[must_use]
    pub const fn error(consumed: usize, produced: usize) -> Self {
        Self::new(ConvResult::Error, consumed, produced)
    }

    /// `Ok` or `Partial`: the call made whatever progress it reports.
    #[must_use]
    pub const fn progressed(&self) -> bool {
        matches!(self.result, ConvResult::Ok | ConvResult::Partial)
    }
}

/// Opaque conversion state, the moral equivalent of `mbstate_t`.
///
/// The engine only copies, stores and restores it; its meaning belongs to the
/// facility. Two words are available: a shift word for the current encoding
/// mode and a small buffer for bytes of an incomplete sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ConvState {
    shift: u32,
    pending: u32,
    pending_len: u8,
}

impl ConvState {
    /// The initial (homed) state.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            shift: 0,
            pending: 0,
            pending_len: 0,
        }
    }

    #[must_use]
    pub const fn is_initial(&self) -> bool {
        self.shift == 0 && self.pending_len == 0
    }

    #[must_use]
    pub const fn shift(&self) -> u32 {
        self.shift
    }

    pub fn set_shift(&mut self, shift: u32) {
        self.shift = shift;
    }

    /// Bytes of an incomplete sequence held by the facility (at most 4).
    #[must_use]
    pub fn pending(&self) -> ([u8; 4], usize) {
        (self.pending.to_le_bytes(), usize::from(self.pending_len))
    }

    /// Store up to four bytes of an incomplete sequence. Extra bytes are dropped.
    pub fn set_pending(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(4);
        let mut raw = [0u8; 4];
        raw[..len].copy_from_slice(&bytes[..len]);
        self.pending = u32::from_le_bytes(raw);
        self.pending_len = len as u8;
    }

    pub fn clear_pending(&mut self) {
        self.pending = 0;
        self.pending_len = 0;
    }
}

/// A conversion facility between units `C` and raw file bytes.
///
/// Implementations must be shareable: a locale hands the same facility to
/// every stream bound to it, and each stream keeps its own [`ConvState`].
pub trait Codecvt<C: CharUnit>: Send + Sync + Debug {
    /// Decode raw bytes in `from` into units in `to`.
    fn decode(&self, state: &mut ConvState, from: &[u8], to: &mut [C]) -> Conversion;

    /// Encode units in `from` into raw bytes in `to`.
    fn encode(&self, state: &mut ConvState, from: &[C], to: &mut [u8]) -> Conversion;

    /// Decode the bytes left over once the input has ended. Facilities that
    /// hold a byte back waiting for a continuation settle it here.
    fn decode_final(&self, state: &mut ConvState, from: &[u8], to: &mut [C]) -> Conversion {
        self.decode(state, from, to)
    }

    /// Produce the bytes that return `state` to the initial shift state.
    /// `consumed` is always 0.
    fn unshift(&self, state: &mut ConvState, to: &mut [u8]) -> Conversion;

    /// True if this facility never converts anything; the engine then drops it
    /// and uses the identity fast paths.
    fn always_noconv(&self) -> bool {
        false
    }

    /// Longest raw byte sequence one unit can decode from.
    fn max_length(&self) -> usize {
        4
    }

    /// Human-readable encoding name for diagnostics.
    fn encoding_name(&self) -> &str {
        "unnamed"
    }
}
