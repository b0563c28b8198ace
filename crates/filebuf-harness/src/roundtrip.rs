//! Write-then-read round trips through the engine.

use filebuf_core::stdio::OpenFlags;
use filebuf_core::{FileBuf, RawFile, SeekDir};
use serde::Serialize;

use crate::codecs::{ShiftCodec, codec_unit, locale_for};
use crate::error::HarnessError;
use crate::fixtures::{FixtureUnit, UnitKind};
use crate::memfile::MemFile;

/// Outcome of one round trip.
#[derive(Debug, Clone, Serialize)]
pub struct RoundTrip {
    pub codec: String,
    pub unit: UnitKind,
    /// Units generated and written.
    pub units: usize,
    /// Units `xsputn` accepted.
    pub written: usize,
    /// Bytes that reached the file.
    pub bytes: usize,
    /// Units read back.
    pub read: usize,
    /// Index of the first unit that came back different.
    pub first_mismatch: Option<usize>,
}

impl RoundTrip {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.written == self.units && self.read == self.units && self.first_mismatch.is_none()
    }
}

/// Small deterministic generator (xorshift64*).
#[derive(Debug, Clone)]
pub struct UnitRng(u64);

impl UnitRng {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        (x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32) as u32
    }
}

/// A unit value `codec` can carry unchanged through a write and a read.
fn representable(codec: &str, unit: UnitKind, raw: u32) -> u32 {
    match (codec, unit) {
        ("crlf", _) => match raw & 0xFF {
            0x0D => 0x0A,
            b => b,
        },
        ("utf8", _) => {
            let v = raw % 0x11_0000;
            if (0xD800..=0xDFFF).contains(&v) { v - 0x800 } else { v }
        }
        ("shift", _) => {
            let v = raw & 0xFFFF;
            if ShiftCodec::is_unmappable(v as u16) { (v & 0x7F) | 0x40 } else { v }
        }
        (_, UnitKind::U8) => raw & 0xFF,
        (_, UnitKind::U16) => raw & 0xFFFF,
        (_, UnitKind::U32) => raw,
    }
}

/// `count` units `codec` can round-trip, derived from `seed`.
pub fn sample_units<C: FixtureUnit>(
    codec: &str,
    count: usize,
    seed: u64,
) -> Result<Vec<C>, HarnessError> {
    let mut rng = UnitRng::new(seed);
    (0..count)
        .map(|_| {
            let value = representable(codec, C::KIND, rng.next_u32());
            crate::fixtures::unit_from_u32::<C>(value)
        })
        .collect()
}

/// Write `units` through an engine bound to `codec`, sync, rewind and read
/// them back.
pub fn round_trip<C: FixtureUnit>(codec: &str, units: &[C]) -> Result<RoundTrip, HarnessError> {
    let backing = MemFile::new();
    let file = RawFile::from_io(backing.clone(), OpenFlags::read_write());
    let mut buf = FileBuf::<C>::from_raw(file);
    buf.imbue(locale_for(codec, C::KIND)?);

    let written = buf.xsputn(units);
    if !buf.sync() {
        log::warn!("round trip: sync failed after {written} units");
    }
    let bytes = backing.len();
    if buf.seekoff(0, SeekDir::Begin).is_none() {
        log::warn!("round trip: rewind failed");
    }

    let mut back = vec![C::default(); units.len() + 1];
    let read = buf.xsgetn(&mut back);
    let first_mismatch = units
        .iter()
        .zip(&back[..read.min(units.len())])
        .position(|(a, b)| a != b);

    Ok(RoundTrip {
        codec: codec.to_string(),
        unit: C::KIND,
        units: units.len(),
        written,
        bytes,
        read,
        first_mismatch,
    })
}

/// Round trip `count` generated units for a codec by name. `identity` uses
/// `unit`; other codecs use their own unit type.
pub fn run(
    codec: &str,
    unit: UnitKind,
    count: usize,
    seed: u64,
) -> Result<RoundTrip, HarnessError> {
    let unit = codec_unit(codec).unwrap_or(unit);
    match unit {
        UnitKind::U8 => round_trip(codec, &sample_units::<u8>(codec, count, seed)?),
        UnitKind::U16 => round_trip(codec, &sample_units::<u16>(codec, count, seed)?),
        UnitKind::U32 => round_trip(codec, &sample_units::<u32>(codec, count, seed)?),
    }
}
