//! Reference conversion facilities.
//!
//! These are small, fully specified encodings used to exercise the engine's
//! conversion paths from tests, fixtures and the CLI:
//!
//! | Name    | Unit  | File form                                            |
//! |---------|-------|------------------------------------------------------|
//! | `crlf`  | `u8`  | `'\n'` stored as `"\r\n"`, everything else verbatim    |
//! | `utf8`  | `u32` | Unicode scalar values as UTF-8                       |
//! | `shift` | `u16` | ASCII bytes, wide units as SO-prefixed byte pairs    |

use std::sync::Arc;

use filebuf_core::{Codecvt, ConvState, Conversion, Locale};

use crate::error::HarnessError;
use crate::fixtures::UnitKind;

// ---------------------------------------------------------------------------
// CRLF text mode
// ---------------------------------------------------------------------------

/// Text-mode line endings: `'\n'` is written as `"\r\n"` and read back as a
/// single `'\n'`. A `'\r'` not followed by `'\n'` is an ordinary byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crlf;

impl Codecvt<u8> for Crlf {
    fn decode(&self, _state: &mut ConvState, from: &[u8], to: &mut [u8]) -> Conversion {
        let Some(slot) = to.first_mut() else {
            return Conversion::partial(0, 0);
        };
        match from {
            [] | [b'\r'] => Conversion::partial(0, 0),
            [b'\r', b'\n', ..] => {
                *slot = b'\n';
                Conversion::ok(2, 1)
            }
            [b, ..] => {
                *slot = *b;
                Conversion::ok(1, 1)
            }
        }
    }

    fn decode_final(&self, state: &mut ConvState, from: &[u8], to: &mut [u8]) -> Conversion {
        match (from, to.first_mut()) {
            ([b'\r'], Some(slot)) => {
                *slot = b'\r';
                Conversion::ok(1, 1)
            }
            _ => self.decode(state, from, to),
        }
    }

    fn encode(&self, _state: &mut ConvState, from: &[u8], to: &mut [u8]) -> Conversion {
        match from.first() {
            None => Conversion::ok(0, 0),
            Some(b'\n') if to.len() < 2 => Conversion::partial(0, 0),
            Some(b'\n') => {
                to[..2].copy_from_slice(b"\r\n");
                Conversion::ok(1, 2)
            }
            Some(_) if to.is_empty() => Conversion::partial(0, 0),
            Some(&b) => {
                to[0] = b;
                Conversion::ok(1, 1)
            }
        }
    }

    fn unshift(&self, _state: &mut ConvState, _to: &mut [u8]) -> Conversion {
        Conversion::ok(0, 0)
    }

    fn max_length(&self) -> usize {
        2
    }

    fn encoding_name(&self) -> &str {
        "crlf"
    }
}

// ---------------------------------------------------------------------------
// UTF-8
// ---------------------------------------------------------------------------

/// Unicode scalar values stored as UTF-8. Surrogates and values above
/// `U+10FFFF` cannot be encoded; malformed input cannot be decoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8;

fn utf8_sequence_len(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

impl Codecvt<u32> for Utf8 {
    fn decode(&self, _state: &mut ConvState, from: &[u8], to: &mut [u32]) -> Conversion {
        let (Some(&lead), Some(slot)) = (from.first(), to.first_mut()) else {
            return Conversion::partial(0, 0);
        };
        let Some(need) = utf8_sequence_len(lead) else {
            return Conversion::error(0, 0);
        };
        if from.len() < need {
            // Reject bad continuation bytes early instead of waiting for more.
            if from[1..].iter().any(|b| b & 0xC0 != 0x80) {
                return Conversion::error(0, 0);
            }
            return Conversion::partial(0, 0);
        }
        match std::str::from_utf8(&from[..need])
            .ok()
            .and_then(|s| s.chars().next())
        {
            Some(c) => {
                *slot = u32::from(c);
                Conversion::ok(need, 1)
            }
            None => Conversion::error(0, 0),
        }
    }

    fn encode(&self, _state: &mut ConvState, from: &[u32], to: &mut [u8]) -> Conversion {
        let Some(&unit) = from.first() else {
            return Conversion::ok(0, 0);
        };
        let Some(c) = char::from_u32(unit) else {
            return Conversion::error(0, 0);
        };
        let len = c.len_utf8();
        if to.len() < len {
            return Conversion::partial(0, 0);
        }
        c.encode_utf8(&mut to[..len]);
        Conversion::ok(1, len)
    }

    fn unshift(&self, _state: &mut ConvState, _to: &mut [u8]) -> Conversion {
        Conversion::ok(0, 0)
    }

    fn encoding_name(&self) -> &str {
        "utf-8"
    }
}

// ---------------------------------------------------------------------------
// Stateful SO/SI encoding
// ---------------------------------------------------------------------------

/// Shift-out: following byte pairs are wide units.
pub const SO: u8 = 0x0E;
/// Shift-in: back to single ASCII bytes.
pub const SI: u8 = 0x0F;

const SHIFTED: u32 = 1;

/// A stateful encoding in the ISO-2022 style.
///
/// ASCII units are single bytes while unshifted. Any other unit switches to
/// the shifted mode with [`SO`] and is stored as two big-endian bytes;
/// [`SI`] returns to ASCII. The homing sequence is a lone `SI`, owed whenever
/// output stopped in the shifted mode. Units whose bytes would collide with
/// the shift controls (`0x0E`, `0x0F`, `0x0E00..=0x0FFF`) are unmappable.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShiftCodec;

impl ShiftCodec {
    /// Units this encoding cannot represent.
    #[must_use]
    pub fn is_unmappable(unit: u16) -> bool {
        matches!(unit, 0x0E | 0x0F | 0x0E00..=0x0FFF)
    }
}

impl Codecvt<u16> for ShiftCodec {
    fn decode(&self, state: &mut ConvState, from: &[u8], to: &mut [u16]) -> Conversion {
        let Some(slot) = to.first_mut() else {
            return Conversion::partial(0, 0);
        };
        let mut pos = 0;
        while pos < from.len() {
            match from[pos] {
                SO => {
                    state.set_shift(SHIFTED);
                    pos += 1;
                }
                SI => {
                    state.set_shift(0);
                    pos += 1;
                }
                b if state.shift() != SHIFTED => {
                    if b >= 0x80 {
                        return Conversion::error(pos, 0);
                    }
                    *slot = u16::from(b);
                    return Conversion::ok(pos + 1, 1);
                }
                hi => {
                    let Some(&lo) = from.get(pos + 1) else {
                        break;
                    };
                    *slot = u16::from_be_bytes([hi, lo]);
                    return Conversion::ok(pos + 2, 1);
                }
            }
        }
        Conversion::partial(pos, 0)
    }

    fn encode(&self, state: &mut ConvState, from: &[u16], to: &mut [u8]) -> Conversion {
        let Some(&unit) = from.first() else {
            return Conversion::ok(0, 0);
        };
        if Self::is_unmappable(unit) {
            return Conversion::error(0, 0);
        }
        let shifted = state.shift() == SHIFTED;
        if unit < 0x80 {
            let need = if shifted { 2 } else { 1 };
            if to.len() < need {
                return Conversion::partial(0, 0);
            }
            let mut n = 0;
            if shifted {
                to[n] = SI;
                n += 1;
                state.set_shift(0);
            }
            to[n] = unit as u8;
            return Conversion::ok(1, n + 1);
        }
        let need = if shifted { 2 } else { 3 };
        if to.len() < need {
            return Conversion::partial(0, 0);
        }
        let mut n = 0;
        if !shifted {
            to[n] = SO;
            n += 1;
            state.set_shift(SHIFTED);
        }
        to[n..n + 2].copy_from_slice(&unit.to_be_bytes());
        Conversion::ok(1, n + 2)
    }

    fn unshift(&self, state: &mut ConvState, to: &mut [u8]) -> Conversion {
        if state.shift() != SHIFTED {
            return Conversion::ok(0, 0);
        }
        let Some(slot) = to.first_mut() else {
            return Conversion::partial(0, 0);
        };
        *slot = SI;
        state.set_shift(0);
        Conversion::ok(0, 1)
    }

    fn max_length(&self) -> usize {
        3
    }

    fn encoding_name(&self) -> &str {
        "so/si"
    }
}

// ---------------------------------------------------------------------------
// Locales
// ---------------------------------------------------------------------------

/// Classic locale with the CRLF facility for narrow streams.
#[must_use]
pub fn crlf_locale() -> Locale {
    Locale::classic().with_codecvt::<u8>("C.crlf", Arc::new(Crlf))
}

/// Classic locale with the UTF-8 facility for 32-bit streams.
#[must_use]
pub fn utf8_locale() -> Locale {
    Locale::classic().with_codecvt::<u32>("C.UTF-8", Arc::new(Utf8))
}

/// Classic locale with the SO/SI facility for 16-bit streams.
#[must_use]
pub fn shift_locale() -> Locale {
    Locale::classic().with_codecvt::<u16>("C.shift", Arc::new(ShiftCodec))
}

/// The unit type a named codec works on. `identity` works on all of them.
#[must_use]
pub fn codec_unit(codec: &str) -> Option<UnitKind> {
    match codec {
        "crlf" => Some(UnitKind::U8),
        "utf8" => Some(UnitKind::U32),
        "shift" => Some(UnitKind::U16),
        _ => None,
    }
}

/// Locale for a codec name as used in fixtures and on the command line.
pub fn locale_for(codec: &str, unit: UnitKind) -> Result<Locale, HarnessError> {
    let unknown = || HarnessError::UnknownCodec {
        codec: codec.to_string(),
        unit: unit.to_string(),
    };
    if codec == "identity" {
        return Ok(Locale::classic());
    }
    if codec_unit(codec) != Some(unit) {
        return Err(unknown());
    }
    match codec {
        "crlf" => Ok(crlf_locale()),
        "utf8" => Ok(utf8_locale()),
        "shift" => Ok(shift_locale()),
        _ => Err(unknown()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filebuf_core::ConvResult;

    #[test]
    fn crlf_waits_for_the_byte_after_cr() {
        let mut s = ConvState::initial();
        let mut out = [0u8; 1];
        assert_eq!(Crlf.decode(&mut s, b"\r", &mut out).result, ConvResult::Partial);
        assert_eq!(Crlf.decode(&mut s, b"\r\n", &mut out), Conversion::ok(2, 1));
        assert_eq!(out[0], b'\n');
        assert_eq!(Crlf.decode(&mut s, b"\rx", &mut out), Conversion::ok(1, 1));
        assert_eq!(out[0], b'\r');
    }

    #[test]
    fn crlf_settles_a_final_cr() {
        let mut s = ConvState::initial();
        let mut out = [0u8; 1];
        assert_eq!(Crlf.decode_final(&mut s, b"\r", &mut out), Conversion::ok(1, 1));
        assert_eq!(out[0], b'\r');
        assert_eq!(Crlf.decode_final(&mut s, b"\r\n", &mut out), Conversion::ok(2, 1));
        assert_eq!(out[0], b'\n');
    }

    #[test]
    fn crlf_expands_newline() {
        let mut s = ConvState::initial();
        let mut out = [0u8; 4];
        assert_eq!(Crlf.encode(&mut s, b"\n", &mut out), Conversion::ok(1, 2));
        assert_eq!(&out[..2], b"\r\n");
        assert_eq!(Crlf.encode(&mut s, b"\n", &mut out[..1]).result, ConvResult::Partial);
    }

    #[test]
    fn utf8_decodes_incrementally() {
        let mut s = ConvState::initial();
        let mut out = [0u32; 1];
        let euro = "€".as_bytes();
        assert_eq!(Utf8.decode(&mut s, &euro[..1], &mut out).result, ConvResult::Partial);
        assert_eq!(Utf8.decode(&mut s, &euro[..2], &mut out).result, ConvResult::Partial);
        assert_eq!(Utf8.decode(&mut s, euro, &mut out), Conversion::ok(3, 1));
        assert_eq!(out[0], 0x20AC);
    }

    #[test]
    fn utf8_rejects_bad_input() {
        let mut s = ConvState::initial();
        let mut out = [0u32; 1];
        assert_eq!(Utf8.decode(&mut s, &[0xFF], &mut out).result, ConvResult::Error);
        assert_eq!(Utf8.decode(&mut s, &[0xE2, 0x41], &mut out).result, ConvResult::Error);
        // Encoded surrogate.
        assert_eq!(
            Utf8.decode(&mut s, &[0xED, 0xA0, 0x80], &mut out).result,
            ConvResult::Error
        );
        let mut bytes = [0u8; 4];
        assert_eq!(Utf8.encode(&mut s, &[0xD800], &mut bytes).result, ConvResult::Error);
        assert_eq!(Utf8.encode(&mut s, &[0x11_0000], &mut bytes).result, ConvResult::Error);
    }

    #[test]
    fn shift_codec_tracks_state() {
        let mut s = ConvState::initial();
        let mut out = [0u8; 8];
        assert_eq!(ShiftCodec.encode(&mut s, &[u16::from(b'a')], &mut out), Conversion::ok(1, 1));
        assert_eq!(ShiftCodec.encode(&mut s, &[0x3042], &mut out), Conversion::ok(1, 3));
        assert_eq!(&out[..3], &[SO, 0x30, 0x42]);
        assert_eq!(s.shift(), SHIFTED);
        assert_eq!(ShiftCodec.encode(&mut s, &[0x3044], &mut out), Conversion::ok(1, 2));
        assert_eq!(ShiftCodec.unshift(&mut s, &mut out), Conversion::ok(0, 1));
        assert_eq!(out[0], SI);
        assert!(s.is_initial());
        assert_eq!(ShiftCodec.unshift(&mut s, &mut out), Conversion::ok(0, 0));
    }

    #[test]
    fn shift_codec_decodes_pairs_across_calls() {
        let mut s = ConvState::initial();
        let mut out = [0u16; 1];
        assert_eq!(ShiftCodec.decode(&mut s, &[SO], &mut out), Conversion::partial(1, 0));
        assert_eq!(s.shift(), SHIFTED);
        assert_eq!(ShiftCodec.decode(&mut s, &[0x30], &mut out), Conversion::partial(0, 0));
        assert_eq!(ShiftCodec.decode(&mut s, &[0x30, 0x42], &mut out), Conversion::ok(2, 1));
        assert_eq!(out[0], 0x3042);
        assert_eq!(ShiftCodec.decode(&mut s, &[SI, b'z'], &mut out), Conversion::ok(2, 1));
        assert_eq!(out[0], u16::from(b'z'));
    }

    #[test]
    fn shift_codec_unmappable_units() {
        let mut s = ConvState::initial();
        let mut out = [0u8; 4];
        for unit in [0x0E, 0x0F, 0x0E00, 0x0FFF] {
            assert_eq!(ShiftCodec.encode(&mut s, &[unit], &mut out).result, ConvResult::Error);
        }
        assert!(s.is_initial());
    }

    #[test]
    fn locale_lookup_checks_unit() {
        assert!(locale_for("identity", UnitKind::U16).is_ok());
        assert_eq!(locale_for("crlf", UnitKind::U8).map(|l| l.name().to_string()).ok(), Some("C.crlf".into()));
        assert!(matches!(
            locale_for("crlf", UnitKind::U32),
            Err(HarnessError::UnknownCodec { .. })
        ));
        assert!(locale_for("ebcdic", UnitKind::U8).is_err());
    }
}
