//! Fixture loading and management.
//!
//! A fixture case is a script of engine operations run against an in-memory
//! file, plus the transcript those operations are expected to produce.

use std::fmt;
use std::path::Path;

use filebuf_core::{CharUnit, SeekDir};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::HarnessError;

/// Unit type of the stream under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    U8,
    U16,
    U32,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnitKind::U8 => "u8",
            UnitKind::U16 => "u16",
            UnitKind::U32 => "u32",
        })
    }
}

/// Units that fixtures can spell as plain numbers.
pub trait FixtureUnit: CharUnit {
    const KIND: UnitKind;

    fn from_u32(value: u32) -> Option<Self>;

    fn to_u32(self) -> u32;
}

macro_rules! fixture_unit {
    ($ty:ty, $kind:expr) => {
        impl FixtureUnit for $ty {
            const KIND: UnitKind = $kind;

            fn from_u32(value: u32) -> Option<Self> {
                <$ty>::try_from(value).ok()
            }

            fn to_u32(self) -> u32 {
                u32::from(self)
            }
        }
    };
}

fixture_unit!(u8, UnitKind::U8);
fixture_unit!(u16, UnitKind::U16);
fixture_unit!(u32, UnitKind::U32);

/// Convert a fixture value, naming the unit type on failure.
pub fn unit_from_u32<C: FixtureUnit>(value: u32) -> Result<C, HarnessError> {
    C::from_u32(value).ok_or(HarnessError::UnitOutOfRange {
        value,
        unit: C::KIND.to_string(),
    })
}

/// Seek origin as spelled in fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureDir {
    Begin,
    Current,
    End,
}

impl From<FixtureDir> for SeekDir {
    fn from(dir: FixtureDir) -> Self {
        match dir {
            FixtureDir::Begin => SeekDir::Begin,
            FixtureDir::Current => SeekDir::Current,
            FixtureDir::End => SeekDir::End,
        }
    }
}

/// One scripted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FixtureOp {
    /// `overflow(Some(unit))`.
    Put { unit: u32 },
    /// `xsputn` of the text's characters as units.
    Write { text: String },
    /// `xsputn` of explicit unit values.
    WriteUnits { units: Vec<u32> },
    /// `uflow`.
    Get,
    /// `underflow`.
    Peek,
    /// `xsgetn` of up to `count` units.
    Read { count: usize },
    /// `pbackfail`; no unit means "step back".
    Pushback {
        #[serde(default)]
        unit: Option<u32>,
    },
    /// `sungetc`.
    Unget,
    /// `seekoff`.
    Seek { off: i64, dir: FixtureDir },
    /// `seekoff(0, Current)`, remembering the position for `restore`.
    Tell,
    /// `seekpos` to the last position taken by `tell`.
    Restore,
    /// `sync`.
    Sync,
    /// `overflow(None)`.
    Flush,
    /// `close`.
    Close,
    /// `setbuf(None, 0)`.
    Unbuffered,
    /// `imbue` the locale for a codec name.
    Imbue { codec: String },
    /// Let `bytes` more bytes reach the backing file, then fail one write.
    FailWriteAfter { bytes: usize },
    /// Let `bytes` more bytes come from the backing file, then fail one read.
    FailReadAfter { bytes: usize },
    /// Record the backing file's bytes.
    Contents,
}

/// A single fixture test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureCase {
    /// Case identifier.
    pub name: String,
    /// Behavior family the case belongs to (e.g. "pushback", "homing").
    pub family: String,
    /// Stream unit type.
    pub unit: UnitKind,
    /// Codec bound before the script runs.
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Initial file contents.
    #[serde(default)]
    pub initial: String,
    /// Handle buffering the case applies to (buffered, unbuffered or both).
    #[serde(default = "default_mode")]
    pub mode: String,
    /// The script.
    pub ops: Vec<FixtureOp>,
    /// Expected transcript, one line per operation.
    pub expected_output: Vec<String>,
}

fn default_codec() -> String {
    String::from("identity")
}

fn default_mode() -> String {
    String::from("both")
}

impl FixtureCase {
    /// Expected transcript as one newline-separated block.
    #[must_use]
    pub fn expected_text(&self) -> String {
        self.expected_output.join("\n")
    }
}

/// A collection of fixture cases for one behavior family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureSet {
    /// Schema version.
    pub version: String,
    /// Family name.
    pub family: String,
    /// UTC timestamp of capture.
    pub captured_at: String,
    /// Individual test cases.
    pub cases: Vec<FixtureCase>,
}

impl FixtureSet {
    /// Load fixture set from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize fixture set to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load fixture set from a file path.
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)?;
        let set = Self::from_json(&content)?;
        Ok(set)
    }

    /// SHA-256 of the canonical JSON form, hex encoded.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(self)?;
        Ok(Sha256::digest(&canonical)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "version": "1",
        "family": "pushback",
        "captured_at": "2026-01-01T00:00:00Z",
        "cases": [{
            "name": "step_back",
            "family": "pushback",
            "unit": "u8",
            "initial": "ab",
            "ops": [
                {"op": "get"},
                {"op": "pushback"},
                {"op": "seek", "off": 0, "dir": "begin"},
                {"op": "write_units", "units": [65, 66]}
            ],
            "expected_output": ["get 'a'", "pushback false", "seek 0", "write 2"]
        }]
    }"#;

    #[test]
    fn parses_with_defaults() {
        let set = FixtureSet::from_json(SAMPLE).unwrap();
        let case = &set.cases[0];
        assert_eq!(case.codec, "identity");
        assert_eq!(case.mode, "both");
        assert_eq!(case.unit, UnitKind::U8);
        assert_eq!(case.ops[1], FixtureOp::Pushback { unit: None });
        assert_eq!(
            case.ops[2],
            FixtureOp::Seek {
                off: 0,
                dir: FixtureDir::Begin
            }
        );
        assert_eq!(case.expected_text().lines().count(), 4);
    }

    #[test]
    fn json_round_trip_keeps_digest() {
        let set = FixtureSet::from_json(SAMPLE).unwrap();
        let again = FixtureSet::from_json(&set.to_json().unwrap()).unwrap();
        assert_eq!(set.digest().unwrap(), again.digest().unwrap());
        assert_eq!(set.digest().unwrap().len(), 64);
    }

    #[test]
    fn unknown_op_is_rejected() {
        let bad = SAMPLE.replace("\"get\"}", "\"teleport\"}");
        assert!(FixtureSet::from_json(&bad).is_err());
    }

    #[test]
    fn unit_range_checks() {
        assert_eq!(unit_from_u32::<u8>(0x41).unwrap(), b'A');
        assert!(matches!(
            unit_from_u32::<u8>(0x100),
            Err(HarnessError::UnitOutOfRange { value: 0x100, .. })
        ));
        assert_eq!(unit_from_u32::<u16>(0x3042).unwrap(), 0x3042);
    }
}
