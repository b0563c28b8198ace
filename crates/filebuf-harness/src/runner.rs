//! Test execution engine.
//!
//! Every case runs against a fresh [`MemFile`] wrapped in a raw handle and a
//! borrowing [`FileBuf`]. Each operation appends one transcript line.

use filebuf_core::stdio::OpenFlags;
use filebuf_core::{CloseError, FileBuf, RawFile, StreamPos};

use crate::codecs::locale_for;
use crate::diff;
use crate::error::HarnessError;
use crate::fixtures::{FixtureCase, FixtureOp, FixtureSet, FixtureUnit, UnitKind, unit_from_u32};
use crate::memfile::MemFile;
use crate::verify::VerificationResult;

/// Handle buffering modes a runner can use.
pub const MODES: [&str; 2] = ["buffered", "unbuffered"];

/// Runs a fixture set and collects verification results.
pub struct TestRunner {
    /// Name of the test campaign.
    pub campaign: String,
    /// Handle buffering under test (buffered or unbuffered).
    pub mode: String,
}

impl TestRunner {
    /// Create a new test runner.
    #[must_use]
    pub fn new(campaign: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            campaign: campaign.into(),
            mode: mode.into(),
        }
    }

    /// Run all fixtures in a set and return results.
    pub fn run(&self, fixture_set: &FixtureSet) -> Vec<VerificationResult> {
        fixture_set
            .cases
            .iter()
            .filter(|case| mode_matches(&self.mode, &case.mode))
            .map(|case| {
                let expected = case.expected_text();
                let (actual, diff) = match execute_case(case, &self.mode) {
                    Ok(lines) => {
                        let actual = lines.join("\n");
                        let diff = (actual != expected).then(|| diff::render_diff(&expected, &actual));
                        (actual, diff)
                    }
                    Err(err) => {
                        let actual = format!("error:{err}");
                        let diff = Some(diff::render_diff(&expected, &actual));
                        (actual, diff)
                    }
                };
                log::debug!("[{}] {} ({}): {}", self.campaign, case.name, self.mode, diff.is_none());
                VerificationResult {
                    case_name: case.name.clone(),
                    family: case.family.clone(),
                    mode: self.mode.clone(),
                    passed: diff.is_none(),
                    expected,
                    actual,
                    diff,
                }
            })
            .collect()
    }
}

fn mode_matches(active_mode: &str, case_mode: &str) -> bool {
    let active = active_mode.to_ascii_lowercase();
    let case = case_mode.to_ascii_lowercase();
    case == active || case == "both"
}

/// Run one case and return its transcript.
pub fn execute_case(case: &FixtureCase, mode: &str) -> Result<Vec<String>, HarnessError> {
    let unbuffered = mode.eq_ignore_ascii_case("unbuffered");
    match case.unit {
        UnitKind::U8 => execute::<u8>(case, unbuffered),
        UnitKind::U16 => execute::<u16>(case, unbuffered),
        UnitKind::U32 => execute::<u32>(case, unbuffered),
    }
}

fn execute<C: FixtureUnit>(
    case: &FixtureCase,
    unbuffered: bool,
) -> Result<Vec<String>, HarnessError> {
    let backing = MemFile::with_data(case.initial.as_bytes().to_vec());
    let file = RawFile::from_io(backing.clone(), OpenFlags::read_write());
    let mut buf = FileBuf::<C>::from_raw(file);
    buf.imbue(locale_for(&case.codec, C::KIND)?);
    if unbuffered && !buf.setbuf(None, 0) {
        log::warn!("{}: could not make the handle unbuffered", case.name);
    }

    let mut script = Script {
        buf,
        backing,
        mark: None,
    };
    case.ops.iter().map(|op| script.step(op)).collect()
}

struct Script<C: FixtureUnit> {
    buf: FileBuf<C>,
    backing: MemFile,
    mark: Option<StreamPos>,
}

impl<C: FixtureUnit> Script<C> {
    fn step(&mut self, op: &FixtureOp) -> Result<String, HarnessError> {
        let buf = &mut self.buf;
        let line = match op {
            FixtureOp::Put { unit } => {
                format!("put {}", buf.overflow(Some(unit_from_u32::<C>(*unit)?)))
            }
            FixtureOp::Write { text } => {
                let units = text
                    .chars()
                    .map(|c| unit_from_u32::<C>(u32::from(c)))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("write {}", buf.xsputn(&units))
            }
            FixtureOp::WriteUnits { units } => {
                let units = units
                    .iter()
                    .map(|&v| unit_from_u32::<C>(v))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("write {}", buf.xsputn(&units))
            }
            FixtureOp::Get => format!("get {}", show_opt(buf.uflow())),
            FixtureOp::Peek => format!("peek {}", show_opt(buf.underflow())),
            FixtureOp::Read { count } => {
                let mut out = vec![C::default(); *count];
                let n = buf.xsgetn(&mut out);
                let shown: Vec<String> = out[..n].iter().map(|u| show_unit(u.to_u32())).collect();
                if shown.is_empty() {
                    String::from("read 0")
                } else {
                    format!("read {n} {}", shown.join(" "))
                }
            }
            FixtureOp::Pushback { unit } => {
                let unit = unit.map(unit_from_u32::<C>).transpose()?;
                format!("pushback {}", buf.pbackfail(unit))
            }
            FixtureOp::Unget => format!("unget {}", buf.sungetc()),
            FixtureOp::Seek { off, dir } => match buf.seekoff(*off, (*dir).into()) {
                Some(pos) => format!("seek {pos}"),
                None => String::from("seek fail"),
            },
            FixtureOp::Tell => match buf.seekoff(0, filebuf_core::SeekDir::Current) {
                Some(pos) => {
                    self.mark = Some(pos);
                    format!("tell {pos}")
                }
                None => String::from("tell fail"),
            },
            FixtureOp::Restore => match self.mark {
                Some(mark) => match buf.seekpos(mark) {
                    Some(pos) => format!("restore {pos}"),
                    None => String::from("restore fail"),
                },
                None => String::from("restore none"),
            },
            FixtureOp::Sync => format!("sync {}", buf.sync()),
            FixtureOp::Flush => format!("flush {}", buf.overflow(None)),
            FixtureOp::Close => match buf.close() {
                Ok(()) => String::from("close ok"),
                Err(CloseError::NotOpen) => String::from("close not-open"),
                Err(CloseError::Homing) => String::from("close homing"),
                Err(CloseError::Io(_)) => String::from("close io"),
            },
            FixtureOp::Unbuffered => format!("setbuf {}", buf.setbuf(None, 0)),
            FixtureOp::Imbue { codec } => {
                let locale = locale_for(codec, C::KIND)?;
                let line = format!("imbue {}", locale.name());
                buf.imbue(locale);
                line
            }
            FixtureOp::FailWriteAfter { bytes } => {
                self.backing.fail_write_after(*bytes);
                format!("budget write {bytes}")
            }
            FixtureOp::FailReadAfter { bytes } => {
                self.backing.fail_read_after(*bytes);
                format!("budget read {bytes}")
            }
            FixtureOp::Contents => {
                format!("file \"{}\"", self.backing.contents().escape_ascii())
            }
        };
        Ok(line)
    }
}

/// Printable ASCII as a quoted character, anything else as hex.
#[must_use]
pub fn show_unit(value: u32) -> String {
    match char::from_u32(value) {
        Some(c) if (' '..='~').contains(&c) => format!("'{c}'"),
        _ => format!("{value:#x}"),
    }
}

fn show_opt<C: FixtureUnit>(unit: Option<C>) -> String {
    unit.map_or_else(|| String::from("eof"), |u| show_unit(u.to_u32()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_set() -> FixtureSet {
        let json = r#"{
            "version": "1",
            "family": "basic",
            "captured_at": "2026-01-01T00:00:00Z",
            "cases": [
                {
                    "name": "read_pushback_read",
                    "family": "pushback",
                    "unit": "u8",
                    "initial": "xy",
                    "ops": [
                        {"op": "get"},
                        {"op": "pushback", "unit": 120},
                        {"op": "get"},
                        {"op": "get"},
                        {"op": "get"}
                    ],
                    "expected_output": ["get 'x'", "pushback true", "get 'x'", "get 'y'", "get eof"]
                },
                {
                    "name": "crlf_text",
                    "family": "codec",
                    "unit": "u8",
                    "codec": "crlf",
                    "mode": "buffered",
                    "ops": [
                        {"op": "write", "text": "A\nB"},
                        {"op": "sync"},
                        {"op": "contents"},
                        {"op": "seek", "off": 0, "dir": "begin"},
                        {"op": "read", "count": 8}
                    ],
                    "expected_output": [
                        "write 3",
                        "sync true",
                        "file \"A\\r\\nB\"",
                        "seek 0",
                        "read 3 'A' 0xa 'B'"
                    ]
                },
                {
                    "name": "deliberately_wrong",
                    "family": "pushback",
                    "unit": "u8",
                    "mode": "buffered",
                    "initial": "q",
                    "ops": [{"op": "get"}],
                    "expected_output": ["get 'z'"]
                }
            ]
        }"#;
        FixtureSet::from_json(json).unwrap()
    }

    #[test]
    fn runs_matching_cases_and_diffs_failures() {
        let results = TestRunner::new("unit", "buffered").run(&fixture_set());
        assert_eq!(results.len(), 3);
        assert!(results[0].passed, "{:?}", results[0].diff);
        assert!(results[1].passed, "{:?}", results[1].diff);
        assert!(!results[2].passed);
        let diff = results[2].diff.as_deref().unwrap();
        assert!(diff.contains("-get 'z'\n+get 'q'"));
    }

    #[test]
    fn unbuffered_runner_skips_buffered_only_cases() {
        let results = TestRunner::new("unit", "unbuffered").run(&fixture_set());
        assert_eq!(results.len(), 1);
        assert!(results[0].passed, "{:?}", results[0].diff);
        assert_eq!(results[0].mode, "unbuffered");
    }

    #[test]
    fn mismatched_codec_is_an_error_result() {
        let mut set = fixture_set();
        set.cases[0].codec = String::from("utf8");
        let results = TestRunner::new("unit", "buffered").run(&set);
        assert!(!results[0].passed);
        assert!(results[0].actual.starts_with("error:"));
    }

    #[test]
    fn show_unit_forms() {
        assert_eq!(show_unit(u32::from(b'A')), "'A'");
        assert_eq!(show_unit(0x3042), "0x3042");
        assert_eq!(show_unit(0xD800), "0xd800");
    }
}
