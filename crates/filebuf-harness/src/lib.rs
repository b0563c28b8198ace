//! Conformance tooling for filebuf-core.
//!
//! This crate provides:
//! - Reference conversion facilities (`Crlf`, `Utf8`, `ShiftCodec`)
//! - An in-memory byte backend with injectable short transfers
//! - Fixture sets of scripted engine operations, and a runner for them
//! - Report generation: human-readable + machine-readable conformance reports
//! - A structured JSONL run log

#![forbid(unsafe_code)]

pub mod codecs;
pub mod diff;
pub mod error;
pub mod fixtures;
pub mod memfile;
pub mod report;
pub mod roundtrip;
pub mod runner;
pub mod structured_log;
pub mod verify;

pub use codecs::{Crlf, ShiftCodec, Utf8};
pub use error::HarnessError;
pub use fixtures::{FixtureCase, FixtureOp, FixtureSet};
pub use memfile::MemFile;
pub use report::ConformanceReport;
pub use runner::TestRunner;
pub use verify::VerificationResult;
