//! Harness error type.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no codec named '{codec}' for {unit} units")]
    UnknownCodec { codec: String, unit: String },
    #[error("value {value:#x} does not fit a {unit} unit")]
    UnitOutOfRange { value: u32, unit: String },
    #[error("open failed: {0}")]
    Open(#[from] filebuf_core::OpenError),
}
