//! Error types for the open and close paths.
//!
//! Everything else in the engine reports failure through `Option`, `bool`
//! or short counts, like the stdio layer underneath it.

use std::io;

use thiserror::Error;

use crate::ios::OpenMode;

/// Why an open attempt failed.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("stream is already open")]
    AlreadyOpen,
    #[error("invalid open mode: {0}")]
    InvalidMode(OpenMode),
    #[error("invalid file name")]
    InvalidPath,
    #[error("open failed: {0}")]
    Io(#[from] io::Error),
}

/// Why a close attempt failed. The stream is closed either way.
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("stream is not open")]
    NotOpen,
    #[error("pending output or the homing sequence could not be written")]
    Homing,
    #[error("close failed: {0}")]
    Io(#[from] io::Error),
}
