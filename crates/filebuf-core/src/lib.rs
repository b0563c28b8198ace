//! # filebuf-core
//!
//! Buffered, locale-aware translation between a typed character stream and a
//! byte-oriented file handle.
//!
//! Three layers compose:
//! - [`stdio`]: the raw handle adapter, a stdio-style buffered byte handle.
//! - [`filebuf`]: the buffered conversion engine that drives a pluggable
//!   [`codecvt::Codecvt`] facility across partial conversions, pushback and
//!   seeking.
//! - [`fstream`]: input, output and bidirectional stream facades that fold
//!   engine results into stream state bits.
//!
//! No `unsafe` code is permitted at the crate level.

#![deny(unsafe_code)]

pub mod codecvt;
pub mod config;
pub mod error;
pub mod filebuf;
pub mod fstream;
pub mod ios;
pub mod locale;
pub mod metrics;
pub mod stdio;
pub mod unit;

pub use codecvt::{Codecvt, ConvResult, ConvState, Conversion, NoConv};
pub use error::{CloseError, OpenError};
pub use filebuf::{FileBuf, StreamPos};
pub use fstream::{FStream, IfStream, InputStream, OfStream, OutputStream, StreamBase};
pub use ios::{IoState, OpenMode, SeekDir};
pub use locale::Locale;
pub use stdio::file::RawFile;
pub use unit::CharUnit;
