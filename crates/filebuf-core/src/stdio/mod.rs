//! Raw handle adapter.
//!
//! A stdio-style buffered byte handle over any seekable OS or in-memory
//! stream: open/close, one-byte and one-unit transfers, best-effort unget,
//! block transfers, seeking, flushing, buffering control and locking.

pub mod buffer;
pub mod file;

pub use buffer::{BufMode, StreamBuffer};
pub use file::{FileLock, OpenFlags, RawFile, RawIo, mode_string, parse_mode};
