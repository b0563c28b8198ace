//! Runtime I/O configuration.
//!
//! Values are read from the environment on first use and cached:
//! - `FILEBUF_BUFSIZ`: byte capacity of a freshly opened handle's buffer
//!   (default 8192, the stdio `BUFSIZ`).
//! - `FILEBUF_BULK_CHUNK`: largest block a bulk transfer hands to the handle in
//!   one call (default 4095, one less than the common 4096-byte internal
//!   buffer, so a block never straddles two refills of that buffer).
//! - `FILEBUF_PROT`: octal permission bits for files created by open
//!   (default `0o666`, further reduced by the process umask).
//!
//! Unparseable or zero values fall back to the defaults.

use std::sync::OnceLock;

/// Default handle buffer size (stdio `BUFSIZ`).
pub const DEFAULT_BUFSIZ: usize = 8192;
/// Default bulk-transfer chunk.
pub const DEFAULT_BULK_CHUNK: usize = 4095;
/// Default permission bits for created files.
pub const DEFAULT_PROT: u32 = 0o666;

/// Tunables shared by every handle and engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoConfig {
    pub buffer_size: usize,
    pub bulk_chunk: usize,
    pub default_prot: u32,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFSIZ,
            bulk_chunk: DEFAULT_BULK_CHUNK,
            default_prot: DEFAULT_PROT,
        }
    }
}

impl IoConfig {
    /// Build a configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            buffer_size: lookup("FILEBUF_BUFSIZ")
                .and_then(|v| parse_size(&v))
                .unwrap_or(defaults.buffer_size),
            bulk_chunk: lookup("FILEBUF_BULK_CHUNK")
                .and_then(|v| parse_size(&v))
                .unwrap_or(defaults.bulk_chunk),
            default_prot: lookup("FILEBUF_PROT")
                .and_then(|v| parse_prot(&v))
                .unwrap_or(defaults.default_prot),
        }
    }

    /// Build a configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Parse a positive size, accepting `_` separators and a `k` suffix.
#[must_use]
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim().replace('_', "").to_ascii_lowercase();
    let (digits, scale) = match s.strip_suffix('k') {
        Some(d) => (d.to_string(), 1024),
        None => (s, 1),
    };
    match digits.parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(n) => n.checked_mul(scale),
    }
}

/// Parse octal permission bits (`644`, `0644`, `0o644`).
#[must_use]
pub fn parse_prot(s: &str) -> Option<u32> {
    let s = s.trim();
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8).ok().filter(|p| *p <= 0o7777)
}

static GLOBAL_CONFIG: OnceLock<IoConfig> = OnceLock::new();

/// The process configuration (reads the environment once, caches thereafter).
#[must_use]
pub fn io_config() -> IoConfig {
    *GLOBAL_CONFIG.get_or_init(IoConfig::from_env)
}
