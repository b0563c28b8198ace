//! Stream-level vocabulary: open mode bits, seek origins and state bits.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Open mode bits (`ios_base::openmode`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenMode(u8);

impl OpenMode {
    pub const IN: OpenMode = OpenMode(0x01);
    pub const OUT: OpenMode = OpenMode(0x02);
    pub const ATE: OpenMode = OpenMode(0x04);
    pub const APP: OpenMode = OpenMode(0x08);
    pub const TRUNC: OpenMode = OpenMode(0x10);
    pub const BINARY: OpenMode = OpenMode(0x20);
    /// Fail instead of opening an existing file for writing.
    pub const NOREPLACE: OpenMode = OpenMode(0x40);

    const NAMES: [(OpenMode, &'static str); 7] = [
        (Self::IN, "in"),
        (Self::OUT, "out"),
        (Self::ATE, "ate"),
        (Self::APP, "app"),
        (Self::TRUNC, "trunc"),
        (Self::BINARY, "binary"),
        (Self::NOREPLACE, "noreplace"),
    ];

    #[must_use]
    pub const fn empty() -> Self {
        OpenMode(0)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: OpenMode) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn intersects(self, other: OpenMode) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: OpenMode) -> Self {
        OpenMode(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: OpenMode) -> Self {
        OpenMode(self.0 & !other.0)
    }

    /// Parse a `|`-separated list of mode names (`"in|out|binary"`).
    #[must_use]
    pub fn parse(text: &str) -> Option<OpenMode> {
        let mut mode = OpenMode::empty();
        for part in text.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            let (bit, _) = Self::NAMES.iter().find(|(_, name)| *name == part)?;
            mode |= *bit;
        }
        Some(mode)
    }
}

impl BitOr for OpenMode {
    type Output = OpenMode;

    fn bitor(self, rhs: OpenMode) -> OpenMode {
        OpenMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenMode {
    fn bitor_assign(&mut self, rhs: OpenMode) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for OpenMode {
    type Output = OpenMode;

    fn bitand(self, rhs: OpenMode) -> OpenMode {
        OpenMode(self.0 & rhs.0)
    }
}

impl fmt::Debug for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (bit, name) in Self::NAMES {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("(none)")?;
        }
        Ok(())
    }
}

/// Seek origin (`ios_base::seekdir`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeekDir {
    Begin,
    Current,
    End,
}

impl SeekDir {
    /// Combine with a signed offset into a std seek target.
    ///
    /// Returns `None` for a negative offset from the beginning.
    #[must_use]
    pub fn to_seek_from(self, off: i64) -> Option<std::io::SeekFrom> {
        match self {
            SeekDir::Begin => u64::try_from(off).ok().map(std::io::SeekFrom::Start),
            SeekDir::Current => Some(std::io::SeekFrom::Current(off)),
            SeekDir::End => Some(std::io::SeekFrom::End(off)),
        }
    }
}

/// Stream state bits (`ios_base::iostate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IoState {
    pub eof: bool,
    pub fail: bool,
    /// Loss of integrity of the underlying engine.
    pub bad: bool,
}

impl IoState {
    pub const GOOD: IoState = IoState {
        eof: false,
        fail: false,
        bad: false,
    };
    pub const EOF: IoState = IoState {
        eof: true,
        fail: false,
        bad: false,
    };
    pub const FAIL: IoState = IoState {
        eof: false,
        fail: true,
        bad: false,
    };
    pub const BAD: IoState = IoState {
        eof: false,
        fail: false,
        bad: true,
    };

    #[must_use]
    pub const fn good(self) -> bool {
        !self.eof && !self.fail && !self.bad
    }
}

impl BitOr for IoState {
    type Output = IoState;

    fn bitor(self, rhs: IoState) -> IoState {
        IoState {
            eof: self.eof || rhs.eof,
            fail: self.fail || rhs.fail,
            bad: self.bad || rhs.bad,
        }
    }
}

impl BitOrAssign for IoState {
    fn bitor_assign(&mut self, rhs: IoState) {
        *self = *self | rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_bits_combine() {
        let m = OpenMode::IN | OpenMode::OUT;
        assert!(m.contains(OpenMode::IN));
        assert!(m.contains(OpenMode::OUT));
        assert!(!m.contains(OpenMode::APP));
        assert!(m.intersects(OpenMode::OUT | OpenMode::TRUNC));
        assert_eq!(m.without(OpenMode::IN), OpenMode::OUT);
    }

    #[test]
    fn mode_display_and_parse_agree() {
        let m = OpenMode::OUT | OpenMode::APP | OpenMode::BINARY;
        assert_eq!(m.to_string(), "out|app|binary");
        assert_eq!(OpenMode::parse("out | app|binary"), Some(m));
        assert_eq!(OpenMode::empty().to_string(), "(none)");
        assert_eq!(OpenMode::parse("sideways"), None);
    }

    #[test]
    fn seek_from_rejects_negative_begin() {
        assert_eq!(SeekDir::Begin.to_seek_from(-1), None);
        assert_eq!(
            SeekDir::Begin.to_seek_from(7),
            Some(std::io::SeekFrom::Start(7))
        );
        assert_eq!(
            SeekDir::End.to_seek_from(-2),
            Some(std::io::SeekFrom::End(-2))
        );
    }

    #[test]
    fn state_bits() {
        assert!(IoState::GOOD.good());
        let s = IoState::EOF | IoState::FAIL;
        assert!(!s.good());
        assert!(s.eof && s.fail && !s.bad);
        let mut t = IoState::default();
        t |= IoState::BAD;
        assert!(t.bad);
    }
}
