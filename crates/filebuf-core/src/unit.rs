//! Stream character units.
//!
//! A unit is the logical element type of a stream: `u8` for narrow streams,
//! `u16` and `u32` for wide ones. In identity mode a unit travels to the file
//! as its `WIDTH` little-endian bytes.

use std::fmt::Debug;
use std::sync::Arc;

use crate::codecvt::Codecvt;
use crate::locale::FacetTable;

/// Element type of a character stream.
pub trait CharUnit: Copy + Eq + Default + Debug + Send + Sync + 'static {
    /// Raw byte width of one unit in identity mode.
    const WIDTH: usize;

    /// Rebuild a unit from exactly `WIDTH` little-endian bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Write the unit's `WIDTH` little-endian bytes into `out[..WIDTH]`.
    fn write_le(self, out: &mut [u8]);

    /// Widen a single raw byte (used for `noconv` decode results).
    fn from_byte(byte: u8) -> Self;

    /// View a unit slice as bytes. Only single-byte units support this.
    fn as_bytes(units: &[Self]) -> Option<&[u8]>;

    /// Mutable byte view. Only single-byte units support this.
    fn as_bytes_mut(units: &mut [Self]) -> Option<&mut [u8]>;

    /// The facility for this unit type inside a locale's facet table.
    fn facet(table: &FacetTable) -> &Arc<dyn Codecvt<Self>>;

    /// Mutable access used when building a derived locale.
    fn facet_mut(table: &mut FacetTable) -> &mut Arc<dyn Codecvt<Self>>;
}

impl CharUnit for u8 {
    const WIDTH: usize = 1;

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn write_le(self, out: &mut [u8]) {
        out[0] = self;
    }

    fn from_byte(byte: u8) -> Self {
        byte
    }

    fn as_bytes(units: &[Self]) -> Option<&[u8]> {
        Some(units)
    }

    fn as_bytes_mut(units: &mut [Self]) -> Option<&mut [u8]> {
        Some(units)
    }

    fn facet(table: &FacetTable) -> &Arc<dyn Codecvt<Self>> {
        &table.narrow
    }

    fn facet_mut(table: &mut FacetTable) -> &mut Arc<dyn Codecvt<Self>> {
        &mut table.narrow
    }
}

macro_rules! wide_unit {
    ($ty:ty, $field:ident) => {
        impl CharUnit for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::WIDTH]);
                <$ty>::from_le_bytes(raw)
            }

            fn write_le(self, out: &mut [u8]) {
                out[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
            }

            fn from_byte(byte: u8) -> Self {
                <$ty>::from(byte)
            }

            fn as_bytes(_units: &[Self]) -> Option<&[u8]> {
                None
            }

            fn as_bytes_mut(_units: &mut [Self]) -> Option<&mut [u8]> {
                None
            }

            fn facet(table: &FacetTable) -> &Arc<dyn Codecvt<Self>> {
                &table.$field
            }

            fn facet_mut(table: &mut FacetTable) -> &mut Arc<dyn Codecvt<Self>> {
                &mut table.$field
            }
        }
    };
}

wide_unit!(u16, wide16);
wide_unit!(u32, wide32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_storage() {
        assert_eq!(<u8 as CharUnit>::WIDTH, 1);
        assert_eq!(<u16 as CharUnit>::WIDTH, 2);
        assert_eq!(<u32 as CharUnit>::WIDTH, 4);
    }

    #[test]
    fn wide_units_are_little_endian() {
        let mut out = [0u8; 4];
        0x1234u16.write_le(&mut out);
        assert_eq!(&out[..2], &[0x34, 0x12]);
        assert_eq!(u16::from_le_slice(&out[..2]), 0x1234);

        0xA1B2_C3D4u32.write_le(&mut out);
        assert_eq!(out, [0xD4, 0xC3, 0xB2, 0xA1]);
        assert_eq!(u32::from_le_slice(&out), 0xA1B2_C3D4);
    }

    #[test]
    fn only_narrow_units_expose_bytes() {
        let mut narrow = [1u8, 2, 3];
        assert_eq!(u8::as_bytes_mut(&mut narrow).map(|b| b.len()), Some(3));
        let mut wide = [1u16, 2];
        assert!(u16::as_bytes_mut(&mut wide).is_none());
        assert!(u32::as_bytes(&[7u32]).is_none());
    }

    #[test]
    fn from_byte_widens() {
        assert_eq!(u16::from_byte(0xFF), 0x00FF);
        assert_eq!(u32::from_byte(b'A'), 65);
    }
}
