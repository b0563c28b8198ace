//! Property tests: whatever goes in through the engine comes back out.

use filebuf_core::stdio::OpenFlags;
use filebuf_core::{FileBuf, Locale, RawFile, SeekDir};
use filebuf_harness::MemFile;
use filebuf_harness::codecs::{ShiftCodec, crlf_locale};
use filebuf_harness::roundtrip::round_trip;
use proptest::prelude::*;

fn engine_over(data: Vec<u8>) -> (MemFile, FileBuf<u8>) {
    let backing = MemFile::with_data(data);
    let mut buf = FileBuf::from_raw(RawFile::from_io(backing.clone(), OpenFlags::read_write()));
    buf.imbue(Locale::classic());
    (backing, buf)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn identity_bytes_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..9000)) {
        let rt = round_trip::<u8>("identity", &bytes).unwrap();
        prop_assert!(rt.passed(), "{:?}", rt);
        prop_assert_eq!(rt.bytes, bytes.len());
    }

    #[test]
    fn utf8_chars_round_trip(chars in proptest::collection::vec(any::<char>(), 0..512)) {
        let units: Vec<u32> = chars.iter().map(|&c| u32::from(c)).collect();
        let rt = round_trip::<u32>("utf8", &units).unwrap();
        prop_assert!(rt.passed(), "{:?}", rt);
        let encoded: usize = chars.iter().map(|c| c.len_utf8()).sum();
        prop_assert_eq!(rt.bytes, encoded);
    }

    #[test]
    fn shift_mappable_units_round_trip(
        raw in proptest::collection::vec(any::<u16>(), 0..512)
    ) {
        let units: Vec<u16> = raw
            .into_iter()
            .filter(|&u| !ShiftCodec::is_unmappable(u))
            .collect();
        let rt = round_trip::<u16>("shift", &units).unwrap();
        prop_assert!(rt.passed(), "{:?}", rt);
    }

    #[test]
    fn crlf_expands_each_newline(
        bytes in proptest::collection::vec(any::<u8>().prop_filter("no CR", |b| *b != b'\r'), 0..2048)
    ) {
        let rt = round_trip::<u8>("crlf", &bytes).unwrap();
        prop_assert!(rt.passed(), "{:?}", rt);
        let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
        prop_assert_eq!(rt.bytes, bytes.len() + newlines);
    }

    #[test]
    fn pushback_then_get_returns_the_pushed_unit(
        data in proptest::collection::vec(any::<u8>(), 1..64),
        pushed in any::<u8>(),
    ) {
        let (_backing, mut buf) = engine_over(data.clone());
        prop_assert_eq!(buf.uflow(), Some(data[0]));
        prop_assert!(buf.pbackfail(Some(pushed)));
        prop_assert_eq!(buf.uflow(), Some(pushed));
        let mut rest = vec![0u8; data.len()];
        let n = buf.xsgetn(&mut rest);
        prop_assert_eq!(&rest[..n], &data[1..]);
    }

    #[test]
    fn seek_lands_on_the_requested_byte(
        data in proptest::collection::vec(any::<u8>(), 1..6000),
        pick in any::<prop::sample::Index>(),
    ) {
        let (_backing, mut buf) = engine_over(data.clone());
        let target = pick.index(data.len());
        let pos = buf.seekoff(target as i64, SeekDir::Begin).unwrap();
        prop_assert_eq!(pos.offset, target as u64);
        prop_assert_eq!(buf.uflow(), Some(data[target]));
        let back = buf.seekoff(-1, SeekDir::End).unwrap();
        prop_assert_eq!(back.offset, data.len() as u64 - 1);
        prop_assert_eq!(buf.uflow(), data.last().copied());
    }
}

#[test]
fn crlf_locale_reads_back_written_newlines() {
    let backing = MemFile::new();
    let mut buf = FileBuf::<u8>::from_raw(RawFile::from_io(backing.clone(), OpenFlags::read_write()));
    buf.imbue(crlf_locale());
    assert_eq!(buf.xsputn(b"a\n\nb"), 4);
    assert!(buf.sync());
    assert_eq!(backing.contents(), b"a\r\n\r\nb");
}
