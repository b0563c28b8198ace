//! Per-unit conversion cost through a bound facility.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use filebuf_harness::fixtures::UnitKind;
use filebuf_harness::roundtrip::{round_trip, sample_units};

const UNITS: usize = 4096;

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    group.throughput(Throughput::Elements(UNITS as u64));

    let narrow = sample_units::<u8>("identity", UNITS, 1).unwrap_or_default();
    group.bench_function(BenchmarkId::new("identity", UnitKind::U8), |b| {
        b.iter(|| black_box(round_trip::<u8>("identity", &narrow)));
    });

    let text = sample_units::<u8>("crlf", UNITS, 2).unwrap_or_default();
    group.bench_function(BenchmarkId::new("crlf", UnitKind::U8), |b| {
        b.iter(|| black_box(round_trip::<u8>("crlf", &text)));
    });

    let wide = sample_units::<u32>("utf8", UNITS, 3).unwrap_or_default();
    group.bench_function(BenchmarkId::new("utf8", UnitKind::U32), |b| {
        b.iter(|| black_box(round_trip::<u32>("utf8", &wide)));
    });

    let shifted = sample_units::<u16>("shift", UNITS, 4).unwrap_or_default();
    group.bench_function(BenchmarkId::new("shift", UnitKind::U16), |b| {
        b.iter(|| black_box(round_trip::<u16>("shift", &shifted)));
    });

    group.finish();
}

criterion_group!(benches, bench_round_trip);
criterion_main!(benches);
