//! Header stamping and instrumentation parsing throughput
//!
//! Header encoding runs once per datagram on every periodic port, so it has
//! to stay in the tens of nanoseconds.

use codec::{HeaderEncoder, HeaderFlags, Request, HEADER_SIZE};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_header_encode(c: &mut Criterion) {
    let mut encoder = HeaderEncoder::new(17, HeaderFlags::ALL);
    let mut buffer = vec![0u8; HEADER_SIZE + 256];

    c.bench_function("header_encode_all_fields", |b| {
        b.iter(|| {
            encoder
                .encode(black_box(&mut buffer), black_box(1_700_000_000_000_000), black_box(42))
                .ok()
        })
    });
}

fn bench_request_parse(c: &mut Criterion) {
    let frame = Request::Synchro { steps: 4 }.encode();

    c.bench_function("instrumentation_request_parse", |b| {
        b.iter(|| Request::parse(black_box(&frame)).ok())
    });
}

criterion_group!(benches, bench_header_encode, bench_request_parse);
criterion_main!(benches);
