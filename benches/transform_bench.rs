use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Cursor;
use xcode::header::detect_reader;
use xcode::{encode_bytes, encode_stream, transform, EncryptionKey};

fn bench_transform(c: &mut Criterion) {
    let data = vec![42u8; 1024 * 1024];
    let key = EncryptionKey::default();

    c.bench_function("transform_1mb", |b| b.iter(|| transform(&key, black_box(&data))));
    c.bench_function("encode_stream_1mb", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(data.len() + 32);
            encode_stream(&key, Cursor::new(black_box(&data)), data.len() as u64, &mut out).unwrap();
            out
        })
    });
}

fn bench_detect(c: &mut Criterion) {
    let key = EncryptionKey::default();
    let small = encode_bytes(&key, b"x");
    let large = encode_bytes(&key, &vec![7u8; 8 * 1024 * 1024]);

    // Both should cost the same: detection only reads the header.
    c.bench_function("detect_small", |b| b.iter(|| detect_reader(Cursor::new(black_box(&small))).unwrap()));
    c.bench_function("detect_8mb", |b| b.iter(|| detect_reader(Cursor::new(black_box(&large))).unwrap()));
}

criterion_group!(benches, bench_transform, bench_detect);
criterion_main!(benches);
