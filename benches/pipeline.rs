use criterion::{black_box, criterion_group, criterion_main, Criterion};

use delfos::audio::apply_gain_in_place;
use delfos::codec::{encode_frame, PcmEncoder};
use delfos::constants::DEFAULT_FRAME_LENGTH;

fn frame() -> Vec<i16> {
    (0..DEFAULT_FRAME_LENGTH)
        .map(|i| ((i as f64 * 0.05).sin() * 12000.0) as i16)
        .collect()
}

fn bench_gain(c: &mut Criterion) {
    let source = frame();
    let mut samples = source.clone();

    c.bench_function("gain_512_x4", |b| {
        b.iter(|| {
            samples.copy_from_slice(&source);
            apply_gain_in_place(black_box(&mut samples), black_box(4.0));
        })
    });
}

fn bench_encode(c: &mut Criterion) {
    let samples = frame();
    let mut encoder = PcmEncoder::new(DEFAULT_FRAME_LENGTH);

    c.bench_function("encode_512_reused", |b| {
        b.iter(|| black_box(encoder.encode(black_box(&samples))).len())
    });
    c.bench_function("encode_512_alloc", |b| {
        b.iter(|| encode_frame(black_box(&samples)))
    });
}

fn bench_frame_pipeline(c: &mut Criterion) {
    let source = frame();
    let mut samples = source.clone();
    let mut encoder = PcmEncoder::new(DEFAULT_FRAME_LENGTH);

    c.bench_function("gain_then_encode_512", |b| {
        b.iter(|| {
            samples.copy_from_slice(&source);
            apply_gain_in_place(&mut samples, black_box(2.5));
            black_box(encoder.encode(&samples)).len()
        })
    });
}

criterion_group!(benches, bench_gain, bench_encode, bench_frame_pipeline);
criterion_main!(benches);
