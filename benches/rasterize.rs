//! Rasterizer benchmarks for both resampling paths.
//! Run: cargo bench

use ascii_reel::rasterizer::{rasterize, GridSize};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma};

fn gradient(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([((x * 255 / width.max(1) + y * 255 / height.max(1)) / 2) as u8])
    })
}

fn bench_rasterize(c: &mut Criterion) {
    let mut group = c.benchmark_group("rasterize");
    group.sample_size(50);

    let sd_source = gradient(480, 360);
    group.bench_function("nearest_480x360_to_160x45", |b| {
        b.iter(|| black_box(rasterize(1, black_box(&sd_source), GridSize::new(160, 45))));
    });

    let thumb_source = gradient(64, 48);
    group.bench_function("bilinear_64x48_to_160x60", |b| {
        b.iter(|| black_box(rasterize(1, black_box(&thumb_source), GridSize::new(160, 60))));
    });

    group.finish();
}

criterion_group!(benches, bench_rasterize);
criterion_main!(benches);
