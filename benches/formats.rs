use criterion::{criterion_group, criterion_main, Criterion};
use libcamera_bridge::{pixel_format::known_formats, PixelFormat};
use std::hint::black_box;

pub fn benchmark_pixel_format(c: &mut Criterion) {
    let names: Vec<String> = known_formats().map(|f| f.to_string()).collect();
    let dims = [(640, 480), (1920, 1080), (3840, 2160)];

    let mut group = c.benchmark_group("pixel_format");
    group.bench_function("parse", |b| {
        b.iter(|| {
            for name in &names {
                let _ = black_box(name).parse::<PixelFormat>();
            }
        })
    });
    group.bench_function("display", |b| {
        b.iter(|| known_formats().map(|f| f.to_string()).count())
    });
    for (width, height) in dims {
        group.bench_function(format!("frame_size/{width}x{height}"), |b| {
            b.iter(|| {
                known_formats()
                    .map(|f| f.frame_size(black_box(width), black_box(height), 1).unwrap_or(0))
                    .sum::<u32>()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_pixel_format);
criterion_main!(benches);
