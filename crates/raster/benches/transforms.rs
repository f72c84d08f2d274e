//! Benchmarks for pixel transforms.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pixelforge_raster::{
    composite_grid, detect_format, dominant_colors, pixelate, raster_to_block_svg, rotate, Color,
    CollageParams, Pixmap, Region,
};

fn gradient(w: u32, h: u32) -> Pixmap {
    let mut pm = Pixmap::new(w, h).unwrap();
    for y in 0..h {
        for x in 0..w {
            pm.set_pixel(x, y, Color::rgb((x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8));
        }
    }
    pm
}

fn bench_format_detection(c: &mut Criterion) {
    let jpeg_data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
    let png_data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];

    c.bench_function("detect_jpeg", |b| b.iter(|| detect_format(black_box(&jpeg_data))));
    c.bench_function("detect_png", |b| b.iter(|| detect_format(black_box(&png_data))));
}

fn bench_sampling(c: &mut Criterion) {
    let img = gradient(512, 512);
    c.bench_function("dominant_colors_512", |b| {
        b.iter(|| dominant_colors(black_box(&img), 10, 32, 5))
    });
}

fn bench_transforms(c: &mut Criterion) {
    let img = gradient(512, 384);

    c.bench_function("pixelate_512x384_b10", |b| {
        b.iter(|| pixelate(black_box(&img), &Region::full(), 10))
    });

    c.bench_function("rotate_512x384_30deg", |b| b.iter(|| rotate(black_box(&img), 30.0)));

    let palette = dominant_colors(&img, 4, 32, 8).unwrap();
    c.bench_function("block_svg_512x384_s4", |b| {
        b.iter(|| raster_to_block_svg(black_box(&img), 4, &palette))
    });
}

fn bench_collage(c: &mut Criterion) {
    let images: Vec<_> = (0..4).map(|i| gradient(300 + i * 50, 200)).collect();
    let params = CollageParams { columns: 2, gap_px: 10, cell_size: 200, background: Color::BLACK };

    c.bench_function("collage_4x200", |b| b.iter(|| composite_grid(black_box(&images), &params)));
}

criterion_group!(benches, bench_format_detection, bench_sampling, bench_transforms, bench_collage);
criterion_main!(benches);
