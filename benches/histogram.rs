use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use framesearch::histogram::{ColorSpace, HistogramExtractor, histogram_distance};
use framesearch::store::{FeatureStore, Shape};
use image::{Rgba, RgbaImage};
use ndarray::prelude::*;
use rand::prelude::*;

fn random_histogram(rng: &mut impl Rng, shape: Shape) -> Array3<f32> {
    let mut hist = Array3::from_shape_fn(shape.dim(), |_| rng.random::<f32>());
    for mut cell in hist.lanes_mut(Axis(2)) {
        let sum = cell.sum();
        cell.mapv_inplace(|x| x / sum);
    }
    hist
}

fn bench_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("Distance");
    let mut rng = rand::rng();
    let shape = Shape::new(4, 4, 64);
    let stored = random_histogram(&mut rng, shape);
    let query = random_histogram(&mut rng, shape);
    let mask = Array3::from_elem((4, 4, 1), 1f32);
    let masked = ndarray::concatenate(Axis(2), &[query.view(), mask.view()]).unwrap();

    group.bench_function("histogram_distance", |b| {
        b.iter(|| histogram_distance(black_box(stored.view()), black_box(query.view())))
    });
    group.bench_function("histogram_distance_masked", |b| {
        b.iter(|| histogram_distance(black_box(stored.view()), black_box(masked.view())))
    });
    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("Extract");
    let image = RgbaImage::from_fn(640, 360, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]));
    group.throughput(Throughput::Elements((image.width() * image.height()) as u64));
    for color_space in [ColorSpace::Lab, ColorSpace::Rgb] {
        let extractor = HistogramExtractor::new(Shape::new(4, 4, 64), color_space).unwrap();
        group.bench_function(format!("{color_space:?}"), |b| b.iter(|| extractor.extract_masked(black_box(&image)).unwrap()));
    }
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scan");
    let dir = tempfile::tempdir().unwrap();
    let shape = Shape::new(4, 4, 64);
    let store = FeatureStore::initialize(dir.path().join("bench.mdb"), shape, ColorSpace::Lab).unwrap();

    let mut rng = rand::rng();
    let vectors = (0..20000).map(|_| random_histogram(&mut rng, shape)).collect::<Vec<_>>();
    store.append_batch(vectors.iter().map(|v| v.view())).unwrap();
    let query = random_histogram(&mut rng, shape);

    group.sample_size(10);
    group.throughput(Throughput::Elements(vectors.len() as u64));
    group.bench_function("scan_and_rank_20k", |b| {
        b.iter(|| store.scan_and_rank(query.view(), histogram_distance, 1000, None).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_distance, bench_extract, bench_scan);
criterion_main!(benches);
