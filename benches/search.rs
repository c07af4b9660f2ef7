use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use photosearch::embedding::normalize;
use photosearch::index::{FlatIndex, inner_product};
use rand::prelude::*;

const DIM: usize = 512;

fn random_unit(rng: &mut impl Rng) -> Vec<f32> {
    let v: Vec<f32> = (0..DIM).map(|_| rng.random_range(-1.0..1.0)).collect();
    normalize(v).unwrap()
}

fn bench_inner_product(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let a = random_unit(&mut rng);
    let b = random_unit(&mut rng);
    c.bench_function("inner_product_512", |bench| {
        bench.iter(|| inner_product(black_box(&a), black_box(&b)))
    });
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("FlatIndex");
    let mut rng = StdRng::seed_from_u64(42);
    let query = random_unit(&mut rng);

    // 1000 走串行路径，其余走并行路径
    for n in [1_000, 10_000, 100_000] {
        let mut index = FlatIndex::new(DIM);
        for _ in 0..n {
            index.add(&random_unit(&mut rng)).unwrap();
        }
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("search_top10", n), &index, |b, index| {
            b.iter(|| index.search(black_box(&query), 10).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_inner_product, bench_search);
criterion_main!(benches);
