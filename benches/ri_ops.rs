use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use semvec::{
    IndexVectorGenerator, Permutation, PermutationFunction, PermutationKind, RandomIndexing,
    RiConfig,
};

fn bench_index_vectors(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_vectors");
    let generator = IndexVectorGenerator::new(9, 3);

    for length in [512usize, 4000, 20000] {
        group.bench_with_input(BenchmarkId::new("create", length), &length, |bencher, &length| {
            let mut rng = StdRng::seed_from_u64(1);
            bencher.iter(|| black_box(generator.create(black_box(length), &mut rng)))
        });
    }

    let mut rng = StdRng::seed_from_u64(2);
    let a = generator.create(4000, &mut rng).unwrap_or_else(|_| semvec::IndexVector::zero(4000));
    let b = generator.create(4000, &mut rng).unwrap_or_else(|_| semvec::IndexVector::zero(4000));
    group.bench_function("cosine", |bencher| bencher.iter(|| black_box(&a).cosine(black_box(&b))));

    group.finish();
}

fn bench_permutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("permutations");
    let mut rng = StdRng::seed_from_u64(3);
    let v = IndexVectorGenerator::new(9, 3)
        .create(4000, &mut rng)
        .unwrap_or_else(|_| semvec::IndexVector::zero(4000));

    for kind in [PermutationKind::Rotation, PermutationKind::Shuffle] {
        let permutation = Permutation::from_kind(kind, 4000, 11);
        for offset in [-2isize, 1, 5] {
            group.bench_with_input(
                BenchmarkId::new(permutation.name(), offset),
                &offset,
                |bencher, &offset| {
                    bencher.iter(|| black_box(permutation.permute(black_box(&v), offset)))
                },
            );
        }
    }

    group.finish();
}

fn synthetic_document(words: usize, vocabulary: usize, salt: usize) -> Vec<String> {
    (0..words)
        .map(|i| format!("w{}", (i * 7919 + salt * 104729) % vocabulary))
        .collect()
}

fn bench_accumulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("accumulation");
    group.sample_size(20);

    for window in [2usize, 5] {
        let config = RiConfig {
            window_size: window,
            workers: 1,
            ..RiConfig::default()
        }
        .with_seed(5);
        let Ok(engine) = RandomIndexing::new(config) else {
            continue;
        };
        let document = synthetic_document(1000, 500, 0);
        group.bench_with_input(
            BenchmarkId::new("document_1000", window),
            &document,
            |bencher, document| {
                bencher.iter(|| black_box(engine.process_document(black_box(document))))
            },
        );
    }

    group.bench_function("reflective_finalize_50_docs", |bencher| {
        bencher.iter(|| {
            let config = RiConfig {
                vector_length: 1000,
                workers: 2,
                ..RiConfig::reflective()
            }
            .with_seed(5);
            let engine = RandomIndexing::new(config).ok()?;
            for salt in 0..50 {
                engine.process_document(synthetic_document(200, 300, salt)).ok()?;
            }
            black_box(engine.finalize().ok())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_index_vectors, bench_permutations, bench_accumulation);
criterion_main!(benches);
