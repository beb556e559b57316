use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use idvet_merge::{MergeConfig, MergeEngine};
use idvet_types::{Address, ContactDetails, IdGenerator, Password, Person};

fn person(ids: &IdGenerator, i: usize) -> Person {
    let address = Arc::new(Address::new(ids, format!("{i} Main St"), "Springfield", "IL", "62701"));
    Person::new(
        ids.next_identity_id(),
        format!("user{i}"),
        Password::new("pw"),
        format!("Person {}", i % 500),
        30,
        ContactDetails::new(
            Some(format!("555{:04}", i % 700)),
            Some(format!("user{}@x.com", i % 1_000)),
            vec![address],
        ),
    )
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_engine");

    group.bench_function("resolve_into_1000", |b| {
        let ids = IdGenerator::new();
        let engine = MergeEngine::new(MergeConfig::default());
        for i in 0..1_000 {
            engine.resolve_person(person(&ids, i));
        }
        let mut next = 1_000;
        b.iter_batched(
            || {
                next += 1;
                person(&ids, next)
            },
            |p| black_box(engine.resolve_person(p)),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("score_candidates_1000", |b| {
        let ids = IdGenerator::new();
        let engine = MergeEngine::new(MergeConfig::default());
        for i in 0..1_000 {
            engine.resolve_person(person(&ids, i));
        }
        let incoming = person(&ids, 42);
        b.iter(|| black_box(engine.candidates(&incoming)));
    });

    group.finish();
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
