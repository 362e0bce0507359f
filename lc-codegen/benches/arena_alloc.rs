use criterion::{criterion_group, criterion_main, Criterion};
use lc_codegen::arena::next_capacity;

fn bench_arena_growth(c: &mut Criterion) {
    c.bench_function("arena growth sequence to 1MiB", |b| {
        b.iter(|| {
            let mut capacity: u64 = 64;
            while capacity < 1 << 20 {
                capacity = next_capacity(capacity, 1).expect("growth under the 1 GiB cap never fails");
            }
            capacity
        })
    });
}

criterion_group!(benches, bench_arena_growth);
criterion_main!(benches);
