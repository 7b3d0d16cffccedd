//! Benchmarks for trellis-core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::{computed, state, Computed, EffectQueue};

// =============================================================================
// STATE BENCHMARKS
// =============================================================================

fn bench_state_get(c: &mut Criterion) {
    let s = state(42i32);
    c.bench_function("state_get", |b| b.iter(|| black_box(s.get())));
}

fn bench_state_set(c: &mut Criterion) {
    let s = state(0i32);
    let mut i = 0i32;
    c.bench_function("state_set", |b| {
        b.iter(|| {
            s.set(black_box(i)).unwrap();
            i = i.wrapping_add(1);
        })
    });
}

fn bench_state_set_same_value(c: &mut Criterion) {
    let s = state(42i32);
    c.bench_function("state_set_same_value", |b| {
        b.iter(|| s.set(black_box(42)).unwrap())
    });
}

// =============================================================================
// COMPUTED BENCHMARKS
// =============================================================================

fn bench_computed_get_cached(c: &mut Criterion) {
    let s = state(42i32);
    let d = computed({
        let s = s.clone();
        move || Ok(s.get() * 2)
    });
    d.get().unwrap();

    c.bench_function("computed_get_cached", |b| b.iter(|| black_box(d.get())));
}

fn bench_computed_get_dirty(c: &mut Criterion) {
    let s = state(0i32);
    let d = computed({
        let s = s.clone();
        move || Ok(s.get() * 2)
    });

    let mut i = 0i32;
    c.bench_function("computed_get_dirty", |b| {
        b.iter(|| {
            s.set(i).unwrap();
            i = i.wrapping_add(1);
            black_box(d.get())
        })
    });
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");

    for depth in [1, 5, 10, 20] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let s = state(1i32);

            let mut current: Computed<i32> = {
                let s = s.clone();
                computed(move || Ok(s.get() + 1))
            };
            for _ in 1..depth {
                let prev = current.clone();
                current = computed(move || Ok(prev.get()? + 1));
            }

            let mut i = 0i32;
            b.iter(|| {
                s.set(black_box(i)).unwrap();
                i = i.wrapping_add(1);
                black_box(current.get())
            })
        });
    }

    group.finish();
}

/// A change absorbed halfway down a chain: the tail never recomputes.
fn bench_computed_chain_absorbed(c: &mut Criterion) {
    let s = state(1i32);
    let sign = computed({
        let s = s.clone();
        move || Ok(s.get().signum())
    });
    let mut current = sign.clone();
    for _ in 0..10 {
        let prev = current.clone();
        current = computed(move || Ok(prev.get()? + 1));
    }
    current.get().unwrap();

    let mut i = 1i32;
    c.bench_function("computed_chain_absorbed", |b| {
        b.iter(|| {
            s.set(i).unwrap();
            i = i % 1000 + 1;
            black_box(current.get())
        })
    });
}

// =============================================================================
// EFFECT BENCHMARKS
// =============================================================================

fn bench_effect_trigger(c: &mut Criterion) {
    let queue = EffectQueue::new();
    let s = state(0i32);
    let _e = queue.effect({
        let s = s.clone();
        move || {
            black_box(s.get());
            Ok(())
        }
    });
    queue.flush().unwrap();

    let mut i = 0i32;
    c.bench_function("effect_trigger", |b| {
        b.iter(|| {
            s.set(i).unwrap();
            i = i.wrapping_add(1);
            queue.flush().unwrap()
        })
    });
}

fn bench_state_computed_effect(c: &mut Criterion) {
    let queue = EffectQueue::new();
    let count = state(0i32);
    let doubled = computed({
        let count = count.clone();
        move || Ok(count.get() * 2)
    });
    let _e = queue.effect({
        let doubled = doubled.clone();
        move || {
            black_box(doubled.get()?);
            Ok(())
        }
    });
    queue.flush().unwrap();

    let mut i = 0i32;
    c.bench_function("state_computed_effect", |b| {
        b.iter(|| {
            count.set(i).unwrap();
            i = i.wrapping_add(1);
            queue.flush().unwrap()
        })
    });
}

// =============================================================================
// STRESS TESTS
// =============================================================================

fn bench_many_states(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_states");

    for count in [100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("create", count), &count, |b, &count| {
            b.iter(|| {
                let states: Vec<_> = (0..count).map(state).collect();
                black_box(states)
            })
        });
    }

    group.finish();
}

fn bench_many_effects(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_effects");

    for count in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("trigger", count), &count, |b, &count| {
            let queue = EffectQueue::new();
            let s = state(0i32);

            let effects: Vec<_> = (0..count)
                .map(|_| {
                    let s = s.clone();
                    queue.effect(move || {
                        black_box(s.get());
                        Ok(())
                    })
                })
                .collect();
            queue.flush().unwrap();

            let mut i = 0i32;
            b.iter(|| {
                s.set(i).unwrap();
                i = i.wrapping_add(1);
                queue.flush().unwrap()
            });

            for effect in effects {
                effect.dispose();
            }
        });
    }

    group.finish();
}

fn bench_wide_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_in");

    for width in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("width", width), &width, |b, &width| {
            let leaves: Vec<_> = (0..width).map(|_| state(0i64)).collect();
            let total = computed({
                let leaves = leaves.clone();
                move || Ok(leaves.iter().map(|leaf| leaf.get()).sum::<i64>())
            });
            total.get().unwrap();

            let mut i = 0i64;
            b.iter(|| {
                leaves[0].set(i).unwrap();
                i += 1;
                black_box(total.get())
            });
        });
    }

    group.finish();
}

// =============================================================================
// CRITERION SETUP
// =============================================================================

criterion_group!(
    state_benches,
    bench_state_get,
    bench_state_set,
    bench_state_set_same_value,
);

criterion_group!(
    computed_benches,
    bench_computed_get_cached,
    bench_computed_get_dirty,
    bench_computed_chain,
    bench_computed_chain_absorbed,
);

criterion_group!(effect_benches, bench_effect_trigger, bench_state_computed_effect);

criterion_group!(stress_benches, bench_many_states, bench_many_effects, bench_wide_fan_in);

criterion_main!(state_benches, computed_benches, effect_benches, stress_benches);
