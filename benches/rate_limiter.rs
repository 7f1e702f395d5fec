//! # Rate Limiter Benchmarks
//!
//! Admission cost per policy, under contention, and through the keyed limiter.
//!
//! Run with: `cargo bench --bench rate_limiter`

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use sluice::{KeyedRateLimiter, Policy, RateLimiterBuilder, RateLimiterConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Benchmark single-threaded admission for each policy
fn bench_try_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("try_acquire");
    group.throughput(Throughput::Elements(1));

    for policy in Policy::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(policy), &policy, |b, &policy| {
            // Large enough that the hot loop stays on the admitting path
            let limiter = RateLimiterBuilder::new()
                .policy(policy)
                .max_requests(u32::MAX)
                .window(Duration::from_secs(3600))
                .build()
                .unwrap();
            b.iter(|| std::hint::black_box(limiter.try_acquire()));
        });
    }

    group.finish();
}

/// Benchmark the refusing path, which is what an overloaded service sees
fn bench_try_acquire_refused(c: &mut Criterion) {
    let mut group = c.benchmark_group("try_acquire_refused");

    for policy in Policy::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(policy), &policy, |b, &policy| {
            let limiter = RateLimiterBuilder::new()
                .policy(policy)
                .max_requests(100)
                .window(Duration::from_secs(3600))
                .build()
                .unwrap();
            while limiter.try_acquire() {}

            b.iter(|| std::hint::black_box(limiter.try_acquire()));
        });
    }

    group.finish();
}

/// Benchmark sliding window cost as the log grows
fn bench_sliding_window_log_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window_log_size");

    for size in [10u32, 1_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let limiter = RateLimiterBuilder::new()
                .policy(Policy::SlidingWindow)
                .max_requests(size)
                .window(Duration::from_secs(3600))
                .build()
                .unwrap();

            b.iter_batched(
                || limiter.reset(),
                |_| {
                    for _ in 0..size {
                        std::hint::black_box(limiter.try_acquire());
                    }
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// Benchmark concurrent admission
fn bench_concurrent_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_acquire");

    for num_threads in [2, 4, 8] {
        group.throughput(Throughput::Elements(num_threads as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_threads", num_threads)),
            &num_threads,
            |b, &num_threads| {
                let limiter = RateLimiterBuilder::new()
                    .policy(Policy::TokenBucket)
                    .max_requests(1_000_000)
                    .window(Duration::from_secs(1))
                    .build_shared()
                    .unwrap();

                b.iter_custom(|iters| {
                    let mut total_duration = Duration::ZERO;

                    for _ in 0..iters {
                        limiter.reset();
                        let start = std::time::Instant::now();

                        let handles: Vec<_> = (0..num_threads)
                            .map(|_| {
                                let limiter = limiter.clone();
                                thread::spawn(move || {
                                    for _ in 0..1000 {
                                        limiter.try_acquire();
                                    }
                                })
                            })
                            .collect();

                        for handle in handles {
                            handle.join().unwrap();
                        }

                        total_duration += start.elapsed();
                    }

                    total_duration
                });
            },
        );
    }

    group.finish();
}

/// Benchmark blocking acquirers handing admissions to each other
fn bench_blocking_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocking_handoff");
    group.sample_size(10);

    group.bench_function("token_bucket_4_threads", |b| {
        // 10 000 per second, so 400 admissions take about 40ms once drained
        let limiter = RateLimiterBuilder::new()
            .policy(Policy::TokenBucket)
            .max_requests(100)
            .window(Duration::from_millis(10))
            .build_shared()
            .unwrap();

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let limiter = limiter.clone();
                    thread::spawn(move || {
                        for _ in 0..100 {
                            limiter.acquire();
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }
        });
    });

    group.finish();
}

/// Benchmark metrics snapshots
fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");
    let limiter = RateLimiterBuilder::new().max_requests(1000).build().unwrap();
    for _ in 0..500 {
        limiter.try_acquire();
    }

    group.bench_function("snapshot", |b| {
        b.iter(|| std::hint::black_box(limiter.metrics()));
    });

    group.bench_function("health_status", |b| {
        b.iter(|| std::hint::black_box(limiter.metrics().health_status()));
    });

    group.finish();
}

/// Benchmark keyed limiter lookups
fn bench_keyed(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed");
    let config = RateLimiterConfig::new(Policy::FixedWindow, 1_000_000, Duration::from_secs(3600));

    group.bench_function("get_limiter", |b| {
        let keyed = KeyedRateLimiter::new(config.clone()).unwrap();
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));

        b.iter(|| std::hint::black_box(keyed.get_limiter(&ip)));
    });

    group.bench_function("try_acquire_key", |b| {
        let keyed = KeyedRateLimiter::new(config.clone()).unwrap();
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));

        b.iter(|| std::hint::black_box(keyed.try_acquire(&ip)));
    });

    group.bench_function("many_keys", |b| {
        let keyed = KeyedRateLimiter::new(config.clone()).unwrap();
        let mut counter = 0u8;

        b.iter(|| {
            counter = counter.wrapping_add(1);
            let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, counter));
            std::hint::black_box(keyed.try_acquire(&ip))
        });
    });

    group.finish();
}

/// Benchmark keyed limiter cleanup
fn bench_keyed_cleanup(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_cleanup");

    group.bench_function("cleanup_100_keys", |b| {
        let keyed = KeyedRateLimiter::with_cleanup_settings(
            RateLimiterConfig::per_second(100),
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
        .unwrap();

        b.iter_batched(
            || {
                for i in 0..100u32 {
                    keyed.get_limiter(&i);
                }
                thread::sleep(Duration::from_millis(5));
            },
            |_| keyed.cleanup(),
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_try_acquire,
    bench_try_acquire_refused,
    bench_sliding_window_log_size,
    bench_concurrent_acquire,
    bench_blocking_handoff,
    bench_metrics,
    bench_keyed,
    bench_keyed_cleanup,
);

criterion_main!(benches);
