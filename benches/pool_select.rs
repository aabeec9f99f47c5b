//! 服务器池选择与主机缓存的性能基准
//!
//! 运行: `cargo bench --bench pool_select`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rat_failover_dns::{HostCache, SelectionStrategy, ServerPool};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// 生成 `count` 个随机的公网服务器地址
fn random_servers(count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            // 1.0.0.0/8 到 9.0.0.0/8 均为公网段
            Ipv4Addr::new(fastrand::u8(1..=9), fastrand::u8(..), fastrand::u8(..), fastrand::u8(1..))
                .to_string()
        })
        .collect()
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_select");

    for strategy in [
        SelectionStrategy::Random,
        SelectionStrategy::RoundRobin,
        SelectionStrategy::TimeSliced,
    ] {
        for size in [10usize, 1000] {
            let pool = ServerPool::new(strategy, 30, Duration::from_secs(900));
            pool.load(random_servers(size));

            group.bench_with_input(BenchmarkId::new(strategy.to_string(), size), &pool, |b, pool| {
                b.iter(|| black_box(pool.select()))
            });
        }
    }

    group.finish();
}

fn bench_mark_cycle(c: &mut Criterion) {
    let pool = ServerPool::new(SelectionStrategy::RoundRobin, 30, Duration::from_secs(900));
    pool.load(random_servers(100));

    c.bench_function("select_mark_success", |b| {
        b.iter(|| {
            if let Ok(handle) = pool.select() {
                pool.mark_success(black_box(&handle));
            }
        })
    });
}

fn bench_cache(c: &mut Criterion) {
    let cache = HostCache::new(4096, Duration::from_secs(300));
    let hosts: Vec<String> = (0..4096).map(|i| format!("host{}.example.com", i)).collect();
    let addrs = vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))];
    for host in &hosts {
        cache.put(host, addrs.clone());
    }

    c.bench_function("cache_get_hit", |b| {
        b.iter(|| black_box(cache.get(&hosts[fastrand::usize(..hosts.len())])))
    });

    c.bench_function("cache_put_full", |b| {
        b.iter(|| cache.put(&format!("new{}.example.com", fastrand::u32(..)), addrs.clone()))
    });
}

criterion_group!(benches, bench_select, bench_mark_cycle, bench_cache);
criterion_main!(benches);
