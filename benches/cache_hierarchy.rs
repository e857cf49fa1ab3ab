//! Benchmarks for the four-level cache hierarchy.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use tokio::runtime::Runtime;

use noesis::domain::models::config::CacheConfig;
use noesis::infrastructure::hashing::generate_cache_key;
use noesis::services::cache::{CacheHierarchy, CacheLevel};

fn bench_cascade_read(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = CacheHierarchy::new(&CacheConfig::default());
    let key = generate_cache_key("bench", &json!({"k": "warm"}));
    rt.block_on(cache.write_to_level(key.clone(), json!({"v": 1}), CacheLevel::L3, None));

    c.bench_function("cascade_read_l3_hit", |b| {
        b.to_async(&rt).iter(|| {
            let cache = &cache;
            let key = &key;
            async move { black_box(cache.read_cache(key, None).await) }
        });
    });

    let miss_key = generate_cache_key("bench", &json!({"k": "cold"}));
    c.bench_function("cascade_read_full_miss", |b| {
        b.to_async(&rt).iter(|| {
            let cache = &cache;
            let key = &miss_key;
            async move { black_box(cache.read_cache(key, None).await) }
        });
    });
}

fn bench_write(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = CacheHierarchy::new(&CacheConfig::default());
    let payload = json!({ "vector": vec![0.1f32; 64] });

    c.bench_function("write_l2", |b| {
        let mut i = 0u64;
        b.to_async(&rt).iter(|| {
            i += 1;
            let key = generate_cache_key("bench_write", &json!({ "i": i }));
            let cache = &cache;
            let payload = payload.clone();
            async move { cache.write_to_level(key, payload, CacheLevel::L2, None).await }
        });
    });
}

criterion_group!(benches, bench_cascade_read, bench_write);
criterion_main!(benches);
