//! Benchmarks for cache-key generation over canonical payloads.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use noesis::infrastructure::hashing::{canonical_json_bytes, generate_cache_key};

fn small_payload() -> serde_json::Value {
    json!({ "text": "urgent reboot required", "lang": "en" })
}

fn nested_payload() -> serde_json::Value {
    json!({
        "tool_id": "web.search",
        "args": {
            "query": "quarterly filings for the last closed business week",
            "filters": { "site": "sec.gov", "max_results": 25 },
            "rerank": true,
        },
        "trace": { "hops": [1, 2, 3, 4, 5], "labels": ["a", "b", "c"] },
    })
}

fn bench_generate_cache_key(c: &mut Criterion) {
    let small = small_payload();
    let nested = nested_payload();

    c.bench_function("cache_key_small", |b| {
        b.iter(|| generate_cache_key(black_box("classify"), black_box(&small)));
    });
    c.bench_function("cache_key_nested", |b| {
        b.iter(|| generate_cache_key(black_box("tool_output"), black_box(&nested)));
    });
}

fn bench_canonicalization(c: &mut Criterion) {
    let nested = nested_payload();
    c.bench_function("canonical_bytes_nested", |b| {
        b.iter(|| canonical_json_bytes(black_box(&nested)));
    });
}

criterion_group!(benches, bench_generate_cache_key, bench_canonicalization);
criterion_main!(benches);
