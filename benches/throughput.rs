//! Throughput Benchmark for pollkv
//!
//! This benchmark measures the storage engine and the wire codec
//! under various workloads.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use pollkv::protocol::frame::{encode_request, write_response, HEADER_LEN};
use pollkv::protocol::{parse_request, parse_response, Value};
use pollkv::storage::StorageEngine;

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let mut engine = StorageEngine::new();

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            let value = Bytes::from("small_value");
            engine.set(key, value);
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024)); // 1KB value
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, value.clone());
            i += 1;
        });
    });

    group.bench_function("overwrite", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("hot:{}", i % 1000));
            engine.set(key, Bytes::from("value"));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let mut engine = StorageEngine::new();

    // Pre-populate with data
    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        engine.set(key, value);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes)
fn bench_mixed(c: &mut Criterion) {
    let mut engine = StorageEngine::new();

    // Pre-populate
    for i in 0..10_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        engine.set(key, value);
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                // 20% writes
                let key = Bytes::from(format!("new:{}", i));
                engine.set(key, Bytes::from("value"));
            } else {
                // 80% reads
                let key = format!("key:{}", i % 10_000);
                black_box(engine.get(key.as_bytes()));
            }
            i += 1;
        });
    });

    group.bench_function("set_then_delete", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("tmp:{}", i));
            engine.set(key.clone(), Bytes::from("value"));
            black_box(engine.delete(&key));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark the full key listing
fn bench_keys(c: &mut Criterion) {
    let mut engine = StorageEngine::new();

    for i in 0..3_000 {
        engine.set(Bytes::from(format!("user:{}", i)), Bytes::from("user_data"));
    }

    let mut group = c.benchmark_group("keys");
    group.throughput(Throughput::Elements(engine.len() as u64));

    group.bench_function("keys_all", |b| {
        b.iter(|| {
            black_box(engine.keys().cloned().collect::<Vec<_>>());
        });
    });

    group.finish();
}

/// Benchmark request parsing and response framing
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));

    let mut request = BytesMut::new();
    encode_request(&["set", "key:12345", "some moderately sized value"], &mut request);
    let request = request.freeze();

    group.bench_function("parse_request", |b| {
        b.iter(|| black_box(parse_request(request.slice(HEADER_LEN..)).unwrap()));
    });

    let value = Value::string(Bytes::from("x".repeat(1024)));
    group.bench_function("write_response", |b| {
        b.iter_batched_ref(
            || BytesMut::with_capacity(2048),
            |out| black_box(write_response(out, &value)),
            BatchSize::SmallInput,
        );
    });

    let keys = Value::array(
        (0..1_000)
            .map(|i| Value::string(Bytes::from(format!("key:{}", i))))
            .collect(),
    );
    let mut framed = BytesMut::new();
    write_response(&mut framed, &keys);

    group.bench_function("parse_keys_response", |b| {
        b.iter(|| black_box(parse_response(&framed).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_keys,
    bench_codec,
);

criterion_main!(benches);
