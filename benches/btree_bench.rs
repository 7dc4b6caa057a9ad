//! B+Tree benchmarks.
//!
//! - Insert: sequential keys through repeated `put` versus `bulk_load`
//! - Point read: `get` on a warm cache
//! - Scan: full leaf-chain walk

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pagetree::{AllocatorConfig, BPlusTree, Key, KeyType, PageAllocator, PageCache, RecordId};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn new_tree(cache_pages: usize, order: usize) -> (BPlusTree, TempDir) {
    let dir = tempdir().unwrap();
    let allocator = PageAllocator::create(
        dir.path().join("bench.db"),
        Arc::new(PageCache::new(cache_pages)),
        AllocatorConfig::default().with_durable(false),
    )
    .unwrap();
    (BPlusTree::create(allocator, KeyType::Int, order).unwrap(), dir)
}

fn entries(count: i32) -> impl Iterator<Item = (Key, RecordId)> {
    (0..count).map(|i| (Key::Int(i), RecordId::new(i as u32, (i % 100) as u16)))
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_insert");

    for count in [1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("put", count), &count, |b, &count| {
            b.iter_with_setup(
                || new_tree(256, 64),
                |(mut tree, dir)| {
                    for (key, rid) in entries(count) {
                        tree.put(key, rid).unwrap();
                    }
                    (tree, dir)
                },
            );
        });

        group.bench_with_input(BenchmarkId::new("bulk_load", count), &count, |b, &count| {
            b.iter_with_setup(
                || new_tree(256, 64),
                |(mut tree, dir)| {
                    tree.bulk_load(entries(count), 0.75).unwrap();
                    (tree, dir)
                },
            );
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let (mut tree, _dir) = new_tree(1024, 64);
    tree.bulk_load(entries(10_000), 1.0).unwrap();

    c.bench_function("btree_get_cached", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % 10_000;
            black_box(tree.get(&Key::Int(i)).unwrap());
        });
    });
}

fn bench_scan(c: &mut Criterion) {
    let (mut tree, _dir) = new_tree(1024, 64);
    tree.bulk_load(entries(10_000), 1.0).unwrap();

    let mut group = c.benchmark_group("btree_scan");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("scan_all", |b| {
        b.iter(|| black_box(tree.scan_all().unwrap().count()));
    });
    group.bench_function("scan_greater_equal_half", |b| {
        b.iter(|| black_box(tree.scan_greater_equal(&Key::Int(5_000)).unwrap().count()));
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_get, bench_scan);
criterion_main!(benches);
