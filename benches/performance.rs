//! Performance benchmarks for the node store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use grove::{ChangeOp, ScalarValue, Store};

fn populated_store(children: usize) -> (Store, grove::Revision) {
    let store = Store::in_memory(0).unwrap();
    store
        .commit("/", &[ChangeOp::add("/p", vec![])], None, None)
        .unwrap();
    let ops: Vec<ChangeOp> = (0..children)
        .map(|i| {
            ChangeOp::add(
                format!("/p/n{:05}", i),
                vec![("idx".to_string(), ScalarValue::from(i as i64))],
            )
        })
        .collect();
    let rev = store.commit("/p", &ops, None, None).unwrap();
    (store, rev)
}

/// Commit throughput for single-node commits.
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");

    group.bench_function("add_single_node", |b| {
        let store = Store::in_memory(0).unwrap();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            store
                .commit(
                    "/",
                    &[ChangeOp::add(
                        format!("/n{}", i),
                        vec![("v".to_string(), ScalarValue::from(i as i64))],
                    )],
                    None,
                    None,
                )
                .unwrap()
        });
    });

    group.finish();
}

/// Node reads, cold vs. cache-warmed.
fn bench_get_node(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_node");
    let (store, rev) = populated_store(1000);

    group.bench_function("warm_cache", |b| {
        b.iter(|| black_box(store.get_node("/p/n00500", rev).unwrap()));
    });

    group.bench_function("cold_read", |b| {
        let mut i = 0usize;
        b.iter(|| {
            // Distinct revisions defeat the (path, revision) cache.
            i += 1;
            let fresh = store.new_revision();
            black_box(store.get_node(&format!("/p/n{:05}", i % 1000), fresh).unwrap())
        });
    });

    group.finish();
}

/// Paging through child listings of varying fan-out.
fn bench_read_children(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_children");

    for fan_out in [100, 1000, 5000] {
        let (store, rev) = populated_store(fan_out);
        group.bench_with_input(BenchmarkId::new("full_scan", fan_out), &fan_out, |b, _| {
            b.iter(|| black_box(store.read_children("/p", None, rev, usize::MAX).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("paged_100", fan_out), &fan_out, |b, _| {
            b.iter(|| {
                let mut token: Option<String> = None;
                loop {
                    let page = store
                        .read_children("/p", token.as_deref(), rev, 100)
                        .unwrap();
                    if !page.has_more {
                        break;
                    }
                    token = page
                        .children
                        .last()
                        .map(|path| grove::types::node_name(path).to_string());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_commit, bench_get_node, bench_read_children);
criterion_main!(benches);
