use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use notebridge::model::{Block, BlockDraft, ImportItem, NoteDraft, SourceNote};
use notebridge::store::Graph;
use notebridge::MappingCache;
use std::collections::BTreeSet;

fn make_mapping(size: usize) -> MappingCache {
    let mut mapping = MappingCache::new();
    for i in 0..size {
        mapping.upsert(format!("r{}", i), format!("s{}", i));
    }
    mapping
}

fn make_page(i: usize) -> SourceNote {
    SourceNote {
        uid: format!("p{}", i),
        title: format!("Page {}", i),
        children: vec![Block {
            uid: format!("b{}", i),
            string: format!("links to [[Page {}]] and ((b{}))", i / 2, i / 3),
            children: vec![],
            refs: vec![],
        }],
        page_refs: BTreeSet::new(),
        edit_time: None,
    }
}

fn bench_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapping_upsert");

    for size in [100, 500, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| make_mapping(black_box(size)));
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapping_lookup");

    for size in [100, 500, 1000, 5000].iter() {
        let mapping = make_mapping(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    black_box(mapping.lookup_by_source(&format!("r{}", i)));
                    black_box(mapping.lookup_by_sink(&format!("s{}", i)));
                }
            });
        });
    }
    group.finish();
}

fn bench_cache_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapping_parse");

    for size in [100, 1000, 5000].iter() {
        let raw = make_mapping(*size).serialize();
        group.bench_with_input(BenchmarkId::from_parameter(size), &raw, |b, raw| {
            b.iter(|| MappingCache::parse(black_box(raw)).unwrap());
        });
    }
    group.finish();
}

fn bench_graph_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_merge");

    for page_count in [100, 500, 1000].iter() {
        let graph = Graph::new((0..*page_count).map(make_page).collect());
        let batch: Vec<ImportItem> = (0..10)
            .map(|i| ImportItem::Update {
                uid: format!("p{}", i),
                draft: NoteDraft {
                    title: format!("Renamed {}", i),
                    children: vec![BlockDraft::text("rewritten")],
                },
                origin: None,
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(page_count),
            page_count,
            |b, _| {
                b.iter(|| {
                    let mut graph = graph.clone();
                    let mut n = 0usize;
                    graph
                        .merge(black_box(&batch), || {
                            n += 1;
                            format!("new{}", n)
                        })
                        .unwrap()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_upsert,
    bench_lookup,
    bench_cache_roundtrip,
    bench_graph_merge
);
criterion_main!(benches);
