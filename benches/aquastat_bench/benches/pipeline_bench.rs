//! Ingestion and sweep benchmarks
//!
//! Measures the hot path of the stat pipeline against the in-memory stores.

use aquastat::registry::{normalize_path, EndpointId};
use aquastat::snapshot::agent_dedup_key;
use aquastat::{
    InMemoryCounterStore, InMemoryDurableStore, Observation, StatIngestEngine, StatReporter,
    StatSynchronizer,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::Method;
use std::sync::Arc;

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");

    for path in ["/farms", "/farms/12345", "/ponds/7/", "/barns"] {
        group.bench_with_input(BenchmarkId::new("resolve", path), path, |b, path| {
            b.iter(|| EndpointId::resolve(&normalize_path(black_box(path))))
        });
    }

    group.bench_function("dedup_key", |b| {
        let ua = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";
        b.iter(|| agent_dedup_key(EndpointId::FARMS, &Method::GET, black_box(ua)))
    });

    group.finish();
}

fn bench_ingest(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("ingest");

    group.bench_function("repeat_agent", |b| {
        let engine = StatIngestEngine::new(Arc::new(InMemoryCounterStore::new()));
        let obs = Observation::new("/farms/42", "GET", "curl/8.0", 200);
        b.iter(|| rt.block_on(engine.ingest(black_box(&obs))))
    });

    group.bench_function("new_agent", |b| {
        let engine = StatIngestEngine::new(Arc::new(InMemoryCounterStore::new()));
        let mut n: u64 = 0;
        b.iter(|| {
            n += 1;
            let obs = Observation::new("/ponds", "POST", format!("agent-{}", n), 201);
            rt.block_on(engine.ingest(&obs))
        })
    });

    group.bench_function("unknown_path", |b| {
        let engine = StatIngestEngine::new(Arc::new(InMemoryCounterStore::new()));
        let obs = Observation::new("/stat", "GET", "curl/8.0", 200);
        b.iter(|| rt.block_on(engine.ingest(black_box(&obs))))
    });

    group.finish();
}

fn bench_sweeps(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let counters = Arc::new(InMemoryCounterStore::new());
    let durable = Arc::new(InMemoryDurableStore::new());
    let engine = StatIngestEngine::new(counters.clone());
    rt.block_on(async {
        for (path, method) in [
            ("/farms", "GET"),
            ("/farms", "POST"),
            ("/ponds", "PUT"),
            ("/ponds", "DELETE"),
        ] {
            engine
                .ingest(&Observation::new(path, method, "bench", 200))
                .await;
        }
    });

    let sync = StatSynchronizer::new(counters.clone(), durable.clone());
    let reporter = StatReporter::new(counters, durable);

    let mut group = c.benchmark_group("sweeps");
    group.bench_function("backup", |b| b.iter(|| rt.block_on(sync.backup())));
    group.bench_function("migrate", |b| b.iter(|| rt.block_on(sync.migrate())));
    group.bench_function("report", |b| {
        b.iter(|| rt.block_on(reporter.generate_report()))
    });
    group.finish();
}

criterion_group!(benches, bench_routing, bench_ingest, bench_sweeps);
criterion_main!(benches);
