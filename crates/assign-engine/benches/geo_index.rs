use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fire_assign_engine::prelude::*;
use fire_assign_engine::{AssignmentEngineBuilder, GeoIndex, GeoPoint};
use std::sync::Arc;
use tokio::runtime::Runtime;

const OFFICE_COUNTS: [usize; 4] = [16, 128, 1024, 8192];
const ASSIGN_BATCH: usize = 500;

fn grid_offices(count: usize) -> Vec<Office> {
    (0..count)
        .map(|i| Office {
            id: OfficeId::from(format!("office-{:05}", i)),
            name: format!("Office {}", i),
            address: String::new(),
            location: GeoPoint::new(
                40.0 + (i % 97) as f64 * 0.1,
                50.0 + (i / 97) as f64 * 0.1,
            ),
        })
        .collect()
}

fn bench_nearest_offices(c: &mut Criterion) {
    let mut group = c.benchmark_group("nearest_offices");
    let query = GeoPoint::new(43.238949, 76.889709);

    for count in OFFICE_COUNTS {
        let index = GeoIndex::new(grid_offices(count));
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("top_3", count), &index, |b, index| {
            b.iter(|| index.nearest_offices(black_box(query), 3).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("ranked", count), &index, |b, index| {
            b.iter(|| index.ranked(black_box(query)).unwrap())
        });
    }
    group.finish();
}

fn bench_assign(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("assign");
    group.sample_size(20);
    group.throughput(Throughput::Elements(ASSIGN_BATCH as u64));

    group.bench_function("memory_store_batch", |b| {
        b.iter(|| {
            rt.block_on(async {
                let offices = grid_offices(128);
                let managers: Vec<Manager> = offices
                    .iter()
                    .flat_map(|o| {
                        (0..4).map(move |n| Manager {
                            id: ManagerId::from(format!("{}-m{}", o.id, n)),
                            name: String::new(),
                            position: "Специалист".to_string(),
                            office_id: o.id.clone(),
                            skills: ["billing".to_string()].into_iter().collect(),
                            current_load: n,
                        })
                    })
                    .collect();
                let store = Arc::new(MemoryStore::with_reference(offices, managers));
                let engine = AssignmentEngineBuilder::new()
                    .with_backend(store)
                    .build()
                    .await
                    .unwrap();

                for i in 0..ASSIGN_BATCH {
                    let ticket = Ticket::new(format!("t-{}", i), "Mass");
                    let guid = format!("t-{}", i);
                    let analysis = AiAnalysis::new(format!("an-{}", i), guid, "billing", 3)
                        .with_geo_point(GeoPoint::new(40.0 + (i % 50) as f64 * 0.2, 51.0));
                    black_box(engine.assign(&ticket, &analysis).await.unwrap());
                }
            })
        })
    });
    group.finish();
}

criterion_group!(benches, bench_nearest_offices, bench_assign);
criterion_main!(benches);
