//! Benchmarks for record/replay throughput

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use reel::mode::FixedOverride;
use reel::repository::{HarFileRepository, InMemoryRepository, InteractionRepository};
use reel::transport::Transport;
use reel::{Mode, Recorder};

#[derive(Debug)]
struct StaticTransport;

#[async_trait]
impl Transport for StaticTransport {
    async fn send(&self, request: hyper::Request<Bytes>) -> reel::Result<hyper::Response<Bytes>> {
        let body = format!("{{\"path\":\"{}\"}}", request.uri().path());
        Ok(hyper::Response::builder()
            .header("Content-Type", "application/json")
            .body(Bytes::from(body))
            .unwrap())
    }
}

fn request(index: usize) -> hyper::Request<Bytes> {
    hyper::Request::builder()
        .uri(format!("http://api.example.com/items/{index}"))
        .body(Bytes::new())
        .unwrap()
}

fn recorder(name: &str, mode: Mode, repository: Arc<dyn InteractionRepository>) -> Recorder {
    Recorder::builder(name)
        .mode(mode)
        .mode_override(Box::new(FixedOverride(None)))
        .repository(repository)
        .transport(Arc::new(StaticTransport))
        .build()
        .unwrap()
}

fn bench_record_memory(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("record_memory_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let engine = recorder("bench", Mode::Record, Arc::new(InMemoryRepository::new()));
                for i in 0..10 {
                    black_box(engine.handle(request(i)).await.unwrap());
                }
            });
        });
    });
}

fn bench_record_file(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("record_har_file_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let temp_dir = TempDir::new().unwrap();
                let engine = recorder(
                    "bench",
                    Mode::Record,
                    Arc::new(HarFileRepository::new(temp_dir.path())),
                );
                for i in 0..10 {
                    black_box(engine.handle(request(i)).await.unwrap());
                }
            });
        });
    });
}

fn bench_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("replay");

    for size in [10, 100] {
        let temp_dir = TempDir::new().unwrap();
        let repository: Arc<dyn InteractionRepository> =
            Arc::new(HarFileRepository::new(temp_dir.path()));

        rt.block_on(async {
            let engine = recorder("bench", Mode::Record, Arc::clone(&repository));
            for i in 0..size {
                engine.handle(request(i)).await.unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let engine = recorder("bench", Mode::Replay, Arc::clone(&repository));
                    for i in 0..size {
                        black_box(engine.handle(request(i)).await.unwrap());
                    }
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record_memory, bench_record_file, bench_replay);
criterion_main!(benches);
