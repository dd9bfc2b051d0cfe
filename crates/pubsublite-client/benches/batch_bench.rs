//! Publisher Performance Benchmarks
//!
//! ## Benchmarks
//!
//! ### 1. Batch Assembly (`bench_batch_assembly`)
//! - Appends messages to a `BatchAssembler` and seals the remainder
//! - Tests different payload sizes
//!
//! ### 2. Routing (`bench_routing`)
//! - Keyed (SHA-256) vs unkeyed (round-robin) partition selection
//!
//! ### 3. End-to-end publish (`bench_publish_in_memory`)
//! - Publishes and awaits 1000 messages through the in-memory transport
//!
//! ## Running
//!
//! ```bash
//! cargo bench -p pubsublite-client --bench batch_bench
//! cargo bench -p pubsublite-client --bench batch_bench routing
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pubsublite_admin::{AdminClient, InMemoryAdminClient, TopicConfig};
use pubsublite_client::batching::PendingMessage;
use pubsublite_client::testing::InMemoryTransport;
use pubsublite_client::{
    BatchAssembler, BatchingOptions, Message, PubSubMessage, PublisherConnection,
    PublisherOptions, RoutingPolicy, TopicPath,
};
use std::sync::Arc;
use std::time::Duration;

fn bench_batch_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_assembly");

    for size in [64usize, 1024, 16 * 1024] {
        let message = PubSubMessage::new(vec![b'x'; size]).with_key("key");
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| {
                let mut assembler = BatchAssembler::new(BatchingOptions::default());
                let mut handles = Vec::with_capacity(1000);
                let mut sealed = 0;
                for _ in 0..1000 {
                    let (pending, handle) = PendingMessage::new(message.clone());
                    handles.push(handle);
                    sealed += assembler.append(pending).len();
                }
                sealed += assembler.seal().into_iter().count();
                black_box(sealed)
            });
        });
    }

    group.finish();
}

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    let routing = RoutingPolicy::new();

    group.bench_function("keyed", |b| {
        b.iter(|| routing.route(black_box(b"user-123456"), black_box(64)))
    });

    group.bench_function("round_robin", |b| {
        b.iter(|| routing.route(black_box(b""), black_box(64)))
    });

    group.finish();
}

fn bench_publish_in_memory(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let topic: TopicPath = "projects/bench/locations/us-central1-a/topics/bench"
        .parse()
        .unwrap();

    let connection = runtime.block_on(async {
        let admin = Arc::new(InMemoryAdminClient::new());
        admin
            .create_topic(TopicConfig::new(topic.clone(), 4))
            .await
            .unwrap();
        PublisherConnection::builder()
            .topic(topic)
            .admin(admin)
            .transport(Arc::new(InMemoryTransport::new()))
            .options(
                PublisherOptions::builder()
                    .flush_alarm_period(Duration::from_millis(1))
                    .build(),
            )
            .build()
            .await
            .unwrap()
    });

    let mut group = c.benchmark_group("publish_in_memory");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("1000_messages", |b| {
        b.to_async(&runtime).iter(|| async {
            let futures: Vec<_> = (0..1000)
                .map(|i| connection.publish(Message::new(format!("message-{}", i))))
                .collect();
            connection.flush().await;
            for future in futures {
                black_box(future.await.unwrap());
            }
        });
    });
    group.finish();

    runtime.block_on(connection.shutdown());
}

criterion_group!(
    benches,
    bench_batch_assembly,
    bench_routing,
    bench_publish_in_memory
);
criterion_main!(benches);
