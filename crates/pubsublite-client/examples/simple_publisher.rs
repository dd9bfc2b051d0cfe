//! Simple Publisher Example
//!
//! Publishes a handful of keyed and unkeyed messages to an in-memory server
//! and prints where each one was stored.
//!
//! Run with:
//! ```bash
//! RUST_LOG=pubsublite_client=debug cargo run --package pubsublite-client --example simple_publisher
//! ```

use pubsublite_admin::{AdminClient, InMemoryAdminClient, TopicConfig};
use pubsublite_client::testing::{Fault, InMemoryTransport};
use pubsublite_client::{Message, PublisherConnection, PublisherOptions, TopicPath};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let topic: TopicPath = "projects/demo-project/locations/us-central1-a/topics/orders".parse()?;

    // Control plane with a 3-partition topic.
    let admin = Arc::new(InMemoryAdminClient::new());
    admin.create_topic(TopicConfig::new(topic.clone(), 3)).await?;
    println!("Created topic {} with 3 partitions", topic);

    // Break the first stream after it receives a batch to show a resume.
    let transport = InMemoryTransport::new();
    transport.push_fault(Fault::FailAfterReceive(tonic::Status::unavailable(
        "simulated connection reset",
    )));

    let options = PublisherOptions::builder()
        .max_batch_message_count(4)
        .flush_alarm_period(Duration::from_millis(20))
        .build();
    let connection = PublisherConnection::builder()
        .topic(topic)
        .admin(admin)
        .transport(Arc::new(transport.clone()))
        .options(options)
        .build()
        .await?;

    let mut pending = Vec::new();
    for i in 0..5 {
        let message = Message::new(format!("order {}", i)).with_ordering_key("customer-42");
        pending.push((format!("keyed order {}", i), connection.publish(message)));
    }
    for i in 0..5 {
        let message = Message::new(format!("event {}", i)).with_attribute("source", "example");
        pending.push((format!("unkeyed event {}", i), connection.publish(message)));
    }
    connection.flush().await;

    for (label, ack) in pending {
        match ack.await {
            Ok(ack) => println!("  {:<16} -> {}", label, ack),
            Err(e) => println!("  {:<16} -> failed: {}", label, e),
        }
    }

    connection.shutdown().await;
    println!("Streams opened: {}", transport.streams_opened());
    Ok(())
}
