//! Many calls in flight on one connection, completing out of order.
//!
//! Run with: `cargo run --example concurrent-calls`

use std::sync::Arc;
use std::time::{Duration, Instant};

use wirecall::transport::RpcListener;
use wirecall::{dial, Network, Options, Server, Service};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new();
    server.register(
        Service::builder("Clock")
            .method("Sleep", |millis: u64| async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok::<_, String>(millis)
            })
            .build()?,
    )?;

    let listener = RpcListener::bind(Network::Tcp, "127.0.0.1:0").await?;
    let address = listener.local_addr().to_string();
    tokio::spawn(async move { server.accept(listener).await });

    let client = Arc::new(dial(Network::Tcp, &address, Options::default()).await?);
    let started = Instant::now();

    let mut calls = tokio::task::JoinSet::new();
    for millis in [500u64, 100, 300, 200, 400] {
        let client = Arc::clone(&client);
        calls.spawn(async move {
            let reply = client
                .call_timeout::<_, u64>(Duration::from_secs(2), "Clock.Sleep", &millis)
                .await;
            (millis, reply, started.elapsed())
        });
    }

    while let Some(joined) = calls.join_next().await {
        let (millis, reply, elapsed) = joined?;
        println!("Sleep({millis}) -> {:?} after {elapsed:?}", reply?);
    }
    // All five overlap: total time tracks the slowest call, not the sum.
    println!("total: {:?}", started.elapsed());

    client.close().await?;
    Ok(())
}
