//! Client and server talking over loopback TCP.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use wirecall_codec::CodecType;
use wirecall_rpc::{
    dial, CancellationToken, Client, Options, RpcError, Server, Service,
};
use wirecall_transport::{Network, RpcListener};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Greeting {
    name: String,
    times: u32,
}

fn server() -> Server {
    let mut server = Server::new();
    server
        .register(
            Service::builder("Arith")
                .method("Sum", |args: Vec<i64>| async move {
                    Ok::<_, String>(args.iter().sum::<i64>())
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    server
        .register(
            Service::builder("Echo")
                .method("Greet", |g: Greeting| async move {
                    Ok::<_, String>(vec![format!("hello {}", g.name); g.times as usize])
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    server
        .register(
            Service::builder("Clock")
                .method("Sleep", |ms: u64| async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok::<_, String>(ms)
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    server
}

async fn start(server: Server) -> String {
    let listener = RpcListener::bind(Network::Tcp, "127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().to_string();
    tokio::spawn(async move { server.accept(listener).await });
    address
}

async fn client(address: &str, codec: CodecType) -> Client {
    dial(Network::Tcp, address, Options::default().with_codec_type(codec))
        .await
        .unwrap()
}

#[tokio::test]
async fn sum_over_both_codecs() {
    let address = start(server()).await;
    for codec in [CodecType::JSON, CodecType::MSGPACK] {
        let client = client(&address, codec).await;
        let sum: i64 = client
            .call(&CancellationToken::new(), "Arith.Sum", &[1, 2, 3])
            .await
            .unwrap();
        assert_eq!(sum, 6);

        let greeting = Greeting {
            name: "wirecall".to_string(),
            times: 2,
        };
        let replies: Vec<String> = client
            .call_timeout(Duration::from_secs(5), "Echo.Greet", &greeting)
            .await
            .unwrap();
        assert_eq!(replies, vec!["hello wirecall", "hello wirecall"]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_are_matched_by_sequence() {
    let address = start(server()).await;
    let client = Arc::new(client(&address, CodecType::MSGPACK).await);

    // Later calls sleep less, so replies come back in reverse order.
    let tasks: Vec<_> = (0..32u64)
        .map(|i| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let ms = (32 - i) * 3;
                let reply: u64 = client
                    .call_timeout(Duration::from_secs(10), "Clock.Sleep", &ms)
                    .await
                    .unwrap();
                (ms, reply)
            })
        })
        .collect();

    for task in tasks {
        let (sent, got) = task.await.unwrap();
        assert_eq!(sent, got);
    }
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn go_returns_before_reply() {
    let address = start(server()).await;
    let client = client(&address, CodecType::JSON).await;

    let slow = client.go::<_, u64>("Clock.Sleep", &200u64).await;
    let fast = client.go::<_, i64>("Arith.Sum", &[4, 5]).await;
    assert!(slow.seq() < fast.seq());
    assert_eq!(fast.done().await.unwrap(), 9);
    assert_eq!(slow.done().await.unwrap(), 200);
}

#[tokio::test]
async fn application_errors_keep_connection_open() {
    let address = start(server()).await;
    let client = client(&address, CodecType::MSGPACK).await;
    let cancel = CancellationToken::new();

    let err = client
        .call::<_, i64>(&cancel, "Nope.Sum", &[1])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "rpc server: can't find service Nope");

    let err = client
        .call::<_, String>(&cancel, "Arith.Sum", &[1, 2])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Decode(_)));

    assert!(client.is_available());
    let sum: i64 = client.call(&cancel, "Arith.Sum", &[10]).await.unwrap();
    assert_eq!(sum, 10);
}

#[tokio::test]
async fn handle_timeout_isolated_to_slow_call() {
    let address = start(server()).await;
    let options = Options::default().with_handle_timeout(Duration::from_millis(100));
    let client = Arc::new(dial(Network::Tcp, &address, options).await.unwrap());

    let started = Instant::now();
    let slow = client.go::<_, u64>("Clock.Sleep", &60_000u64).await;
    let quick: Vec<_> = {
        let mut quick = Vec::new();
        for i in 0..5i64 {
            quick.push(client.go::<_, i64>("Arith.Sum", &[i, i]).await);
        }
        quick
    };

    for (i, call) in quick.into_iter().enumerate() {
        assert_eq!(call.done().await.unwrap(), 2 * i as i64);
    }
    let err = slow.done().await.unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert_eq!(
        err.to_string(),
        "rpc server: request handle timeout: expect within 100ms"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(client.is_available());
}

#[tokio::test]
async fn connect_timeout_against_silent_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    // Accepts and reads, but never acknowledges the options.
    let peer = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut sink = Vec::new();
        let _ = socket.read_to_end(&mut sink).await;
        sink
    });

    let started = Instant::now();
    let err = dial(
        Network::Tcp,
        &address,
        Options::default().with_connect_timeout(Duration::from_millis(100)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RpcError::ConnectTimeout(_)));
    assert!(started.elapsed() < Duration::from_secs(5));

    // read_to_end returns once the abandoned connection is closed.
    let received = tokio::time::timeout(Duration::from_secs(5), peer)
        .await
        .expect("abandoned connection should be closed")
        .unwrap();
    assert!(!received.is_empty(), "the options frame was sent");
}

#[tokio::test]
async fn close_then_calls_fail_fast() {
    let address = start(server()).await;
    let client = client(&address, CodecType::JSON).await;
    let pending = client.go::<_, u64>("Clock.Sleep", &5_000u64).await;

    client.close().await.unwrap();
    assert!(matches!(pending.done().await, Err(RpcError::Shutdown)));
    assert!(!client.is_available());

    let err = client
        .call::<_, i64>(&CancellationToken::new(), "Arith.Sum", &[1])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Shutdown));
    assert!(matches!(client.close().await, Err(RpcError::Shutdown)));
}

#[tokio::test]
async fn cancellation_detaches_only_the_caller() {
    let address = start(server()).await;
    let client = client(&address, CodecType::MSGPACK).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let err = client
        .call::<_, u64>(&cancel, "Clock.Sleep", &150u64)
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Cancelled));
    assert_eq!(client.pending_calls(), 1);

    // The late reply is drained and the connection keeps working.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(client.pending_calls(), 0);
    let sum: i64 = client
        .call(&CancellationToken::new(), "Arith.Sum", &[2, 3])
        .await
        .unwrap();
    assert_eq!(sum, 5);
}

#[tokio::test]
async fn server_going_away_fails_every_pending_call() {
    let listener = RpcListener::bind(Network::Tcp, "127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().to_string();
    let server = server();
    let serving = tokio::spawn(async move {
        let stream = listener.accept().await.unwrap();
        // Serve exactly one connection, then drop it mid-flight.
        tokio::time::timeout(Duration::from_millis(100), server.serve_conn(stream)).await
    });

    let client = client(&address, CodecType::JSON).await;
    let mut calls = Vec::new();
    for _ in 0..3 {
        calls.push(client.go::<_, u64>("Clock.Sleep", &10_000u64).await);
    }

    assert!(serving.await.unwrap().is_err(), "serve_conn should be cut off");
    for call in calls {
        let err = call.done().await.unwrap_err();
        assert!(matches!(err, RpcError::Disconnected(_)), "{err}");
    }
    assert_eq!(client.pending_calls(), 0);
    assert!(!client.is_available());
}

#[cfg(unix)]
#[tokio::test]
async fn unix_socket_round_trip() {
    let dir = std::env::temp_dir().join(format!("wirecall-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("rpc.sock").display().to_string();

    let listener = RpcListener::bind(Network::Unix, &path).await.unwrap();
    let server = server();
    tokio::spawn(async move { server.accept(listener).await });

    let client = dial(Network::Unix, &path, Options::default()).await.unwrap();
    let sum: i64 = client
        .call(&CancellationToken::new(), "Arith.Sum", &[7, 8])
        .await
        .unwrap();
    assert_eq!(sum, 15);
    let _ = std::fs::remove_dir_all(&dir);
}
