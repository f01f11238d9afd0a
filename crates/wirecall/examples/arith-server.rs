//! A server exposing `Arith.Sum` and `Arith.Mul`, exercised by one client.
//!
//! Run with: `cargo run --example arith-server`

use serde::{Deserialize, Serialize};
use wirecall::transport::RpcListener;
use wirecall::{dial, CancellationToken, CodecType, Network, Options, Server, Service};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Args {
    num1: i64,
    num2: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new();
    server.register(
        Service::builder("Arith")
            .method("Sum", |args: Args| async move {
                Ok::<_, String>(args.num1 + args.num2)
            })
            .method("Mul", |args: Args| async move {
                Ok::<_, String>(args.num1 * args.num2)
            })
            .build()?,
    )?;

    let listener = RpcListener::bind(Network::Tcp, "127.0.0.1:0").await?;
    let address = listener.local_addr().to_string();
    println!("listening on {address}");
    tokio::spawn(async move { server.accept(listener).await });

    let options = Options::default().with_codec_type(CodecType::JSON);
    let client = dial(Network::Tcp, &address, options).await?;
    let cancel = CancellationToken::new();

    for (num1, num2) in [(1, 2), (3, 4), (10, -7)] {
        let sum: i64 = client
            .call(&cancel, "Arith.Sum", &Args { num1, num2 })
            .await?;
        let product: i64 = client
            .call(&cancel, "Arith.Mul", &Args { num1, num2 })
            .await?;
        println!("{num1} + {num2} = {sum}, {num1} * {num2} = {product}");
    }

    client.close().await?;
    Ok(())
}
