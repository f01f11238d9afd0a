use std::time::Duration;

use tracing::{info, warn};
use wirecall::transport::RpcListener;
use wirecall::{Server, ServerConfig, Service};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{rpc_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let handle_timeout = parse_duration(&args.handle_timeout)?;
    let server = demo_server(ServerConfig::default().with_handle_timeout(handle_timeout))
        .map_err(|err| rpc_error("register services", err))?;

    let listener = RpcListener::bind(args.network, &args.address)
        .await
        .map_err(|err| transport_error("bind", err))?;
    print_listening(listener.network().as_str(), listener.local_addr(), format);

    tokio::select! {
        result = server.accept(listener) => {
            result.map_err(|err| rpc_error("accept", err))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }
    Ok(SUCCESS)
}

/// A server with the demo services registered.
pub fn demo_server(config: ServerConfig) -> wirecall::Result<Server> {
    let mut server = Server::with_config(config);
    server.register(arith()?)?;
    server.register(echo()?)?;
    server.register(clock()?)?;
    Ok(server)
}

fn arith() -> wirecall::Result<Service> {
    Service::builder("Arith")
        .method("Sum", |terms: Vec<i64>| async move {
            terms
                .iter()
                .try_fold(0i64, |acc, n| acc.checked_add(*n))
                .ok_or("integer overflow")
        })
        .method("Mul", |factors: Vec<i64>| async move {
            factors
                .iter()
                .try_fold(1i64, |acc, n| acc.checked_mul(*n))
                .ok_or("integer overflow")
        })
        .method("Div", |(num, den): (i64, i64)| async move {
            num.checked_div(den).ok_or("divide by zero")
        })
        .build()
}

fn echo() -> wirecall::Result<Service> {
    Service::builder("Echo")
        .method("Say", |message: serde_json::Value| async move {
            Ok::<_, String>(message)
        })
        .build()
}

fn clock() -> wirecall::Result<Service> {
    Service::builder("Clock")
        // Sleeps for the given number of milliseconds, then echoes it back.
        .method("Sleep", |millis: u64| async move {
            if millis > 60_000 {
                warn!(millis, "refusing long sleep");
                return Err("sleep longer than 60s".to_string());
            }
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(millis)
        })
        .build()
}
