//! Demo worker serving one plain operation and one ALO over HTTP.
//!
//! - `demo/echo` returns its input.
//! - `demo/sleep` is an ALO that sleeps for the number of milliseconds given
//!   as UTF-8 decimal input, honouring cancellation.

use std::sync::Arc;
use std::time::Duration;

use alo_core::{codes, Request, Response, ResponseFailure};
use alo_server::alo::{AloFailure, AloHost, AloHostConfig, LoggingInvoker, TaskAdapter};
use alo_server::network::{NetworkConfig, NetworkModule};
use alo_server::service::{Dispatcher, OperationError, OperationRouter, ServerConfig};
use alo_server::traits::handler_fn;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "alo-demo-server", about = "ALO RPC demo worker")]
struct Args {
    /// Bind address.
    #[arg(long, env = "ALO_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Listen port. 0 picks a free one.
    #[arg(long, env = "ALO_PORT", default_value_t = 8080)]
    port: u16,

    /// Identifier reported by the health endpoint.
    #[arg(long, env = "ALO_NODE_ID", default_value = "demo-worker")]
    node_id: String,

    /// Seconds an ALO may take to report that it started.
    #[arg(long, env = "ALO_START_TIMEOUT_SECS", default_value_t = 30)]
    start_timeout_secs: u64,

    /// Emit logs as JSON lines.
    #[arg(long, env = "ALO_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn sleep_task(req: Request, cancel: CancellationToken) -> Result<Vec<u8>, AloFailure> {
    let millis: u64 = std::str::from_utf8(&req.input)
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .ok_or_else(|| {
            ResponseFailure::with_message(
                codes::INVALID_ARGUMENT,
                "input must be a decimal number of milliseconds",
            )
        })?;

    tokio::select! {
        () = tokio::time::sleep(Duration::from_millis(millis)) => {
            Ok(format!("slept {millis}ms").into_bytes())
        }
        () = cancel.cancelled() => Err(AloFailure::Cancelled),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut host_config = AloHostConfig::default();
    host_config.supervisor.start_timeout = Duration::from_secs(args.start_timeout_secs);
    let host = AloHost::with_callback_invoker(host_config, Arc::new(LoggingInvoker));

    let mut router = OperationRouter::new();
    router.register(
        "demo",
        "echo",
        handler_fn(|req: Request| async move {
            Ok::<_, OperationError>(Response::output(req.input))
        }),
    )?;
    host.register(&mut router, "demo", "sleep", TaskAdapter::new(sleep_task))?;

    let server_config = ServerConfig {
        node_id: args.node_id.clone(),
        ..ServerConfig::default()
    };
    let dispatcher = Dispatcher::new(router, &server_config);
    let mut sweeper = host.spawn_sweeper();

    let network_config = NetworkConfig {
        host: args.host,
        port: args.port,
        ..NetworkConfig::default()
    };
    let mut module = NetworkModule::new(network_config, dispatcher, args.node_id);
    let port = module.start().await?;
    tracing::info!(port, "demo worker listening");

    module
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for ctrl-c");
            }
        })
        .await?;

    sweeper.stop().await;
    Ok(())
}
