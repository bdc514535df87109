mod app;
mod collectors;
mod config;
mod http;
mod metrics;
mod normalize;
mod remote;
mod report;
mod snapshot;
mod ticket;
mod update;

use app::AppContext;
use axum::serve;
use clap::Parser;
use config::Config;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "supportdesk")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Collect one snapshot, print the report and exit.
    #[arg(long)]
    once: bool,
    /// With --once, print the snapshot as JSON.
    #[arg(long, requires = "once")]
    json: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = if cli.once && !std::path::Path::new(&cli.config).exists() {
        Config::default()
    } else {
        match Config::load_from_file(&cli.config) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        }
    };

    let ctx = match AppContext::init(cfg) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(error = %err, "failed to initialize");
            std::process::exit(1);
        }
    };

    if cli.once {
        std::process::exit(print_once(&ctx, cli.json).await);
    }

    info!(
        listen = %ctx.config.listen,
        poll_interval_secs = ctx.config.poll_interval_secs,
        version = env!("CARGO_PKG_VERSION"),
        "starting supportdesk"
    );

    ctx.start().await;

    let http_task = {
        let ctx = ctx.clone();
        let mut shutdown_rx = ctx.shutdown_signal();
        tokio::spawn(async move {
            let addr: SocketAddr = match ctx.config.listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %ctx.config.listen, "invalid listen address");
                    ctx.request_shutdown();
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to start HTTP server");
                    ctx.request_shutdown();
                    return;
                }
            };

            let app = http::build_router(ctx.clone());
            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    };

    let mut shutdown_rx = ctx.shutdown_signal();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(error = %err, "failed to wait for Ctrl+C");
            }
            info!("received Ctrl+C, shutting down");
        }
        _ = shutdown_rx.changed() => {
            info!("shutdown requested");
        }
    }

    ctx.shutdown().await;
    let _ = http_task.await;
}

async fn print_once(ctx: &AppContext, json: bool) -> i32 {
    let snapshot = match ctx.collector.collect().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            error!(error = %err, "snapshot collection failed");
            return 1;
        }
    };
    if json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                error!(error = %err, "failed to encode snapshot");
                return 1;
            }
        }
    } else {
        print!("{}", report::render_plain_text(&snapshot));
    }
    0
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
