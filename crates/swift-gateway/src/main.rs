//! Swift Gateway - streaming HTTP gateway for Swift object storage

use clap::Parser;
use swift_gateway::{run_server, GatewayConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "swift-gateway")]
#[command(about = "Streaming HTTP gateway for Swift object storage")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "SWIFT_GATEWAY_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "9000", env = "SWIFT_GATEWAY_PORT")]
    port: u16,

    /// Storage backend host
    #[arg(long, default_value = "localhost", env = "SWIFT_HOST")]
    swift_host: String,

    /// Storage backend port
    #[arg(long, default_value = "8080", env = "SWIFT_PORT")]
    swift_port: u16,

    /// Storage backend scheme
    #[arg(long, default_value = "https", env = "SWIFT_SCHEME")]
    swift_scheme: String,

    /// Storage user
    #[arg(long, env = "SWIFT_USER")]
    swift_user: String,

    /// Storage password
    #[arg(long, env = "SWIFT_PASS", hide_env_values = true)]
    swift_pass: String,

    /// Enable debug logging
    #[arg(short, long, env = "SWIFT_GATEWAY_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| {
                format!("swift_gateway={0},swift_client={0},tower_http=debug", log_level).into()
            }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Swift gateway on {}:{}", args.host, args.port);
    tracing::info!(
        "Storage backend: {}://{}:{} as {}",
        args.swift_scheme,
        args.swift_host,
        args.swift_port,
        args.swift_user
    );

    if args.swift_scheme == "http" {
        tracing::warn!("Storage credentials will be sent without TLS");
    }

    let config = GatewayConfig {
        host: args.host,
        port: args.port,
        swift_host: args.swift_host,
        swift_port: args.swift_port,
        swift_scheme: args.swift_scheme,
        swift_user: args.swift_user,
        swift_pass: args.swift_pass,
        ..Default::default()
    };

    run_server(config).await
}
