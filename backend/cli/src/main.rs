mod api;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use flipforge_engine::ArbitrageEngine;
use flipforge_market::{FeedSource, MarketClient};
use flipforge_scheduler::{CronScheduler, RunLog};

use api::AppState;
use config::Config;

#[derive(Parser)]
#[command(name = "flipforge")]
#[command(about = "FlipForge marketplace arbitrage automation runtime")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler runtime and management API
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show scheduler health from a running instance
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            let config = Config {
                port: port.unwrap_or(config.port),
                ..config
            };
            run_server(config).await?;
        }
        Commands::Status => {
            let client = reqwest::Client::new();
            match client
                .get(format!("http://localhost:{}/health", config.port))
                .send()
                .await
            {
                Ok(resp) => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => {
                    println!("FlipForge is not running on port {}", config.port);
                }
            }
        }
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    info!(
        port = config.port,
        bind = %config.bind_address,
        db = %config.db_path,
        market_api = %config.market_api_url,
        "Starting FlipForge runtime"
    );

    let run_log = Arc::new(RunLog::open(&config.db_path)?);

    let engine = Arc::new(ArbitrageEngine::new());
    if let Some(url) = &config.supplier_feed_url {
        engine.register_source(Arc::new(FeedSource::new(url))).await;
        info!(url = %url, "Registered supplier feed source");
    }

    let market = Arc::new(MarketClient::new(&config.market_api_url));

    let scheduler = Arc::new(CronScheduler::new(
        engine,
        market,
        run_log,
        config.jobs.clone(),
        config.scan.clone(),
    ));
    scheduler.initialize().await;
    if config.autostart {
        scheduler.start().await?;
    }

    let state = Arc::new(AppState { scheduler });
    let app = api::build_router(state).layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;
    info!("Management API listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
