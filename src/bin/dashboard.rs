//! Standalone random pie chart dashboard.
//!
//! Run with: cargo run --bin dashboard -- --bind 127.0.0.1:8050

use bag_geotag::config::Config;
use bag_geotag::dashboard;
use bag_geotag::logging::{self, LogLevel, Source};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dashboard", version, about = "Three random pie charts, refreshed on click")]
struct Cli {
    /// Configuration file (defaults to ./geotag.toml when present)
    #[arg(short, long, env = "GEOTAG_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on; overrides dashboard.bind
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init_logger(LogLevel::Info, None, true);

    let bind = cli.bind.unwrap_or(config.dashboard.bind);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    logging::info(Source::Dashboard, None, &format!("Dashboard listening on http://{}", bind));

    axum::serve(listener, dashboard::router()).await?;
    Ok(())
}
