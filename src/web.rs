#![cfg(not(tarpaulin_include))]

use clap::Parser;
use emotion_report::app;
use emotion_report::config::ServerConfig;

/// Main entry point for the web application
///
/// Reads the server configuration from the command line and environment,
/// sets up logging and serves until interrupted.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    app::run(config).await
}
