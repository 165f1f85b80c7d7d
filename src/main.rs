use std::fs;
use std::path::Path;

use anyhow::Result;
use clap::Parser;

mod database;
mod models;
mod repositories;
pub mod services;
pub mod settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Overrides `server.listen` from the config file.
    #[arg(short, long)]
    listen: Option<String>,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log4rs).expect("Failed to initialize logging.");
    let settings = settings::Settings::new(&args.config).expect("Could not load config file.");
    log::info!("Starting copydesk.");

    let pool = database::connect(&settings.database)
        .await
        .expect("Could not connect to database.");

    let listen = args.listen.unwrap_or_else(|| settings.server.listen.clone());
    let (channels, feed) = services::start_services(pool, settings)
        .await
        .expect("Could not start services.");

    services::http::start_http_server(&listen, services::http::AppState { channels, feed })
        .await
        .expect("HTTP server failed.");

    Ok(())
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
