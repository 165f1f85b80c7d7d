use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Market {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geolocation {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vip {
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub database: Database,
    pub market: Market,
    pub geolocation: Geolocation,
    pub vip: Vip,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.listen", "0.0.0.0:8080")?
            .set_default("database.url", "sqlite://copydesk.db")?
            .set_default("database.max_connections", 5)?
            .set_default("market.base_url", "https://api.binance.com")?
            .set_default("market.timeout_secs", 10)?
            .set_default("geolocation.base_url", "https://ipapi.co")?
            .set_default("geolocation.timeout_secs", 3)?
            .set_default("vip.sweep_interval_secs", 300)?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("COPYDESK").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
