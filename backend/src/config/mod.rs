use config::{Config, ConfigError, Environment, Source};
use dotenv::dotenv;
use serde::Deserialize;

use crate::schedule::MissingSet;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub db_pool_size: u32,
    /// Queue worker endpoint; without it queued items wait for polling.
    pub queue_processor_url: Option<String>,
    pub queue_trigger_timeout_secs: u64,
    /// Reading of a listing with no recorded availability.
    pub missing_availability: MissingSet,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load .env file if present
        Self::from_source(Environment::default().try_parsing(true))
    }

    pub fn from_source<S>(source: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 3000)?
            .set_default("db_pool_size", 10)?
            .set_default("queue_trigger_timeout_secs", 10)?
            .set_default("missing_availability", "nothing")?
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}
